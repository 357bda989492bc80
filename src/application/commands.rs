use crate::application::bootstrap::bootstrap_workspace;
use crate::application::route_overlay::{RouteOverlay, RouteOverlayFetcher};
use crate::application::schedule_store::{DeleteConfirmation, ScheduleStore};
use crate::application::session::{SessionState, SessionTokenProvider, SignInOutcome};
use crate::domain::models::{validate_date, Itinerary, LatLng, LatLngBounds, ScheduleEntry, SessionToken};
use crate::domain::timeline::{layout_day, ExpansionState};
use crate::infrastructure::config::{read_api_base_url, read_origin, read_token_endpoint};
use crate::infrastructure::credential_store::KeyringCredentialStore;
use crate::infrastructure::directions_client::{ReqwestDirectionsClient, StaticLocationProvider};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::identity_client::ReqwestIdentityClient;
use crate::infrastructure::itinerary_api_client::ReqwestItineraryApiClient;
use crate::infrastructure::session_prefs_repository::{
    SessionPrefsRepository, SqliteSessionPrefsRepository,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

type Session =
    SessionTokenProvider<KeyringCredentialStore, ReqwestIdentityClient, SqliteSessionPrefsRepository>;
type Schedule = ScheduleStore<ReqwestItineraryApiClient, Session>;
type Routes = RouteOverlayFetcher<ReqwestDirectionsClient, StaticLocationProvider, Session>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    session: Arc<Session>,
    schedule: Arc<Schedule>,
    routes: Arc<Routes>,
    prefs: Arc<SqliteSessionPrefsRepository>,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, CoreError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let api_base_url = read_api_base_url(&config_dir)?;
        let token_endpoint = read_token_endpoint(&config_dir)?;
        let origin = read_origin(&config_dir)?;

        let prefs = Arc::new(SqliteSessionPrefsRepository::new(&bootstrap.database_path));
        let session = Arc::new(Session::new(
            Arc::new(KeyringCredentialStore::default()),
            Arc::new(ReqwestIdentityClient::new(token_endpoint)),
            Arc::clone(&prefs),
        ));
        let schedule = Arc::new(Schedule::new(
            Arc::new(ReqwestItineraryApiClient::new(&api_base_url)?),
            Arc::clone(&session),
        ));
        let routes = Arc::new(Routes::new(
            Arc::new(ReqwestDirectionsClient::new(&api_base_url)?),
            Arc::new(StaticLocationProvider::new(origin)),
            Arc::clone(&session),
        ));

        Ok(Self {
            config_dir,
            database_path: bootstrap.database_path,
            logs_dir,
            session,
            schedule,
            routes,
            prefs,
            runtime: Mutex::new(RuntimeState::default()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &CoreError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Default)]
struct RuntimeState {
    selected_day: Option<String>,
    expansion: ExpansionState,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectItineraryResponse {
    pub itinerary: Itinerary,
    pub selected_day: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelineEntryView {
    pub id: Option<String>,
    pub place_name: String,
    pub scheduled_time: String,
    pub top: f32,
    pub height: f32,
    pub expanded: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelineView {
    pub day: String,
    pub entries: Vec<TimelineEntryView>,
    pub total_height: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteOverlayResponse {
    pub destination_place_id: String,
    pub path: Vec<LatLng>,
    pub bounds: LatLngBounds,
}

pub async fn initialize_session_impl(state: &AppState) -> Result<String, CoreError> {
    let session_state = state.session.initialize().await?;
    state.log_info(
        "initialize_session",
        &format!("restored session state {session_state:?}"),
    );
    Ok(session_state_label(session_state).to_string())
}

pub fn sign_in_impl(
    state: &AppState,
    raw_token: String,
    expires_in_seconds: i64,
) -> Result<SignInResponse, CoreError> {
    let raw_token = raw_token.trim();
    if raw_token.is_empty() {
        return Err(CoreError::Validation("token must not be empty".to_string()));
    }
    if expires_in_seconds <= 0 {
        return Err(CoreError::Validation(
            "expires_in_seconds must be positive".to_string(),
        ));
    }

    let token = SessionToken {
        raw_token: raw_token.to_string(),
        expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
    };
    let expires_at = token.expires_at.to_rfc3339();

    match state.session.handle_sign_in(token)? {
        SignInOutcome::Accepted => {
            state.log_info("sign_in", "session accepted and refresh scheduled");
            Ok(SignInResponse {
                status: "accepted".to_string(),
                expires_at: Some(expires_at),
            })
        }
        SignInOutcome::RejectedNotRemembered => {
            state.log_info("sign_in", "session discarded per remember-me preference");
            Ok(SignInResponse {
                status: "signed_out".to_string(),
                expires_at: None,
            })
        }
    }
}

pub fn sign_out_impl(state: &AppState) -> Result<(), CoreError> {
    state.session.sign_out()?;
    state.routes.clear();
    state.log_info("sign_out", "cleared session and route overlay");
    Ok(())
}

pub fn set_remember_me_impl(state: &AppState, remember_me: bool) -> Result<(), CoreError> {
    let mut prefs = state.prefs.load()?;
    prefs.remember_me = remember_me;
    state.prefs.save(&prefs, Utc::now())?;
    state.log_info("set_remember_me", &format!("remember_me={remember_me}"));
    Ok(())
}

pub async fn list_itineraries_impl(state: &AppState) -> Result<Vec<Itinerary>, CoreError> {
    let itineraries = state.schedule.load_itineraries().await?;
    state.log_info(
        "list_itineraries",
        &format!("loaded {} itineraries", itineraries.len()),
    );
    Ok(itineraries)
}

pub fn select_itinerary_impl(
    state: &AppState,
    itinerary_id: String,
) -> Result<SelectItineraryResponse, CoreError> {
    let itinerary_id = itinerary_id.trim();
    if itinerary_id.is_empty() {
        return Err(CoreError::Validation(
            "itinerary_id must not be empty".to_string(),
        ));
    }

    let itinerary = state.schedule.select_itinerary(itinerary_id)?;

    let selected_day = {
        let mut runtime = lock_runtime(state)?;
        // Keep the shown day only when it falls inside the new itinerary;
        // otherwise anchor to its first day.
        let keep = runtime
            .selected_day
            .as_deref()
            .is_some_and(|day| itinerary.contains_date(day));
        if !keep {
            runtime.selected_day = Some(itinerary.start_date.clone());
        }
        runtime.expansion.collapse();
        runtime
            .selected_day
            .clone()
            .unwrap_or_else(|| itinerary.start_date.clone())
    };

    let mut prefs = state.prefs.load()?;
    prefs.selected_itinerary_id = Some(itinerary.id.clone());
    state.prefs.save(&prefs, Utc::now())?;

    state.log_info(
        "select_itinerary",
        &format!("selected itinerary_id={} day={selected_day}", itinerary.id),
    );
    Ok(SelectItineraryResponse {
        itinerary,
        selected_day,
    })
}

pub fn select_day_impl(state: &AppState, day: String) -> Result<TimelineView, CoreError> {
    let day = day.trim().to_string();
    validate_date(&day, "day").map_err(CoreError::Validation)?;

    let itinerary = required_selected_itinerary(state)?;
    if !itinerary.contains_date(&day) {
        return Err(CoreError::Validation(format!(
            "day {day} is outside itinerary range {}..{}",
            itinerary.start_date, itinerary.end_date
        )));
    }

    let mut runtime = lock_runtime(state)?;
    runtime.selected_day = Some(day.clone());
    runtime.expansion.collapse();
    let expansion = runtime.expansion.clone();
    drop(runtime);

    build_timeline_view(&itinerary.entries, &day, &expansion)
}

pub fn layout_timeline_impl(state: &AppState) -> Result<TimelineView, CoreError> {
    let itinerary = required_selected_itinerary(state)?;
    let (day, expansion) = {
        let runtime = lock_runtime(state)?;
        let day = runtime
            .selected_day
            .clone()
            .unwrap_or_else(|| itinerary.start_date.clone());
        (day, runtime.expansion.clone())
    };
    build_timeline_view(&itinerary.entries, &day, &expansion)
}

pub fn toggle_entry_expansion_impl(
    state: &AppState,
    entry_id: String,
    panel_height: f32,
) -> Result<TimelineView, CoreError> {
    let entry_id = entry_id.trim();
    if entry_id.is_empty() {
        return Err(CoreError::Validation(
            "entry_id must not be empty".to_string(),
        ));
    }
    if !panel_height.is_finite() || panel_height < 0.0 {
        return Err(CoreError::Validation(format!(
            "panel_height must be non-negative, got {panel_height}"
        )));
    }

    let itinerary = required_selected_itinerary(state)?;
    let (day, expansion) = {
        let mut runtime = lock_runtime(state)?;
        runtime.expansion.toggle(entry_id, panel_height);
        let day = runtime
            .selected_day
            .clone()
            .unwrap_or_else(|| itinerary.start_date.clone());
        (day, runtime.expansion.clone())
    };
    build_timeline_view(&itinerary.entries, &day, &expansion)
}

pub async fn create_entry_impl(
    state: &AppState,
    entry: ScheduleEntry,
) -> Result<ScheduleEntry, CoreError> {
    let stored = state.schedule.create_entry(entry).await?;
    state.log_info(
        "create_entry",
        &format!(
            "created entry_id={} at {} {}",
            stored.id.as_deref().unwrap_or("?"),
            stored.scheduled_date,
            stored.scheduled_time
        ),
    );
    Ok(stored)
}

pub async fn update_entry_impl(
    state: &AppState,
    entry_id: String,
    scheduled_date: String,
    scheduled_time: String,
    duration_minutes: i64,
) -> Result<TimelineView, CoreError> {
    let entry_id = entry_id.trim();
    if entry_id.is_empty() {
        return Err(CoreError::Validation(
            "entry_id must not be empty".to_string(),
        ));
    }

    state
        .schedule
        .update_entry(entry_id, &scheduled_date, &scheduled_time, duration_minutes)
        .await?;
    state.log_info(
        "update_entry",
        &format!("rescheduled entry_id={entry_id} to {scheduled_date} {scheduled_time}"),
    );
    layout_timeline_impl(state)
}

pub async fn delete_entry_impl(
    state: &AppState,
    entry_id: String,
    confirmed: bool,
) -> Result<bool, CoreError> {
    let entry_id = entry_id.trim().to_string();
    if entry_id.is_empty() {
        return Err(CoreError::Validation(
            "entry_id must not be empty".to_string(),
        ));
    }
    if !confirmed {
        state.log_info("delete_entry", &format!("cancelled entry_id={entry_id}"));
        return Ok(false);
    }

    state
        .schedule
        .delete_entry(&entry_id, DeleteConfirmation::Confirmed)
        .await?;

    {
        let mut runtime = lock_runtime(state)?;
        if runtime.expansion.expanded_id() == Some(entry_id.as_str()) {
            runtime.expansion.collapse();
        }
    }

    state.log_info("delete_entry", &format!("deleted entry_id={entry_id}"));
    Ok(true)
}

pub async fn delete_itinerary_impl(state: &AppState, itinerary_id: String) -> Result<(), CoreError> {
    let itinerary_id = itinerary_id.trim();
    if itinerary_id.is_empty() {
        return Err(CoreError::Validation(
            "itinerary_id must not be empty".to_string(),
        ));
    }

    state.schedule.delete_itinerary(itinerary_id).await?;

    let mut prefs = state.prefs.load()?;
    if prefs.selected_itinerary_id.as_deref() == Some(itinerary_id) {
        prefs.selected_itinerary_id = None;
        state.prefs.save(&prefs, Utc::now())?;
    }

    state.log_info(
        "delete_itinerary",
        &format!("deleted itinerary_id={itinerary_id}"),
    );
    Ok(())
}

pub async fn toggle_route_impl(
    state: &AppState,
    destination_place_id: String,
) -> Result<Option<RouteOverlayResponse>, CoreError> {
    let destination_place_id = destination_place_id.trim();
    if destination_place_id.is_empty() {
        return Err(CoreError::Validation(
            "destination_place_id must not be empty".to_string(),
        ));
    }

    let overlay = state.routes.toggle_route(destination_place_id).await?;
    match &overlay {
        Some(overlay) => state.log_info(
            "toggle_route",
            &format!(
                "showing route to {} with {} points",
                overlay.destination_place_id,
                overlay.path.len()
            ),
        ),
        None => state.log_info("toggle_route", "route hidden or superseded"),
    }
    Ok(overlay.map(to_route_response))
}

/// Called when the timeline screen goes away. Pending route fetches are
/// cancelled so a late response cannot draw on an unrelated screen.
pub fn leave_timeline_impl(state: &AppState) -> Result<(), CoreError> {
    state.routes.cancel_pending();
    let mut runtime = lock_runtime(state)?;
    runtime.expansion.collapse();
    Ok(())
}

fn required_selected_itinerary(state: &AppState) -> Result<Itinerary, CoreError> {
    state
        .schedule
        .selected_itinerary()?
        .ok_or(CoreError::NoItinerarySelected)
}

fn build_timeline_view(
    entries: &[ScheduleEntry],
    day: &str,
    expansion: &ExpansionState,
) -> Result<TimelineView, CoreError> {
    let layout = layout_day(entries, day, expansion)?;
    Ok(TimelineView {
        day: day.to_string(),
        entries: layout
            .entries
            .into_iter()
            .map(|positioned| TimelineEntryView {
                id: positioned.entry.id,
                place_name: positioned.entry.place_name,
                scheduled_time: positioned.entry.scheduled_time,
                top: positioned.top,
                height: positioned.height,
                expanded: positioned.expanded,
            })
            .collect(),
        total_height: layout.total_height,
    })
}

fn to_route_response(overlay: RouteOverlay) -> RouteOverlayResponse {
    RouteOverlayResponse {
        destination_place_id: overlay.destination_place_id,
        path: overlay.path,
        bounds: overlay.bounds,
    }
}

fn session_state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Uninitialized => "uninitialized",
        SessionState::Initializing => "initializing",
        SessionState::Authenticated => "authenticated",
        SessionState::Anonymous => "anonymous",
    }
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, CoreError> {
    state
        .runtime
        .lock()
        .map_err(|error| CoreError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

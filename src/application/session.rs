use crate::domain::models::SessionToken;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::identity_client::IdentityClient;
use crate::infrastructure::session_prefs_repository::SessionPrefsRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Leeway applied when deciding whether a stored token is still good to
/// attach to an outbound request.
const SEND_LEEWAY_SECONDS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    Accepted,
    /// The user opted out of session persistence; the incoming session is
    /// signed out before any token is stored.
    RejectedNotRemembered,
}

/// The token surface the request layer depends on. Mutations and fetchers
/// take this seam instead of the concrete provider so tests can script it.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Freshest valid raw token, refreshing once if the stored one expired.
    async fn current_token(&self) -> Result<String, CoreError>;

    /// Forces a refresh and returns the new raw token.
    async fn refresh_now(&self) -> Result<String, CoreError>;

    /// Drops the session: clears the stored token and transitions to
    /// Anonymous. Best-effort; store errors are swallowed.
    fn invalidate(&self);
}

pub struct SessionTokenProvider<S, C, P>
where
    S: CredentialStore,
    C: IdentityClient,
    P: SessionPrefsRepository,
{
    credential_store: Arc<S>,
    identity_client: Arc<C>,
    prefs_repository: Arc<P>,
    state: Mutex<SessionState>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    now_provider: NowProvider,
}

impl<S, C, P> SessionTokenProvider<S, C, P>
where
    S: CredentialStore + 'static,
    C: IdentityClient + 'static,
    P: SessionPrefsRepository + 'static,
{
    pub fn new(credential_store: Arc<S>, identity_client: Arc<C>, prefs_repository: Arc<P>) -> Self {
        Self {
            credential_store,
            identity_client,
            prefs_repository,
            state: Mutex::new(SessionState::Uninitialized),
            refresh_task: Mutex::new(None),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|guard| *guard)
            .unwrap_or(SessionState::Anonymous)
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// Restores a persisted session on startup. The remember-me preference is
    /// consulted before any token work so a non-remembered token never lives
    /// past this point.
    pub async fn initialize(self: &Arc<Self>) -> Result<SessionState, CoreError> {
        self.set_state(SessionState::Initializing);

        let prefs = self.prefs_repository.load()?;
        if !prefs.remember_me {
            self.credential_store.delete_token()?;
            self.set_state(SessionState::Anonymous);
            return Ok(SessionState::Anonymous);
        }

        let Some(stored) = self.credential_store.load_token()? else {
            self.set_state(SessionState::Anonymous);
            return Ok(SessionState::Anonymous);
        };

        if stored.is_valid_at((self.now_provider)(), SEND_LEEWAY_SECONDS) {
            self.set_state(SessionState::Authenticated);
            self.schedule_refresh(&stored);
            return Ok(SessionState::Authenticated);
        }

        match self.identity_client.refresh_token(&stored).await {
            Ok(token) => {
                self.credential_store.save_token(&token)?;
                self.set_state(SessionState::Authenticated);
                self.schedule_refresh(&token);
                Ok(SessionState::Authenticated)
            }
            Err(_) => {
                self.credential_store.delete_token()?;
                self.set_state(SessionState::Anonymous);
                Ok(SessionState::Anonymous)
            }
        }
    }

    /// Reacts to a sign-in event from the identity provider. Gating on the
    /// remember-me preference happens first, once per auth-state change.
    pub fn handle_sign_in(self: &Arc<Self>, token: SessionToken) -> Result<SignInOutcome, CoreError> {
        let prefs = self.prefs_repository.load()?;
        if !prefs.remember_me {
            self.credential_store.delete_token()?;
            self.set_state(SessionState::Anonymous);
            return Ok(SignInOutcome::RejectedNotRemembered);
        }

        self.credential_store.save_token(&token)?;
        self.set_state(SessionState::Authenticated);
        self.schedule_refresh(&token);
        Ok(SignInOutcome::Accepted)
    }

    pub fn sign_out(&self) -> Result<(), CoreError> {
        self.cancel_refresh();
        self.credential_store.delete_token()?;
        self.set_state(SessionState::Anonymous);
        Ok(())
    }

    /// Arms the proactive refresh timer. Replacing the previous timer keeps
    /// the invariant that at most one refresh is ever pending.
    pub fn schedule_refresh(self: &Arc<Self>, token: &SessionToken) {
        let delay = token
            .refresh_delay_from((self.now_provider)())
            .to_std()
            .unwrap_or_else(|_| std::time::Duration::from_secs(30));

        let provider = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if provider.state() != SessionState::Authenticated {
                return;
            }
            // A failed proactive refresh is not terminal; the next outbound
            // request goes through the reactive retry path.
            if let Ok(token) = provider.refresh_once().await {
                provider.schedule_refresh(&token);
            }
        });

        if let Ok(mut guard) = self.refresh_task.lock() {
            if let Some(previous) = guard.replace(handle) {
                previous.abort();
            }
        }
    }

    pub fn cancel_refresh(&self) {
        if let Ok(mut guard) = self.refresh_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }

    pub fn has_pending_refresh(&self) -> bool {
        self.refresh_task
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }

    async fn refresh_once(&self) -> Result<SessionToken, CoreError> {
        let Some(stored) = self.credential_store.load_token()? else {
            return Err(CoreError::AuthenticationRequired);
        };

        let token = self.identity_client.refresh_token(&stored).await?;
        if self.prefs_repository.load()?.remember_me {
            self.credential_store.save_token(&token)?;
        }
        Ok(token)
    }
}

#[async_trait]
impl<S, C, P> TokenSource for SessionTokenProvider<S, C, P>
where
    S: CredentialStore + 'static,
    C: IdentityClient + 'static,
    P: SessionPrefsRepository + 'static,
{
    async fn current_token(&self) -> Result<String, CoreError> {
        if matches!(self.state(), SessionState::Anonymous | SessionState::Uninitialized) {
            return Err(CoreError::AuthenticationRequired);
        }

        let Some(stored) = self.credential_store.load_token()? else {
            return Err(CoreError::AuthenticationRequired);
        };
        if stored.is_valid_at((self.now_provider)(), SEND_LEEWAY_SECONDS) {
            return Ok(stored.raw_token);
        }

        Ok(self.refresh_once().await?.raw_token)
    }

    async fn refresh_now(&self) -> Result<String, CoreError> {
        Ok(self.refresh_once().await?.raw_token)
    }

    fn invalidate(&self) {
        self.cancel_refresh();
        let _ = self.credential_store.delete_token();
        self.set_state(SessionState::Anonymous);
    }
}

/// Runs an authenticated request with single-retry-on-unauthorized semantics:
/// the freshest token is attached at send time; one 401 triggers exactly one
/// refresh and one retry; a second 401 (or a failed refresh) ends the session.
pub async fn with_authorized_retry<T, TS, F, Fut>(tokens: &TS, operation: F) -> Result<T, CoreError>
where
    TS: TokenSource + ?Sized,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let token = tokens.current_token().await?;
    match operation(token).await {
        Err(error) if error.is_unauthorized() => {
            let refreshed = match tokens.refresh_now().await {
                Ok(token) => token,
                Err(_) => {
                    tokens.invalidate();
                    return Err(CoreError::AuthenticationExpiredFinal);
                }
            };
            match operation(refreshed).await {
                Err(error) if error.is_unauthorized() => {
                    tokens.invalidate();
                    Err(CoreError::AuthenticationExpiredFinal)
                }
                other => other,
            }
        }
        other => other,
    }
}

use crate::domain::timeline::LayoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("credential store error: {0}")]
    Credential(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("remote request failed with status {status}: {detail}")]
    RemoteRequestFailed { status: u16, detail: String },
    #[error("no valid session token; sign in required")]
    AuthenticationRequired,
    #[error("session expired; sign in again")]
    AuthenticationExpiredFinal,
    #[error("a mutation for entry '{0}' is already in flight")]
    ConcurrentMutation(String),
    #[error("update of '{entry}' failed and local state was rolled back: {detail}")]
    RollbackApplied { entry: String, detail: String },
    #[error("entry '{0}' not found in the selected itinerary")]
    EntryNotFound(String),
    #[error("itinerary '{0}' not found")]
    ItineraryNotFound(String),
    #[error("no itinerary selected")]
    NoItinerarySelected,
    #[error("device location unavailable: {0}")]
    LocationUnavailable(String),
    #[error("invalid polyline encoding: {0}")]
    InvalidPolyline(String),
}

impl CoreError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CoreError::RemoteRequestFailed { status: 401, .. })
    }
}

use crate::infrastructure::error::CoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Preferences that survive process restarts: whether the user opted into
/// session persistence, and which itinerary was last selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPrefs {
    pub remember_me: bool,
    pub selected_itinerary_id: Option<String>,
}

impl Default for SessionPrefs {
    fn default() -> Self {
        Self {
            remember_me: true,
            selected_itinerary_id: None,
        }
    }
}

pub trait SessionPrefsRepository: Send + Sync {
    fn load(&self) -> Result<SessionPrefs, CoreError>;
    fn save(&self, prefs: &SessionPrefs, updated_at: DateTime<Utc>) -> Result<(), CoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSessionPrefsRepository {
    db_path: PathBuf,
}

impl SqliteSessionPrefsRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

impl SessionPrefsRepository for SqliteSessionPrefsRepository {
    fn load(&self) -> Result<SessionPrefs, CoreError> {
        let connection = self.connect()?;
        let row: Option<(bool, Option<String>)> = connection
            .query_row(
                "SELECT remember_me, selected_itinerary_id FROM session_prefs WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((remember_me, selected_itinerary_id)) = row else {
            return Ok(SessionPrefs::default());
        };
        Ok(SessionPrefs {
            remember_me,
            selected_itinerary_id,
        })
    }

    fn save(&self, prefs: &SessionPrefs, updated_at: DateTime<Utc>) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO session_prefs (id, remember_me, selected_itinerary_id, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
               remember_me = excluded.remember_me,
               selected_itinerary_id = excluded.selected_itinerary_id,
               updated_at = excluded.updated_at",
            params![
                prefs.remember_me,
                prefs.selected_itinerary_id,
                updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionPrefsRepository {
    prefs: Mutex<Option<SessionPrefs>>,
}

impl InMemorySessionPrefsRepository {
    pub fn with_prefs(prefs: SessionPrefs) -> Self {
        Self {
            prefs: Mutex::new(Some(prefs)),
        }
    }
}

impl SessionPrefsRepository for InMemorySessionPrefsRepository {
    fn load(&self) -> Result<SessionPrefs, CoreError> {
        let prefs = self
            .prefs
            .lock()
            .map_err(|error| CoreError::InvalidConfig(format!("prefs lock poisoned: {error}")))?;
        Ok(prefs.clone().unwrap_or_default())
    }

    fn save(&self, prefs: &SessionPrefs, _updated_at: DateTime<Utc>) -> Result<(), CoreError> {
        let mut guard = self
            .prefs
            .lock()
            .map_err(|error| CoreError::InvalidConfig(format!("prefs lock poisoned: {error}")))?;
        *guard = Some(prefs.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_database() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("tripdeck-prefs-{nanos}.sqlite"))
    }

    #[test]
    fn sqlite_prefs_roundtrip_and_default() {
        let path = temp_database();
        initialize_database(&path).expect("initialize database");
        let repository = SqliteSessionPrefsRepository::new(&path);

        assert_eq!(repository.load().expect("load empty"), SessionPrefs::default());

        let prefs = SessionPrefs {
            remember_me: false,
            selected_itinerary_id: Some("itn-7".to_string()),
        };
        repository.save(&prefs, Utc::now()).expect("save prefs");
        assert_eq!(repository.load().expect("load saved"), prefs);
    }
}

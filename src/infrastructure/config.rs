use crate::domain::models::LatLng;
use crate::infrastructure::error::CoreError;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": "TripDeck",
        "apiBaseUrl": "http://127.0.0.1:8000",
        "tokenEndpoint": "http://127.0.0.1:8000/auth/token",
        "origin": null
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), CoreError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, CoreError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| CoreError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(CoreError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_required_url(config: &serde_json::Value, key: &str, path: &Path) -> Result<String, CoreError> {
    config
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| CoreError::InvalidConfig(format!("missing {} in {}", key, path.display())))
}

pub fn read_api_base_url(config_dir: &Path) -> Result<String, CoreError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;
    read_required_url(&app, "apiBaseUrl", &path)
}

pub fn read_token_endpoint(config_dir: &Path) -> Result<String, CoreError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;
    read_required_url(&app, "tokenEndpoint", &path)
}

/// Configured device position. A desktop workstation has no location sensor,
/// so the origin used for route requests comes from configuration; `None`
/// means location is unavailable.
pub fn read_origin(config_dir: &Path) -> Result<Option<LatLng>, CoreError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;
    let Some(origin) = app.get("origin").filter(|value| !value.is_null()) else {
        return Ok(None);
    };
    let lat = origin.get("lat").and_then(serde_json::Value::as_f64);
    let lng = origin.get("lng").and_then(serde_json::Value::as_f64);
    match (lat, lng) {
        (Some(lat), Some(lng)) => Ok(Some(LatLng { lat, lng })),
        _ => Err(CoreError::InvalidConfig(format!(
            "origin must carry numeric lat and lng in {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_config_dir(tag: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("tripdeck-config-{tag}-{nanos}"));
        fs::create_dir_all(&dir).expect("create temp config dir");
        dir
    }

    #[test]
    fn defaults_are_written_once_and_readable() {
        let dir = temp_config_dir("defaults");
        ensure_default_configs(&dir).expect("write defaults");
        let base_url = read_api_base_url(&dir).expect("read base url");
        assert!(base_url.starts_with("http"));
        assert!(read_origin(&dir).expect("read origin").is_none());
    }

    #[test]
    fn configured_origin_is_parsed() {
        let dir = temp_config_dir("origin");
        let config = serde_json::json!({
            "schema": 1,
            "apiBaseUrl": "https://api.example.test",
            "tokenEndpoint": "https://api.example.test/auth/token",
            "origin": { "lat": 35.68, "lng": 139.76 }
        });
        fs::write(
            dir.join(APP_JSON),
            serde_json::to_string_pretty(&config).expect("serialize"),
        )
        .expect("write config");

        let origin = read_origin(&dir).expect("read origin").expect("origin set");
        assert_eq!(origin.lat, 35.68);
        assert_eq!(origin.lng, 139.76);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = temp_config_dir("schema");
        fs::write(dir.join(APP_JSON), "{\"schema\": 2}").expect("write config");
        assert!(matches!(
            read_api_base_url(&dir),
            Err(CoreError::InvalidConfig(_))
        ));
    }
}

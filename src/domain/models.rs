use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItineraryKind {
    Auto,
    Custom,
}

/// A single planned activity with a place, date, start time and duration.
///
/// `id` is `None` for an entry that has not been persisted yet; the server
/// assigns the identifier on create. Calendar dates are `YYYY-MM-DD` strings
/// and times are zero-padded `HH:MM` strings, exactly as the remote API
/// carries them. No timezone conversion is ever applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub id: Option<String>,
    pub place_id: String,
    pub place_name: String,
    pub description: Option<String>,
    pub place_type: Option<String>,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub image_url: Option<String>,
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub duration_minutes: i64,
}

impl ScheduleEntry {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.place_id, "entry.place_id")?;
        validate_non_empty(&self.place_name, "entry.place_name")?;
        validate_date(&self.scheduled_date, "entry.scheduled_date")?;
        validate_hhmm(&self.scheduled_time, "entry.scheduled_time")?;
        if self.duration_minutes <= 0 {
            return Err("entry.duration_minutes must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Itinerary {
    pub id: String,
    pub name: String,
    pub kind: ItineraryKind,
    pub budget: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub entries: Vec<ScheduleEntry>,
}

impl Itinerary {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "itinerary.id")?;
        validate_non_empty(&self.name, "itinerary.name")?;
        validate_date(&self.start_date, "itinerary.start_date")?;
        validate_date(&self.end_date, "itinerary.end_date")?;
        if self.end_date < self.start_date {
            return Err("itinerary.end_date must not precede itinerary.start_date".to_string());
        }
        for entry in &self.entries {
            entry.validate()?;
            if !self.contains_date(&entry.scheduled_date) {
                return Err(format!(
                    "entry '{}' scheduled on {} outside itinerary range {}..{}",
                    entry.place_name, entry.scheduled_date, self.start_date, self.end_date
                ));
            }
        }
        Ok(())
    }

    /// Lexicographic comparison is calendar order for ISO `YYYY-MM-DD` strings.
    pub fn contains_date(&self, date: &str) -> bool {
        self.start_date.as_str() <= date && date <= self.end_date.as_str()
    }
}

/// Identity token for the remote API, replaced wholesale on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionToken {
    pub raw_token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.raw_token.trim().is_empty()
    }

    /// Delay before the proactive refresh should fire: one minute ahead of
    /// expiry, but never sooner than 30 seconds from now.
    pub fn refresh_delay_from(&self, now: DateTime<Utc>) -> chrono::Duration {
        let until_expiry = (self.expires_at - now).num_seconds();
        chrono::Duration::seconds((until_expiry - 60).max(30))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    parse_hhmm(value)
        .map(|_| ())
        .ok_or_else(|| format!("{field_name} must be HH:MM"))
}

pub fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}

pub fn parse_hhmm(value: &str) -> Option<(u32, u32)> {
    let time = NaiveTime::parse_from_str(value, "%H:%M").ok()?;
    Some((time.hour(), time.minute()))
}

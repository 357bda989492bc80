use crate::domain::models::{Itinerary, ItineraryKind, LatLng, ScheduleEntry};
use crate::infrastructure::error::CoreError;
use chrono::{NaiveDate, NaiveTime, Timelike};

/// Schedule item as the remote API carries it, embedded in an itinerary
/// payload or returned from an item endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ScheduleItemPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub place_id: String,
    pub place_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ItineraryPayload {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub items: Vec<ScheduleItemPayload>,
}

/// Body of `PUT /itineraries/items/{id}`.
#[derive(Debug, Clone, serde::Serialize, PartialEq)]
pub struct SchedulePatchPayload {
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, serde::Deserialize, PartialEq)]
pub struct DirectionsPayload {
    pub encoded_polyline: String,
}

pub fn format_origin(origin: LatLng) -> String {
    format!("{},{}", origin.lat, origin.lng)
}

pub fn decode_itinerary(payload: &ItineraryPayload) -> Result<Itinerary, CoreError> {
    let kind = match payload.kind.trim().to_ascii_lowercase().as_str() {
        "auto" => ItineraryKind::Auto,
        "custom" => ItineraryKind::Custom,
        other => {
            return Err(CoreError::InvalidConfig(format!(
                "invalid itinerary type value: {other}"
            )))
        }
    };

    let entries = payload
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| decode_item(item, &payload.id, index))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Itinerary {
        id: payload.id.clone(),
        name: payload.name.clone(),
        kind,
        budget: payload.budget.clone(),
        start_date: normalize_date(&payload.start_date)?,
        end_date: normalize_date(&payload.end_date)?,
        entries,
    })
}

/// Items arriving embedded in an itinerary fetch may lack an explicit id; the
/// synthetic `{itinerary_id}-{index}` keeps them addressable until a refetch.
fn decode_item(
    item: &ScheduleItemPayload,
    itinerary_id: &str,
    index: usize,
) -> Result<ScheduleEntry, CoreError> {
    let id = item
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("{itinerary_id}-{index}"));

    Ok(ScheduleEntry {
        id: Some(id),
        place_id: item.place_id.clone(),
        place_name: item.place_name.clone(),
        description: item.description.clone(),
        place_type: item.place_type.clone(),
        address: item.address.clone(),
        rating: item.rating,
        image_url: item.image_url.clone(),
        scheduled_date: normalize_date(&item.scheduled_date)?,
        scheduled_time: normalize_hhmm(&item.scheduled_time)?,
        duration_minutes: item.duration_minutes,
    })
}

pub fn encode_new_item(entry: &ScheduleEntry) -> ScheduleItemPayload {
    ScheduleItemPayload {
        id: None,
        place_id: entry.place_id.clone(),
        place_name: entry.place_name.clone(),
        description: entry.description.clone(),
        place_type: entry.place_type.clone(),
        address: entry.address.clone(),
        rating: entry.rating,
        image_url: entry.image_url.clone(),
        scheduled_date: entry.scheduled_date.clone(),
        scheduled_time: entry.scheduled_time.clone(),
        duration_minutes: entry.duration_minutes,
    }
}

pub fn encode_patch(date: &str, time: &str, duration_minutes: i64) -> SchedulePatchPayload {
    SchedulePatchPayload {
        scheduled_date: date.to_string(),
        scheduled_time: time.to_string(),
        duration_minutes,
    }
}

fn normalize_date(value: &str) -> Result<String, CoreError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|error| CoreError::InvalidConfig(format!("invalid item date '{value}': {error}")))
}

/// The layout engine relies on zero-padded `HH:MM`; the API sometimes carries
/// seconds ("09:00:00") or unpadded hours ("9:00").
fn normalize_hhmm(value: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|error| CoreError::InvalidConfig(format!("invalid item time '{value}': {error}")))?;
    Ok(format!("{:02}:{:02}", parsed.hour(), parsed.minute()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(id: Option<&str>) -> ScheduleItemPayload {
        ScheduleItemPayload {
            id: id.map(ToOwned::to_owned),
            place_id: "plc-1".to_string(),
            place_name: "Harbor Market".to_string(),
            description: None,
            place_type: Some("market".to_string()),
            address: None,
            rating: Some(4.2),
            image_url: None,
            scheduled_date: "2025-06-02".to_string(),
            scheduled_time: "09:00:00".to_string(),
            duration_minutes: 60,
        }
    }

    fn sample_payload() -> ItineraryPayload {
        ItineraryPayload {
            id: "itn-9".to_string(),
            name: "Coast trip".to_string(),
            kind: "auto".to_string(),
            budget: None,
            start_date: "2025-06-01".to_string(),
            end_date: "2025-06-03".to_string(),
            items: vec![sample_item(Some("itm-1")), sample_item(None)],
        }
    }

    #[test]
    fn decode_normalizes_times_to_hhmm() {
        let itinerary = decode_itinerary(&sample_payload()).expect("decode");
        assert_eq!(itinerary.entries[0].scheduled_time, "09:00");
    }

    #[test]
    fn embedded_items_without_id_get_synthetic_ids() {
        let itinerary = decode_itinerary(&sample_payload()).expect("decode");
        assert_eq!(itinerary.entries[0].id.as_deref(), Some("itm-1"));
        assert_eq!(itinerary.entries[1].id.as_deref(), Some("itn-9-1"));
    }

    #[test]
    fn unknown_itinerary_type_is_rejected() {
        let mut payload = sample_payload();
        payload.kind = "mystery".to_string();
        assert!(decode_itinerary(&payload).is_err());
    }

    #[test]
    fn malformed_item_time_is_rejected() {
        let mut payload = sample_payload();
        payload.items[0].scheduled_time = "quarter past nine".to_string();
        assert!(decode_itinerary(&payload).is_err());
    }

    #[test]
    fn origin_formats_as_lat_comma_lng() {
        let origin = LatLng { lat: 35.68, lng: 139.76 };
        assert_eq!(format_origin(origin), "35.68,139.76");
    }
}

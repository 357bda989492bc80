//! Decoding for the compact path encoding returned by the directions API
//! (Google's encoded polyline format: signed deltas, 5 bits per chunk,
//! offset by 63, scaled by 1e5).

use crate::domain::models::{LatLng, LatLngBounds};
use crate::infrastructure::error::CoreError;

pub fn decode_polyline(encoded: &str) -> Result<Vec<LatLng>, CoreError> {
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::new();
    let mut index = 0usize;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while index < bytes.len() {
        lat += decode_value(bytes, &mut index)?;
        lng += decode_value(bytes, &mut index)?;
        coordinates.push(LatLng {
            lat: lat as f64 / 1e5,
            lng: lng as f64 / 1e5,
        });
    }

    Ok(coordinates)
}

fn decode_value(bytes: &[u8], index: &mut usize) -> Result<i64, CoreError> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;

    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(CoreError::InvalidPolyline(
                "truncated chunk sequence".to_string(),
            ));
        };
        *index += 1;

        if byte < 63 {
            return Err(CoreError::InvalidPolyline(format!(
                "byte {byte} below encoding offset"
            )));
        }
        let chunk = (byte - 63) as i64;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk & 0x20 == 0 {
            break;
        }
        if shift > 30 {
            return Err(CoreError::InvalidPolyline("chunk overflow".to_string()));
        }
    }

    // Zig-zag: the sign lives in the lowest bit.
    if result & 1 != 0 {
        Ok(!(result >> 1))
    } else {
        Ok(result >> 1)
    }
}

/// Smallest viewport containing every point of the path. Empty paths have no
/// viewport.
pub fn bounding_viewport(path: &[LatLng]) -> Option<LatLngBounds> {
    let first = path.first()?;
    let mut bounds = LatLngBounds {
        south_west: *first,
        north_east: *first,
    };
    for point in &path[1..] {
        bounds.south_west.lat = bounds.south_west.lat.min(point.lat);
        bounds.south_west.lng = bounds.south_west.lng.min(point.lng);
        bounds.north_east.lat = bounds.north_east.lat.max(point.lat);
        bounds.north_east.lng = bounds.north_east.lng.max(point.lng);
    }
    Some(bounds)
}

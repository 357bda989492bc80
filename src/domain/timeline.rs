//! Vertical layout for a single itinerary day.
//!
//! The timeline spans a fixed 24-hour grid that starts at 06:00 and wraps past
//! midnight: a traveler's day runs from early morning to late night, not
//! midnight to midnight. Entries are positioned independently by absolute
//! time, so entries with overlapping times will visually overlap; the layout
//! does not reposition them.

use crate::domain::models::{parse_hhmm, ScheduleEntry};
use thiserror::Error;

/// Pixel height of one hour row.
pub const ROW_HEIGHT: f32 = 80.0;

/// Fixed ordering of clock hours on the timeline: the "day" segment 06..23
/// followed by the "night" segment 00..05. This order must be preserved
/// exactly; it is a product decision, not an artifact.
pub const DAY_HOUR_SEQUENCE: [u32; 24] = [
    6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 0, 1, 2, 3, 4, 5,
];

/// Contract violations in layout input. These indicate corrupted upstream
/// data, not user-recoverable conditions.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayoutError {
    #[error("invalid wall-clock time {0}")]
    InvalidTimeValue(String),
    #[error("duration of {0} minutes is not positive")]
    InvalidDuration(i64),
}

/// Row index (0..=23) of a clock hour within the day sequence.
pub fn hour_to_row_index(hour: u32) -> Result<usize, LayoutError> {
    DAY_HOUR_SEQUENCE
        .iter()
        .position(|&candidate| candidate == hour)
        .ok_or_else(|| LayoutError::InvalidTimeValue(format!("{hour}:00")))
}

/// Vertical pixel offset of a wall-clock time on the grid. Sub-row precision
/// is preserved; consumers may round for pixel snapping, the engine does not.
pub fn vertical_offset(hour: u32, minute: u32) -> Result<f32, LayoutError> {
    if minute > 59 {
        return Err(LayoutError::InvalidTimeValue(format!("{hour}:{minute:02}")));
    }
    let row = hour_to_row_index(hour)?;
    Ok(row as f32 * ROW_HEIGHT + (minute as f32 / 60.0) * ROW_HEIGHT)
}

/// Rendered height of an entry: proportional to duration, floored at half a
/// row so short activities stay visible.
pub fn entry_height(duration_minutes: i64) -> Result<f32, LayoutError> {
    if duration_minutes <= 0 {
        return Err(LayoutError::InvalidDuration(duration_minutes));
    }
    Ok(((duration_minutes as f32 / 60.0) * ROW_HEIGHT).max(ROW_HEIGHT / 2.0))
}

/// Which entry, if any, currently has its detail panel open.
///
/// At most one entry is expanded at a time. The panel height is measured by
/// the caller after the panel renders; the engine only consumes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionState {
    expanded_id: Option<String>,
    panel_height: f32,
}

impl ExpansionState {
    /// Selecting the expanded entry collapses it; selecting a different entry
    /// switches expansion in one step, with no dual-expansion in between.
    pub fn toggle(&mut self, entry_id: &str, panel_height: f32) {
        if self.expanded_id.as_deref() == Some(entry_id) {
            self.collapse();
        } else {
            self.expanded_id = Some(entry_id.to_string());
            self.panel_height = panel_height;
        }
    }

    pub fn collapse(&mut self) {
        self.expanded_id = None;
        self.panel_height = 0.0;
    }

    pub fn expanded_id(&self) -> Option<&str> {
        self.expanded_id.as_deref()
    }

    pub fn panel_height(&self) -> f32 {
        self.panel_height
    }
}

/// Transient layout rect for one entry on the selected day. Never persisted;
/// recomputed whenever the day, the entry set or the expansion changes.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedEntry {
    pub entry: ScheduleEntry,
    pub top: f32,
    pub height: f32,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayLayout {
    pub entries: Vec<PositionedEntry>,
    pub total_height: f32,
}

/// Lay out the entries of one calendar day.
///
/// Only entries whose `scheduled_date` equals `day` participate. Ordering is
/// ascending by `scheduled_time`; for zero-padded `HH:MM` strings the
/// lexicographic order is chronological order. The expanded entry keeps its
/// base position and grows by the panel height; every other entry whose base
/// top is strictly greater is pushed down by the panel height.
pub fn layout_day(
    entries: &[ScheduleEntry],
    day: &str,
    expansion: &ExpansionState,
) -> Result<DayLayout, LayoutError> {
    let mut day_entries: Vec<&ScheduleEntry> = entries
        .iter()
        .filter(|entry| entry.scheduled_date == day)
        .collect();
    day_entries.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));

    let mut positioned = Vec::with_capacity(day_entries.len());
    let mut expanded_top: Option<f32> = None;

    for entry in &day_entries {
        let (hour, minute) = parse_hhmm(&entry.scheduled_time)
            .ok_or_else(|| LayoutError::InvalidTimeValue(entry.scheduled_time.clone()))?;
        let top = vertical_offset(hour, minute)?;
        let height = entry_height(entry.duration_minutes)?;
        let expanded = entry
            .id
            .as_deref()
            .is_some_and(|id| expansion.expanded_id() == Some(id));
        if expanded {
            expanded_top = Some(top);
        }
        positioned.push(PositionedEntry {
            entry: (*entry).clone(),
            top,
            height,
            expanded,
        });
    }

    let panel_height = expansion.panel_height();
    if let Some(expanded_top) = expanded_top {
        for item in &mut positioned {
            if item.expanded {
                item.height += panel_height;
            } else if item.top > expanded_top {
                item.top += panel_height;
            }
        }
    }

    let total_height = if expanded_top.is_some() {
        24.0 * ROW_HEIGHT + panel_height
    } else {
        24.0 * ROW_HEIGHT
    };

    Ok(DayLayout {
        entries: positioned,
        total_height,
    })
}

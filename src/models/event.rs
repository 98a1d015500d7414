use chrono::{DateTime, Utc};

/// One upcoming calendar entry as seen by the meeting loop.
///
/// Times stay optional: a provider entry whose start or end could not be
/// parsed still reaches the loop, which skips the tick instead of treating
/// the calendar as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub title: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl CalendarEvent {
    pub fn new(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            title: title.to_string(),
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

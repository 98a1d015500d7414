use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::event::CalendarEvent;

/// Source of upcoming events, already filtered and sorted by start time.
/// Implementations swallow their own transport errors and return an empty
/// list instead.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn list_upcoming(&self, now: DateTime<Utc>, max_results: usize) -> Vec<CalendarEvent>;
}

pub struct CalendarService {
    source: Arc<dyn CalendarSource>,
    max_results: usize,
}

impl CalendarService {
    pub fn new(source: Arc<dyn CalendarSource>, max_results: usize) -> Self {
        Self {
            source,
            max_results: max_results.max(1),
        }
    }

    pub async fn next_event(&self, now: DateTime<Utc>) -> Option<CalendarEvent> {
        self.source
            .list_upcoming(now, self.max_results)
            .await
            .into_iter()
            .next()
    }
}

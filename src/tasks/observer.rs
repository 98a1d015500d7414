use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tracing::info;

/// Receives what the meeting loop decided each tick. Called on the loop's own
/// task, so implementations must not block.
pub trait StatusObserver: Send + Sync {
    fn on_status_changed(&self, text: &str) -> Result<(), String>;
    fn on_next_meeting_changed(&self, start: DateTime<Utc>) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    Status(String),
    NextMeeting(DateTime<Utc>),
}

/// Forwards updates over an unbounded channel so a display task can consume
/// them without slowing the loop down.
#[derive(Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ObserverEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: ObserverEvent) -> Result<(), String> {
        self.tx
            .send(event)
            .map_err(|_| "status receiver dropped".to_string())
    }
}

impl StatusObserver for ChannelObserver {
    fn on_status_changed(&self, text: &str) -> Result<(), String> {
        self.emit(ObserverEvent::Status(text.to_string()))
    }

    fn on_next_meeting_changed(&self, start: DateTime<Utc>) -> Result<(), String> {
        self.emit(ObserverEvent::NextMeeting(start))
    }
}

/// Discards every update. For headless runs and tests that only care about
/// the light.
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn on_status_changed(&self, _text: &str) -> Result<(), String> {
        Ok(())
    }

    fn on_next_meeting_changed(&self, _start: DateTime<Utc>) -> Result<(), String> {
        Ok(())
    }
}

pub struct LogObserver {
    timezone: Tz,
}

impl LogObserver {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl StatusObserver for LogObserver {
    fn on_status_changed(&self, text: &str) -> Result<(), String> {
        info!("Status: {}", text);
        Ok(())
    }

    fn on_next_meeting_changed(&self, start: DateTime<Utc>) -> Result<(), String> {
        info!("{}", next_meeting_line(start, &self.timezone));
        Ok(())
    }
}

pub fn next_meeting_line(start: DateTime<Utc>, timezone: &Tz) -> String {
    format!(
        "Next Meeting At: {}",
        start.with_timezone(timezone).format("%I:%M %p")
    )
}

pub fn render_event(event: &ObserverEvent, timezone: &Tz) -> String {
    match event {
        ObserverEvent::Status(text) => format!("Status: {}", text),
        ObserverEvent::NextMeeting(start) => next_meeting_line(*start, timezone),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_meeting_renders_in_display_zone() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
        assert_eq!(next_meeting_line(start, &Tz::UTC), "Next Meeting At: 02:30 PM");
        assert_eq!(
            next_meeting_line(start, &chrono_tz::America::New_York),
            "Next Meeting At: 09:30 AM"
        );
    }

    #[test]
    fn channel_observer_reports_closed_receiver() {
        let (observer, rx) = ChannelObserver::new();
        observer.on_status_changed("Idle").unwrap();
        drop(rx);
        assert!(observer.on_status_changed("Idle").is_err());
    }
}

use std::fmt;

pub const CONNECTION_ISSUE_MARKER: &str = " (⚠️ Connection issue)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeetingStatus {
    Idle,
    Soon,
    Imminent,
    InMeeting,
    NoEvents,
}

impl MeetingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MeetingStatus::Idle => "Idle",
            MeetingStatus::Soon => "Meeting soon",
            MeetingStatus::Imminent => "Meeting imminent",
            MeetingStatus::InMeeting => "In meeting",
            MeetingStatus::NoEvents => "No upcoming events",
        }
    }

    /// Text handed to the observer; flags a failed convergence so stale light
    /// state is visible without stopping the loop.
    pub fn report_text(&self, light_ok: bool) -> String {
        if light_ok {
            self.label().to_string()
        } else {
            format!("{}{}", self.label(), CONNECTION_ISSUE_MARKER)
        }
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

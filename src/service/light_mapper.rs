use crate::config::LightPalette;
use crate::models::light::LightConfig;
use crate::models::status::MeetingStatus;

/// Maps a meeting status to the light state configured for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightMapper {
    palette: LightPalette,
}

impl LightMapper {
    pub fn new(palette: LightPalette) -> Self {
        Self { palette }
    }

    pub fn light_config_for(&self, status: MeetingStatus) -> LightConfig {
        match status {
            MeetingStatus::Idle | MeetingStatus::NoEvents => self.palette.idle,
            MeetingStatus::Soon => self.palette.soon,
            MeetingStatus::Imminent => self.palette.imminent,
            MeetingStatus::InMeeting => self.palette.in_meeting,
        }
    }
}

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::Thresholds;
use crate::models::status::MeetingStatus;

/// Classifies how close the next meeting is.
///
/// Inside `[start, end]` is always `InMeeting`. Otherwise the time until start
/// is partitioned as `(0, soon]` → `Imminent`, `(soon, idle]` → `Soon`, and
/// everything else (far away or already over) → `Idle`. Callers must keep
/// `soon < idle`.
pub fn classify(
    now: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    thresholds: &Thresholds,
) -> MeetingStatus {
    let until_start = start - now;

    if start <= now && now <= end {
        MeetingStatus::InMeeting
    } else if until_start > TimeDelta::zero() && until_start <= thresholds.soon {
        MeetingStatus::Imminent
    } else if until_start > thresholds.soon && until_start <= thresholds.idle {
        MeetingStatus::Soon
    } else {
        MeetingStatus::Idle
    }
}

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::LoopSettings;
use crate::error::LoopError;
use crate::models::status::MeetingStatus;
use crate::service::calendar_service::CalendarService;
use crate::service::light_mapper::LightMapper;
use crate::service::light_service::LightService;
use crate::service::status_service::classify;
use crate::tasks::observer::StatusObserver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Updated { status: MeetingStatus, light_ok: bool },
    /// The next event had no usable start/end; the light was left alone.
    Skipped { title: String },
}

pub struct MeetingLoop {
    calendar: CalendarService,
    light: LightService,
    mapper: LightMapper,
    observer: Arc<dyn StatusObserver>,
    settings: LoopSettings,
    last_health_check: Option<DateTime<Utc>>,
}

impl MeetingLoop {
    pub fn new(
        calendar: CalendarService,
        light: LightService,
        mapper: LightMapper,
        observer: Arc<dyn StatusObserver>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            calendar,
            light,
            mapper,
            observer,
            settings,
            last_health_check: None,
        }
    }

    pub fn light(&self) -> &LightService {
        &self.light
    }

    pub fn light_mut(&mut self) -> &mut LightService {
        &mut self.light
    }

    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        self.last_health_check
    }

    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, LoopError> {
        if self.health_check_due(now) {
            self.run_health_check(now).await;
        }

        let Some(event) = self.calendar.next_event(now).await else {
            info!("No upcoming events found.");
            let target = self.mapper.light_config_for(MeetingStatus::Idle);
            let light_ok = self.light.apply_config(&target).await;
            self.report_status(MeetingStatus::NoEvents, light_ok)?;
            return Ok(TickOutcome::Updated {
                status: MeetingStatus::NoEvents,
                light_ok,
            });
        };

        let Some((start, end)) = event.time_range() else {
            warn!("Event '{}' missing valid time info, skipping", event.title);
            return Ok(TickOutcome::Skipped { title: event.title });
        };

        let status = classify(now, start, end, &self.settings.thresholds);
        self.observer
            .on_next_meeting_changed(start)
            .map_err(LoopError::Observer)?;
        log_status(&event.title, status, now, start, end);

        let target = self.mapper.light_config_for(status);
        let light_ok = self.light.apply_config(&target).await;
        if !light_ok {
            warn!("Light commands failed. Connection may be unstable.");
        }
        self.report_status(status, light_ok)?;
        Ok(TickOutcome::Updated { status, light_ok })
    }

    fn health_check_due(&self, now: DateTime<Utc>) -> bool {
        self.last_health_check
            .is_none_or(|last| now - last > self.settings.health_check_interval)
    }

    async fn run_health_check(&mut self, now: DateTime<Utc>) {
        info!("Performing periodic health check...");
        let report = self.light.check_health_at(now);
        info!("Connection health: {}", report.message);
        if !report.healthy {
            warn!("Connection appears unhealthy, attempting recovery...");
            self.light.perform_health_check().await;
            self.light.reset_belief();
        }
        self.last_health_check = Some(now);
    }

    fn report_status(&self, status: MeetingStatus, light_ok: bool) -> Result<(), LoopError> {
        self.observer
            .on_status_changed(&status.report_text(light_ok))
            .map_err(LoopError::Observer)
    }

    /// Safe state on the fatal path. Failure is logged, never retried beyond
    /// the normal write policy.
    pub async fn shutdown_light(&mut self) {
        if self.light.turn_off().await {
            info!("Light turned off due to error.");
        } else {
            error!("Failed to turn off light during error handling");
        }
    }
}

fn log_status(title: &str, status: MeetingStatus, now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) {
    let until_start = start - now;
    match status {
        MeetingStatus::Idle => info!(
            "Meeting '{}' is {} minutes away. Status: {}",
            title,
            until_start.num_minutes(),
            status
        ),
        MeetingStatus::Soon => info!(
            "Meeting '{}' in {} minutes. Status: {}",
            title,
            until_start.num_minutes(),
            status
        ),
        MeetingStatus::Imminent => info!(
            "Meeting '{}' starting in {} seconds! Status: {}",
            title,
            until_start.num_seconds(),
            status
        ),
        MeetingStatus::InMeeting => info!(
            "In meeting '{}' (ends in {} min). Status: {}",
            title,
            (end - now).num_minutes(),
            status
        ),
        MeetingStatus::NoEvents => info!("Status: {}", status),
    }
}

/// First whole multiple of `interval` since the epoch strictly after `now`.
/// With a 60s interval ticks land on minute boundaries regardless of how long
/// the previous tick took.
pub fn next_tick_boundary(now: DateTime<Utc>, interval: TimeDelta) -> DateTime<Utc> {
    let step = interval.num_seconds().max(1);
    let next = (now.timestamp().div_euclid(step) + 1) * step;
    DateTime::from_timestamp(next, 0).unwrap_or(now + TimeDelta::seconds(step))
}

/// Runs ticks on a wall-clock cadence until `shutdown` resolves.
///
/// A `LoopError` or a panic inside a tick turns the light off and ends the
/// loop with an error. Shutdown leaves the light as it is.
pub async fn run_meeting_loop<F>(meeting_loop: &mut MeetingLoop, shutdown: F) -> Result<(), LoopError>
where
    F: Future<Output = ()>,
{
    let thresholds = meeting_loop.settings.thresholds;
    let interval = meeting_loop.settings.loop_interval;
    info!("Meeting Light loop started");
    info!(
        "Configuration: Idle>{}s, Soon<={}s, Imminent<={}s",
        thresholds.idle.num_seconds(),
        thresholds.idle.num_seconds(),
        thresholds.soon.num_seconds()
    );

    tokio::pin!(shutdown);
    let mut iteration: u64 = 0;
    loop {
        iteration += 1;
        let now = Utc::now();
        debug!("Running meeting loop tick (iteration {})", iteration);

        let result = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Meeting light loop stopped by user.");
                return Ok(());
            }
            result = AssertUnwindSafe(meeting_loop.tick(now)).catch_unwind() => result,
        };

        let fault = match result {
            Ok(Ok(_)) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => Some(LoopError::Unexpected(panic_message(panic.as_ref()))),
        };
        if let Some(err) = fault {
            error!("Unexpected error in meeting loop: {}", err);
            meeting_loop.shutdown_light().await;
            return Err(err);
        }

        let wake_at = next_tick_boundary(now, interval);
        let wait = (wake_at - Utc::now()).to_std().unwrap_or_default();
        debug!("Waiting {}s until next check...", wait.as_secs());
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Meeting light loop stopped by user.");
                return Ok(());
            }
            _ = sleep(wait) => {}
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::error;

use crate::clients::gcal_client::GoogleCalendarClient;
use crate::clients::govee_client::GoveeClient;
use crate::config::Settings;
use crate::service::calendar_service::CalendarService;
use crate::service::light_mapper::LightMapper;
use crate::service::light_service::LightService;
use crate::tasks::meeting_loop::{run_meeting_loop, MeetingLoop};
use crate::tasks::observer::{render_event, ChannelObserver, LogObserver, StatusObserver};

pub fn build_light_service(settings: &Settings) -> anyhow::Result<LightService> {
    let credentials = settings.govee.credentials()?;
    let client = GoveeClient::from_settings(&settings.govee, credentials)
        .context("failed to build Govee client")?;
    Ok(LightService::new(Arc::new(client), settings.retry))
}

pub fn build_calendar_service(settings: &Settings) -> anyhow::Result<CalendarService> {
    let client = GoogleCalendarClient::from_settings(&settings.calendar)?;
    Ok(CalendarService::new(Arc::new(client), settings.calendar.max_results))
}

pub fn build_meeting_loop(settings: &Settings, observer: Arc<dyn StatusObserver>) -> anyhow::Result<MeetingLoop> {
    Ok(MeetingLoop::new(
        build_calendar_service(settings)?,
        build_light_service(settings)?,
        LightMapper::new(settings.palette),
        observer,
        settings.loop_settings,
    ))
}

/// Runs the meeting loop until Ctrl-C, printing status updates on a separate
/// display task fed by the loop's observer channel. With `log_only` updates
/// go to tracing and nothing is printed.
pub async fn run(settings: Settings, log_only: bool) -> anyhow::Result<()> {
    if log_only {
        let observer = LogObserver::new(settings.display_timezone);
        let mut meeting_loop = build_meeting_loop(&settings, Arc::new(observer))?;
        return Ok(run_meeting_loop(&mut meeting_loop, interrupted()).await?);
    }

    let (observer, mut updates) = ChannelObserver::new();
    let timezone = settings.display_timezone;
    let display = tokio::spawn(async move {
        while let Some(event) = updates.recv().await {
            println!("{}", render_event(&event, &timezone));
        }
    });

    let mut meeting_loop = build_meeting_loop(&settings, Arc::new(observer))?;
    let result = run_meeting_loop(&mut meeting_loop, interrupted()).await;

    drop(meeting_loop);
    let _ = display.await;
    result.map_err(Into::into)
}

async fn interrupted() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "Unable to listen for Ctrl-C; loop will only stop on error");
        std::future::pending::<()>().await;
    }
}

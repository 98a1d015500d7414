mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use common::{lamp, light_service, FixedCalendar, RecordingObserver, ScriptedDevice, Step};
use meetingLight::clients::govee_client::{DeviceCommand, PowerState};
use meetingLight::config::{LightPalette, LoopSettings};
use meetingLight::error::LoopError;
use meetingLight::models::event::CalendarEvent;
use meetingLight::models::light::Rgb;
use meetingLight::models::status::MeetingStatus;
use meetingLight::service::calendar_service::{CalendarService, CalendarSource};
use meetingLight::service::light_mapper::LightMapper;
use meetingLight::tasks::meeting_loop::{run_meeting_loop, MeetingLoop, TickOutcome};
use meetingLight::tasks::observer::{ChannelObserver, NoopObserver, ObserverEvent, StatusObserver};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

struct Harness {
    device: Arc<ScriptedDevice>,
    calendar: Arc<FixedCalendar>,
    observer: Arc<RecordingObserver>,
    meeting_loop: MeetingLoop,
}

fn harness(events: Vec<CalendarEvent>) -> Harness {
    let device = ScriptedDevice::new();
    device.set_listing(Some(vec![lamp()]));
    let calendar = FixedCalendar::new(events);
    let observer = Arc::new(RecordingObserver::default());
    let source: Arc<dyn CalendarSource> = calendar.clone();
    let status_observer: Arc<dyn StatusObserver> = observer.clone();
    let meeting_loop = MeetingLoop::new(
        CalendarService::new(source, 5),
        light_service(&device, now()),
        LightMapper::new(LightPalette::default()),
        status_observer,
        LoopSettings::default(),
    );
    Harness {
        device,
        calendar,
        observer,
        meeting_loop,
    }
}

fn meeting(start_offset: TimeDelta, length: TimeDelta) -> CalendarEvent {
    let start = now() + start_offset;
    CalendarEvent::new("Planning", start, start + length)
}

#[tokio::test]
async fn no_events_reports_status_and_sets_idle_light() {
    let mut h = harness(Vec::new());

    let outcome = h.meeting_loop.tick(now()).await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Updated {
            status: MeetingStatus::NoEvents,
            light_ok: true
        }
    );
    assert_eq!(h.observer.last_status().as_deref(), Some("No upcoming events"));
    assert_eq!(
        h.device.commands(),
        vec![
            DeviceCommand::ColorTemperature(2900),
            DeviceCommand::Brightness(10)
        ]
    );
    assert!(h.observer.next_meetings.lock().unwrap().is_empty());
}

#[tokio::test]
async fn meeting_in_thirty_seconds_is_imminent_red() {
    let mut h = harness(vec![meeting(TimeDelta::seconds(30), TimeDelta::minutes(30))]);

    let outcome = h.meeting_loop.tick(now()).await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Updated {
            status: MeetingStatus::Imminent,
            light_ok: true
        }
    );
    assert_eq!(
        h.device.commands(),
        vec![
            DeviceCommand::Color(Rgb::new(255, 0, 0)),
            DeviceCommand::Brightness(100)
        ]
    );
    assert_eq!(h.observer.last_status().as_deref(), Some("Meeting imminent"));
    assert_eq!(
        *h.observer.next_meetings.lock().unwrap(),
        vec![now() + TimeDelta::seconds(30)]
    );
}

#[tokio::test]
async fn meeting_started_five_minutes_ago_is_in_meeting_white() {
    let mut h = harness(vec![meeting(TimeDelta::minutes(-5), TimeDelta::minutes(15))]);

    let outcome = h.meeting_loop.tick(now()).await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Updated {
            status: MeetingStatus::InMeeting,
            light_ok: true
        }
    );
    assert_eq!(
        h.device.commands(),
        vec![
            DeviceCommand::Color(Rgb::new(255, 255, 255)),
            DeviceCommand::Brightness(50)
        ]
    );
    assert_eq!(h.observer.last_status().as_deref(), Some("In meeting"));
}

#[tokio::test]
async fn meeting_in_five_minutes_is_soon_blue() {
    let mut h = harness(vec![meeting(TimeDelta::minutes(5), TimeDelta::minutes(30))]);

    h.meeting_loop.tick(now()).await.unwrap();

    assert_eq!(
        h.device.commands(),
        vec![
            DeviceCommand::Color(Rgb::new(0, 0, 255)),
            DeviceCommand::Brightness(50)
        ]
    );
    assert_eq!(h.observer.last_status().as_deref(), Some("Meeting soon"));
}

#[tokio::test]
async fn repeated_ticks_with_same_status_do_not_rewrite_the_light() {
    let mut h = harness(vec![meeting(TimeDelta::hours(3), TimeDelta::minutes(30))]);

    h.meeting_loop.tick(now()).await.unwrap();
    h.device.clear_commands();
    let outcome = h.meeting_loop.tick(now() + TimeDelta::minutes(1)).await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Updated {
            status: MeetingStatus::Idle,
            light_ok: true
        }
    );
    assert!(h.device.commands().is_empty());
    assert_eq!(h.observer.statuses.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn unresolvable_event_times_skip_the_tick() {
    let broken = CalendarEvent {
        title: "Broken".to_string(),
        start: Some(now() + TimeDelta::minutes(2)),
        end: None,
    };
    let mut h = harness(vec![broken]);

    let outcome = h.meeting_loop.tick(now()).await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Skipped {
            title: "Broken".to_string()
        }
    );
    assert!(h.device.commands().is_empty());
    assert!(h.observer.statuses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_convergence_marks_status_with_connection_issue() {
    let mut h = harness(vec![meeting(TimeDelta::seconds(45), TimeDelta::minutes(30))]);
    h.device.script(&[Step::Status(404)]);

    let outcome = h.meeting_loop.tick(now()).await.unwrap();

    assert_eq!(
        outcome,
        TickOutcome::Updated {
            status: MeetingStatus::Imminent,
            light_ok: false
        }
    );
    assert_eq!(
        h.observer.last_status().as_deref(),
        Some("Meeting imminent (⚠️ Connection issue)")
    );
}

#[tokio::test]
async fn no_events_failure_is_also_marked() {
    let mut h = harness(Vec::new());
    h.device.fail_always(Step::Timeout, 3);

    h.meeting_loop.tick(now()).await.unwrap();

    assert_eq!(
        h.observer.last_status().as_deref(),
        Some("No upcoming events (⚠️ Connection issue)")
    );
}

#[tokio::test]
async fn health_check_runs_first_tick_then_on_interval() {
    let mut h = harness(Vec::new());

    h.meeting_loop.tick(now()).await.unwrap();
    assert_eq!(h.meeting_loop.last_health_check(), Some(now()));

    h.meeting_loop.tick(now() + TimeDelta::minutes(5)).await.unwrap();
    assert_eq!(h.meeting_loop.last_health_check(), Some(now()));

    let later = now() + TimeDelta::minutes(5) + TimeDelta::seconds(1);
    h.meeting_loop.tick(later).await.unwrap();
    assert_eq!(h.meeting_loop.last_health_check(), Some(later));
    // healthy checks never probe the device listing
    assert_eq!(h.device.listing_calls(), 0);
}

#[tokio::test]
async fn unhealthy_check_probes_device_and_resyncs_belief() {
    let mut h = harness(vec![meeting(TimeDelta::hours(2), TimeDelta::minutes(30))]);

    // first tick sets the idle light
    h.meeting_loop.tick(now()).await.unwrap();
    assert_eq!(h.meeting_loop.light().belief().color_temperature, Some(2900));

    // push failures past the threshold
    h.device.fail_always(Step::Status(401), 5);
    for level in 0..5 {
        assert!(!h.meeting_loop.light_mut().set_brightness(level).await);
    }
    assert!(!h.meeting_loop.light().check_health_at(now()).healthy);

    h.device.clear_commands();
    h.meeting_loop
        .tick(now() + TimeDelta::minutes(6))
        .await
        .unwrap();

    assert_eq!(h.device.listing_calls(), 1);
    assert_eq!(h.meeting_loop.light().health().consecutive_failures, 0);
    // belief was reset, so the unchanged idle target is sent again
    assert_eq!(
        h.device.commands(),
        vec![
            DeviceCommand::ColorTemperature(2900),
            DeviceCommand::Brightness(10)
        ]
    );
}

#[tokio::test]
async fn status_follows_the_calendar_across_ticks() {
    let mut h = harness(vec![meeting(TimeDelta::minutes(5), TimeDelta::minutes(30))]);

    h.meeting_loop.tick(now()).await.unwrap();
    h.meeting_loop
        .tick(now() + TimeDelta::minutes(4) + TimeDelta::seconds(30))
        .await
        .unwrap();
    h.meeting_loop
        .tick(now() + TimeDelta::minutes(6))
        .await
        .unwrap();
    h.calendar.set(Vec::new());
    h.meeting_loop
        .tick(now() + TimeDelta::minutes(40))
        .await
        .unwrap();

    assert_eq!(
        *h.observer.statuses.lock().unwrap(),
        vec![
            "Meeting soon".to_string(),
            "Meeting imminent".to_string(),
            "In meeting".to_string(),
            "No upcoming events".to_string(),
        ]
    );
}

#[tokio::test]
async fn closed_observer_channel_is_a_loop_error() {
    let device = ScriptedDevice::new();
    let (observer, rx) = ChannelObserver::new();
    drop(rx);
    let source: Arc<dyn CalendarSource> = FixedCalendar::new(Vec::new());
    let mut meeting_loop = MeetingLoop::new(
        CalendarService::new(source, 5),
        light_service(&device, now()),
        LightMapper::default(),
        Arc::new(observer),
        LoopSettings::default(),
    );

    let result = meeting_loop.tick(now()).await;

    assert!(matches!(result, Err(LoopError::Observer(_))));
}

#[tokio::test]
async fn channel_observer_delivers_updates_in_order() {
    let device = ScriptedDevice::new();
    let (observer, mut rx) = ChannelObserver::new();
    let start = now() + TimeDelta::seconds(30);
    let source: Arc<dyn CalendarSource> =
        FixedCalendar::new(vec![CalendarEvent::new("Sync", start, start + TimeDelta::minutes(30))]);
    let mut meeting_loop = MeetingLoop::new(
        CalendarService::new(source, 5),
        light_service(&device, now()),
        LightMapper::default(),
        Arc::new(observer),
        LoopSettings::default(),
    );

    meeting_loop.tick(now()).await.unwrap();

    assert_eq!(rx.recv().await, Some(ObserverEvent::NextMeeting(start)));
    assert_eq!(
        rx.recv().await,
        Some(ObserverEvent::Status("Meeting imminent".to_string()))
    );
}

struct PanickingCalendar;

#[async_trait]
impl CalendarSource for PanickingCalendar {
    async fn list_upcoming(&self, _now: DateTime<Utc>, _max_results: usize) -> Vec<CalendarEvent> {
        panic!("calendar exploded");
    }
}

#[tokio::test]
async fn unexpected_fault_turns_light_off_and_stops() {
    let device = ScriptedDevice::new();
    let source: Arc<dyn CalendarSource> = Arc::new(PanickingCalendar);
    let mut meeting_loop = MeetingLoop::new(
        CalendarService::new(source, 5),
        light_service(&device, Utc::now()),
        LightMapper::default(),
        Arc::new(NoopObserver),
        LoopSettings::default(),
    );

    let result = run_meeting_loop(&mut meeting_loop, std::future::pending::<()>()).await;

    match result {
        Err(LoopError::Unexpected(message)) => assert!(message.contains("calendar exploded")),
        other => panic!("expected unexpected-fault error, got {:?}", other),
    }
    assert_eq!(device.commands(), vec![DeviceCommand::Turn(PowerState::Off)]);
}

#[tokio::test]
async fn failed_light_off_during_fault_is_not_fatal_twice() {
    let device = ScriptedDevice::new();
    device.fail_always(Step::Timeout, 3);
    let source: Arc<dyn CalendarSource> = Arc::new(PanickingCalendar);
    let mut meeting_loop = MeetingLoop::new(
        CalendarService::new(source, 5),
        light_service(&device, Utc::now()),
        LightMapper::default(),
        Arc::new(NoopObserver),
        LoopSettings::default(),
    );

    let result = run_meeting_loop(&mut meeting_loop, std::future::pending::<()>()).await;

    assert!(matches!(result, Err(LoopError::Unexpected(_))));
    assert_eq!(device.commands().len(), 3);
    assert_eq!(meeting_loop.light().belief().power, None);
}

#[tokio::test]
async fn shutdown_stops_the_loop_cleanly() {
    let mut h = harness(Vec::new());

    let result = run_meeting_loop(&mut h.meeting_loop, async {}).await;

    assert!(result.is_ok());
    assert!(h.device.commands().is_empty());
}

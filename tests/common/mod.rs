#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use meetingLight::clients::govee_client::{DeviceCommand, DeviceInfo};
use meetingLight::config::RetryPolicy;
use meetingLight::error::DeviceError;
use meetingLight::models::event::CalendarEvent;
use meetingLight::service::calendar_service::CalendarSource;
use meetingLight::service::light_service::{DeviceApi, DeviceResponse, LightService};
use meetingLight::tasks::observer::StatusObserver;

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Status(u16),
    Timeout,
    Refused,
}

/// Device API that answers writes from a script (200 once the script runs
/// out) and records every command it receives.
#[derive(Default)]
pub struct ScriptedDevice {
    steps: Mutex<VecDeque<Step>>,
    commands: Mutex<Vec<DeviceCommand>>,
    listing: Mutex<Option<Vec<DeviceInfo>>>,
    listing_calls: Mutex<usize>,
}

impl ScriptedDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, steps: &[Step]) {
        self.steps.lock().unwrap().extend(steps.iter().copied());
    }

    pub fn fail_always(&self, step: Step, times: usize) {
        self.script(&vec![step; times]);
    }

    pub fn set_listing(&self, devices: Option<Vec<DeviceInfo>>) {
        *self.listing.lock().unwrap() = devices;
    }

    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    pub fn listing_calls(&self) -> usize {
        *self.listing_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl DeviceApi for ScriptedDevice {
    async fn send_command(&self, command: DeviceCommand) -> Result<DeviceResponse, DeviceError> {
        self.commands.lock().unwrap().push(command);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Status(200));
        match step {
            Step::Status(status) => Ok(DeviceResponse {
                status,
                body: String::new(),
            }),
            Step::Timeout => Err(DeviceError::Timeout),
            Step::Refused => Err(DeviceError::Connect("connection refused".to_string())),
        }
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        *self.listing_calls.lock().unwrap() += 1;
        match self.listing.lock().unwrap().clone() {
            Some(devices) => Ok(devices),
            None => Err(DeviceError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

pub fn lamp() -> DeviceInfo {
    DeviceInfo {
        device: "AA:BB:CC:DD:EE:FF".to_string(),
        model: "H6159".to_string(),
        name: "Desk lamp".to_string(),
        controllable: true,
        support_cmds: vec!["turn".to_string(), "brightness".to_string(), "color".to_string(), "colorTem".to_string()],
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::default().without_delays()
}

pub fn light_service(device: &Arc<ScriptedDevice>, now: DateTime<Utc>) -> LightService {
    light_service_with(device, now, fast_policy())
}

pub fn light_service_with(device: &Arc<ScriptedDevice>, now: DateTime<Utc>, policy: RetryPolicy) -> LightService {
    let api: Arc<dyn DeviceApi> = device.clone();
    LightService::new(api, policy).with_clock(Arc::new(move || now))
}

/// Collects formatted tracing output so tests can assert on log events.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }

    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(self.clone())
            .finish()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Calendar that returns whatever it was last given.
#[derive(Default)]
pub struct FixedCalendar {
    events: Mutex<Vec<CalendarEvent>>,
}

impl FixedCalendar {
    pub fn new(events: Vec<CalendarEvent>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(events),
        })
    }

    pub fn set(&self, events: Vec<CalendarEvent>) {
        *self.events.lock().unwrap() = events;
    }
}

#[async_trait::async_trait]
impl CalendarSource for FixedCalendar {
    async fn list_upcoming(&self, _now: DateTime<Utc>, max_results: usize) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().iter().take(max_results).cloned().collect()
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub statuses: Mutex<Vec<String>>,
    pub next_meetings: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingObserver {
    pub fn last_status(&self) -> Option<String> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

impl StatusObserver for RecordingObserver {
    fn on_status_changed(&self, text: &str) -> Result<(), String> {
        self.statuses.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn on_next_meeting_changed(&self, start: DateTime<Utc>) -> Result<(), String> {
        self.next_meetings.lock().unwrap().push(start);
        Ok(())
    }
}

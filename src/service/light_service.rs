use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::clients::govee_client::{DeviceCommand, DeviceInfo, PowerState};
use crate::config::RetryPolicy;
use crate::error::DeviceError;
use crate::models::light::{DeviceBelief, HealthReport, HealthState, LightConfig, LightMode, Rgb};

const HTTP_TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    pub status: u16,
    pub body: String,
}

/// Remote device API. Implementations report HTTP statuses as data and only
/// use `Err` for transport failures.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn send_command(&self, command: DeviceCommand) -> Result<DeviceResponse, DeviceError>;
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;
}

/// Result of one write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptOutcome {
    Succeeded,
    RateLimited,
    Retryable(String),
    Rejected(String),
}

fn classify_response(response: &DeviceResponse) -> AttemptOutcome {
    match response.status {
        200..=299 => AttemptOutcome::Succeeded,
        HTTP_TOO_MANY_REQUESTS => AttemptOutcome::RateLimited,
        400..=499 => AttemptOutcome::Rejected(format!("HTTP {} - {}", response.status, response.body)),
        status => AttemptOutcome::Retryable(format!("HTTP {} - {}", status, response.body)),
    }
}

/// Drives the light toward a target state with as few writes as possible.
///
/// Keeps a belief of what the device was last told and skips any command
/// the belief already satisfies. Writes go through a bounded retry loop and
/// feed the health counters read by [`LightService::check_health`].
pub struct LightService {
    api: Arc<dyn DeviceApi>,
    policy: RetryPolicy,
    belief: DeviceBelief,
    health: HealthState,
    clock: Clock,
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

impl LightService {
    pub fn new(api: Arc<dyn DeviceApi>, policy: RetryPolicy) -> Self {
        Self {
            api,
            policy,
            belief: DeviceBelief::default(),
            health: HealthState::default(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the time source used to stamp successful writes and to judge
    /// health staleness.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn belief(&self) -> &DeviceBelief {
        &self.belief
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// Color or temperature first, then brightness. A skipped command counts
    /// as success; the result is true only if every issued command succeeded.
    pub async fn apply_config(&mut self, target: &LightConfig) -> bool {
        let mode_ok = match target.mode {
            LightMode::Color(rgb) => self.set_color(rgb).await,
            LightMode::Temperature(kelvin) => self.set_color_temperature(kelvin).await,
        };
        let brightness_ok = self.set_brightness(target.brightness).await;
        mode_ok && brightness_ok
    }

    pub async fn set_color(&mut self, rgb: Rgb) -> bool {
        if self.belief.color == Some(rgb) {
            debug!("Color already set to {}, skipping API call", rgb);
            return true;
        }
        let success = self.execute(DeviceCommand::Color(rgb)).await;
        if success {
            self.belief.color = Some(rgb);
            self.belief.color_temperature = None;
        }
        success
    }

    pub async fn set_color_temperature(&mut self, kelvin: u16) -> bool {
        if self.belief.color_temperature == Some(kelvin) {
            debug!("Color temperature already set to {}K, skipping API call", kelvin);
            return true;
        }
        let success = self.execute(DeviceCommand::ColorTemperature(kelvin)).await;
        if success {
            self.belief.color_temperature = Some(kelvin);
            self.belief.color = None;
        }
        success
    }

    pub async fn set_brightness(&mut self, level: u8) -> bool {
        if self.belief.brightness == Some(level) {
            debug!("Brightness already set to {}, skipping API call", level);
            return true;
        }
        let success = self.execute(DeviceCommand::Brightness(level)).await;
        if success {
            self.belief.brightness = Some(level);
        }
        success
    }

    pub async fn turn_on(&mut self) -> bool {
        self.set_power(true).await
    }

    pub async fn turn_off(&mut self) -> bool {
        self.set_power(false).await
    }

    async fn set_power(&mut self, on: bool) -> bool {
        if self.belief.power == Some(on) {
            debug!(on, "Light power already matches, skipping API call");
            return true;
        }
        let state = if on { PowerState::On } else { PowerState::Off };
        let success = self.execute(DeviceCommand::Turn(state)).await;
        if success {
            self.belief.power = Some(on);
        }
        success
    }

    /// Forget everything known about the device so the next convergence
    /// re-sends every field. Used after manual changes or sleep/wake.
    pub fn reset_belief(&mut self) {
        self.belief = DeviceBelief::default();
        info!("Light state tracking reset");
    }

    pub fn reset_health(&mut self) {
        self.health.consecutive_failures = 0;
        info!("Connection health counters reset");
    }

    pub fn check_health(&self) -> HealthReport {
        self.check_health_at((self.clock)())
    }

    pub fn check_health_at(&self, now: DateTime<Utc>) -> HealthReport {
        let failures = self.health.consecutive_failures;
        if failures >= self.policy.max_consecutive_failures {
            return HealthReport {
                healthy: false,
                message: format!("Connection unhealthy: {} consecutive failures", failures),
            };
        }

        let Some(last_success) = self.health.last_success else {
            return HealthReport {
                healthy: true,
                message: "No calls made yet".to_string(),
            };
        };

        let since_success = now - last_success;
        if since_success > self.policy.health_check_timeout {
            return HealthReport {
                healthy: false,
                message: format!("No successful call in {} minutes", since_success.num_minutes()),
            };
        }

        HealthReport {
            healthy: true,
            message: format!("Healthy: Last success {}s ago", since_success.num_seconds()),
        }
    }

    /// Read-only probe of the device listing. A non-empty listing clears the
    /// failure counter; anything else leaves the counters alone.
    pub async fn perform_health_check(&mut self) -> bool {
        info!("Performing connection health check...");
        match self.api.list_devices().await {
            Ok(devices) if !devices.is_empty() => {
                info!(devices = devices.len(), "Health check PASSED - Connection is healthy");
                self.reset_health();
                true
            }
            Ok(_) => {
                warn!("Health check FAILED - device list is empty");
                false
            }
            Err(err) => {
                warn!(error = %err, "Health check FAILED - Connection may be degraded");
                false
            }
        }
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        self.api.list_devices().await
    }

    async fn execute(&mut self, command: DeviceCommand) -> bool {
        let operation = command.describe();
        let attempts = self.policy.max_retries.max(1);

        for attempt in 0..attempts {
            debug!("Attempting {} (attempt {}/{})", operation, attempt + 1, attempts);

            let outcome = match self.api.send_command(command).await {
                Ok(response) => classify_response(&response),
                Err(err) => AttemptOutcome::Retryable(err.to_string()),
            };

            match outcome {
                AttemptOutcome::Succeeded => {
                    info!("{} - SUCCESS", operation);
                    self.health.last_success = Some((self.clock)());
                    self.health.consecutive_failures = 0;
                    pause(self.policy.rate_limit_delay).await;
                    return true;
                }
                AttemptOutcome::RateLimited => {
                    warn!("{} - Rate limited, waiting before retry...", operation);
                    pause(self.policy.rate_limit_cooldown).await;
                    continue;
                }
                AttemptOutcome::Rejected(reason) => {
                    self.health.consecutive_failures += 1;
                    error!("{} - FAILED: {} (not retrying)", operation, reason);
                    return false;
                }
                AttemptOutcome::Retryable(reason) => {
                    error!("{} - FAILED: {} (attempt {}/{})", operation, reason, attempt + 1, attempts);
                }
            }

            if attempt + 1 < attempts {
                let delay = self.policy.backoff_delay(attempt);
                info!("Waiting {:?} before retry...", delay);
                pause(delay).await;
            }
        }

        self.health.consecutive_failures += 1;
        let failures = self.health.consecutive_failures;
        error!(
            "{} - FAILED after {} attempts. Consecutive failures: {}",
            operation, attempts, failures
        );
        if failures >= self.policy.max_consecutive_failures {
            error!(
                critical = true,
                "CONNECTION HEALTH CRITICAL: {} consecutive failures. Light may be offline or network issues.",
                failures
            );
        }
        false
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

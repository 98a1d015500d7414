use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::models::light::{LightConfig, Rgb, MAX_BRIGHTNESS, MAX_COLOR_TEMPERATURE, MIN_COLOR_TEMPERATURE};

pub const DEFAULT_GOVEE_API_URL: &str = "https://developer-api.govee.com/v1/devices/control";
pub const DEFAULT_GOVEE_DEVICES_URL: &str = "https://developer-api.govee.com/v1/devices";
pub const DEFAULT_GCAL_API_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Raw `KEY=VALUE` settings read from a dotenv-style file, with process
/// environment as the fallback for every lookup.
#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
    source: Option<PathBuf>,
}

/// One dotenv line: blank and `#` lines yield `None`, an `export ` prefix and
/// matching outer quotes are dropped.
fn parse_line(number: usize, raw: &str) -> Result<Option<(&str, &str)>, ConfigError> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Syntax {
        line: number,
        content: raw.to_string(),
    })?;
    Ok(Some((key.trim(), unquote(value.trim()))))
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|quote| value.strip_prefix(*quote)?.strip_suffix(*quote))
        .unwrap_or(value)
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for (idx, raw) in content.lines().enumerate() {
            if let Some((key, value)) = parse_line(idx + 1, raw)? {
                values.insert(key.to_string(), value.to_string());
            }
        }
        Ok(Self { values, source: None })
    }

    /// File this config was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Loads `CONFIG_FILE` if set, otherwise the per-user default location
    /// when it exists. A missing default file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var("CONFIG_FILE") {
            return Self::from_file(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| env::var(key).ok())
            .filter(|value| !value.trim().is_empty())
    }

    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::invalid(key, format!("cannot parse '{}'", raw))),
            None => Ok(default),
        }
    }

    /// Whole seconds as a `TimeDelta`. Values chrono cannot represent are
    /// rejected rather than clamped.
    pub fn delta_seconds_or(&self, key: &str, default_secs: i64) -> Result<TimeDelta, ConfigError> {
        let secs = self.parse_or(key, default_secs)?;
        TimeDelta::try_seconds(secs)
            .ok_or_else(|| ConfigError::invalid(key, format!("{} seconds is out of range", secs)))
    }

    /// Seconds, fractional values allowed (`0.5`).
    pub fn seconds_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get(key) {
            Some(raw) => {
                let secs: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::invalid(key, format!("cannot parse '{}' as seconds", raw)))?;
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| ConfigError::invalid(key, format!("'{}' is not a valid duration", raw)))
            }
            None => Ok(default),
        }
    }
}

pub const USER_CONFIG_FILE_NAME: &str = "user_config.json";

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("meetinglight").join(".env"))
}

/// `USER_CONFIG_FILE` when set. Otherwise `user_config.json` beside the loaded
/// `.env` (or beside the default location), only if that file exists.
pub fn user_config_path(config: &AppConfig) -> Option<PathBuf> {
    if let Some(path) = config.get("USER_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }
    let env_file = config.source().map(Path::to_path_buf).or_else(default_config_path)?;
    let candidate = env_file.parent()?.join(USER_CONFIG_FILE_NAME);
    candidate.is_file().then_some(candidate)
}

#[derive(Debug, Clone)]
pub struct GoveeSettings {
    pub api_key: Option<String>,
    pub device: Option<String>,
    pub model: Option<String>,
    pub control_url: String,
    pub devices_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoveeCredentials {
    pub api_key: String,
    pub device: String,
    pub model: String,
}

impl GoveeSettings {
    pub fn credentials(&self) -> Result<GoveeCredentials, ConfigError> {
        let missing = |key: &str| ConfigError::Missing(key.to_string());
        Ok(GoveeCredentials {
            api_key: self.api_key.clone().ok_or_else(|| missing("GOVEE_API_KEY"))?,
            device: self.device.clone().ok_or_else(|| missing("GOVEE_DEVICE_MAC"))?,
            model: self.model.clone().ok_or_else(|| missing("GOVEE_MODEL"))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CalendarSettings {
    pub api_key: Option<String>,
    pub calendar_id: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
    pub max_results: usize,
}

/// Retry and health knobs for device writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Throttle after every successful write.
    pub rate_limit_delay: Duration,
    /// Wait after an HTTP 429 before the next attempt.
    pub rate_limit_cooldown: Duration,
    pub max_consecutive_failures: u32,
    pub health_check_timeout: TimeDelta,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_millis(500),
            rate_limit_cooldown: Duration::from_secs(5),
            max_consecutive_failures: 5,
            health_check_timeout: TimeDelta::seconds(600),
        }
    }
}

impl RetryPolicy {
    /// Same attempt counts, no sleeping.
    pub fn without_delays(self) -> Self {
        Self {
            base_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            rate_limit_cooldown: Duration::ZERO,
            ..self
        }
    }

    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let multiplier = 1u32 << attempt_index.min(16);
        self.base_delay.saturating_mul(multiplier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub idle: TimeDelta,
    pub soon: TimeDelta,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            idle: TimeDelta::seconds(600),
            soon: TimeDelta::seconds(60),
        }
    }
}

/// Target light state for each meeting status. `NoEvents` shares `idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightPalette {
    pub idle: LightConfig,
    pub soon: LightConfig,
    pub imminent: LightConfig,
    pub in_meeting: LightConfig,
}

impl Default for LightPalette {
    fn default() -> Self {
        Self {
            idle: LightConfig::temperature(2900, 10),
            soon: LightConfig::color(Rgb::new(0, 0, 255), 50),
            imminent: LightConfig::color(Rgb::new(255, 0, 0), 100),
            in_meeting: LightConfig::color(Rgb::new(255, 255, 255), 50),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub thresholds: Thresholds,
    pub loop_interval: TimeDelta,
    pub health_check_interval: TimeDelta,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            loop_interval: TimeDelta::seconds(60),
            health_check_interval: TimeDelta::seconds(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub govee: GoveeSettings,
    pub calendar: CalendarSettings,
    pub retry: RetryPolicy,
    pub loop_settings: LoopSettings,
    pub palette: LightPalette,
    pub display_timezone: Tz,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let api_timeout = config.seconds_or("GOVEE_API_TIMEOUT", Duration::from_secs(10))?;
        let govee = GoveeSettings {
            api_key: config.get("GOVEE_API_KEY"),
            device: config.get("GOVEE_DEVICE_MAC"),
            model: config.get("GOVEE_MODEL"),
            control_url: config
                .get("GOVEE_API_URL")
                .unwrap_or_else(|| DEFAULT_GOVEE_API_URL.to_string()),
            devices_url: config
                .get("GOVEE_DEVICES_URL")
                .unwrap_or_else(|| DEFAULT_GOVEE_DEVICES_URL.to_string()),
            timeout: api_timeout,
        };
        let calendar = CalendarSettings {
            api_key: config.get("GOOGLE_API_KEY"),
            calendar_id: config.get("GOOGLE_CALENDAR_ID"),
            api_url: config
                .get("GCAL_API_URL")
                .unwrap_or_else(|| DEFAULT_GCAL_API_URL.to_string()),
            timeout: config.seconds_or("GCAL_API_TIMEOUT", Duration::from_secs(10))?,
            max_results: config.parse_or("GCAL_MAX_RESULTS", 5usize)?,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: config.parse_or("GOVEE_MAX_RETRIES", defaults.max_retries)?,
            base_delay: config.seconds_or("GOVEE_RETRY_DELAY", defaults.base_delay)?,
            rate_limit_delay: config.seconds_or("GOVEE_RATE_LIMIT_DELAY", defaults.rate_limit_delay)?,
            rate_limit_cooldown: config
                .seconds_or("GOVEE_RATE_LIMIT_COOLDOWN", defaults.rate_limit_cooldown)?,
            max_consecutive_failures: config
                .parse_or("MAX_CONSECUTIVE_FAILURES", defaults.max_consecutive_failures)?,
            health_check_timeout: config.delta_seconds_or("HEALTH_CHECK_TIMEOUT", 600)?,
        };

        let loop_settings = LoopSettings {
            thresholds: Thresholds {
                idle: config.delta_seconds_or("MEETING_IDLE_THRESHOLD", 600)?,
                soon: config.delta_seconds_or("MEETING_SOON_THRESHOLD", 60)?,
            },
            loop_interval: config.delta_seconds_or("LOOP_UPDATE_INTERVAL", 60)?,
            health_check_interval: config.delta_seconds_or("HEALTH_CHECK_INTERVAL", 300)?,
        };

        let palette = palette_from_config(config)?;

        let display_timezone = match config.get("DISPLAY_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::invalid("DISPLAY_TIMEZONE", format!("unknown time zone '{}'", name)))?,
            None => Tz::UTC,
        };

        let mut settings = Self {
            govee,
            calendar,
            retry,
            loop_settings,
            palette,
            display_timezone,
            log_level: config.get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_file: config.get("LOG_FILE").map(PathBuf::from),
        };

        if let Some(overrides) = user_config_path(config).and_then(|path| UserOverrides::load(&path)) {
            overrides.apply(&mut settings);
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = &self.loop_settings.thresholds;
        if thresholds.soon <= TimeDelta::zero() || thresholds.soon >= thresholds.idle {
            return Err(ConfigError::invalid(
                "MEETING_SOON_THRESHOLD",
                "must be positive and below MEETING_IDLE_THRESHOLD",
            ));
        }
        if self.loop_settings.loop_interval <= TimeDelta::zero() {
            return Err(ConfigError::invalid("LOOP_UPDATE_INTERVAL", "must be positive"));
        }
        if self.loop_settings.health_check_interval <= TimeDelta::zero() {
            return Err(ConfigError::invalid("HEALTH_CHECK_INTERVAL", "must be positive"));
        }
        if self.retry.health_check_timeout <= TimeDelta::zero() {
            return Err(ConfigError::invalid("HEALTH_CHECK_TIMEOUT", "must be positive"));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::invalid("GOVEE_MAX_RETRIES", "must be at least 1"));
        }
        for (key, entry) in [
            ("idle", self.palette.idle),
            ("soon", self.palette.soon),
            ("imminent", self.palette.imminent),
            ("in_meeting", self.palette.in_meeting),
        ] {
            entry
                .validate()
                .map_err(|reason| ConfigError::invalid(&format!("palette.{}", key), reason))?;
        }
        Ok(())
    }
}

fn palette_from_config(config: &AppConfig) -> Result<LightPalette, ConfigError> {
    let defaults = LightPalette::default();
    let idle_temperature = config.parse_or("TEMPERATURE_IDLE", 2900u16)?;
    Ok(LightPalette {
        idle: LightConfig::temperature(
            idle_temperature,
            config.parse_or("BRIGHTNESS_IDLE", defaults.idle.brightness)?,
        ),
        soon: LightConfig::color(
            rgb_or(config, "COLOR_SOON", Rgb::new(0, 0, 255))?,
            config.parse_or("BRIGHTNESS_SOON", defaults.soon.brightness)?,
        ),
        imminent: LightConfig::color(
            rgb_or(config, "COLOR_IMMINENT", Rgb::new(255, 0, 0))?,
            config.parse_or("BRIGHTNESS_IMMINENT", defaults.imminent.brightness)?,
        ),
        in_meeting: LightConfig::color(
            rgb_or(config, "COLOR_IN_MEETING", Rgb::new(255, 255, 255))?,
            config.parse_or("BRIGHTNESS_IN_MEETING", defaults.in_meeting.brightness)?,
        ),
    })
}

fn rgb_or(config: &AppConfig, key: &str, default: Rgb) -> Result<Rgb, ConfigError> {
    let Some(raw) = config.get(key) else {
        return Ok(default);
    };
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(ConfigError::invalid(key, format!("expected 'r,g,b', got '{}'", raw)));
    };
    let channel = |value: &str| {
        value
            .parse::<u8>()
            .map_err(|_| ConfigError::invalid(key, format!("'{}' is not a 0-255 channel", value)))
    };
    Ok(Rgb::new(channel(*r)?, channel(*g)?, channel(*b)?))
}

/// Operator overrides saved as JSON. Values out of range are dropped with a
/// warning instead of failing startup.
#[derive(Debug, Default, Deserialize)]
pub struct UserOverrides {
    pub meeting_idle_threshold: Option<i64>,
    pub meeting_soon_threshold: Option<i64>,
    pub color_soon: Option<Vec<i64>>,
    pub color_imminent: Option<Vec<i64>>,
    pub color_in_meeting: Option<Vec<i64>>,
    pub color_idle_temp: Option<i64>,
    pub brightness_idle: Option<i64>,
    pub brightness_soon: Option<i64>,
    pub brightness_imminent: Option<i64>,
    pub brightness_in_meeting: Option<i64>,
}

impl UserOverrides {
    pub fn load(path: &Path) -> Option<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "user config not readable, using defaults");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(overrides) => Some(overrides),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "user config is not valid JSON, using defaults");
                None
            }
        }
    }

    pub fn apply(&self, settings: &mut Settings) {
        let thresholds = &mut settings.loop_settings.thresholds;
        let idle = positive("meeting_idle_threshold", self.meeting_idle_threshold).unwrap_or(thresholds.idle);
        let soon = positive("meeting_soon_threshold", self.meeting_soon_threshold).unwrap_or(thresholds.soon);
        if soon < idle {
            thresholds.idle = idle;
            thresholds.soon = soon;
        } else {
            warn!(
                idle = idle.num_seconds(),
                soon = soon.num_seconds(),
                "ignoring threshold overrides: soon must stay below idle"
            );
        }

        let palette = &mut settings.palette;
        if let Some(kelvin) = self.color_idle_temp {
            match u16::try_from(kelvin) {
                Ok(kelvin) if (MIN_COLOR_TEMPERATURE..=MAX_COLOR_TEMPERATURE).contains(&kelvin) => {
                    palette.idle = LightConfig::temperature(kelvin, palette.idle.brightness);
                }
                _ => warn!(value = kelvin, "ignoring color_idle_temp outside 2000-9000"),
            }
        }
        for (name, value, entry) in [
            ("color_soon", &self.color_soon, &mut palette.soon),
            ("color_imminent", &self.color_imminent, &mut palette.imminent),
            ("color_in_meeting", &self.color_in_meeting, &mut palette.in_meeting),
        ] {
            if let Some(rgb) = value.as_deref().and_then(|raw| rgb_from_json(name, raw)) {
                *entry = LightConfig::color(rgb, entry.brightness);
            }
        }
        for (name, value, entry) in [
            ("brightness_idle", self.brightness_idle, &mut palette.idle),
            ("brightness_soon", self.brightness_soon, &mut palette.soon),
            ("brightness_imminent", self.brightness_imminent, &mut palette.imminent),
            ("brightness_in_meeting", self.brightness_in_meeting, &mut palette.in_meeting),
        ] {
            let Some(value) = value else { continue };
            match u8::try_from(value) {
                Ok(level) if level <= MAX_BRIGHTNESS => entry.brightness = level,
                _ => warn!(key = name, value, "ignoring brightness outside 0-100"),
            }
        }
    }
}

fn positive(name: &str, value: Option<i64>) -> Option<TimeDelta> {
    let secs = value?;
    match TimeDelta::try_seconds(secs) {
        Some(delta) if secs > 0 => Some(delta),
        _ => {
            warn!(key = name, value = secs, "ignoring threshold that is not a positive number of seconds");
            None
        }
    }
}

fn rgb_from_json(name: &str, raw: &[i64]) -> Option<Rgb> {
    let channels: Option<Vec<u8>> = raw.iter().map(|v| u8::try_from(*v).ok()).collect();
    match channels.as_deref() {
        Some([r, g, b]) => Some(Rgb::new(*r, *g, *b)),
        _ => {
            warn!(key = name, value = ?raw, "ignoring color that is not three 0-255 channels");
            None
        }
    }
}

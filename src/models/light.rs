use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MIN_COLOR_TEMPERATURE: u16 = 2000;
pub const MAX_COLOR_TEMPERATURE: u16 = 9000;
pub const MAX_BRIGHTNESS: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB({},{},{})", self.r, self.g, self.b)
    }
}

/// Visual mode of the light. A light shows either an RGB color or a white
/// color temperature, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightMode {
    Color(Rgb),
    Temperature(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightConfig {
    pub mode: LightMode,
    pub brightness: u8,
}

impl LightConfig {
    pub const fn color(color: Rgb, brightness: u8) -> Self {
        Self {
            mode: LightMode::Color(color),
            brightness,
        }
    }

    pub const fn temperature(kelvin: u16, brightness: u8) -> Self {
        Self {
            mode: LightMode::Temperature(kelvin),
            brightness,
        }
    }

    pub fn color_rgb(&self) -> Option<Rgb> {
        match self.mode {
            LightMode::Color(rgb) => Some(rgb),
            LightMode::Temperature(_) => None,
        }
    }

    pub fn color_temperature(&self) -> Option<u16> {
        match self.mode {
            LightMode::Temperature(kelvin) => Some(kelvin),
            LightMode::Color(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.brightness > MAX_BRIGHTNESS {
            return Err(format!("brightness {} is outside 0-100", self.brightness));
        }
        if let LightMode::Temperature(kelvin) = self.mode {
            if !(MIN_COLOR_TEMPERATURE..=MAX_COLOR_TEMPERATURE).contains(&kelvin) {
                return Err(format!("color temperature {}K is outside 2000-9000", kelvin));
            }
        }
        Ok(())
    }
}

/// Last commanded state of the physical light. `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceBelief {
    pub power: Option<bool>,
    pub color: Option<Rgb>,
    pub brightness: Option<u8>,
    pub color_temperature: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthState {
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_exposes_exactly_one_mode() {
        let warm = LightConfig::temperature(2900, 10);
        assert_eq!(warm.color_temperature(), Some(2900));
        assert_eq!(warm.color_rgb(), None);

        let red = LightConfig::color(Rgb::new(255, 0, 0), 100);
        assert_eq!(red.color_rgb(), Some(Rgb::new(255, 0, 0)));
        assert_eq!(red.color_temperature(), None);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        assert!(LightConfig::temperature(1500, 10).validate().is_err());
        assert!(LightConfig::temperature(9001, 10).validate().is_err());
        assert!(LightConfig::color(Rgb::new(1, 2, 3), 101).validate().is_err());
        assert!(LightConfig::temperature(9000, 100).validate().is_ok());
    }
}

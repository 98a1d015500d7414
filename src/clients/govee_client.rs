use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GoveeCredentials, GoveeSettings};
use crate::error::DeviceError;
use crate::models::light::Rgb;
use crate::service::light_service::{DeviceApi, DeviceResponse};

pub const API_KEY_HEADER: &str = "Govee-API-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

/// One control command. Serializes to the `cmd` object of the control
/// endpoint, e.g. `{"name":"colorTem","value":2900}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "name", content = "value")]
pub enum DeviceCommand {
    #[serde(rename = "color")]
    Color(Rgb),
    #[serde(rename = "brightness")]
    Brightness(u8),
    #[serde(rename = "colorTem")]
    ColorTemperature(u16),
    #[serde(rename = "turn")]
    Turn(PowerState),
}

impl DeviceCommand {
    pub fn describe(&self) -> String {
        match self {
            DeviceCommand::Color(rgb) => format!("Set color to {}", rgb),
            DeviceCommand::Brightness(level) => format!("Set brightness to {}", level),
            DeviceCommand::ColorTemperature(kelvin) => format!("Set color temperature to {}K", kelvin),
            DeviceCommand::Turn(PowerState::On) => "Turn light ON".to_string(),
            DeviceCommand::Turn(PowerState::Off) => "Turn light OFF".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ControlRequest<'a> {
    model: &'a str,
    device: &'a str,
    cmd: DeviceCommand,
}

#[derive(Debug, Deserialize)]
struct DeviceListResponse {
    data: Option<DeviceListData>,
}

#[derive(Debug, Deserialize)]
struct DeviceListData {
    #[serde(default)]
    devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceInfo {
    pub device: String,
    pub model: String,
    #[serde(rename = "deviceName", default)]
    pub name: String,
    #[serde(default)]
    pub controllable: bool,
    #[serde(rename = "supportCmds", default)]
    pub support_cmds: Vec<String>,
}

pub struct GoveeClient {
    http: reqwest::Client,
    credentials: GoveeCredentials,
    control_url: String,
    devices_url: String,
}

impl GoveeClient {
    pub fn new(
        credentials: GoveeCredentials,
        control_url: &str,
        devices_url: &str,
        timeout: Duration,
    ) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            credentials,
            control_url: control_url.to_string(),
            devices_url: devices_url.to_string(),
        })
    }

    pub fn from_settings(settings: &GoveeSettings, credentials: GoveeCredentials) -> Result<Self, DeviceError> {
        Self::new(
            credentials,
            &settings.control_url,
            &settings.devices_url,
            settings.timeout,
        )
    }
}

#[async_trait]
impl DeviceApi for GoveeClient {
    async fn send_command(&self, command: DeviceCommand) -> Result<DeviceResponse, DeviceError> {
        let request = ControlRequest {
            model: &self.credentials.model,
            device: &self.credentials.device,
            cmd: command,
        };
        debug!(url = %self.control_url, ?command, "sending device command");
        let response = self
            .http
            .put(&self.control_url)
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(DeviceResponse { status, body })
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let response = self
            .http
            .get(&self.devices_url)
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DeviceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: DeviceListResponse =
            serde_json::from_str(&text).map_err(|e| DeviceError::Decode(e.to_string()))?;
        Ok(parsed.data.map(|data| data.devices).unwrap_or_default())
    }
}

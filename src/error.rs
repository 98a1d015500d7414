use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing config value {0}")]
    Missing(String),

    #[error("Invalid config value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Invalid config line {line}: {content}")]
    Syntax { line: usize, content: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Transport-level failures of a single device request. HTTP status codes are
/// not errors at this layer; they are classified by the light service.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connect(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("failed to decode device response: {0}")]
    Decode(String),

    #[error("device API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for DeviceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeviceError::Timeout
        } else if err.is_connect() {
            DeviceError::Connect(err.to_string())
        } else if err.is_decode() {
            DeviceError::Decode(err.to_string())
        } else {
            DeviceError::Request(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("calendar request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("calendar API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode calendar response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid calendar URL: {0}")]
    Url(String),
}

/// Errors that escape a loop tick. These are the only fatal path of the
/// meeting loop.
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("status observer is gone: {0}")]
    Observer(String),

    #[error("unexpected fault in meeting loop: {0}")]
    Unexpected(String),
}

//! Configuration types for webimage-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport configuration handed to the session when the downloader is built
///
/// Timeouts here are enforced by the transport collaborator; the orchestration
/// layer itself never times anything out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// User-Agent sent with every request (default: "webimage-dl/<version>")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum time to establish a connection (None = transport default)
    #[serde(default, with = "optional_duration_serde")]
    pub connect_timeout: Option<Duration>,

    /// Maximum time for a whole request, body included (None = no limit)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// Idle connections kept per host (default: 8)
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Label attached to the session, used in logs
    #[serde(default = "default_session_description")]
    pub session_description: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout: None,
            request_timeout: None,
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            session_description: default_session_description(),
        }
    }
}

/// Processing pool configuration (decode and transform stages)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum number of task pipelines running at once (default: available parallelism)
    #[serde(default = "default_max_concurrent_processing")]
    pub max_concurrent_processing: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_processing: default_max_concurrent_processing(),
        }
    }
}

/// How results are handed to observers and completion handlers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// One delivery at a time, in dispatch order (default)
    #[default]
    Serial,
    /// Deliveries for different tasks may overlap
    Concurrent,
}

/// Delivery queue configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Queue discipline used when no custom queue is supplied
    #[serde(default)]
    pub delivery_mode: DeliveryMode,
}

/// Main configuration for ImageDownloader
///
/// Sub-configs are flattened, so the serialized form is a single flat object:
///
/// ```
/// use webimage_dl::Config;
///
/// let config = Config::from_json(r#"{
///     "user_agent": "my-app/1.0",
///     "request_timeout": 30,
///     "max_concurrent_processing": 2,
///     "delivery_mode": "concurrent"
/// }"#).unwrap();
///
/// assert_eq!(config.processing.max_concurrent_processing, 2);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings forwarded to the transport session
    #[serde(flatten)]
    pub transport: TransportConfig,

    /// Decode/transform pool settings
    #[serde(flatten)]
    pub processing: ProcessingConfig,

    /// Result delivery settings
    #[serde(flatten)]
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Parse a configuration from JSON, filling in defaults for missing keys
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde alone cannot express
    pub fn validate(&self) -> Result<()> {
        if self.processing.max_concurrent_processing == 0 {
            return Err(Error::Config {
                message: "processing pool must allow at least one pipeline".into(),
                key: Some("max_concurrent_processing".into()),
            });
        }

        if self.transport.user_agent.trim().is_empty() {
            return Err(Error::Config {
                message: "user agent must not be empty".into(),
                key: Some("user_agent".into()),
            });
        }

        Ok(())
    }
}

fn default_user_agent() -> String {
    format!("webimage-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_pool_max_idle_per_host() -> usize {
    8
}

fn default_session_description() -> String {
    "webimage-dl.ImageDownloader".into()
}

fn default_max_concurrent_processing() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

// Optional Duration serialization helper (whole seconds)
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

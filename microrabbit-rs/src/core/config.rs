//! Bus configuration: defaults, overridable from `MICRORABBIT_*` environment variables.

use microrabbit_core::AmqpConfig;
use serde::Deserialize;

use super::error::BusError;

/// When a delivery is acknowledged relative to handler execution.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Ack on receipt, before any handler runs. A failing handler loses the message.
    BeforeHandling,
    /// Ack once every handler completed; failures are nacked. Handlers should be idempotent.
    #[default]
    AfterSuccess,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub amqp_url: String,
    pub connection_name: String,
    pub prefetch_count: u16,
    pub ack_mode: AckMode,
    /// Requeue a message whose handler failed (only with `AckMode::AfterSuccess`).
    pub requeue_on_failure: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        let amqp = AmqpConfig::default();
        Self {
            amqp_url: amqp.url,
            connection_name: amqp.connection_name,
            prefetch_count: amqp.prefetch_count,
            ack_mode: AckMode::default(),
            requeue_on_failure: false,
        }
    }
}

impl BusConfig {
    /// Defaults overlaid with `MICRORABBIT_AMQP_URL`, `MICRORABBIT_CONNECTION_NAME`,
    /// `MICRORABBIT_PREFETCH_COUNT`, `MICRORABBIT_ACK_MODE`, `MICRORABBIT_REQUEUE_ON_FAILURE`.
    pub fn from_env() -> Result<Self, BusError> {
        Self::from_source(config::Environment::with_prefix("MICRORABBIT").try_parsing(true))
    }

    /// Defaults overlaid with any `config` source (file, environment, in-memory).
    pub fn from_source<S>(source: S) -> Result<Self, BusError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder().add_source(source).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Broker connection settings.
    pub fn amqp(&self) -> AmqpConfig {
        AmqpConfig {
            url: self.amqp_url.clone(),
            connection_name: self.connection_name.clone(),
            prefetch_count: self.prefetch_count,
        }
    }
}

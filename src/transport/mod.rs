//! Bidirectional event channel for detection alerts.
//!
//! `EventChannel` is what the alert emitter talks to. `MqttEventChannel`
//! is the production implementation; `OfflineChannel` stands in when no
//! broker is configured.

mod broker;
mod mqtt;

use anyhow::Result;

pub use broker::{parse_broker_endpoint, validate_loopback, BrokerEndpoint, TlsMaterials};
pub use mqtt::MqttEventChannel;

pub trait EventChannel: Send {
    /// True while the channel has an established connection.
    fn is_connected(&self) -> bool;

    /// Send one named event with a JSON payload.
    fn emit(&self, event: &str, payload: &[u8]) -> Result<()>;
}

/// Channel that never connects. Every emission is skipped by the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineChannel;

impl EventChannel for OfflineChannel {
    fn is_connected(&self) -> bool {
        false
    }

    fn emit(&self, event: &str, _payload: &[u8]) -> Result<()> {
        anyhow::bail!("event channel offline; dropped {}", event)
    }
}

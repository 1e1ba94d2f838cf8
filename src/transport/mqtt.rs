use anyhow::{Context, Result};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, Incoming, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::broker::{parse_broker_endpoint, validate_loopback, TlsMaterials};
use super::EventChannel;
use crate::config::MqttSettings;

const AVAILABILITY_SUFFIX: &str = "status";
const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// MQTT-backed event channel. Events land on `{topic_prefix}/{event}`.
///
/// The connection is driven by a background thread. `is_connected` tracks
/// the last CONNACK / connection error seen by that thread.
pub struct MqttEventChannel {
    client: Client,
    topic_prefix: String,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttEventChannel {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let endpoint = parse_broker_endpoint(&settings.broker_addr, settings.use_tls)?;
        validate_loopback(&endpoint, settings.allow_remote)?;
        let tls = TlsMaterials::load(
            settings.tls_ca_path.as_deref(),
            settings.tls_client_cert_path.as_deref(),
            settings.tls_client_key_path.as_deref(),
        )?;

        let availability = availability_topic(&settings.topic_prefix);
        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            &availability,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        ));
        options.set_transport(tls.transport_for(&endpoint)?);

        let (client, connection) = Client::new(options, 10);
        let connected = Arc::new(AtomicBool::new(false));
        let closing = Arc::new(AtomicBool::new(false));
        let handle = spawn_connection_loop(connection, connected.clone(), closing.clone());

        client
            .publish(
                availability,
                QoS::AtLeastOnce,
                true,
                PAYLOAD_ONLINE.as_bytes().to_vec(),
            )
            .context("queue MQTT availability message")?;
        log::info!(
            "MQTT event channel {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.username.is_some()
        );

        Ok(Self {
            client,
            topic_prefix: settings.topic_prefix.clone(),
            connected,
            closing,
            connection_handle: Some(handle),
        })
    }

    pub fn topic_for(&self, event: &str) -> String {
        event_topic(&self.topic_prefix, event)
    }

    /// Publish `offline`, disconnect and wait for the connection thread.
    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.connection_handle.take() else {
            return Ok(());
        };
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.client.publish(
            availability_topic(&self.topic_prefix),
            QoS::AtLeastOnce,
            true,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
        );
        let result = self.client.disconnect().context("MQTT disconnect");
        let _ = handle.join();
        self.connected.store(false, Ordering::SeqCst);
        result
    }
}

impl EventChannel for MqttEventChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: &str, payload: &[u8]) -> Result<()> {
        let topic = self.topic_for(event);
        self.client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, payload.to_vec())
            .with_context(|| format!("publish to {}", topic))?;
        Ok(())
    }
}

impl Drop for MqttEventChannel {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::debug!("MQTT shutdown on drop: {:#}", e);
        }
    }
}

fn spawn_connection_loop(
    mut connection: Connection,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(Incoming::ConnAck(..))) => {
                    if !connected.swap(true, Ordering::SeqCst) {
                        log::info!("Connected to MQTT broker");
                    }
                }
                Ok(Event::Incoming(Incoming::Disconnect(..))) => {
                    connected.store(false, Ordering::SeqCst);
                    log::warn!("MQTT broker closed the session");
                }
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    if connected.swap(false, Ordering::SeqCst) {
                        log::warn!("Disconnected from MQTT broker: {}", e);
                    } else {
                        log::debug!("MQTT connection error: {}", e);
                    }
                    if closing.load(Ordering::SeqCst) {
                        break;
                    }
                    std::thread::sleep(RECONNECT_DELAY);
                }
            }
        }
    })
}

fn availability_topic(prefix: &str) -> String {
    event_topic(prefix, AVAILABILITY_SUFFIX)
}

fn event_topic(prefix: &str, event: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), event)
}

//! Broker address parsing and TLS material loading.

use anyhow::{anyhow, bail, Context, Result};
use rumqttc::Transport;
use std::net::IpAddr;
use std::path::Path;

/// Parsed `[scheme://]host:port` broker address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl BrokerEndpoint {
    pub fn is_loopback(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
            || self
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false)
    }
}

/// Accepts `host:port`, `[v6]:port`, and the `mqtt`/`tcp`/`mqtts`/`ssl`
/// schemes. `mqtts` and `ssl` force TLS on.
pub fn parse_broker_endpoint(addr: &str, force_tls: bool) -> Result<BrokerEndpoint> {
    let mut use_tls = force_tls;
    let mut rest = addr.trim();
    if let Some((scheme, tail)) = rest.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => bail!("unsupported MQTT scheme: {}", other),
        }
        rest = tail;
    }

    let (host, port) = match rest.strip_prefix('[') {
        Some(v6) => {
            let (host, tail) = v6
                .split_once(']')
                .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
            (host, port)
        }
        None => rest
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?,
    };
    if host.is_empty() {
        bail!("missing MQTT host in {}", addr);
    }
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok(BrokerEndpoint {
        host: host.to_string(),
        port,
        use_tls,
    })
}

/// Refuse non-loopback brokers unless explicitly allowed.
pub fn validate_loopback(endpoint: &BrokerEndpoint, allow_remote: bool) -> Result<()> {
    if endpoint.is_loopback() {
        return Ok(());
    }
    if allow_remote {
        log::warn!(
            "Remote MQTT broker {}:{} enabled - alerts carry camera snapshots",
            endpoint.host,
            endpoint.port
        );
        return Ok(());
    }
    Err(anyhow!(
        "MQTT broker must be loopback: {}:{} (set mqtt.allow_remote to override)",
        endpoint.host,
        endpoint.port
    ))
}

/// PEM materials for broker TLS.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    pub ca: Option<Vec<u8>>,
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    pub fn load(
        ca_path: Option<&Path>,
        client_cert_path: Option<&Path>,
        client_key_path: Option<&Path>,
    ) -> Result<Self> {
        let ca = ca_path
            .map(|path| {
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA {}", path.display()))
            })
            .transpose()?;
        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert), Some(key)) => Some((
                std::fs::read(cert).with_context(|| {
                    format!("failed to read MQTT TLS client cert {}", cert.display())
                })?,
                std::fs::read(key).with_context(|| {
                    format!("failed to read MQTT TLS client key {}", key.display())
                })?,
            )),
            (None, None) => None,
            _ => bail!("MQTT TLS client cert and key must be provided together"),
        };
        Ok(Self { ca, client_auth })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }

    pub fn transport_for(&self, endpoint: &BrokerEndpoint) -> Result<Transport> {
        if !endpoint.use_tls {
            if self.is_configured() {
                bail!("MQTT TLS materials provided but TLS is disabled (set mqtt.use_tls or use mqtts://)");
            }
            return Ok(Transport::tcp());
        }
        if !self.is_configured() {
            return Ok(Transport::tls_with_default_config());
        }
        let ca = self.ca.clone().ok_or_else(|| {
            anyhow!("MQTT TLS CA certificate is required when providing client certificates")
        })?;
        Ok(Transport::tls(ca, self.client_auth.clone(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_tls_schemes() {
        let plain = parse_broker_endpoint("mqtt://127.0.0.1:1883", false).unwrap();
        assert_eq!(plain.port, 1883);
        assert!(!plain.use_tls);

        let tls = parse_broker_endpoint("mqtts://broker.local:8883", false).unwrap();
        assert_eq!(tls.host, "broker.local");
        assert!(tls.use_tls);

        let forced = parse_broker_endpoint("localhost:1883", true).unwrap();
        assert!(forced.use_tls);
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let endpoint = parse_broker_endpoint("[::1]:1883", false).unwrap();
        assert_eq!(endpoint.host, "::1");
        assert!(endpoint.is_loopback());
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(parse_broker_endpoint("ws://127.0.0.1:1883", false).is_err());
        assert!(parse_broker_endpoint("127.0.0.1", false).is_err());
        assert!(parse_broker_endpoint(":1883", false).is_err());
        assert!(parse_broker_endpoint("host:notaport", false).is_err());
    }

    #[test]
    fn remote_broker_needs_opt_in() {
        let endpoint = parse_broker_endpoint("192.168.1.20:1883", false).unwrap();
        assert!(validate_loopback(&endpoint, false).is_err());
        assert!(validate_loopback(&endpoint, true).is_ok());
    }

    #[test]
    fn tls_materials_without_tls_rejected() {
        let endpoint = parse_broker_endpoint("127.0.0.1:1883", false).unwrap();
        let materials = TlsMaterials {
            ca: Some(b"pem".to_vec()),
            client_auth: None,
        };
        assert!(materials.transport_for(&endpoint).is_err());
    }

    #[test]
    fn cert_without_key_rejected() {
        let err = TlsMaterials::load(None, Some(Path::new("/tmp/cert.pem")), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("together"));
    }
}

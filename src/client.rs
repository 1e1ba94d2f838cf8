//! HTTP calls to the detection server.
//!
//! - `HttpDetector`: `POST /detect_frame` with a base64 JPEG body.
//! - `SmsStatusMonitor`: periodic `GET /api/sms_status`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::ServerSettings;
use crate::detection::DetectResponse;

/// Something that turns an encoded frame into detections.
///
/// Transport and decode failures are `Err`; an application-level error
/// reported by the server comes back as `Ok` with `error` set.
pub trait Detector: Send {
    fn detect(&mut self, image_base64: &str) -> Result<DetectResponse>;
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    image: &'a str,
}

pub struct HttpDetector {
    agent: ureq::Agent,
    url: String,
}

impl HttpDetector {
    pub fn new(server: &ServerSettings) -> Self {
        Self {
            agent: build_agent(server.timeout),
            url: server.detect_url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Detector for HttpDetector {
    fn detect(&mut self, image_base64: &str) -> Result<DetectResponse> {
        let request = DetectRequest {
            image: image_base64,
        };
        match self.agent.post(&self.url).send_json(&request) {
            Ok(response) => response
                .into_json::<DetectResponse>()
                .context("decode /detect_frame response"),
            Err(ureq::Error::Status(code, response)) => {
                // Servers report model failures as a JSON body on an error status.
                match response.into_json::<DetectResponse>() {
                    Ok(body) if body.error.is_some() => Ok(body),
                    _ => Err(anyhow!("detection endpoint returned status {}", code)),
                }
            }
            Err(e) => Err(anyhow!("send frame to {}: {}", self.url, e)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SmsStatus {
    #[serde(default)]
    sms_enabled: bool,
}

/// Polls whether the server has SMS notification configured.
pub struct SmsStatusMonitor {
    agent: ureq::Agent,
    url: String,
    interval: Duration,
    next_poll: Option<Instant>,
    enabled: Option<bool>,
}

impl SmsStatusMonitor {
    pub fn new(server: &ServerSettings, interval: Duration) -> Self {
        Self {
            agent: build_agent(server.timeout),
            url: server.sms_status_url(),
            interval,
            next_poll: None,
            enabled: None,
        }
    }

    /// Last known state; `None` until the first successful poll.
    pub fn enabled(&self) -> Option<bool> {
        self.enabled
    }

    /// When the next poll is due. Immediately before the first poll.
    pub fn next_deadline(&self, now: Instant) -> Instant {
        self.next_poll.unwrap_or(now)
    }

    /// Poll when due. Failures are logged and never fatal.
    pub fn poll_if_due(&mut self, now: Instant) {
        if self.next_poll.is_some_and(|due| now < due) {
            return;
        }
        self.next_poll = Some(now + self.interval);
        match self.fetch() {
            Ok(enabled) => self.record(enabled),
            Err(e) => log::warn!("Error checking SMS status: {:#}", e),
        }
    }

    fn record(&mut self, enabled: bool) {
        if self.enabled != Some(enabled) {
            log::info!(
                "SMS notifications {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.enabled = Some(enabled);
    }

    fn fetch(&self) -> Result<bool> {
        let status: SmsStatus = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("GET {}", self.url))?
            .into_json()
            .context("decode sms status")?;
        Ok(status.sms_enabled)
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

//! `detection_alert` emission for high-confidence detections.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::AlertSettings;
use crate::detection::Detection;
use crate::frame::Frame;
use crate::transport::EventChannel;

pub const DETECTION_ALERT: &str = "detection_alert";

/// Payload of one `detection_alert` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub object: String,
    pub confidence: f64,
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
    /// Base64 JPEG of the raw frame, no data-URL prefix.
    pub image: String,
}

pub struct AlertEmitter {
    threshold: f64,
    snapshot_quality: u8,
    cooldown: Duration,
    last_sent: HashMap<String, Instant>,
}

impl AlertEmitter {
    pub fn new(settings: &AlertSettings) -> Self {
        Self {
            threshold: settings.threshold,
            snapshot_quality: settings.snapshot_jpeg_quality,
            cooldown: settings.cooldown,
            last_sent: HashMap::new(),
        }
    }

    /// Emit one event per detection at or above the alert threshold.
    ///
    /// `detections` is the rendered list. Returns the number of events
    /// handed to the channel.
    pub fn emit_for(
        &mut self,
        channel: &dyn EventChannel,
        frame: &Frame,
        detections: &[Detection],
    ) -> usize {
        let now = frame.captured_at();
        let qualifying: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.confidence >= self.threshold)
            .collect();
        if qualifying.is_empty() {
            return 0;
        }
        if !channel.is_connected() {
            log::debug!(
                "event channel disconnected; skipped {} alert(s)",
                qualifying.len()
            );
            return 0;
        }

        let image = match frame.snapshot().to_base64_jpeg(self.snapshot_quality) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("failed to encode alert snapshot: {:#}", e);
                return 0;
            }
        };
        let time = chrono::Local::now().format("%H:%M:%S").to_string();

        let mut sent = 0;
        for detection in qualifying {
            if self.cooling_down(&detection.label, now) {
                continue;
            }
            let event = AlertEvent {
                object: detection.label.clone(),
                confidence: detection.confidence,
                time: time.clone(),
                image: image.clone(),
            };
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("failed to serialize alert: {}", e);
                    continue;
                }
            };
            match channel.emit(DETECTION_ALERT, &payload) {
                Ok(()) => {
                    self.last_sent.insert(detection.label.clone(), now);
                    sent += 1;
                }
                Err(e) => log::warn!("failed to emit alert for {}: {:#}", detection.label, e),
            }
        }
        sent
    }

    fn cooling_down(&self, label: &str, now: Instant) -> bool {
        if self.cooldown.is_zero() {
            return false;
        }
        self.last_sent
            .get(label)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.cooldown)
    }
}

//! Camera frame sources.
//!
//! This module provides the sources the capture loop can grab frames from:
//! - `stub://` synthetic camera (tests, demos)
//! - HTTP(S) JPEG snapshot or MJPEG stream (IP cameras, ESP32-S3 boards)
//! - Local still image, repeated every grab
//!
//! Every source follows the same lifecycle: `open` acquires the device,
//! `grab` returns the current frame (or `None` while the device has no
//! decoded data yet), and `release` stops all tracks. `release` is
//! idempotent and must be safe to call on any exit path.

mod http;
mod still;
mod synthetic;

use anyhow::{anyhow, Result};
use url::Url;

use crate::config::CameraSettings;
use crate::frame::Frame;

pub use http::HttpSource;
pub use still::StillSource;
pub use synthetic::SyntheticSource;

/// Exclusive handle on a camera.
pub trait FrameSource: Send {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Acquire the device. Errors here are hardware/permission errors.
    fn open(&mut self) -> Result<()>;

    /// Current frame, or `None` when no decoded frame is available yet.
    fn grab(&mut self) -> Result<Option<Frame>>;

    /// Stop all tracks and drop the device handle.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Camera selected from `camera.url`.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    Http(HttpSource),
    Still(StillSource),
}

impl CameraSource {
    pub fn new(settings: &CameraSettings) -> Result<Self> {
        let url = settings.url.trim();
        let backend = if url.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticSource::new(url, settings.width, settings.height))
        } else if url.contains("://") {
            let parsed = Url::parse(url).map_err(|e| anyhow!("invalid camera url {}: {}", url, e))?;
            match parsed.scheme() {
                "http" | "https" => CameraBackend::Http(HttpSource::new(url)),
                other => {
                    return Err(anyhow!(
                        "unsupported camera scheme '{}'; expected stub, http(s) or a local path",
                        other
                    ))
                }
            }
        } else {
            CameraBackend::Still(StillSource::new(url))
        };
        Ok(Self { backend })
    }

    fn inner(&self) -> &dyn FrameSource {
        match &self.backend {
            CameraBackend::Synthetic(source) => source,
            CameraBackend::Http(source) => source,
            CameraBackend::Still(source) => source,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source,
            CameraBackend::Http(source) => source,
            CameraBackend::Still(source) => source,
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        self.inner().describe()
    }

    fn open(&mut self) -> Result<()> {
        self.inner_mut().open()
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        self.inner_mut().grab()
    }

    fn release(&mut self) {
        self.inner_mut().release()
    }

    fn is_open(&self) -> bool {
        self.inner().is_open()
    }
}

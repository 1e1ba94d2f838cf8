//! Camera session: the capture loop and its lifecycle.
//!
//! `CaptureSession` owns the camera, the detector client and the event
//! channel for one process. The binary drives it with `poll(now)` from a
//! single-threaded timer loop; every due tick runs one synchronous
//! capture -> detect -> render -> alert cycle, so cycles never overlap.
//!
//! Lifecycle: `Idle -> Starting -> Streaming -> Idle`. A hardware error
//! while starting falls straight back to `Idle`.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::alert::AlertEmitter;
use crate::client::Detector;
use crate::config::LookoutConfig;
use crate::detection::{self, DetectResponse, Detection};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::palette::Palette;
use crate::render::{self, OverlayBox, OverlayRenderer};
use crate::transport::EventChannel;
use crate::view::ViewBinding;

pub const STATUS_STARTING: &str = "Accessing camera...";
pub const STATUS_STREAMING: &str = "Camera active - detecting objects";
pub const STATUS_CAMERA_ERROR: &str = "Error accessing camera. Please check permissions.";
pub const STATUS_STOPPED: &str = "Camera stopped";
pub const STATUS_CONNECTION_ERROR: &str = "Connection error - check console";
pub const STATUS_ENCODE_ERROR: &str = "Frame encoding error - check console";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
}

/// Fixed-interval timer. A late poll fires once, then realigns to `now`.
#[derive(Clone, Debug)]
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(interval: Duration, started: Instant) -> Self {
        Self {
            interval,
            next: started + interval,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Consume the tick if it is due.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.interval;
        if self.next <= now {
            self.next = now + self.interval;
        }
        true
    }
}

/// Why a capture cycle failed. Drives the status text.
#[derive(Debug)]
pub enum CaptureError {
    /// The camera failed to produce a frame mid-session.
    Camera(anyhow::Error),
    /// The grabbed frame could not be encoded as JPEG.
    Encode(anyhow::Error),
    /// Request failed, or the response could not be read.
    Transport(anyhow::Error),
    /// The server answered with an `error` field.
    Server(String),
}

impl CaptureError {
    pub fn status_message(&self) -> String {
        match self {
            CaptureError::Camera(_) => STATUS_CAMERA_ERROR.to_string(),
            CaptureError::Encode(_) => STATUS_ENCODE_ERROR.to_string(),
            CaptureError::Transport(_) => STATUS_CONNECTION_ERROR.to_string(),
            CaptureError::Server(message) => format!("Detection error: {}", message),
        }
    }
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Camera(e) => write!(f, "camera error: {:#}", e),
            CaptureError::Encode(e) => write!(f, "frame encoding failed: {:#}", e),
            CaptureError::Transport(e) => write!(f, "detection request failed: {:#}", e),
            CaptureError::Server(message) => write!(f, "detection error: {}", message),
        }
    }
}

/// Result of one `poll` / `capture_and_send`.
#[derive(Debug)]
pub enum TickOutcome {
    /// Not streaming, or the timer was not due.
    Idle,
    /// The camera had no decoded frame yet.
    NoFrame,
    /// The response belonged to a session that already ended.
    Stale,
    Detected {
        found: usize,
        rendered: usize,
        alerts: usize,
    },
    Failed(CaptureError),
}

pub struct CaptureSession {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    channel: Box<dyn EventChannel>,
    view: ViewBinding,
    palette: Palette,
    renderer: OverlayRenderer,
    alerts: AlertEmitter,
    interval: Duration,
    display_threshold: f64,
    max_boxes: usize,
    jpeg_quality: u8,
    state: SessionState,
    ticker: Option<Ticker>,
    generation: u64,
    current_frame: Option<Frame>,
    last_detections: Vec<Detection>,
    rendered: Vec<OverlayBox>,
}

impl CaptureSession {
    pub fn new(
        config: &LookoutConfig,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        channel: Box<dyn EventChannel>,
    ) -> Result<Self> {
        Ok(Self {
            source,
            detector,
            channel,
            view: ViewBinding::mount(&config.overlay),
            palette: Palette::from_hex_map(&config.colors)?,
            renderer: OverlayRenderer::load(config.overlay.font_path.as_deref())?,
            alerts: AlertEmitter::new(&config.alerts),
            interval: config.capture.interval,
            display_threshold: config.capture.display_threshold,
            max_boxes: config.capture.max_boxes,
            jpeg_quality: config.capture.jpeg_quality,
            state: SessionState::Idle,
            ticker: None,
            generation: 0,
            current_frame: None,
            last_detections: Vec::new(),
            rendered: Vec::new(),
        })
    }

    /// Open the camera and register the capture timer.
    ///
    /// Returns whether the session is streaming afterwards. Starting an
    /// already streaming session changes nothing.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_streaming() {
            return true;
        }
        self.state = SessionState::Starting;
        self.view.set_status(STATUS_STARTING);
        if let Err(e) = self.source.open() {
            log::error!("Error accessing camera {}: {:#}", self.source.describe(), e);
            self.source.release();
            self.state = SessionState::Idle;
            self.view.set_status(STATUS_CAMERA_ERROR);
            self.view.reset_buttons();
            return false;
        }

        self.generation += 1;
        self.ticker = Some(Ticker::new(self.interval, now));
        self.state = SessionState::Streaming;
        self.view.show_streaming_controls();
        self.view.set_status(STATUS_STREAMING);
        log::info!(
            "Camera started: {} (every {} ms)",
            self.source.describe(),
            self.interval.as_millis()
        );
        true
    }

    /// Clear the timer, release the camera and the canvas.
    pub fn stop(&mut self) {
        if !self.is_streaming() {
            if self.source.is_open() {
                self.source.release();
            }
            self.view.clear_canvas();
            return;
        }
        self.ticker = None;
        self.source.release();
        self.view.clear_canvas();
        self.current_frame = None;
        self.rendered.clear();
        self.state = SessionState::Idle;
        self.view.reset_buttons();
        self.view.set_status(STATUS_STOPPED);
        log::info!("Camera stopped: {}", self.source.describe());
    }

    /// Run the capture cycle if the timer is due.
    pub fn poll(&mut self, now: Instant) -> TickOutcome {
        let due = match self.ticker.as_mut() {
            Some(ticker) => ticker.fire(now),
            None => false,
        };
        if !due {
            return TickOutcome::Idle;
        }
        self.capture_and_send()
    }

    /// One capture cycle: grab, encode, POST, then apply the response.
    pub fn capture_and_send(&mut self) -> TickOutcome {
        if !self.is_streaming() {
            return TickOutcome::Idle;
        }
        let frame = match self.source.grab() {
            Ok(Some(frame)) if !frame.is_empty() => frame,
            Ok(_) => return TickOutcome::NoFrame,
            Err(e) => return self.fail(CaptureError::Camera(e)),
        };

        let encoded = frame.to_base64_jpeg(self.jpeg_quality);
        self.current_frame = Some(frame);
        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(e) => return self.fail(CaptureError::Encode(e)),
        };

        let generation = self.generation;
        match self.detector.detect(&encoded) {
            Ok(response) => self.apply_response(generation, response),
            Err(e) => self.fail(CaptureError::Transport(e)),
        }
    }

    /// Render a detection response for the session `generation` it was
    /// requested in. Responses for an ended session are dropped.
    pub fn apply_response(&mut self, generation: u64, response: DetectResponse) -> TickOutcome {
        if !self.is_streaming() || generation != self.generation {
            log::debug!("dropping detection response for ended session {}", generation);
            return TickOutcome::Stale;
        }
        if let Some(error) = response.error.clone() {
            return self.fail(CaptureError::Server(error));
        }

        let detections = response.into_detections();
        let found = detections.len();
        if found > 0 {
            self.view
                .set_status(format!("Active detection: {} objects found", found));
            for d in detections.iter().take(3) {
                log::debug!("detected {} ({:.2})", d.label, d.confidence);
            }
        }
        self.last_detections = detections;

        let significant =
            detection::significant(&self.last_detections, self.display_threshold, self.max_boxes);
        let Some(frame) = self.current_frame.as_ref() else {
            self.rendered.clear();
            return TickOutcome::Detected {
                found,
                rendered: 0,
                alerts: 0,
            };
        };

        self.rendered = render::layout(&significant, frame.width(), frame.height(), &self.palette);
        if !self.renderer.has_font() {
            for overlay in &self.rendered {
                log::debug!("overlay: {}", overlay.label);
            }
        }
        let canvas = self.renderer.render(frame, &self.rendered);
        if let Err(e) = self.view.present(canvas) {
            log::warn!("failed to present overlay: {:#}", e);
        }

        let alerts = self
            .alerts
            .emit_for(self.channel.as_ref(), frame, &significant);

        TickOutcome::Detected {
            found,
            rendered: self.rendered.len(),
            alerts,
        }
    }

    /// Report `error` and show the current frame without any boxes.
    fn fail(&mut self, error: CaptureError) -> TickOutcome {
        log::warn!("{}", error);
        self.view.set_status(error.status_message());
        self.rendered.clear();
        if let Some(frame) = self.current_frame.as_ref() {
            if let Err(e) = self.view.present(frame.image().clone()) {
                log::warn!("failed to present frame: {:#}", e);
            }
        }
        TickOutcome::Failed(error)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    pub fn status(&self) -> &str {
        self.view.status()
    }

    pub fn view(&self) -> &ViewBinding {
        &self.view
    }

    pub fn last_detections(&self) -> &[Detection] {
        &self.last_detections
    }

    pub fn rendered(&self) -> &[OverlayBox] {
        &self.rendered
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_timer(&self) -> bool {
        self.ticker.is_some()
    }

    /// When the next capture is due, if streaming.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.ticker.as_ref().map(Ticker::deadline)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.source.release();
    }
}

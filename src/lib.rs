//! Lookout camera client
//!
//! Captures frames from a camera on a fixed timer, sends each one to a
//! remote object-detection endpoint, draws the returned boxes over the
//! frame, and raises `detection_alert` events for confident detections.
//!
//! # Data flow
//!
//! camera (`ingest`) -> capture loop (`session`) -> `POST /detect_frame`
//! (`client`) -> renderer (`detection`, `render`) -> alert emitter
//! (`alert`) -> event channel (`transport`).
//!
//! # Module Structure
//!
//! - `config`: file + environment configuration
//! - `frame`: decoded frames and JPEG/base64 encoding
//! - `ingest`: camera sources (synthetic, HTTP, still image)
//! - `detection`: wire and normalized detections, significance filter
//! - `palette`, `render`: colors and overlay rasterization
//! - `session`: capture lifecycle and timer
//! - `view`: status text, controls and overlay canvas
//! - `persist`: the `camera_should_run` session flag

pub mod alert;
pub mod client;
pub mod config;
pub mod detection;
pub mod frame;
pub mod ingest;
pub mod palette;
pub mod persist;
pub mod render;
pub mod session;
pub mod transport;
pub mod view;

pub use alert::{AlertEmitter, AlertEvent, DETECTION_ALERT};
pub use client::{Detector, HttpDetector, SmsStatusMonitor};
pub use config::LookoutConfig;
pub use detection::{DetectResponse, Detection, Geometry, WireDetection};
pub use frame::Frame;
pub use ingest::{CameraSource, FrameSource};
pub use palette::{Color, Palette};
pub use persist::SessionStore;
pub use render::{BoxRect, OverlayBox, OverlayRenderer};
pub use session::{CaptureError, CaptureSession, SessionState, TickOutcome};
pub use transport::{EventChannel, MqttEventChannel, OfflineChannel};
pub use view::ViewBinding;

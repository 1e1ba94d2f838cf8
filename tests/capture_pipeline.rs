use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use lookout::{
    AlertEvent, CaptureSession, DetectResponse, Detector, EventChannel, Frame, FrameSource,
    LookoutConfig, SessionState, TickOutcome, WireDetection, DETECTION_ALERT,
};

#[derive(Default)]
struct CameraLog {
    opens: usize,
    releases: usize,
    open: bool,
}

struct FakeCamera {
    log: Arc<Mutex<CameraLog>>,
    deny: bool,
    blank_first: bool,
}

impl FrameSource for FakeCamera {
    fn describe(&self) -> String {
        "fake://camera".to_string()
    }

    fn open(&mut self) -> Result<()> {
        if self.deny {
            return Err(anyhow!("permission denied"));
        }
        let mut log = self.log.lock().unwrap();
        log.opens += 1;
        log.open = true;
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<Frame>> {
        if self.blank_first {
            self.blank_first = false;
            return Ok(None);
        }
        Ok(Some(Frame::new(RgbImage::from_pixel(
            200,
            150,
            Rgb([40, 40, 40]),
        ))))
    }

    fn release(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.releases += 1;
        log.open = false;
    }

    fn is_open(&self) -> bool {
        self.log.lock().unwrap().open
    }
}

struct ScriptedDetector {
    responses: VecDeque<Result<DetectResponse>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, image_base64: &str) -> Result<DetectResponse> {
        self.requests.lock().unwrap().push(image_base64.to_string());
        self.responses
            .pop_front()
            .unwrap_or_else(|| Ok(DetectResponse::ok(Vec::new())))
    }
}

struct RecordingChannel {
    connected: bool,
    sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl EventChannel for RecordingChannel {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn emit(&self, event: &str, payload: &[u8]) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((event.to_string(), payload.to_vec()));
        Ok(())
    }
}

struct Harness {
    session: CaptureSession,
    camera: Arc<Mutex<CameraLog>>,
    requests: Arc<Mutex<Vec<String>>>,
    sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl Harness {
    fn alerts(&self) -> Vec<AlertEvent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(event, payload)| {
                assert_eq!(event, DETECTION_ALERT);
                serde_json::from_slice(payload).unwrap()
            })
            .collect()
    }
}

struct Setup {
    responses: Vec<Result<DetectResponse>>,
    connected: bool,
    deny: bool,
    blank_first: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            connected: true,
            deny: false,
            blank_first: false,
        }
    }
}

fn harness(setup: Setup) -> Harness {
    let camera = Arc::new(Mutex::new(CameraLog::default()));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let session = CaptureSession::new(
        &LookoutConfig::default(),
        Box::new(FakeCamera {
            log: camera.clone(),
            deny: setup.deny,
            blank_first: setup.blank_first,
        }),
        Box::new(ScriptedDetector {
            responses: setup.responses.into(),
            requests: requests.clone(),
        }),
        Box::new(RecordingChannel {
            connected: setup.connected,
            sent: sent.clone(),
        }),
    )
    .expect("session");
    Harness {
        session,
        camera,
        requests,
        sent,
    }
}

fn wire(json: &str) -> WireDetection {
    serde_json::from_str(json).unwrap()
}

#[test]
fn person_detection_renders_and_alerts() {
    let mut h = harness(Setup {
        responses: vec![Ok(DetectResponse::ok(vec![wire(
            r#"{"label":"person","confidence":0.92,"x1":10,"y1":10,"x2":50,"y2":90}"#,
        )]))],
        ..Setup::default()
    });
    let t0 = Instant::now();
    assert!(h.session.start(t0));
    assert_eq!(h.session.status(), "Camera active - detecting objects");

    assert!(matches!(h.session.poll(t0), TickOutcome::Idle));
    let outcome = h.session.poll(t0 + Duration::from_millis(200));
    assert!(matches!(
        outcome,
        TickOutcome::Detected {
            found: 1,
            rendered: 1,
            alerts: 1
        }
    ));

    let rendered = &h.session.rendered()[0];
    assert_eq!(rendered.rect.x, 10.0);
    assert_eq!(rendered.rect.y, 10.0);
    assert_eq!(rendered.rect.width, 40.0);
    assert_eq!(rendered.rect.height, 80.0);
    assert_eq!(rendered.color.to_string(), "#FF5733");
    assert!(rendered.label.contains("92%"));
    assert_eq!(h.session.status(), "Active detection: 1 objects found");

    let alerts = h.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].object, "person");
    assert_eq!(alerts[0].confidence, 0.92);

    let requests = h.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].starts_with("data:"));
    drop(requests);
    assert!(h.session.view().canvas().is_some());
}

#[test]
fn second_start_registers_no_extra_timer() {
    let mut h = harness(Setup::default());
    let t0 = Instant::now();
    assert!(h.session.start(t0));
    let generation = h.session.generation();
    let deadline = h.session.next_deadline();

    assert!(h.session.start(t0 + Duration::from_millis(50)));
    assert_eq!(h.session.generation(), generation);
    assert_eq!(h.session.next_deadline(), deadline);
    assert_eq!(h.camera.lock().unwrap().opens, 1);
}

#[test]
fn denied_camera_returns_to_idle() {
    let mut h = harness(Setup {
        deny: true,
        ..Setup::default()
    });
    assert!(!h.session.start(Instant::now()));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!h.session.has_timer());
    assert_eq!(
        h.session.status(),
        "Error accessing camera. Please check permissions."
    );
    assert!(h.session.view().start_visible());
    assert!(!h.session.view().stop_visible());
    assert!(h.camera.lock().unwrap().releases >= 1);
}

#[test]
fn stop_after_errors_releases_camera_and_clears_canvas() {
    let mut h = harness(Setup {
        responses: vec![
            Ok(DetectResponse::ok(vec![wire(
                r#"{"label":"car","confidence":0.8,"width":30,"height":20}"#,
            )])),
            Err(anyhow!("connection refused")),
            Ok(DetectResponse::failed("model not loaded")),
        ],
        ..Setup::default()
    });
    assert!(h.session.start(Instant::now()));
    assert!(matches!(
        h.session.capture_and_send(),
        TickOutcome::Detected { .. }
    ));
    assert!(h.session.view().canvas().is_some());

    assert!(matches!(
        h.session.capture_and_send(),
        TickOutcome::Failed(_)
    ));
    assert_eq!(h.session.status(), "Connection error - check console");

    assert!(matches!(
        h.session.capture_and_send(),
        TickOutcome::Failed(_)
    ));
    assert_eq!(h.session.status(), "Detection error: model not loaded");
    assert!(h.session.is_streaming());

    h.session.stop();
    let camera = h.camera.lock().unwrap();
    assert!(!camera.open);
    assert_eq!(camera.releases, 1);
    assert!(h.session.view().canvas().is_none());
    assert!(!h.session.has_timer());
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.session.status(), "Camera stopped");
}

fn canvas_is_plain_frame(h: &Harness) -> bool {
    h.session
        .view()
        .canvas()
        .map(|canvas| canvas.pixels().all(|p| *p == Rgb([40, 40, 40])))
        .unwrap_or(false)
}

#[test]
fn failed_cycle_clears_previous_boxes() {
    let person = || {
        Ok(DetectResponse::ok(vec![wire(
            r#"{"label":"person","confidence":0.9,"x1":20,"y1":40,"x2":120,"y2":130}"#,
        )]))
    };
    let mut h = harness(Setup {
        responses: vec![
            person(),
            Err(anyhow!("connection refused")),
            person(),
            Ok(DetectResponse::failed("model not loaded")),
        ],
        ..Setup::default()
    });
    assert!(h.session.start(Instant::now()));

    h.session.capture_and_send();
    assert_eq!(h.session.rendered().len(), 1);
    assert!(!canvas_is_plain_frame(&h));

    assert!(matches!(
        h.session.capture_and_send(),
        TickOutcome::Failed(_)
    ));
    assert!(h.session.rendered().is_empty());
    assert!(canvas_is_plain_frame(&h));

    h.session.capture_and_send();
    assert!(!canvas_is_plain_frame(&h));
    assert!(matches!(
        h.session.capture_and_send(),
        TickOutcome::Failed(_)
    ));
    assert!(h.session.rendered().is_empty());
    assert!(canvas_is_plain_frame(&h));
    assert_eq!(h.session.status(), "Detection error: model not loaded");
}

#[test]
fn huge_coordinates_from_server_do_not_stall_the_loop() {
    let mut h = harness(Setup {
        responses: vec![Ok(DetectResponse::ok(vec![
            wire(r#"{"label":"person","confidence":0.9,"x1":1e19,"y1":10,"x2":1e19,"y2":20}"#),
            wire(r#"{"label":"car","confidence":0.8,"x1":5,"y1":-1e300,"width":10,"height":10}"#),
        ]))],
        ..Setup::default()
    });
    assert!(h.session.start(Instant::now()));
    assert!(matches!(
        h.session.capture_and_send(),
        TickOutcome::Detected { rendered: 2, .. }
    ));
    let canvas = h.session.view().canvas().expect("canvas");
    assert_eq!(canvas.dimensions(), (200, 150));
}

#[test]
fn late_response_after_stop_is_ignored() {
    let mut h = harness(Setup::default());
    assert!(h.session.start(Instant::now()));
    let generation = h.session.generation();
    h.session.stop();

    let late = DetectResponse::ok(vec![wire(r#"{"label":"dog","confidence":0.99}"#)]);
    assert!(matches!(
        h.session.apply_response(generation, late),
        TickOutcome::Stale
    ));
    assert!(h.session.last_detections().is_empty());
    assert!(h.alerts().is_empty());
    assert_eq!(h.session.status(), "Camera stopped");
}

#[test]
fn response_from_previous_session_is_ignored() {
    let mut h = harness(Setup::default());
    assert!(h.session.start(Instant::now()));
    let old = h.session.generation();
    h.session.stop();
    assert!(h.session.start(Instant::now()));
    assert!(h.session.generation() > old);

    let late = DetectResponse::ok(vec![wire(r#"{"label":"cat","confidence":0.9}"#)]);
    assert!(matches!(
        h.session.apply_response(old, late),
        TickOutcome::Stale
    ));
}

#[test]
fn renders_top_five_above_threshold_in_order() {
    let detections = [
        ("a", 0.41),
        ("b", 0.95),
        ("c", 0.39),
        ("d", 0.60),
        ("e", 0.40),
        ("f", 0.77),
        ("g", 0.88),
        ("h", 0.52),
    ]
    .iter()
    .map(|(label, confidence)| {
        wire(&format!(
            r#"{{"label":"{}","confidence":{}}}"#,
            label, confidence
        ))
    })
    .collect();

    let mut h = harness(Setup {
        responses: vec![Ok(DetectResponse::ok(detections))],
        connected: false,
        ..Setup::default()
    });
    assert!(h.session.start(Instant::now()));
    assert!(matches!(
        h.session.capture_and_send(),
        TickOutcome::Detected {
            found: 8,
            rendered: 5,
            alerts: 0
        }
    ));
    let labels: Vec<&str> = h
        .session
        .rendered()
        .iter()
        .map(|b| b.label.split(':').next().unwrap())
        .collect();
    assert_eq!(labels, vec!["b", "g", "f", "d", "h"]);
    assert_eq!(h.session.last_detections().len(), 8);
}

#[test]
fn disconnected_channel_gets_no_alerts() {
    let mut h = harness(Setup {
        responses: vec![Ok(DetectResponse::ok(vec![wire(
            r#"{"label":"person","confidence":0.97}"#,
        )]))],
        connected: false,
        ..Setup::default()
    });
    assert!(h.session.start(Instant::now()));
    h.session.capture_and_send();
    assert_eq!(h.session.rendered().len(), 1);
    assert!(h.sent.lock().unwrap().is_empty());
}

#[test]
fn undecoded_frame_skips_the_cycle() {
    let mut h = harness(Setup {
        blank_first: true,
        ..Setup::default()
    });
    assert!(h.session.start(Instant::now()));
    assert!(matches!(h.session.capture_and_send(), TickOutcome::NoFrame));
    assert!(h.requests.lock().unwrap().is_empty());
    assert!(matches!(
        h.session.capture_and_send(),
        TickOutcome::Detected { found: 0, .. }
    ));
}

#[test]
fn alerts_use_only_rendered_detections() {
    let mut h = harness(Setup {
        responses: vec![Ok(DetectResponse::ok(
            ["p1", "p2", "p3", "p4", "p5", "p6"]
                .iter()
                .map(|label| wire(&format!(r#"{{"label":"{}","confidence":0.9}}"#, label)))
                .collect(),
        ))],
        ..Setup::default()
    });
    assert!(h.session.start(Instant::now()));
    h.session.capture_and_send();
    let objects: Vec<String> = h.alerts().into_iter().map(|a| a.object).collect();
    assert_eq!(objects, vec!["p1", "p2", "p3", "p4", "p5"]);
}

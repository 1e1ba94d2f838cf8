//! lookout - camera client for a remote object-detection server
//!
//! This binary:
//! 1. Opens the configured camera
//! 2. Sends a frame to `POST /detect_frame` every capture interval
//! 3. Draws the returned boxes (optionally to an overlay image file)
//! 4. Publishes `detection_alert` events over MQTT when enabled
//! 5. Polls `/api/sms_status` and remembers whether the camera was running

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lookout::{
    CameraSource, CaptureSession, EventChannel, HttpDetector, LookoutConfig, MqttEventChannel,
    OfflineChannel, SessionStore, SmsStatusMonitor, TickOutcome,
};

#[path = "../ui.rs"]
mod ui;

const MAX_IDLE_SLEEP: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream camera frames to a detection server and raise alerts"
)]
struct Args {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "LOOKOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Detection server base URL.
    #[arg(long)]
    server_url: Option<String>,

    /// Camera URL: stub://name, http(s)://..., or an image path.
    #[arg(long)]
    camera_url: Option<String>,

    /// Run a single capture cycle, print the boxes and exit.
    #[arg(long)]
    once: bool,

    /// Start the camera only if it was running when the last run exited.
    #[arg(long)]
    resume: bool,

    /// Output mode for progress.
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());

    let config = {
        let _stage = ui.stage("Load configuration");
        load_config(&args)?
    };
    log::info!(
        "detection server {}, camera {}",
        config.server.base_url,
        config.camera.url
    );

    let channel: Box<dyn EventChannel> = if config.mqtt.enabled && !args.once {
        let _stage = ui.stage("Connect event channel");
        Box::new(MqttEventChannel::connect(&config.mqtt)?)
    } else {
        log::info!("event channel disabled; alerts will not be sent");
        Box::new(OfflineChannel)
    };

    let mut session = {
        let _stage = ui.stage("Prepare camera");
        let source = CameraSource::new(&config.camera)?;
        CaptureSession::new(
            &config,
            Box::new(source),
            Box::new(HttpDetector::new(&config.server)),
            channel,
        )?
    };

    if args.once {
        return run_once(&mut session);
    }

    let store = SessionStore::new(&config.session.state_path);
    if !store.should_start(args.resume) {
        log::info!(
            "camera was not running when the last run exited; nothing to resume ({})",
            store.path().display()
        );
        return Ok(());
    }
    if !session.start(Instant::now()) {
        bail!("{}", session.status());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let mut sms = SmsStatusMonitor::new(&config.server, config.sms.poll_interval);
    let mut status = ui.status_line();
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        sms.poll_if_due(now);
        if let TickOutcome::Detected { alerts, .. } = session.poll(now) {
            if alerts > 0 {
                log::info!("sent {} detection alert(s)", alerts);
            }
        }
        status.update(session.status());

        let mut deadline = sms.next_deadline(now);
        if let Some(capture) = session.next_deadline() {
            deadline = deadline.min(capture);
        }
        let wait = deadline
            .saturating_duration_since(Instant::now())
            .min(MAX_IDLE_SLEEP);
        std::thread::sleep(wait);
    }
    status.finish();

    log::info!("shutdown signal received, stopping camera...");
    if let Err(e) = store.save(session.is_streaming()) {
        log::warn!("failed to save session state: {:#}", e);
    }
    session.stop();
    drop(session);
    Ok(())
}

fn load_config(args: &Args) -> Result<LookoutConfig> {
    let mut config = LookoutConfig::load_from(args.config.as_deref())?;
    if let Some(url) = &args.server_url {
        config.server.base_url = url.clone();
    }
    if let Some(url) = &args.camera_url {
        config.camera.url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run_once(session: &mut CaptureSession) -> Result<()> {
    if !session.start(Instant::now()) {
        bail!("{}", session.status());
    }
    // Sources may need a grab or two before a decoded frame is available.
    let mut outcome = session.capture_and_send();
    for _ in 0..3 {
        if !matches!(outcome, TickOutcome::NoFrame) {
            break;
        }
        outcome = session.capture_and_send();
    }
    let result = match outcome {
        TickOutcome::Detected { found, .. } => {
            for overlay in session.rendered() {
                let r = overlay.rect;
                println!(
                    "{}\t{:.0},{:.0} {:.0}x{:.0}\t{}",
                    overlay.label, r.x, r.y, r.width, r.height, overlay.color
                );
            }
            log::info!("{} detections, {} drawn", found, session.rendered().len());
            Ok(())
        }
        TickOutcome::Failed(e) => Err(anyhow::anyhow!("{}", e)),
        other => Err(anyhow::anyhow!("no frame captured ({:?})", other)),
    };
    session.stop();
    result
}

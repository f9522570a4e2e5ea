use anyhow::{anyhow, Context, Result};
use clap::Parser;
use facescan_core::{
    DataLayout, FaceIdentity, FaceStore, HeadlessPreview, ScanLog, ScanOptions, ScanSession,
    ScrfdDetector, SessionError, StopReason,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod camera_source;
mod cli;
mod commands;
mod config;
mod preview;

use camera_source::CameraSource;
use cli::{Cli, Mode};
use config::Config;
use preview::TerminalPreview;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply_to(&mut config);

    let layout = DataLayout::new(&config.data_dir);
    layout.ensure().with_context(|| {
        format!("cannot create data directory {}", layout.root().display())
    })?;
    let mut log = ScanLog::open_or_empty(layout.log_file());

    let mut stdout = std::io::stdout().lock();
    match cli.mode() {
        Mode::Stats => commands::stats(&log, &layout, &mut stdout),
        Mode::ListFaces => commands::list_faces(&log, &mut stdout),
        Mode::Cleanup(days) => {
            commands::cleanup(&mut log, days, config.missing_file_policy, &mut stdout).map(|_| ())
        }
        Mode::Export(path) => commands::export(&log, path.as_deref(), &mut stdout).map(|_| ()),
        Mode::Scan(options) => {
            drop(stdout);
            scan(&config, &layout, log, options)
        }
    }
}

fn scan(config: &Config, layout: &DataLayout, log: ScanLog, options: ScanOptions) -> Result<()> {
    println!("Starting face scanner...");

    let detector = ScrfdDetector::load(&config.detector_model_path())
        .context("failed to load face detector")?;
    let source = CameraSource::new(
        &config.camera_device,
        config.camera_width,
        config.camera_height,
    );
    let mut session = ScanSession::new(
        source,
        detector,
        FaceIdentity::new(),
        FaceStore::new(layout.faces_dir()),
        log,
    );

    install_shutdown_handler(session.shutdown_handle())?;

    let result = if options.display {
        println!("Press 'q' to quit, 's' to save current face");
        let mut preview =
            TerminalPreview::enable().context("failed to enable terminal controls")?;
        session.start(options, &mut preview)
    } else {
        session.start(options, &mut HeadlessPreview)
    };

    match result {
        Ok(summary) => {
            if summary.stop_reason == StopReason::Interrupted {
                println!("Scanning interrupted by user");
            }
            println!(
                "Face scanner stopped: {} frames, {} faces detected, {} saved",
                summary.frames, summary.faces_detected, summary.saved
            );
            Ok(())
        }
        Err(SessionError::Acquisition(e)) => Err(anyhow!(
            "could not open camera {}: {e}",
            config.camera_device
        )),
        Err(e @ SessionError::FrameRead(_)) => {
            Err(anyhow::Error::new(e).context("scanning stopped"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Route SIGINT, SIGTERM and SIGHUP to the session's shutdown flag so the
/// loop exits through `stop()` and the terminal is restored.
fn install_shutdown_handler(shutdown: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
        .context("failed to install signal handler")
}

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::time::sleep;

use proctor_lib::{
    sim::{JitterBackend, RecordingNavigator, RecordingOverlay, SimulatedHost, SyntheticCamera},
    utils::logging,
    AssessmentSession, LogEmitter, ProctorConfig, VisionController,
};

/// Runs one simulated attempt: a restless candidate on a synthetic camera
/// who switches tabs once, leaves fullscreen briefly and trips the audio
/// monitor, then finishes normally.
#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ProctorConfig::load(&PathBuf::from(path))?,
        None => ProctorConfig::default(),
    };
    info!("proctor-sim starting (countdown {}s)", config.countdown_seconds);

    let host = Arc::new(SimulatedHost::new());
    let navigator = Arc::new(RecordingNavigator::default());
    let emitter = Arc::new(LogEmitter);
    let overlay = Arc::new(RecordingOverlay::default());

    let session = AssessmentSession::new(&config, host.clone(), navigator.clone(), emitter.clone());
    let vision = Arc::new(VisionController::new(
        Arc::new(SyntheticCamera::new(640, 480).frame_interval(Duration::from_millis(33))),
        Arc::new(JitterBackend::default()),
        Some(overlay.clone()),
        &config.vision,
        emitter,
    ));
    session.attach_vision(vision.clone()).await;

    session.start().await?;
    info!("session {} running", session.id().await);
    sleep(Duration::from_secs(2)).await;

    // Alt-tab away and back.
    session.guard().on_window_blur().await;
    session.guard().on_visibility_change(true).await;
    sleep(Duration::from_millis(800)).await;
    session.guard().on_visibility_change(false).await;
    session.guard().on_window_focus().await;
    session.guard().dismiss_banner().await;

    // Esc out of fullscreen, then come back before the countdown runs out.
    host.set_fullscreen(false);
    session.guard().on_fullscreen_change(false).await;
    sleep(Duration::from_secs(3)).await;
    if let Err(err) = session.guard().return_to_fullscreen().await {
        warn!("could not return to fullscreen: {err}");
    }

    let audio_count = session.report_audio_warning().await?;
    info!("audio warnings so far: {audio_count}");
    sleep(Duration::from_secs(2)).await;

    if session.should_terminate().await {
        warn!("termination requested by the warning ledger");
    }

    let metrics = vision.metrics().await;
    info!(
        "pipeline: {} frames, {} object requests, {} events, {} errors, cpu {:.1}%, rss {:.1} MB",
        metrics.frames_processed,
        metrics.object_requests,
        metrics.events_logged,
        metrics.inference_errors,
        metrics.system.cpu_percent,
        metrics.system.memory_mb
    );

    let summary = session.stop().await?;
    info!("overlay drew {} frames and was cleared {} times", overlay.draws(), overlay.clears());

    let dir = std::env::current_dir().context("failed to resolve working directory")?;
    let path = vision.export_to_dir(&dir).await?;
    info!("detection log written to {}", path.display());

    if !navigator.routes().is_empty() {
        warn!("candidate was redirected: {:?}", navigator.routes());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("failed to serialise session summary")?
    );
    Ok(())
}

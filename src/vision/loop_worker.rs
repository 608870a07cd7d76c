use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::VisionConfig,
    emit::{emit_json, Emitter, CAMERA_STATUS_CHANGED, DETECTION_EVENT},
    metrics::MetricsCollector,
};

use super::{
    analyzer::FrameAnalyzer,
    detectors::{DetectorBackend, Detectors},
    events::{DetectionEvent, SharedLog},
    frame::Frame,
    media::{Camera, CameraError, CameraStatus, MediaStream, OverlaySink},
    worker::ObjectWorker,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Everything one pipeline run needs. Built by the controller per `start`.
pub(crate) struct LoopContext {
    pub camera: Arc<dyn Camera>,
    pub backend: Arc<dyn DetectorBackend>,
    pub overlay: Option<Arc<dyn OverlaySink>>,
    pub config: VisionConfig,
    pub log: SharedLog,
    pub status: Arc<watch::Sender<CameraStatus>>,
    pub events: broadcast::Sender<DetectionEvent>,
    pub emitter: Arc<dyn Emitter>,
    pub metrics: MetricsCollector,
    pub cancel: CancellationToken,
}

impl LoopContext {
    fn set_status(&self, status: CameraStatus) {
        emit_json(self.emitter.as_ref(), CAMERA_STATUS_CHANGED, &status);
        self.status.send_replace(status);
    }

    fn deny(&self, err: &CameraError) {
        log_warn!("camera pipeline unavailable: {err}");
        self.set_status(CameraStatus::denied(err));
    }
}

/// Acquire → wait for a usable frame → load models → analyse frames until
/// cancelled. Never panics or returns an error; failures end up in the
/// camera status.
pub(crate) async fn vision_loop(ctx: LoopContext) {
    ctx.set_status(CameraStatus::Requesting);

    let Some(mut stream) = acquire_stream(&ctx).await else {
        return;
    };
    log_info!("camera stream acquired (tracks: {:?})", stream.track_kinds());

    let ready_timeout = Duration::from_millis(ctx.config.ready_timeout_ms);
    let ready = tokio::select! {
        _ = ctx.cancel.cancelled() => None,
        ready = tokio::time::timeout(ready_timeout, wait_for_usable_frame(&mut stream)) => Some(ready),
    };
    let first_frame = match ready {
        None => {
            stream.stop_all_tracks();
            return;
        }
        Some(Ok(Ok(frame))) => frame,
        Some(Ok(Err(err))) => {
            stream.stop_all_tracks();
            ctx.deny(&err);
            return;
        }
        Some(Err(_elapsed)) => {
            stream.stop_all_tracks();
            ctx.deny(&CameraError::Timeout);
            return;
        }
    };

    let mut analyzer = match load_models(&ctx).await {
        Some(Ok(analyzer)) => analyzer,
        Some(Err(err)) => {
            stream.stop_all_tracks();
            ctx.deny(&err);
            return;
        }
        None => {
            stream.stop_all_tracks();
            return;
        }
    };

    ctx.set_status(CameraStatus::Granted);
    log_info!(
        "vision pipeline running with {} backend",
        ctx.backend.name()
    );

    let mut next = Some(first_frame);
    loop {
        let frame = match next.take() {
            Some(frame) => frame,
            None => {
                let received = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => break,
                    frame = stream.next_frame() => frame,
                };
                match received {
                    Some(frame) => frame,
                    None => {
                        log_warn!("camera stream ended unexpectedly");
                        ctx.deny(&CameraError::NotReadable);
                        break;
                    }
                }
            }
        };

        let completed = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => false,
            _ = handle_frame(&ctx, &mut analyzer, frame) => true,
        };
        if !completed {
            break;
        }
    }

    analyzer.shutdown();
    stream.stop_all_tracks();
    if !stream.all_tracks_ended() {
        log_warn!("camera tracks still live after stop: {:?}", stream.track_kinds());
    }
    if let Some(overlay) = ctx.overlay.as_ref() {
        overlay.clear();
    }
    log_info!("vision loop shutting down");
}

async fn acquire_stream(ctx: &LoopContext) -> Option<MediaStream> {
    let camera = ctx.camera.clone();
    let mut acquire = tokio::task::spawn_blocking(move || camera.acquire());

    let answered = tokio::select! {
        result = &mut acquire => Some(result),
        _ = ctx.cancel.cancelled() => None,
    };

    let Some(result) = answered else {
        // The prompt is still open. If it's granted later, release the
        // camera straight away.
        tokio::spawn(async move {
            if let Ok(Ok(mut stream)) = acquire.await {
                stream.stop_all_tracks();
                log_info!("released camera granted after stop");
            }
        });
        return None;
    };

    match result {
        Ok(Ok(stream)) => Some(stream),
        Ok(Err(err)) => {
            ctx.deny(&err);
            None
        }
        Err(err) => {
            log_error!("camera acquisition task failed: {err}");
            ctx.deny(&CameraError::NotReadable);
            None
        }
    }
}

async fn wait_for_usable_frame(stream: &mut MediaStream) -> Result<Frame, CameraError> {
    loop {
        match stream.next_frame().await {
            Some(frame) if frame.is_usable() => return Ok(frame),
            Some(_) => continue,
            None => return Err(CameraError::NotReadable),
        }
    }
}

/// `None` when cancelled during the load.
async fn load_models(ctx: &LoopContext) -> Option<Result<FrameAnalyzer, CameraError>> {
    let backend = ctx.backend.clone();
    let load_started = Instant::now();
    let loading = tokio::task::spawn_blocking(move || backend.load());

    let loaded = tokio::select! {
        _ = ctx.cancel.cancelled() => return None,
        loaded = loading => loaded,
    };

    let detectors: Detectors = match loaded {
        Ok(Ok(detectors)) => detectors,
        Ok(Err(err)) => return Some(Err(CameraError::ModelLoad(err.to_string()))),
        Err(err) => return Some(Err(CameraError::ModelLoad(err.to_string()))),
    };
    log_info!(
        "{} models loaded in {}ms",
        ctx.backend.name(),
        load_started.elapsed().as_millis()
    );

    let worker = match ObjectWorker::spawn(detectors.objects.clone(), ctx.config.object_input_size) {
        Ok(worker) => worker,
        Err(err) => return Some(Err(CameraError::ModelLoad(err.to_string()))),
    };
    Some(Ok(FrameAnalyzer::new(detectors, worker, &ctx.config)))
}

async fn handle_frame(ctx: &LoopContext, analyzer: &mut FrameAnalyzer, frame: Frame) {
    let outcome = analyzer.process(&frame, Instant::now()).await;

    for _ in 0..outcome.errors {
        ctx.metrics.record_inference_error().await;
    }

    if let (Some(overlay), Some(landmarks)) = (ctx.overlay.as_ref(), outcome.landmarks.as_ref()) {
        overlay.draw(&frame, landmarks);
    }

    if let Some(event) = outcome.event {
        // A stop that raced this frame wins: nothing is appended after it.
        if ctx.cancel.is_cancelled() {
            return;
        }
        ctx.log.push(event.clone()).await;
        emit_json(ctx.emitter.as_ref(), DETECTION_EVENT, &event);
        let _ = ctx.events.send(event);
    }

    ctx.metrics.record_frame(outcome.metrics).await;
}

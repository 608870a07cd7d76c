use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::VisionConfig,
    emit::{emit_json, Emitter, CAMERA_STATUS_CHANGED},
    metrics::{MetricsCollector, MetricsSnapshot},
};

use super::{
    detectors::DetectorBackend,
    events::{DetectionEvent, SharedLog},
    loop_worker::{vision_loop, LoopContext},
    media::{Camera, CameraStatus, OverlaySink},
    SignalFuture, VisualSignalSource,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct PipelineRun {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Owns the camera pipeline for one assessment. The detection log and
/// metrics outlive individual runs so a retry keeps earlier entries.
pub struct VisionController {
    camera: Arc<dyn Camera>,
    backend: Arc<dyn DetectorBackend>,
    overlay: Option<Arc<dyn OverlaySink>>,
    config: VisionConfig,
    emitter: Arc<dyn Emitter>,
    log: SharedLog,
    status: Arc<watch::Sender<CameraStatus>>,
    events: broadcast::Sender<DetectionEvent>,
    metrics: MetricsCollector,
    run: Mutex<Option<PipelineRun>>,
}

impl VisionController {
    pub fn new(
        camera: Arc<dyn Camera>,
        backend: Arc<dyn DetectorBackend>,
        overlay: Option<Arc<dyn OverlaySink>>,
        config: &VisionConfig,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        let (status, _) = watch::channel(CameraStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            camera,
            backend,
            overlay,
            config: config.clone(),
            emitter,
            log: SharedLog::new(config.max_log_entries),
            status: Arc::new(status),
            events,
            metrics: MetricsCollector::new(),
            run: Mutex::new(None),
        }
    }

    /// Starts a run unless one is already live. A run that ended on its own
    /// (denied, stream lost) is reaped first, so this doubles as retry.
    pub async fn start_pipeline(&self) {
        let mut run = self.run.lock().await;
        if let Some(current) = run.as_ref() {
            if !current.handle.is_finished() {
                log_info!("vision pipeline already running");
                return;
            }
        }
        if let Some(finished) = run.take() {
            join_run(finished).await;
        }

        let cancel = CancellationToken::new();
        let ctx = LoopContext {
            camera: self.camera.clone(),
            backend: self.backend.clone(),
            overlay: self.overlay.clone(),
            config: self.config.clone(),
            log: self.log.clone(),
            status: self.status.clone(),
            events: self.events.clone(),
            emitter: self.emitter.clone(),
            metrics: self.metrics.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(vision_loop(ctx));
        *run = Some(PipelineRun { handle, cancel });
        log_info!("vision pipeline started ({} backend)", self.backend.name());
    }

    /// Safe in any state, including mid-acquire and mid-load. When it
    /// returns, every acquired track has been stopped and no further event
    /// will be appended.
    pub async fn stop_pipeline(&self) {
        let previous = self.run.lock().await.take();
        if let Some(run) = previous {
            run.cancel.cancel();
            join_run(run).await;
            log_info!("vision pipeline stopped");
        }

        if let Some(overlay) = self.overlay.as_ref() {
            overlay.clear();
        }
        if *self.status.borrow() != CameraStatus::Idle {
            emit_json(self.emitter.as_ref(), CAMERA_STATUS_CHANGED, &CameraStatus::Idle);
            self.status.send_replace(CameraStatus::Idle);
        }
    }

    /// The retry affordance of the denied state.
    pub async fn retry(&self) {
        self.stop_pipeline().await;
        self.start_pipeline().await;
    }

    pub fn status(&self) -> CameraStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CameraStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DetectionEvent> {
        self.events.subscribe()
    }

    pub fn log(&self) -> SharedLog {
        self.log.clone()
    }

    pub async fn export_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        self.log.export_to_dir(dir).await
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.metrics.get_snapshot().await
    }
}

async fn join_run(run: PipelineRun) {
    if let Err(err) = run.handle.await {
        log_error!("vision loop task failed to join: {err}");
    }
}

impl VisualSignalSource for VisionController {
    fn start(&self) -> SignalFuture<'_> {
        Box::pin(self.start_pipeline())
    }

    fn stop(&self) -> SignalFuture<'_> {
        Box::pin(self.stop_pipeline())
    }

    fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.subscribe_events()
    }

    fn status(&self) -> CameraStatus {
        VisionController::status(self)
    }

    fn detection_log(&self) -> SharedLog {
        self.log()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::ChannelEmitter;
    use crate::sim::{ScriptedBackend, ScriptedFrame, SyntheticCamera};
    use crate::vision::media::CameraError;
    use std::time::Duration;

    fn controller(camera: SyntheticCamera, backend: ScriptedBackend) -> VisionController {
        let (emitter, _rx) = ChannelEmitter::new();
        VisionController::new(
            Arc::new(camera),
            Arc::new(backend),
            None,
            &VisionConfig::default(),
            Arc::new(emitter),
        )
    }

    async fn wait_for(controller: &VisionController, wanted: fn(&CameraStatus) -> bool) {
        let mut status = controller.subscribe_status();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !wanted(&status.borrow_and_update()) {
                if status.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn denied_permission_surfaces_a_message() {
        let camera = SyntheticCamera::new(64, 48).failing_with(CameraError::PermissionDenied);
        let vision = controller(camera, ScriptedBackend::steady(ScriptedFrame::looking_at_screen()));

        vision.start_pipeline().await;
        wait_for(&vision, |s| matches!(s, CameraStatus::Denied { .. })).await;

        let CameraStatus::Denied { message } = vision.status() else {
            unreachable!()
        };
        assert!(message.contains("denied"));
    }

    #[tokio::test]
    async fn stop_releases_every_track_and_freezes_the_log() {
        let camera = SyntheticCamera::new(64, 48);
        let tracks = camera.issued_tracks();
        let vision = controller(camera, ScriptedBackend::steady(ScriptedFrame::looking_at_screen()));

        vision.start_pipeline().await;
        wait_for(&vision, |s| *s == CameraStatus::Granted).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        vision.stop_pipeline().await;
        assert!(tracks.all_ended());
        assert_eq!(vision.status(), CameraStatus::Idle);

        let logged = vision.log().len().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(vision.log().len().await, logged);

        // Idempotent.
        vision.stop_pipeline().await;
    }

    #[tokio::test]
    async fn stop_while_permission_prompt_is_open_still_releases_the_camera() {
        let camera = SyntheticCamera::new(64, 48).answering_after(Duration::from_millis(150));
        let tracks = camera.issued_tracks();
        let vision = controller(camera, ScriptedBackend::steady(ScriptedFrame::looking_at_screen()));

        vision.start_pipeline().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        vision.stop_pipeline().await;

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(tracks.all_ended());
        assert_eq!(vision.status(), CameraStatus::Idle);
    }

    #[tokio::test]
    async fn retry_after_failed_model_load() {
        let camera = SyntheticCamera::new(64, 48);
        let backend = ScriptedBackend::steady(ScriptedFrame::looking_at_screen()).failing_loads(1);
        let vision = controller(camera, backend);

        vision.start_pipeline().await;
        wait_for(&vision, |s| matches!(s, CameraStatus::Denied { .. })).await;

        vision.retry().await;
        wait_for(&vision, |s| *s == CameraStatus::Granted).await;
        vision.stop_pipeline().await;
    }
}

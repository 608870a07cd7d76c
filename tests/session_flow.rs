use std::{sync::Arc, time::Duration};

use proctor_lib::{
    emit::{ChannelEmitter, CAMERA_STATUS_CHANGED, DETECTION_EVENT},
    sim::{
        RecordingNavigator, RecordingOverlay, ScriptedBackend, ScriptedFrame, SimulatedHost,
        SyntheticCamera,
    },
    vision::DetectedObject,
    AssessmentSession, CameraError, CameraStatus, DetectionEvent, DisqualificationReason,
    ProctorConfig, SessionStatus, VisionController, VisualSignalSource, WarningLimits,
};
use tokio::time::{sleep, timeout};

async fn wait_for_status(vision: &VisionController, wanted: fn(&CameraStatus) -> bool) {
    let mut status = vision.subscribe_status();
    timeout(Duration::from_secs(5), async {
        while !wanted(&status.borrow_and_update()) {
            if status.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("camera status never reached the expected state");
}

#[tokio::test]
async fn full_attempt_with_camera() {
    let config = ProctorConfig {
        vision: proctor_lib::VisionConfig {
            object_every_n_frames: 1,
            event_throttle_ms: 100,
            ..Default::default()
        },
        ..ProctorConfig::default()
    };

    let phone_on_desk = ScriptedFrame {
        objects: vec![
            DetectedObject::new("person", 0.9),
            DetectedObject::new("cell phone", 0.8),
        ],
        ..ScriptedFrame::looking_at_screen()
    };
    let backend = ScriptedBackend::sequence(vec![ScriptedFrame::looking_at_screen(), phone_on_desk]);

    let camera = SyntheticCamera::new(64, 48);
    let tracks = camera.issued_tracks();
    let overlay = Arc::new(RecordingOverlay::default());
    let (emitter, mut ui) = ChannelEmitter::new();
    let emitter = Arc::new(emitter);

    let host = Arc::new(SimulatedHost::new());
    let navigator = Arc::new(RecordingNavigator::default());
    let session = AssessmentSession::new(&config, host.clone(), navigator.clone(), emitter.clone());
    let vision = Arc::new(VisionController::new(
        Arc::new(camera),
        Arc::new(backend),
        Some(overlay.clone()),
        &config.vision,
        emitter,
    ));
    let mut events = vision.subscribe();
    session.attach_vision(vision.clone()).await;

    session.start().await.unwrap();
    wait_for_status(&vision, |s| *s == CameraStatus::Granted).await;

    let first: DetectionEvent = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.gaze.as_deref(), Some("looking_center"));

    // The phone shows up once it is in the majority of recent frames.
    let with_phone = timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.objects.contains(&"cell phone".to_string()) {
                return event;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(with_phone.objects, vec!["cell phone"]);

    session.guard().on_window_blur().await;
    session.guard().on_window_focus().await;

    let summary = session.stop().await.unwrap();
    assert_eq!(summary.status, SessionStatus::Completed);
    assert_eq!(summary.warnings.tab_switch.count, 1);
    assert!(summary.detection_events >= 2);
    assert!(navigator.routes().is_empty());

    // Teardown: every track ended, canvas cleared, log frozen.
    assert!(tracks.all_ended());
    assert!(overlay.draws() > 0);
    assert!(!overlay.is_showing());
    assert_eq!(vision.status(), CameraStatus::Idle);
    let logged = vision.log().events().await;
    sleep(Duration::from_millis(150)).await;
    assert_eq!(vision.log().events().await, logged);

    // Export is a pure read of the in-memory log.
    let dir = tempfile::tempdir().unwrap();
    let path = vision.export_to_dir(dir.path()).await.unwrap();
    let exported: Vec<DetectionEvent> =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(exported, logged);

    let mut names = Vec::new();
    while let Ok((name, _)) = ui.try_recv() {
        names.push(name);
    }
    assert!(names.iter().any(|n| n == DETECTION_EVENT));
    assert!(names.iter().any(|n| n == CAMERA_STATUS_CHANGED));
}

#[tokio::test]
async fn denied_camera_does_not_end_the_attempt() {
    let config = ProctorConfig::default();
    let (emitter, _ui) = ChannelEmitter::new();
    let emitter = Arc::new(emitter);
    let vision = Arc::new(VisionController::new(
        Arc::new(SyntheticCamera::new(64, 48).failing_with(CameraError::NotFound)),
        Arc::new(ScriptedBackend::steady(ScriptedFrame::looking_at_screen())),
        None,
        &config.vision,
        emitter.clone(),
    ));
    let session = AssessmentSession::new(
        &config,
        Arc::new(SimulatedHost::new()),
        Arc::new(RecordingNavigator::default()),
        emitter,
    );
    session.attach_vision(vision.clone()).await;
    session.start().await.unwrap();

    wait_for_status(&vision, |s| matches!(s, CameraStatus::Denied { .. })).await;
    let CameraStatus::Denied { message } = vision.status() else {
        unreachable!()
    };
    assert!(message.contains("No camera"));
    assert!(!session.should_terminate().await);

    let summary = session.stop().await.unwrap();
    assert_eq!(summary.status, SessionStatus::Completed);
    assert_eq!(summary.detection_events, 0);
}

#[tokio::test(start_paused = true)]
async fn unresolved_fullscreen_exit_disqualifies_the_attempt() {
    let config = ProctorConfig {
        countdown_seconds: 3,
        limits: WarningLimits {
            fullscreen_exit: 5,
            ..WarningLimits::default()
        },
        ..ProctorConfig::default()
    };
    let host = Arc::new(SimulatedHost::new());
    let navigator = Arc::new(RecordingNavigator::default());
    let (emitter, _ui) = ChannelEmitter::new();
    let session = AssessmentSession::new(&config, host.clone(), navigator.clone(), Arc::new(emitter));
    session.start().await.unwrap();

    host.set_fullscreen(false);
    session.guard().on_fullscreen_change(false).await;
    sleep(Duration::from_millis(3_100)).await;

    assert_eq!(navigator.routes(), vec!["/disqualified?reason=left_fullscreen"]);
    assert!(session.should_terminate().await);

    // Late events after navigation change nothing.
    session.guard().on_fullscreen_change(true).await;
    session.guard().on_window_blur().await;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(navigator.routes().len(), 1);

    let summary = session.stop().await.unwrap();
    assert_eq!(summary.status, SessionStatus::Disqualified);
    assert_eq!(summary.disqualification, Some(DisqualificationReason::LeftFullscreen));
    assert_eq!(summary.warnings.fullscreen_exit.count, 1);
}

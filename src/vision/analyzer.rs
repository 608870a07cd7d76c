use std::{collections::BTreeSet, time::Duration};

use chrono::Utc;
use tokio::time::Instant;

use crate::{config::VisionConfig, metrics::FrameMetrics};

use super::{
    detectors::{DetectedObject, DetectorError, Detectors},
    events::{ChangeGate, DetectionEvent, Observation},
    frame::Frame,
    inference::{estimate_gaze, estimate_gesture, estimate_mood, Gaze, Gesture},
    landmarks::HolisticResult,
    smoothing::SmoothingWindow,
    worker::ObjectWorker,
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const PERSON_LABEL: &str = "person";

/// What one frame produced.
pub struct FrameOutcome {
    pub landmarks: Option<HolisticResult>,
    pub event: Option<DetectionEvent>,
    pub metrics: FrameMetrics,
    /// Inference calls that failed on this frame.
    pub errors: u32,
}

/// Per-frame analysis for one pipeline run: raw classifications go into
/// their smoothing windows, and the smoothed observation goes through the
/// change gate.
pub struct FrameAnalyzer {
    detectors: Detectors,
    worker: ObjectWorker,
    mood: SmoothingWindow<Option<String>>,
    gesture: SmoothingWindow<Option<Gesture>>,
    gaze: SmoothingWindow<Option<Gaze>>,
    objects: SmoothingWindow<BTreeSet<String>>,
    gate: ChangeGate,
    mood_interval: Duration,
    object_every_n_frames: u64,
    object_min_score: f32,
    last_mood_at: Option<Instant>,
    frames_seen: u64,
}

impl FrameAnalyzer {
    pub fn new(detectors: Detectors, worker: ObjectWorker, config: &VisionConfig) -> Self {
        let window = config.smoothing_window;
        Self {
            detectors,
            worker,
            mood: SmoothingWindow::new(window),
            gesture: SmoothingWindow::new(window),
            gaze: SmoothingWindow::new(window),
            objects: SmoothingWindow::new(window),
            gate: ChangeGate::new(Duration::from_millis(config.event_throttle_ms)),
            mood_interval: Duration::from_millis(config.mood_interval_ms),
            object_every_n_frames: config.object_every_n_frames.max(1),
            object_min_score: config.object_min_score,
            last_mood_at: None,
            frames_seen: 0,
        }
    }

    pub async fn process(&mut self, frame: &Frame, now: Instant) -> FrameOutcome {
        let started = Instant::now();
        let sequence = self.frames_seen;
        self.frames_seen += 1;
        let mut errors = 0;

        // Collect a finished object answer before deciding on a new request.
        if let Some(answer) = self.worker.poll() {
            match answer {
                Ok(detections) => self
                    .objects
                    .push(foreign_objects(&detections, self.object_min_score)),
                Err(err) => {
                    log_warn!("object detection failed on frame {}: {err}", frame.index);
                    errors += 1;
                }
            }
        }
        let object_dispatched =
            sequence % self.object_every_n_frames == 0 && self.worker.try_dispatch(frame);

        let landmarks_started = Instant::now();
        let landmarks = match self.detect_landmarks(frame).await {
            Ok(result) => Some(result),
            Err(err) => {
                log_warn!("landmark detection failed on frame {}: {err}", frame.index);
                errors += 1;
                None
            }
        };
        let landmarks_ms = landmarks_started.elapsed().as_millis() as u64;

        let mut mood_ms = None;
        if let Some(result) = landmarks.as_ref() {
            self.gesture.push(estimate_gesture(result));
            self.gaze.push(result.face.as_ref().and_then(estimate_gaze));

            if self.mood_due(now) {
                self.last_mood_at = Some(now);
                let mood_started = Instant::now();
                match self.evaluate_mood(frame, result).await {
                    Ok(mood) => self.mood.push(mood),
                    Err(err) => {
                        log_warn!("mood evaluation failed on frame {}: {err}", frame.index);
                        errors += 1;
                    }
                }
                mood_ms = Some(mood_started.elapsed().as_millis() as u64);
            }
        }

        let observation = self.observation();
        let event = self
            .gate
            .admit(&observation, now)
            .then(|| DetectionEvent::from_observation(&observation, Utc::now()));

        FrameOutcome {
            metrics: FrameMetrics {
                timestamp: frame.captured_at,
                frame_index: frame.index,
                landmarks_ms,
                mood_ms,
                object_dispatched,
                event_logged: event.is_some(),
                total_ms: started.elapsed().as_millis() as u64,
            },
            landmarks,
            event,
            errors,
        }
    }

    /// Current smoothed value of every channel.
    pub fn observation(&self) -> Observation {
        Observation {
            mood: self.mood.majority().flatten(),
            gesture: self
                .gesture
                .majority()
                .flatten()
                .map(|g| g.as_str().to_string()),
            gaze: self.gaze.majority().flatten().map(|g| g.as_str().to_string()),
            objects: self.objects.stable_members(),
        }
    }

    pub fn shutdown(&mut self) {
        self.worker.shutdown();
    }

    fn mood_due(&self, now: Instant) -> bool {
        self.last_mood_at
            .map(|last| now.saturating_duration_since(last) >= self.mood_interval)
            .unwrap_or(true)
    }

    async fn detect_landmarks(&self, frame: &Frame) -> Result<HolisticResult, DetectorError> {
        let detector = self.detectors.landmarks.clone();
        let image = frame.image.clone();
        tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .map_err(|e| DetectorError::Inference(format!("landmark worker join failed: {e}")))?
    }

    async fn evaluate_mood(
        &self,
        frame: &Frame,
        landmarks: &HolisticResult,
    ) -> Result<Option<String>, DetectorError> {
        let Some(classifier) = self.detectors.expressions.clone() else {
            return Ok(landmarks
                .face
                .as_ref()
                .and_then(estimate_mood)
                .map(str::to_string));
        };

        let image = frame.image.clone();
        let face = landmarks.face.clone();
        tokio::task::spawn_blocking(move || classifier.classify(&image, face.as_ref()))
            .await
            .map_err(|e| DetectorError::Inference(format!("expression worker join failed: {e}")))?
    }
}

/// Labels worth logging. The candidate is always in frame, so `person`
/// only counts once a second person shows up.
pub fn foreign_objects(detections: &[DetectedObject], min_score: f32) -> BTreeSet<String> {
    let confident = detections.iter().filter(|d| d.score >= min_score);
    let people = confident.clone().filter(|d| d.label == PERSON_LABEL).count();

    let mut labels: BTreeSet<String> = confident
        .filter(|d| d.label != PERSON_LABEL)
        .map(|d| d.label.clone())
        .collect();
    if people > 1 {
        labels.insert(PERSON_LABEL.to_string());
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{face_mesh, ScriptedBackend, ScriptedFrame};
    use crate::vision::detectors::DetectorBackend;
    use image::RgbImage;

    fn config() -> VisionConfig {
        VisionConfig {
            object_every_n_frames: 1,
            ..VisionConfig::default()
        }
    }

    fn analyzer(backend: &ScriptedBackend, config: &VisionConfig) -> FrameAnalyzer {
        let detectors = backend.load().unwrap();
        let worker = ObjectWorker::spawn(detectors.objects.clone(), config.object_input_size).unwrap();
        FrameAnalyzer::new(detectors, worker, config)
    }

    fn frame(index: u64) -> Frame {
        Frame::new(index, RgbImage::new(64, 48))
    }

    #[test]
    fn single_person_is_not_foreign() {
        let detections = vec![
            DetectedObject::new("person", 0.95),
            DetectedObject::new("cell phone", 0.7),
            DetectedObject::new("book", 0.2),
        ];
        let labels: Vec<_> = foreign_objects(&detections, 0.5).into_iter().collect();
        assert_eq!(labels, vec!["cell phone"]);

        let crowd = vec![
            DetectedObject::new("person", 0.95),
            DetectedObject::new("person", 0.8),
        ];
        let labels: Vec<_> = foreign_objects(&crowd, 0.5).into_iter().collect();
        assert_eq!(labels, vec!["person"]);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_feed_logs_a_single_event() {
        let backend = ScriptedBackend::steady(ScriptedFrame::looking_at_screen());
        let config = config();
        let mut analyzer = analyzer(&backend, &config);

        let start = Instant::now();
        let mut events = Vec::new();
        for i in 0..10 {
            let outcome = analyzer
                .process(&frame(i), start + Duration::from_millis(33 * i))
                .await;
            events.extend(outcome.event);
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].gaze.as_deref(), Some("looking_center"));
        assert_eq!(events[0].mood.as_deref(), Some("neutral"));
        assert_eq!(events[0].gesture.as_deref(), Some("looking_forward"));
    }

    #[tokio::test(start_paused = true)]
    async fn single_frame_misfire_is_smoothed_away() {
        let steady = ScriptedFrame::looking_at_screen();
        let misfire = ScriptedFrame {
            face: Some(face_mesh(0.2, 0.5, 0.0, 0.0)),
            ..steady.clone()
        };
        let backend = ScriptedBackend::sequence(vec![
            steady.clone(),
            steady.clone(),
            steady.clone(),
            misfire,
            steady,
        ]);
        let config = config();
        let mut analyzer = analyzer(&backend, &config);

        let start = Instant::now();
        let mut gazes = Vec::new();
        for i in 0..5 {
            let outcome = analyzer
                .process(&frame(i), start + Duration::from_millis(1_100 * i))
                .await;
            if let Some(event) = outcome.event {
                gazes.push(event.gaze);
            }
        }
        assert_eq!(gazes, vec![Some("looking_center".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn landmark_failure_skips_the_frame() {
        let backend = ScriptedBackend::steady(ScriptedFrame::looking_at_screen()).failing_every(2);
        let config = config();
        let mut analyzer = analyzer(&backend, &config);

        let start = Instant::now();
        let first = analyzer.process(&frame(0), start).await;
        assert_eq!(first.errors, 1);
        assert!(first.landmarks.is_none());
        assert!(first.event.is_none());

        let second = analyzer
            .process(&frame(1), start + Duration::from_millis(40))
            .await;
        assert_eq!(second.errors, 0);
        assert!(second.event.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn mood_runs_at_reduced_cadence() {
        let backend = ScriptedBackend::steady(ScriptedFrame::looking_at_screen());
        let config = config();
        let mut analyzer = analyzer(&backend, &config);

        let start = Instant::now();
        let mut evaluated = 0;
        for i in 0..30 {
            let outcome = analyzer
                .process(&frame(i), start + Duration::from_millis(100 * i))
                .await;
            if outcome.metrics.mood_ms.is_some() {
                evaluated += 1;
            }
        }
        // t = 0, 1.0s, 2.0s
        assert_eq!(evaluated, 3);
    }
}

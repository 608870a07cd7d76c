//! Webcam analysis: camera → per-frame detectors → smoothing → change gate
//! → detection log.

mod analyzer;
mod controller;
mod detectors;
mod events;
mod frame;
mod inference;
pub mod landmarks;
mod loop_worker;
mod media;
mod smoothing;
mod worker;

use std::{future::Future, pin::Pin};

use tokio::sync::broadcast;

pub use analyzer::{foreign_objects, FrameAnalyzer, FrameOutcome};
pub use controller::VisionController;
pub use detectors::{
    DetectedObject, DetectorBackend, DetectorError, Detectors, ExpressionClassifier,
    LandmarkDetector, ObjectDetector,
};
pub use events::{export_file_name, ChangeGate, DetectionEvent, DetectionLog, Observation, SharedLog};
pub use frame::Frame;
pub use inference::{estimate_gaze, estimate_gesture, estimate_mood, Gaze, Gesture};
pub use landmarks::{FaceLandmarks, HolisticResult, Point, PoseLandmarks};
pub use media::{Camera, CameraError, CameraStatus, MediaStream, MediaTrack, OverlaySink, TrackState};
pub use smoothing::SmoothingWindow;
pub use worker::ObjectWorker;

pub type SignalFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A pipeline the session can drive without knowing which detector family
/// sits behind it.
pub trait VisualSignalSource: Send + Sync {
    fn start(&self) -> SignalFuture<'_>;
    fn stop(&self) -> SignalFuture<'_>;
    /// One receiver per listener; lagging receivers skip old events.
    fn subscribe(&self) -> broadcast::Receiver<DetectionEvent>;
    fn status(&self) -> CameraStatus;
    fn detection_log(&self) -> SharedLog;
}

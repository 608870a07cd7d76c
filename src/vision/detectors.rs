//! Model seams. Weights and runtimes live behind these traits; every call
//! is blocking and is run off the async executor by the pipeline.

use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::landmarks::{FaceLandmarks, HolisticResult};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectorError {
    #[error("model failed to load: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("detector worker is gone")]
    WorkerGone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedObject {
    pub label: String,
    pub score: f32,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

pub trait LandmarkDetector: Send + Sync + 'static {
    fn detect(&self, image: &RgbImage) -> Result<HolisticResult, DetectorError>;
}

pub trait ObjectDetector: Send + Sync + 'static {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedObject>, DetectorError>;
}

/// Dedicated expression model. When a backend has none, mood falls back to
/// mouth geometry.
pub trait ExpressionClassifier: Send + Sync + 'static {
    fn classify(
        &self,
        image: &RgbImage,
        face: Option<&FaceLandmarks>,
    ) -> Result<Option<String>, DetectorError>;
}

/// Loaded models for one pipeline run.
#[derive(Clone)]
pub struct Detectors {
    pub landmarks: Arc<dyn LandmarkDetector>,
    pub objects: Arc<dyn ObjectDetector>,
    pub expressions: Option<Arc<dyn ExpressionClassifier>>,
}

/// A family of models selected at composition time. `load` may take
/// seconds (network fetch, runtime init) and is run on a blocking thread.
pub trait DetectorBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn load(&self) -> Result<Detectors, DetectorError>;
}

pub mod config;
pub mod emit;
pub mod guard;
pub mod metrics;
pub mod session;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod utils;
pub mod vision;
pub mod warnings;

pub use config::{ProctorConfig, VisionConfig, WarningLimits};
pub use emit::{ChannelEmitter, Emitter, LogEmitter};
pub use guard::{
    DisqualificationReason, FullscreenError, FullscreenHost, GuardController, GuardPhase,
    GuardState, Navigator,
};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use session::{AssessmentSession, SessionStatus, SessionSummary};
pub use vision::{
    Camera, CameraError, CameraStatus, DetectionEvent, DetectorBackend, VisionController,
    VisualSignalSource,
};
pub use warnings::{WarningCategory, WarningLedger, WarningSnapshot};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timings for one processed frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetrics {
    pub timestamp: DateTime<Utc>,
    pub frame_index: u64,
    pub landmarks_ms: u64,
    /// Present only on frames where mood was evaluated.
    pub mood_ms: Option<u64>,
    pub object_dispatched: bool,
    pub event_logged: bool,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_frames: Vec<FrameMetrics>,
    pub frames_processed: u64,
    pub inference_errors: u64,
    pub object_requests: u64,
    pub events_logged: u64,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            system: SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            },
            recent_frames: Vec::new(),
            frames_processed: 0,
            inference_errors: 0,
            object_requests: 0,
            events_logged: 0,
        }
    }
}

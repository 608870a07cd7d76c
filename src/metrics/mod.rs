mod types;

pub use types::{FrameMetrics, MetricsSnapshot, SystemMetrics};

use std::collections::VecDeque;
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_FRAMES: usize = 20;

/// Per-frame pipeline timings plus process CPU/RAM.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_frames: VecDeque<FrameMetrics>,
    frames_processed: u64,
    inference_errors: u64,
    object_requests: u64,
    events_logged: u64,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes; take the baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_frames: VecDeque::with_capacity(MAX_RECENT_FRAMES),
                frames_processed: 0,
                inference_errors: 0,
                object_requests: 0,
                events_logged: 0,
                system,
                pid,
            })),
        }
    }

    pub async fn record_frame(&self, metrics: FrameMetrics) {
        let mut state = self.inner.lock().await;

        state.frames_processed += 1;
        if metrics.object_dispatched {
            state.object_requests += 1;
        }
        if metrics.event_logged {
            state.events_logged += 1;
        }

        if state.recent_frames.len() == MAX_RECENT_FRAMES {
            state.recent_frames.pop_front();
        }
        state.recent_frames.push_back(metrics);
    }

    pub async fn record_inference_error(&self) {
        self.inner.lock().await.inference_errors += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let pid = state.pid;

        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system_metrics = if let Some(process) = state.system.process(pid) {
            SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            }
        } else {
            SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            }
        };

        MetricsSnapshot {
            system: system_metrics,
            recent_frames: state.recent_frames.iter().cloned().collect(),
            frames_processed: state.frames_processed,
            inference_errors: state.inference_errors,
            object_requests: state.object_requests,
            events_logged: state.events_logged,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        let pid = state.pid;
        state.recent_frames.clear();
        state.frames_processed = 0;
        state.inference_errors = 0;
        state.object_requests = 0;
        state.events_logged = 0;
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

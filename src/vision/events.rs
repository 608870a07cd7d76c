use std::{
    collections::{BTreeSet, VecDeque},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};

/// Smoothed value of every channel at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub mood: Option<String>,
    pub gesture: Option<String>,
    pub gaze: Option<String>,
    pub objects: BTreeSet<String>,
}

/// One forensic log entry. Never mutated once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionEvent {
    /// Local wall-clock time, e.g. `3:04:05 PM`.
    pub time: String,
    /// RFC 3339 / ISO-8601 UTC timestamp.
    pub timestamp: String,
    pub mood: Option<String>,
    pub gesture: Option<String>,
    pub gaze: Option<String>,
    pub objects: Vec<String>,
}

impl DetectionEvent {
    pub fn from_observation(observation: &Observation, at: DateTime<Utc>) -> Self {
        Self {
            time: at.with_timezone(&Local).format("%-I:%M:%S %p").to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            mood: observation.mood.clone(),
            gesture: observation.gesture.clone(),
            gaze: observation.gaze.clone(),
            objects: observation.objects.iter().cloned().collect(),
        }
    }
}

/// The single place that decides whether a new entry is logged: something
/// must differ from the last *logged* observation and the throttle must have
/// elapsed since the last entry.
#[derive(Debug)]
pub struct ChangeGate {
    last_logged: Observation,
    last_emitted_at: Option<Instant>,
    throttle: Duration,
}

impl ChangeGate {
    pub fn new(throttle: Duration) -> Self {
        Self {
            last_logged: Observation::default(),
            last_emitted_at: None,
            throttle,
        }
    }

    /// Returns `true` and records `observation` as logged when it passes.
    pub fn admit(&mut self, observation: &Observation, now: Instant) -> bool {
        if *observation == self.last_logged {
            return false;
        }
        if let Some(last) = self.last_emitted_at {
            if now.saturating_duration_since(last) < self.throttle {
                return false;
            }
        }
        self.last_logged = observation.clone();
        self.last_emitted_at = Some(now);
        true
    }

    pub fn last_logged(&self) -> &Observation {
        &self.last_logged
    }
}

/// Append-only, bounded sequence of detection events.
#[derive(Debug, Clone)]
pub struct DetectionLog {
    events: VecDeque<DetectionEvent>,
    max_entries: usize,
}

impl DetectionLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn push(&mut self, event: DetectionEvent) {
        if self.events.len() == self.max_entries {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> Vec<DetectionEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.events).context("failed to serialise detection log")
    }
}

/// Handle to the pipeline's log, shared with whoever exports it.
#[derive(Clone)]
pub struct SharedLog {
    inner: Arc<Mutex<DetectionLog>>,
}

impl SharedLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DetectionLog::new(max_entries))),
        }
    }

    pub async fn push(&self, event: DetectionEvent) {
        self.inner.lock().await.push(event);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn events(&self) -> Vec<DetectionEvent> {
        self.inner.lock().await.events()
    }

    pub async fn to_json(&self) -> Result<String> {
        self.inner.lock().await.to_json()
    }

    /// Download the log as `detection-logs-<timestamp>.json` into `dir`.
    /// Read-only with respect to the pipeline.
    pub async fn export_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let json = self.to_json().await?;
        let path = dir.join(export_file_name(Utc::now()));
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write detection log to {}", path.display()))?;
        Ok(path)
    }
}

/// `detection-logs-2026-10-16T09-30-00.000Z.json`
pub fn export_file_name(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    format!("detection-logs-{stamp}.json")
}

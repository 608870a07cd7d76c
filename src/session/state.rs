use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{guard::DisqualificationReason, warnings::WarningSnapshot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Running,
    Completed,
    Disqualified,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: String,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: SessionStatus::Idle,
            started_at: None,
            stopped_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Disqualified
        )
    }

    /// Wall-clock length of the attempt so far, or in total once stopped.
    pub fn duration_ms(&self) -> i64 {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => (stop - start).num_milliseconds().max(0),
            (Some(start), None) => (Utc::now() - start).num_milliseconds().max(0),
            _ => 0,
        }
    }
}

/// What the assessment shell reports once the attempt is over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub warnings: WarningSnapshot,
    pub disqualification: Option<DisqualificationReason>,
    pub detection_events: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn duration_uses_stop_time_once_finished() {
        let mut state = SessionState::new("s".into());
        assert_eq!(state.duration_ms(), 0);

        let start = Utc::now();
        state.started_at = Some(start);
        state.stopped_at = Some(start + Duration::milliseconds(1_500));
        state.status = SessionStatus::Completed;
        assert_eq!(state.duration_ms(), 1_500);
        assert!(state.is_finished());
    }

    #[test]
    fn status_serialises_camel_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Disqualified).unwrap(),
            "\"disqualified\""
        );
    }
}

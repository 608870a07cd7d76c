use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    config::ProctorConfig,
    emit::Emitter,
    guard::{DisqualificationReason, FullscreenHost, GuardController, GuardPhase, Navigator},
    vision::VisualSignalSource,
    warnings::WarningLedger,
};

use super::state::{SessionState, SessionStatus, SessionSummary};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// One assessment attempt. Owns the warning ledger, the guard bound to it
/// and, optionally, a visual signal pipeline; `start` and `stop` drive all
/// of them together.
#[derive(Clone)]
pub struct AssessmentSession {
    state: Arc<Mutex<SessionState>>,
    ledger: WarningLedger,
    guard: GuardController,
    vision: Arc<Mutex<Option<Arc<dyn VisualSignalSource>>>>,
}

impl AssessmentSession {
    pub fn new(
        config: &ProctorConfig,
        host: Arc<dyn FullscreenHost>,
        navigator: Arc<dyn Navigator>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        let ledger = WarningLedger::new(config.limits);
        let guard = GuardController::new(config, ledger.clone(), host, navigator, emitter);
        Self {
            state: Arc::new(Mutex::new(SessionState::new(Uuid::new_v4().to_string()))),
            ledger,
            guard,
            vision: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn id(&self) -> String {
        self.state.lock().await.id.clone()
    }

    pub async fn get_state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub fn ledger(&self) -> &WarningLedger {
        &self.ledger
    }

    pub fn guard(&self) -> &GuardController {
        &self.guard
    }

    /// Binds a pipeline to this attempt. Attaching while running starts it
    /// straight away; a previously attached pipeline is stopped first.
    pub async fn attach_vision(&self, source: Arc<dyn VisualSignalSource>) {
        let running = self.state.lock().await.status == SessionStatus::Running;
        let previous = self.vision.lock().await.replace(source.clone());
        if let Some(previous) = previous {
            previous.stop().await;
        }
        if running {
            source.start().await;
        }
    }

    pub async fn start(&self) -> Result<()> {
        let id = {
            let mut state = self.state.lock().await;
            if state.status != SessionStatus::Idle {
                bail!("session {} already started", state.id);
            }
            state.status = SessionStatus::Running;
            state.started_at = Some(Utc::now());
            state.id.clone()
        };

        self.ledger.reset_warnings();
        self.guard.mount().await;

        let vision = self.vision.lock().await.clone();
        if let Some(vision) = vision {
            vision.start().await;
        }

        log_info!("assessment session {id} started");
        Ok(())
    }

    /// Entry point for the audio monitor. Returns the new count.
    pub async fn report_audio_warning(&self) -> Result<u32> {
        if self.state.lock().await.status != SessionStatus::Running {
            bail!("audio warning reported outside a running session");
        }
        Ok(self.ledger.increment_audio_warning())
    }

    /// The shell's termination check: a limit is over, or the guard already
    /// sent the candidate away.
    pub async fn should_terminate(&self) -> bool {
        self.ledger.has_exceeded_limits() || self.guard.get_state().await.is_terminal()
    }

    pub async fn disqualification(&self) -> Option<DisqualificationReason> {
        match self.guard.get_state().await.phase {
            GuardPhase::Disqualifying { reason } => Some(reason),
            _ => None,
        }
    }

    /// Tears down the guard and the pipeline. Stopping twice returns the same
    /// summary.
    pub async fn stop(&self) -> Result<SessionSummary> {
        let (id, status) = {
            let state = self.state.lock().await;
            (state.id.clone(), state.status)
        };
        match status {
            SessionStatus::Idle => bail!("session {id} was never started"),
            SessionStatus::Completed | SessionStatus::Disqualified => {
                return Ok(self.summary().await);
            }
            SessionStatus::Running => {}
        }

        self.guard.unmount().await;
        let vision = self.vision.lock().await.clone();
        if let Some(vision) = vision {
            vision.stop().await;
        }

        let disqualification = self.disqualification().await;
        {
            let mut state = self.state.lock().await;
            state.stopped_at = Some(Utc::now());
            state.status = if disqualification.is_some() {
                SessionStatus::Disqualified
            } else {
                SessionStatus::Completed
            };
        }

        match disqualification {
            Some(reason) => log_warn!("session stopped after disqualification: {}", reason.as_str()),
            None => log_info!("session completed"),
        }
        Ok(self.summary().await)
    }

    pub async fn summary(&self) -> SessionSummary {
        let state = self.state.lock().await.clone();
        let vision = self.vision.lock().await.clone();
        let detection_events = match vision {
            Some(vision) => vision.detection_log().len().await,
            None => 0,
        };

        SessionSummary {
            duration_ms: state.duration_ms(),
            id: state.id,
            status: state.status,
            started_at: state.started_at,
            stopped_at: state.stopped_at,
            warnings: self.ledger.get_warning_state(),
            disqualification: self.disqualification().await,
            detection_events,
        }
    }
}

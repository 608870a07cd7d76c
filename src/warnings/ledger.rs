use std::sync::Arc;

use tokio::sync::watch;

use crate::config::WarningLimits;

use super::state::{WarningCategory, WarningSnapshot, WarningState};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Violation counters for exactly one assessment attempt.
///
/// The state lives inside a `watch` channel: every mutation goes through
/// `send_modify`, so the increment and the observer notification happen as
/// one step and no subscriber ever sees a half-applied update.
#[derive(Clone)]
pub struct WarningLedger {
    tx: Arc<watch::Sender<WarningState>>,
}

impl WarningLedger {
    pub fn new(limits: WarningLimits) -> Self {
        let (tx, _rx) = watch::channel(WarningState::new(limits));
        Self { tx: Arc::new(tx) }
    }

    pub fn increment_tab_switch(&self) -> u32 {
        self.increment(WarningCategory::TabSwitch)
    }

    pub fn increment_fullscreen_exit(&self) -> u32 {
        self.increment(WarningCategory::FullscreenExit)
    }

    pub fn increment_audio_warning(&self) -> u32 {
        self.increment(WarningCategory::AudioWarning)
    }

    /// Returns the new count for `category`.
    pub fn increment(&self, category: WarningCategory) -> u32 {
        let mut count = 0;
        self.tx.send_modify(|state| {
            count = state.increment(category);
        });

        let limit = self.tx.borrow().limit(category);
        if count > limit {
            log_warn!(
                "{} count {} exceeds limit {}",
                category.as_str(),
                count,
                limit
            );
        } else {
            log_info!("{} warning {}/{}", category.as_str(), count, limit);
        }
        count
    }

    pub fn has_exceeded_limits(&self) -> bool {
        self.tx.borrow().has_exceeded_limits()
    }

    pub fn get_exceeded_warnings(&self) -> Vec<WarningCategory> {
        self.tx.borrow().exceeded_categories()
    }

    pub fn get_warning_state(&self) -> WarningSnapshot {
        self.tx.borrow().snapshot()
    }

    pub fn state(&self) -> WarningState {
        self.tx.borrow().clone()
    }

    /// Zeroes all three counters. Only meant for the start of a fresh attempt.
    pub fn reset_warnings(&self) {
        self.tx.send_modify(WarningState::reset);
        log_info!("warning counters reset");
    }

    /// Observers are woken after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<WarningState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> WarningLedger {
        WarningLedger::new(WarningLimits {
            tab_switch: 2,
            fullscreen_exit: 1,
            audio_warning: 5,
        })
    }

    #[test]
    fn counters_track_increments_until_reset() {
        let ledger = ledger();
        for n in 1..=7 {
            assert_eq!(ledger.increment_tab_switch(), n);
        }
        for n in 1..=3 {
            assert_eq!(ledger.increment_audio_warning(), n);
        }

        let state = ledger.state();
        assert_eq!(state.tab_switch_count, 7);
        assert_eq!(state.fullscreen_exit_count, 0);
        assert_eq!(state.audio_warning_count, 3);

        ledger.reset_warnings();
        let state = ledger.state();
        assert_eq!(
            (
                state.tab_switch_count,
                state.fullscreen_exit_count,
                state.audio_warning_count
            ),
            (0, 0, 0)
        );
        assert!(!ledger.has_exceeded_limits());
    }

    #[test]
    fn exceeded_warnings_follow_fixed_order() {
        let ledger = ledger();
        ledger.increment_fullscreen_exit();
        ledger.increment_fullscreen_exit();
        (0..3).for_each(|_| {
            ledger.increment_tab_switch();
        });

        assert!(ledger.has_exceeded_limits());
        assert_eq!(
            ledger.get_exceeded_warnings(),
            vec![WarningCategory::TabSwitch, WarningCategory::FullscreenExit]
        );
        let snapshot = ledger.get_warning_state();
        assert!(snapshot.tab_switch.exceeded);
        assert!(!snapshot.audio_warning.exceeded);
        assert_eq!(snapshot.fullscreen_exit.max_allowed, 1);
    }

    #[tokio::test]
    async fn subscribers_see_every_mutation() {
        let ledger = ledger();
        let mut rx = ledger.subscribe();

        ledger.increment_audio_warning();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().audio_warning_count, 1);

        ledger.reset_warnings();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().audio_warning_count, 0);
    }

    #[test]
    fn clones_share_one_ledger() {
        let ledger = ledger();
        let shell_view = ledger.clone();
        ledger.increment_tab_switch();
        assert_eq!(shell_view.get_warning_state().tab_switch.count, 1);
    }
}

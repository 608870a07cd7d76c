use serde::{Deserialize, Serialize};

use super::{focus::FocusState, navigation::DisqualificationReason};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "phase")]
pub enum GuardPhase {
    /// Fullscreen and focused.
    Protected,
    /// Out of fullscreen with a countdown running.
    #[serde(rename_all = "camelCase")]
    Warned { remaining_secs: u32 },
    /// Navigation issued. Terminal.
    Disqualifying { reason: DisqualificationReason },
}

impl Default for GuardPhase {
    fn default() -> Self {
        GuardPhase::Protected
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BannerKind {
    FullscreenExited,
    FullscreenBlocked,
    TabSwitch,
}

/// Text shown to the candidate for the current violation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WarningBanner {
    pub kind: BannerKind,
    pub message: String,
    /// Cause reported by the browser when a fullscreen request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub countdown_secs: Option<u32>,
    pub show_return_button: bool,
}

impl WarningBanner {
    pub fn fullscreen_exited(remaining_secs: u32) -> Self {
        Self::countdown(BannerKind::FullscreenExited, None, remaining_secs)
    }

    pub fn fullscreen_blocked(detail: &str, remaining_secs: u32) -> Self {
        Self::countdown(
            BannerKind::FullscreenBlocked,
            Some(detail.to_string()),
            remaining_secs,
        )
    }

    pub fn tab_switch(count: u32, limit: u32) -> Self {
        Self {
            kind: BannerKind::TabSwitch,
            message: format!(
                "Switching tabs or windows is not allowed. Warning {count} of {limit}."
            ),
            detail: None,
            countdown_secs: None,
            show_return_button: false,
        }
    }

    fn countdown(kind: BannerKind, detail: Option<String>, remaining_secs: u32) -> Self {
        let mut banner = Self {
            kind,
            message: String::new(),
            detail,
            countdown_secs: Some(remaining_secs),
            show_return_button: true,
        };
        banner.render();
        banner
    }

    pub(crate) fn tick(&mut self, remaining_secs: u32) {
        if self.countdown_secs.is_some() {
            self.countdown_secs = Some(remaining_secs);
            self.render();
        }
    }

    fn render(&mut self) {
        let remaining = self.countdown_secs.unwrap_or_default();
        self.message = match (self.kind, self.detail.as_deref()) {
            (BannerKind::FullscreenBlocked, Some(detail)) => format!(
                "{detail} You will be disqualified in {remaining} seconds if fullscreen is not restored."
            ),
            (BannerKind::TabSwitch, _) => return,
            _ => format!(
                "You have exited fullscreen mode. Return to fullscreen within {remaining} seconds or you will be disqualified."
            ),
        };
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuardState {
    pub phase: GuardPhase,
    pub focus: FocusState,
    pub banner: Option<WarningBanner>,
    pub countdown_total_secs: u32,
    /// Bumped whenever a countdown starts or is cancelled; a ticker only acts
    /// while its epoch is current.
    #[serde(skip)]
    pub countdown_epoch: u64,
}

impl GuardState {
    pub fn new(countdown_total_secs: u32) -> Self {
        Self {
            countdown_total_secs,
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, GuardPhase::Disqualifying { .. })
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        match self.phase {
            GuardPhase::Warned { remaining_secs } => Some(remaining_secs),
            _ => None,
        }
    }

    /// Enters `Warned` with a full countdown. Returns the new epoch.
    pub fn begin_countdown(&mut self, banner: WarningBanner) -> u64 {
        self.countdown_epoch = self.countdown_epoch.wrapping_add(1);
        self.phase = GuardPhase::Warned {
            remaining_secs: self.countdown_total_secs,
        };
        self.banner = Some(banner);
        self.countdown_epoch
    }

    pub fn cancel_countdown(&mut self) {
        self.countdown_epoch = self.countdown_epoch.wrapping_add(1);
        if matches!(self.phase, GuardPhase::Warned { .. }) {
            self.phase = GuardPhase::Protected;
            self.banner = None;
        }
    }

    /// One second elapsed for countdown `epoch`. Returns the remaining
    /// seconds, or `None` when the tick is stale.
    pub fn tick(&mut self, epoch: u64) -> Option<u32> {
        if epoch != self.countdown_epoch {
            return None;
        }
        let GuardPhase::Warned { remaining_secs } = &mut self.phase else {
            return None;
        };
        *remaining_secs = remaining_secs.saturating_sub(1);
        let remaining = *remaining_secs;
        if let Some(banner) = self.banner.as_mut() {
            banner.tick(remaining);
        }
        Some(remaining)
    }

    pub fn disqualify(&mut self, reason: DisqualificationReason) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.countdown_epoch = self.countdown_epoch.wrapping_add(1);
        self.phase = GuardPhase::Disqualifying { reason };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_epoch_ticks_are_ignored() {
        let mut state = GuardState::new(3);
        let first = state.begin_countdown(WarningBanner::fullscreen_exited(3));
        state.cancel_countdown();
        let second = state.begin_countdown(WarningBanner::fullscreen_exited(3));

        assert_eq!(state.tick(first), None);
        assert_eq!(state.tick(second), Some(2));
        assert_eq!(state.remaining_secs(), Some(2));
    }

    #[test]
    fn cancel_restores_full_countdown_for_next_exit() {
        let mut state = GuardState::new(10);
        let epoch = state.begin_countdown(WarningBanner::fullscreen_exited(10));
        state.tick(epoch);
        state.tick(epoch);
        state.cancel_countdown();
        assert_eq!(state.phase, GuardPhase::Protected);
        assert!(state.banner.is_none());

        state.begin_countdown(WarningBanner::fullscreen_exited(10));
        assert_eq!(state.remaining_secs(), Some(10));
    }

    #[test]
    fn banner_tracks_countdown() {
        let mut state = GuardState::new(5);
        let epoch = state.begin_countdown(WarningBanner::fullscreen_exited(5));
        state.tick(epoch);
        let banner = state.banner.clone().unwrap();
        assert_eq!(banner.countdown_secs, Some(4));
        assert!(banner.message.contains("within 4 seconds"));
    }

    #[test]
    fn blocked_banner_keeps_detail_across_ticks() {
        let mut banner = WarningBanner::fullscreen_blocked("Fullscreen was blocked.", 10);
        banner.tick(9);
        assert!(banner.message.starts_with("Fullscreen was blocked."));
        assert!(banner.message.contains("in 9 seconds"));
    }

    #[test]
    fn disqualify_happens_once() {
        let mut state = GuardState::new(10);
        assert!(state.disqualify(DisqualificationReason::LeftFullscreen));
        assert!(!state.disqualify(DisqualificationReason::MultipleTabSwitches));
        assert_eq!(
            state.phase,
            GuardPhase::Disqualifying {
                reason: DisqualificationReason::LeftFullscreen
            }
        );
    }
}

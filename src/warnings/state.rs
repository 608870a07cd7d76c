use serde::{Deserialize, Serialize};

use crate::config::WarningLimits;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    TabSwitch,
    FullscreenExit,
    AudioWarning,
}

impl WarningCategory {
    /// Fixed reporting order; "first exceeded" means first in this list.
    pub const ALL: [WarningCategory; 3] = [
        WarningCategory::TabSwitch,
        WarningCategory::FullscreenExit,
        WarningCategory::AudioWarning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCategory::TabSwitch => "tab_switch",
            WarningCategory::FullscreenExit => "fullscreen_exit",
            WarningCategory::AudioWarning => "audio_warning",
        }
    }
}

/// Counters for one assessment attempt. Counts only grow until `reset`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WarningState {
    pub tab_switch_count: u32,
    pub fullscreen_exit_count: u32,
    pub audio_warning_count: u32,
    pub limits: WarningLimits,
}

impl WarningState {
    pub fn new(limits: WarningLimits) -> Self {
        Self {
            tab_switch_count: 0,
            fullscreen_exit_count: 0,
            audio_warning_count: 0,
            limits,
        }
    }

    pub fn count(&self, category: WarningCategory) -> u32 {
        match category {
            WarningCategory::TabSwitch => self.tab_switch_count,
            WarningCategory::FullscreenExit => self.fullscreen_exit_count,
            WarningCategory::AudioWarning => self.audio_warning_count,
        }
    }

    pub fn limit(&self, category: WarningCategory) -> u32 {
        match category {
            WarningCategory::TabSwitch => self.limits.tab_switch,
            WarningCategory::FullscreenExit => self.limits.fullscreen_exit,
            WarningCategory::AudioWarning => self.limits.audio_warning,
        }
    }

    pub(crate) fn increment(&mut self, category: WarningCategory) -> u32 {
        let slot = match category {
            WarningCategory::TabSwitch => &mut self.tab_switch_count,
            WarningCategory::FullscreenExit => &mut self.fullscreen_exit_count,
            WarningCategory::AudioWarning => &mut self.audio_warning_count,
        };
        *slot = slot.saturating_add(1);
        *slot
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.limits);
    }

    pub fn is_exceeded(&self, category: WarningCategory) -> bool {
        self.count(category) > self.limit(category)
    }

    pub fn has_exceeded_limits(&self) -> bool {
        WarningCategory::ALL.iter().any(|c| self.is_exceeded(*c))
    }

    pub fn exceeded_categories(&self) -> Vec<WarningCategory> {
        WarningCategory::ALL
            .into_iter()
            .filter(|c| self.is_exceeded(*c))
            .collect()
    }

    pub fn snapshot(&self) -> WarningSnapshot {
        let status = |category| CategoryStatus {
            count: self.count(category),
            max_allowed: self.limit(category),
            exceeded: self.is_exceeded(category),
        };
        WarningSnapshot {
            tab_switch: status(WarningCategory::TabSwitch),
            fullscreen_exit: status(WarningCategory::FullscreenExit),
            audio_warning: status(WarningCategory::AudioWarning),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatus {
    pub count: u32,
    pub max_allowed: u32,
    pub exceeded: bool,
}

/// Display snapshot, keyed by category tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WarningSnapshot {
    pub tab_switch: CategoryStatus,
    pub fullscreen_exit: CategoryStatus,
    pub audio_warning: CategoryStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(tab: u32, fs: u32, audio: u32) -> WarningLimits {
        WarningLimits {
            tab_switch: tab,
            fullscreen_exit: fs,
            audio_warning: audio,
        }
    }

    #[test]
    fn reaching_the_limit_is_not_exceeding_it() {
        let mut state = WarningState::new(limits(2, 2, 2));
        state.increment(WarningCategory::TabSwitch);
        state.increment(WarningCategory::TabSwitch);
        assert!(!state.has_exceeded_limits());

        state.increment(WarningCategory::TabSwitch);
        assert!(state.has_exceeded_limits());
        assert_eq!(state.exceeded_categories(), vec![WarningCategory::TabSwitch]);
    }

    #[test]
    fn exceeded_categories_match_predicate_for_every_combination() {
        for tab in 0..3 {
            for fs in 0..3 {
                for audio in 0..3 {
                    let mut state = WarningState::new(limits(1, 1, 1));
                    (0..tab).for_each(|_| {
                        state.increment(WarningCategory::TabSwitch);
                    });
                    (0..fs).for_each(|_| {
                        state.increment(WarningCategory::FullscreenExit);
                    });
                    (0..audio).for_each(|_| {
                        state.increment(WarningCategory::AudioWarning);
                    });

                    let expected: Vec<_> = [(tab, WarningCategory::TabSwitch),
                        (fs, WarningCategory::FullscreenExit),
                        (audio, WarningCategory::AudioWarning)]
                    .into_iter()
                    .filter(|(n, _)| *n > 1)
                    .map(|(_, c)| c)
                    .collect();

                    assert_eq!(state.exceeded_categories(), expected);
                    assert_eq!(state.has_exceeded_limits(), !expected.is_empty());
                }
            }
        }
    }

    #[test]
    fn reset_keeps_limits() {
        let mut state = WarningState::new(limits(1, 2, 3));
        state.increment(WarningCategory::AudioWarning);
        state.reset();
        assert_eq!(state, WarningState::new(limits(1, 2, 3)));
    }

    #[test]
    fn snapshot_serialises_with_category_tags() {
        let mut state = WarningState::new(limits(1, 1, 1));
        state.increment(WarningCategory::FullscreenExit);
        state.increment(WarningCategory::FullscreenExit);
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["fullscreen_exit"]["count"], 2);
        assert_eq!(json["fullscreen_exit"]["maxAllowed"], 1);
        assert_eq!(json["fullscreen_exit"]["exceeded"], true);
        assert_eq!(json["tab_switch"]["exceeded"], false);
    }
}

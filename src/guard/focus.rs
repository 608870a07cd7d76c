use serde::{Deserialize, Serialize};

/// Debounce for tab-switch detection.
///
/// A single switch-away fires both `blur` and `visibilitychange`; only the
/// first one counts. Counting resumes after the window gets focus back.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FocusState {
    #[default]
    Idle,
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusSignal {
    Blur,
    Hidden,
    Visible,
    Focus,
}

impl FocusState {
    /// Applies `signal` and returns whether a tab switch should be counted.
    pub fn apply(&mut self, signal: FocusSignal) -> bool {
        match (*self, signal) {
            (FocusState::Idle, FocusSignal::Blur | FocusSignal::Hidden) => {
                *self = FocusState::Suppressed;
                true
            }
            (_, FocusSignal::Focus) => {
                *self = FocusState::Idle;
                false
            }
            _ => false,
        }
    }
}

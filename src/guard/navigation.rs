use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::warnings::WarningCategory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisqualificationReason {
    LeftFullscreen,
    MultipleTabSwitches,
    MultipleFullscreenExits,
    MultipleAudioWarnings,
}

impl DisqualificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisqualificationReason::LeftFullscreen => "left_fullscreen",
            DisqualificationReason::MultipleTabSwitches => "multiple_tab_switches",
            DisqualificationReason::MultipleFullscreenExits => "multiple_fullscreen_exits",
            DisqualificationReason::MultipleAudioWarnings => "multiple_audio_warnings",
        }
    }

    pub fn for_category(category: WarningCategory) -> Self {
        match category {
            WarningCategory::TabSwitch => DisqualificationReason::MultipleTabSwitches,
            WarningCategory::FullscreenExit => DisqualificationReason::MultipleFullscreenExits,
            WarningCategory::AudioWarning => DisqualificationReason::MultipleAudioWarnings,
        }
    }

    /// `/disqualified` + reason -> `/disqualified?reason=left_fullscreen`.
    pub fn route(&self, base: &str) -> String {
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}reason={}", self.as_str())
    }
}

/// Client-side redirect issued by the guard. Terminal: called at most once
/// per session.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, route: &str);
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FullscreenError {
    #[error("fullscreen request was denied: {0}")]
    Denied(String),
    #[error("fullscreen is not supported in this browser")]
    Unsupported,
}

impl FullscreenError {
    pub fn user_message(&self) -> &'static str {
        match self {
            FullscreenError::Denied(_) => {
                "Fullscreen was blocked. Click \"Return to fullscreen\" to try again."
            }
            FullscreenError::Unsupported => {
                "This browser cannot enter fullscreen. Please switch to a supported browser."
            }
        }
    }
}

pub trait FullscreenHost: Send + Sync + 'static {
    fn request_fullscreen(&self) -> Result<(), FullscreenError>;
    fn is_fullscreen(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_carries_reason_query() {
        assert_eq!(
            DisqualificationReason::LeftFullscreen.route("/disqualified"),
            "/disqualified?reason=left_fullscreen"
        );
        assert_eq!(
            DisqualificationReason::MultipleTabSwitches.route("/exam/done?round=2"),
            "/exam/done?round=2&reason=multiple_tab_switches"
        );
    }

    #[test]
    fn categories_map_to_reasons() {
        assert_eq!(
            DisqualificationReason::for_category(WarningCategory::FullscreenExit).as_str(),
            "multiple_fullscreen_exits"
        );
        assert_eq!(
            serde_json::to_value(DisqualificationReason::for_category(WarningCategory::AudioWarning))
                .unwrap(),
            "multiple_audio_warnings"
        );
    }
}

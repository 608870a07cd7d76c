pub mod controller;
pub mod focus;
pub mod navigation;
pub mod state;

pub use controller::GuardController;
pub use focus::FocusState;
pub use navigation::{DisqualificationReason, FullscreenError, FullscreenHost, Navigator};
pub use state::{BannerKind, GuardPhase, GuardState, WarningBanner};

pub mod controller;
pub mod state;

pub use controller::AssessmentSession;
pub use state::{SessionState, SessionStatus, SessionSummary};

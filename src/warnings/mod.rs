pub mod ledger;
pub mod state;

pub use ledger::WarningLedger;
pub use state::{CategoryStatus, WarningCategory, WarningSnapshot, WarningState};

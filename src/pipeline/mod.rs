pub mod orchestrator;
pub mod state;

pub use orchestrator::{ScanExecutor, ScanOrchestrator};
pub use state::{ReplayOutput, ScanAccumulator, ScanPlan};

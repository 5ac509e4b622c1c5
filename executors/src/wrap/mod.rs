pub mod builder;
pub mod cancel;
pub mod cycle;
pub mod error;
pub mod finality;
pub mod gas;
pub mod rebalance;
pub mod settings;
pub mod submit;

pub use error::{AttemptContext, CycleError, FailureClass};
pub use rebalance::{CycleReport, LoopState, LoopSummary, RebalanceLoop, Resolution};
pub use settings::WrapSettings;

//! Message pipeline: processing, dispatch and outcome counters.

pub mod controller;
pub mod processor;
pub mod stats;

pub use controller::{ControllerOptions, ControllerState, IngestionController};
pub use processor::{MalformedPolicy, MessageProcessor, ProcessOutcome};
pub use stats::{PipelineStats, StatsSnapshot};

pub mod accumulator;
pub mod args;
pub mod enumerate;
pub mod error;
pub mod fetch;
pub mod process;
pub mod quantity;
pub mod report;
pub mod retry;
pub mod run;
pub mod status;
pub mod telemetry;

pub use accumulator::{AccumulatorStore, Metric, ResourceTotals};
pub use enumerate::{CommandEnumerator, KubeEnumerator, NodeEnumerator};
pub use error::StatusError;
pub use fetch::{KubeFetcher, ScriptFetcher, StatusFetcher};
pub use report::{OutputFormat, Report, Reporter};
pub use run::{aggregate, RunOptions};
pub use status::NodeStatus;

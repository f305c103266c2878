use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::process::CommandSpec;
use crate::report::OutputFormat;
use crate::retry::RetryConfig;
use crate::run::RunOptions;

pub const DEFAULT_STATUS_SCRIPT: &str = "get-node-resource-status.sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NodeSource {
    /// Run a listing command (`kubectl get node` by default)
    Command,
    /// Query the Kubernetes API directly
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusSource {
    /// Run the per-node status script
    Script,
    /// Compute from pod requests and metrics.k8s.io
    Api,
}

#[derive(Debug, Parser)]
#[command(name = "cluster-resource-status")]
#[command(about = "Total reserved and used CPU/memory across cluster nodes", long_about = None)]
pub struct Args {
    /// Directory holding the accumulator files and the node list
    #[arg(long, env = "CLUSTER_STATUS_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Where node names come from
    #[arg(long, env = "CLUSTER_STATUS_NODES_FROM", value_enum, default_value_t = NodeSource::Command)]
    pub nodes_from: NodeSource,

    /// Node listing program; its first output line is a header
    #[arg(long, env = "CLUSTER_STATUS_LIST_NODES_CMD", default_value = "kubectl")]
    pub list_nodes_cmd: PathBuf,

    /// Arguments for the node listing program (repeatable; comma-separated in the env var)
    #[arg(
        long = "list-nodes-arg",
        env = "CLUSTER_STATUS_LIST_NODES_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_values = ["get", "node"]
    )]
    pub list_nodes_args: Vec<String>,

    /// Where per-node figures come from
    #[arg(long, env = "CLUSTER_STATUS_STATUS_FROM", value_enum, default_value_t = StatusSource::Script)]
    pub status_from: StatusSource,

    /// Per-node status script [default: <workdir>/get-node-resource-status.sh]
    #[arg(long, env = "CLUSTER_STATUS_SCRIPT")]
    pub status_script: Option<PathBuf>,

    /// Arguments placed before the node name (repeatable; comma-separated in the env var)
    #[arg(
        long = "status-arg",
        env = "CLUSTER_STATUS_SCRIPT_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true
    )]
    pub status_args: Vec<String>,

    /// Per-call timeout for the listing and each node fetch
    #[arg(
        long,
        env = "CLUSTER_STATUS_TIMEOUT_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    /// Extra attempts for a failed listing or node fetch
    #[arg(long, env = "CLUSTER_STATUS_RETRIES", default_value_t = 0)]
    pub retries: u32,

    /// Delay before the first retry, doubled on each further attempt
    #[arg(long, env = "CLUSTER_STATUS_RETRY_DELAY_MS", default_value_t = 500)]
    pub retry_delay_ms: u64,

    /// Warn and skip nodes whose status cannot be fetched
    #[arg(long, env = "CLUSTER_STATUS_SKIP_FAILED")]
    pub skip_failed: bool,

    /// Print one line per node before the totals
    #[arg(long, env = "CLUSTER_STATUS_PER_NODE")]
    pub per_node: bool,

    #[arg(long, env = "CLUSTER_STATUS_OUTPUT", value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Leave the accumulator files in place after reporting
    #[arg(long, env = "CLUSTER_STATUS_KEEP_STATE")]
    pub keep_state: bool,
}

impl Args {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn list_nodes_command(&self) -> CommandSpec {
        CommandSpec::new(&self.list_nodes_cmd).args(&self.list_nodes_args)
    }

    pub fn status_command(&self) -> CommandSpec {
        let script = self
            .status_script
            .clone()
            .unwrap_or_else(|| self.workdir.join(DEFAULT_STATUS_SCRIPT));
        CommandSpec::new(script).args(&self.status_args)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            retry: RetryConfig::new(self.retries, Duration::from_millis(self.retry_delay_ms)),
            skip_failed: self.skip_failed,
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;

use cluster_resource_status::args::{Args, NodeSource, StatusSource};
use cluster_resource_status::telemetry::init_tracing;
use cluster_resource_status::{
    aggregate, AccumulatorStore, CommandEnumerator, KubeEnumerator, KubeFetcher, NodeEnumerator,
    Reporter, ScriptFetcher, StatusFetcher,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let timeout = args.timeout();
    let client = if args.nodes_from == NodeSource::Api || args.status_from == StatusSource::Api {
        Some(
            Client::try_default()
                .await
                .context("cannot build a Kubernetes client from kubeconfig or cluster env")?,
        )
    } else {
        None
    };

    let enumerator: Box<dyn NodeEnumerator> = match (args.nodes_from, &client) {
        (NodeSource::Api, Some(client)) => Box::new(KubeEnumerator::new(client.clone(), timeout)),
        _ => Box::new(CommandEnumerator::new(args.list_nodes_command(), timeout)),
    };
    let fetcher: Box<dyn StatusFetcher> = match (args.status_from, &client) {
        (StatusSource::Api, Some(client)) => Box::new(KubeFetcher::new(client.clone(), timeout)),
        _ => Box::new(ScriptFetcher::new(args.status_command(), timeout)),
    };

    let store = AccumulatorStore::new(&args.workdir);
    let report = aggregate(
        enumerator.as_ref(),
        fetcher.as_ref(),
        &store,
        &args.run_options(),
    )
    .await
    .context("aggregation aborted")?;

    let reporter = Reporter {
        format: args.output,
        per_node: args.per_node,
        keep_state: args.keep_state,
    };
    reporter
        .publish(&report, &store, &mut std::io::stdout())
        .await
        .context("reporting totals")?;

    Ok(())
}

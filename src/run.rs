use tracing::{info, info_span, warn, Instrument};

use crate::accumulator::AccumulatorStore;
use crate::enumerate::NodeEnumerator;
use crate::error::Result;
use crate::fetch::StatusFetcher;
use crate::report::{NodeReport, Report, SkippedNode};
use crate::retry::{retry, RetryConfig};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub retry: RetryConfig,
    /// Warn and continue on a failed node instead of aborting the run.
    pub skip_failed: bool,
}

/// Enumerate the cluster's nodes, then fetch and total each one in listing order.
///
/// Totals are kept in memory and mirrored to the accumulator files after
/// every node, so an aborted run leaves its partial sums on disk. Stale
/// files from an earlier aborted run are cleared before the first node.
pub async fn aggregate(
    enumerator: &dyn NodeEnumerator,
    fetcher: &dyn StatusFetcher,
    store: &AccumulatorStore,
    opts: &RunOptions,
) -> Result<Report> {
    match store.load().await {
        Ok(stale) if !stale.is_zero() => {
            warn!(dir = %store.dir().display(), ?stale, "discarding totals left by an unfinished run")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "discarding unreadable accumulator state"),
    }
    store.reset().await?;

    let source = enumerator.describe();
    let nodes = retry(&opts.retry, &source, || enumerator.list_nodes()).await?;
    info!(count = nodes.len(), %source, "enumerated nodes");
    store.write_node_list(&nodes).await?;

    let mut report = Report::default();

    for node in nodes {
        let span = info_span!("node", node = %node);
        let fetched = retry(&opts.retry, &node, || fetcher.fetch(&node))
            .instrument(span.clone())
            .await;

        let status = match fetched {
            Ok(status) => status,
            Err(e) if opts.skip_failed && e.is_transient() => {
                span.in_scope(|| warn!(error = %e, "skipping node"));
                report.skipped.push(SkippedNode {
                    name: node,
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        report.totals.add(&status);
        store.record(&status).instrument(span).await?;
        report.nodes.push(NodeReport { name: node, status });
    }

    info!(
        nodes = report.nodes.len(),
        skipped = report.skipped.len(),
        totals = ?report.totals,
        "aggregation complete"
    );
    Ok(report)
}

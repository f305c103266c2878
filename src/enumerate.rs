use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Api, ListParams, ResourceExt},
    Client,
};
use tracing::debug;

use crate::error::{Result, StatusError};
use crate::process::CommandSpec;

/// Source of the cluster's node names, in control-plane listing order.
#[async_trait]
pub trait NodeEnumerator: Send + Sync {
    fn describe(&self) -> String;

    async fn list_nodes(&self) -> Result<Vec<String>>;
}

/// Extract node names from `kubectl get node` style output: the first line
/// is a header, the name is the first column of every other line.
pub fn parse_node_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Lists nodes by running a control-plane query command.
pub struct CommandEnumerator {
    command: CommandSpec,
    timeout: Duration,
}

impl CommandEnumerator {
    pub fn new(command: CommandSpec, timeout: Duration) -> Self {
        CommandEnumerator { command, timeout }
    }
}

#[async_trait]
impl NodeEnumerator for CommandEnumerator {
    fn describe(&self) -> String {
        self.command.display()
    }

    async fn list_nodes(&self) -> Result<Vec<String>> {
        let stdout = self
            .command
            .capture(&[], self.timeout)
            .await
            .map_err(|reason| StatusError::connectivity(self.describe(), reason))?;
        let nodes = parse_node_listing(&stdout);
        debug!(count = nodes.len(), "parsed node listing");
        Ok(nodes)
    }
}

/// Lists nodes through the Kubernetes API.
pub struct KubeEnumerator {
    client: Client,
    timeout: Duration,
}

impl KubeEnumerator {
    pub fn new(client: Client, timeout: Duration) -> Self {
        KubeEnumerator { client, timeout }
    }
}

#[async_trait]
impl NodeEnumerator for KubeEnumerator {
    fn describe(&self) -> String {
        "kubernetes api".to_string()
    }

    async fn list_nodes(&self) -> Result<Vec<String>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node_list = tokio::time::timeout(self.timeout, nodes.list(&ListParams::default()))
            .await
            .map_err(|_| StatusError::connectivity(self.describe(), "request timed out"))?
            .map_err(|e| StatusError::connectivity(self.describe(), e))?;
        Ok(node_list.items.iter().map(|n| n.name_any()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_listing() {
        let out = "\
NAME       STATUS   ROLES           AGE   VERSION
cp-1       Ready    control-plane   12d   v1.30.2
worker-1   Ready    <none>          12d   v1.30.2

worker-2   NotReady <none>          3d    v1.30.2
";
        assert_eq!(parse_node_listing(out), vec!["cp-1", "worker-1", "worker-2"]);
    }

    #[test]
    fn test_parse_header_only() {
        assert!(parse_node_listing("NAME STATUS ROLES AGE VERSION\n").is_empty());
        assert!(parse_node_listing("").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_is_connectivity_error() {
        let enumerator = CommandEnumerator::new(
            CommandSpec::new("sh").args(["-c", "echo 'connection refused' >&2; exit 1"]),
            Duration::from_secs(5),
        );
        let err = enumerator.list_nodes().await.unwrap_err();
        assert!(matches!(err, StatusError::Connectivity { .. }), "{err}");
        assert!(err.to_string().contains("connection refused"));
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{
    api::{Api, ListParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use tracing::debug;

use crate::error::{Result, StatusError};
use crate::process::CommandSpec;
use crate::quantity::{cpu_cores, memory_gi};
use crate::status::{parse_status_output, NodeStatus};

/// Fetches the reserved and used resources of a single node.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch(&self, node: &str) -> Result<NodeStatus>;
}

/// Runs an external status script with the node name as its last argument.
pub struct ScriptFetcher {
    command: CommandSpec,
    timeout: Duration,
}

impl ScriptFetcher {
    pub fn new(command: CommandSpec, timeout: Duration) -> Self {
        ScriptFetcher { command, timeout }
    }
}

#[async_trait]
impl StatusFetcher for ScriptFetcher {
    async fn fetch(&self, node: &str) -> Result<NodeStatus> {
        let stdout = self
            .command
            .capture(&[node], self.timeout)
            .await
            .map_err(|reason| StatusError::node_status(node, reason))?;
        parse_status_output(&stdout)
            .map_err(|reason| StatusError::node_status(node, format!("malformed output: {reason}")))
    }
}

/// Computes node status from the Kubernetes API: reservations from the
/// requests of pods scheduled on the node, usage from `metrics.k8s.io`.
pub struct KubeFetcher {
    client: Client,
    timeout: Duration,
}

impl KubeFetcher {
    pub fn new(client: Client, timeout: Duration) -> Self {
        KubeFetcher { client, timeout }
    }

    async fn reserved(&self, node: &str) -> std::result::Result<(f64, f64), String> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default().fields(&format!(
            "spec.nodeName={node},status.phase!=Succeeded,status.phase!=Failed"
        ));
        let pod_list = pods.list(&lp).await.map_err(|e| format!("listing pods: {e}"))?;

        let (mut cpu, mut mem) = (0.0, 0.0);
        for pod in &pod_list.items {
            let (c, m) = pod_requests(pod)?;
            cpu += c;
            mem += m;
        }
        debug!(node, pods = pod_list.items.len(), cpu, mem, "summed pod requests");
        Ok((cpu, mem))
    }

    async fn used(&self, node: &str) -> std::result::Result<(f64, f64), String> {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "NodeMetrics");
        let ar = ApiResource::from_gvk_with_plural(&gvk, "nodes");
        let metrics: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let m = metrics
            .get(node)
            .await
            .map_err(|e| format!("reading node metrics: {e}"))?;
        node_usage(&m)
    }
}

/// CPU cores and GiB in use according to a `NodeMetrics` object.
pub fn node_usage(m: &DynamicObject) -> std::result::Result<(f64, f64), String> {
    let usage = |key: &str| {
        m.data["usage"][key]
            .as_str()
            .map(|s| Quantity(s.to_string()))
            .ok_or_else(|| format!("node metrics carry no usage.{key}"))
    };
    Ok((cpu_cores(&usage("cpu")?)?, memory_gi(&usage("memory")?)?))
}

#[async_trait]
impl StatusFetcher for KubeFetcher {
    async fn fetch(&self, node: &str) -> Result<NodeStatus> {
        let work = async {
            let (reserved_cpu, reserved_mem_gi) = self.reserved(node).await?;
            let (used_cpu, used_mem_gi) = self.used(node).await?;
            Ok::<_, String>(NodeStatus::new(reserved_cpu, reserved_mem_gi, used_cpu, used_mem_gi))
        };
        match tokio::time::timeout(self.timeout, work).await {
            Ok(res) => res.map_err(|reason| StatusError::node_status(node, reason)),
            Err(_) => Err(StatusError::node_status(
                node,
                format!("timed out after {}s", self.timeout.as_secs_f64()),
            )),
        }
    }
}

/// CPU cores and GiB requested by one pod, the way `kubectl describe node`
/// counts them.
///
/// Regular init containers run one at a time before the app containers,
/// alongside any sidecars (`restartPolicy: Always`) started before them.
/// Sidecars keep running with the app containers. A pod reserves the
/// larger of the init-phase peak and the running sum, plus any
/// runtime-class overhead.
pub fn pod_requests(pod: &Pod) -> std::result::Result<(f64, f64), String> {
    let Some(spec) = &pod.spec else {
        return Ok((0.0, 0.0));
    };

    let (mut cpu, mut mem) = (0.0f64, 0.0f64);
    for c in &spec.containers {
        let (c_cpu, c_mem) = requests(c.resources.as_ref().and_then(requests_of))?;
        cpu += c_cpu;
        mem += c_mem;
    }

    let (mut sidecar_cpu, mut sidecar_mem) = (0.0f64, 0.0f64);
    let (mut init_cpu, mut init_mem) = (0.0f64, 0.0f64);
    for c in spec.init_containers.iter().flatten() {
        let (c_cpu, c_mem) = requests(c.resources.as_ref().and_then(requests_of))?;
        let (phase_cpu, phase_mem) = if c.restart_policy.as_deref() == Some("Always") {
            cpu += c_cpu;
            mem += c_mem;
            sidecar_cpu += c_cpu;
            sidecar_mem += c_mem;
            (sidecar_cpu, sidecar_mem)
        } else {
            (c_cpu + sidecar_cpu, c_mem + sidecar_mem)
        };
        init_cpu = init_cpu.max(phase_cpu);
        init_mem = init_mem.max(phase_mem);
    }

    let (o_cpu, o_mem) = requests(spec.overhead.as_ref())?;
    Ok((cpu.max(init_cpu) + o_cpu, mem.max(init_mem) + o_mem))
}

fn requests_of(r: &ResourceRequirements) -> Option<&BTreeMap<String, Quantity>> {
    r.requests.as_ref()
}

fn requests(map: Option<&BTreeMap<String, Quantity>>) -> std::result::Result<(f64, f64), String> {
    let Some(map) = map else {
        return Ok((0.0, 0.0));
    };
    let cpu = map.get("cpu").map(cpu_cores).transpose()?.unwrap_or(0.0);
    let mem = map.get("memory").map(memory_gi).transpose()?.unwrap_or(0.0);
    Ok((cpu, mem))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(spec: serde_json::Value) -> Pod {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "p" },
            "spec": spec,
        }))
        .unwrap()
    }

    #[test]
    fn test_pod_requests_sum_containers() {
        let p = pod(serde_json::json!({
            "containers": [
                { "name": "app", "resources": { "requests": { "cpu": "500m", "memory": "1Gi" } } },
                { "name": "sidecar", "resources": { "requests": { "cpu": "250m", "memory": "512Mi" } } },
                { "name": "bare" }
            ]
        }));
        assert_eq!(pod_requests(&p).unwrap(), (0.75, 1.5));
    }

    #[test]
    fn test_pod_requests_init_peak_and_overhead() {
        let p = pod(serde_json::json!({
            "initContainers": [
                { "name": "migrate", "resources": { "requests": { "cpu": "2", "memory": "256Mi" } } }
            ],
            "containers": [
                { "name": "app", "resources": { "requests": { "cpu": "1", "memory": "2Gi" } } }
            ],
            "overhead": { "cpu": "250m", "memory": "1Gi" }
        }));
        assert_eq!(pod_requests(&p).unwrap(), (2.25, 3.0));
    }

    #[test]
    fn test_pod_requests_sidecar_runs_with_app() {
        let p = pod(serde_json::json!({
            "initContainers": [
                { "name": "proxy", "restartPolicy": "Always",
                  "resources": { "requests": { "cpu": "1", "memory": "1Gi" } } }
            ],
            "containers": [
                { "name": "app", "resources": { "requests": { "cpu": "1", "memory": "1Gi" } } }
            ]
        }));
        assert_eq!(pod_requests(&p).unwrap(), (2.0, 2.0));
    }

    #[test]
    fn test_pod_requests_init_after_sidecar() {
        let p = pod(serde_json::json!({
            "initContainers": [
                { "name": "proxy", "restartPolicy": "Always",
                  "resources": { "requests": { "cpu": "1", "memory": "1Gi" } } },
                { "name": "migrate", "resources": { "requests": { "cpu": "2", "memory": "512Mi" } } }
            ],
            "containers": [
                { "name": "app", "resources": { "requests": { "cpu": "1", "memory": "1Gi" } } }
            ]
        }));
        // cpu peaks while migrate runs next to the proxy; memory peaks once the app is up
        assert_eq!(pod_requests(&p).unwrap(), (3.0, 2.0));
    }

    fn node_metrics(usage: serde_json::Value) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "NodeMetrics",
            "metadata": { "name": "worker-1" },
            "timestamp": "2026-10-16T12:00:00Z",
            "window": "10.5s",
            "usage": usage,
        }))
        .unwrap()
    }

    #[test]
    fn test_node_usage() {
        let m = node_metrics(serde_json::json!({ "cpu": "123456789n", "memory": "2048Ki" }));
        let (cpu, mem) = node_usage(&m).unwrap();
        assert!((cpu - 0.123456789).abs() < 1e-12);
        assert_eq!(mem, 2048.0 * 1024.0 / (1u64 << 30) as f64);

        let m = node_metrics(serde_json::json!({ "cpu": "1500m", "memory": "3Gi" }));
        assert_eq!(node_usage(&m).unwrap(), (1.5, 3.0));
    }

    #[test]
    fn test_node_usage_missing_fields() {
        let m: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "NodeMetrics",
            "metadata": { "name": "worker-1" },
        }))
        .unwrap();
        assert_eq!(node_usage(&m).unwrap_err(), "node metrics carry no usage.cpu");

        let m = node_metrics(serde_json::json!({ "cpu": "1" }));
        assert_eq!(node_usage(&m).unwrap_err(), "node metrics carry no usage.memory");

        let m = node_metrics(serde_json::json!({ "cpu": "fast", "memory": "1Gi" }));
        assert!(node_usage(&m).is_err());
    }

    #[test]
    fn test_pod_requests_rejects_bad_quantity() {
        let p = pod(serde_json::json!({
            "containers": [
                { "name": "app", "resources": { "requests": { "cpu": "lots" } } }
            ]
        }));
        assert!(pod_requests(&p).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_fetcher() {
        let fetcher = ScriptFetcher::new(
            CommandSpec::new("sh").args(["-c", "[ \"$1\" = n1 ] && echo '2 4 1 2'", "sh"]),
            Duration::from_secs(5),
        );
        assert_eq!(
            fetcher.fetch("n1").await.unwrap(),
            NodeStatus::new(2.0, 4.0, 1.0, 2.0)
        );

        let err = fetcher.fetch("n2").await.unwrap_err();
        assert!(err.to_string().contains("'n2'"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_fetcher_malformed_output() {
        let fetcher = ScriptFetcher::new(
            CommandSpec::new("sh").args(["-c", "echo 'cpu: lots'", "sh"]),
            Duration::from_secs(5),
        );
        let err = fetcher.fetch("n1").await.unwrap_err();
        assert!(err.to_string().contains("malformed output"), "{err}");
    }
}

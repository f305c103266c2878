use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, StatusError};
use crate::status::NodeStatus;

const NODE_LIST_FILE: &str = "nodes.tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    ReservedCpu,
    ReservedMem,
    UsedCpu,
    UsedMem,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::ReservedCpu,
        Metric::ReservedMem,
        Metric::UsedCpu,
        Metric::UsedMem,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Metric::ReservedCpu => "reserved_cpu_base.total",
            Metric::ReservedMem => "reserved_mem_gi.total",
            Metric::UsedCpu => "used_cpu_base.total",
            Metric::UsedMem => "used_mem_gi.total",
        }
    }

    fn of(self, status: &NodeStatus) -> f64 {
        match self {
            Metric::ReservedCpu => status.reserved_cpu,
            Metric::ReservedMem => status.reserved_mem_gi,
            Metric::UsedCpu => status.used_cpu,
            Metric::UsedMem => status.used_mem_gi,
        }
    }
}

/// Running totals across processed nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceTotals {
    pub reserved_cpu: f64,
    pub reserved_mem_gi: f64,
    pub used_cpu: f64,
    pub used_mem_gi: f64,
}

impl ResourceTotals {
    pub fn add(&mut self, status: &NodeStatus) {
        self.reserved_cpu += status.reserved_cpu;
        self.reserved_mem_gi += status.reserved_mem_gi;
        self.used_cpu += status.used_cpu;
        self.used_mem_gi += status.used_mem_gi;
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ReservedCpu => self.reserved_cpu,
            Metric::ReservedMem => self.reserved_mem_gi,
            Metric::UsedCpu => self.used_cpu,
            Metric::UsedMem => self.used_mem_gi,
        }
    }

    fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::ReservedCpu => self.reserved_cpu = value,
            Metric::ReservedMem => self.reserved_mem_gi = value,
            Metric::UsedCpu => self.used_cpu = value,
            Metric::UsedMem => self.used_mem_gi = value,
        }
    }

    pub fn is_zero(&self) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m) == 0.0)
    }
}

/// Accumulator files in a working directory, one scalar per metric.
///
/// Only one run may use a directory at a time; nothing here locks.
#[derive(Debug, Clone)]
pub struct AccumulatorStore {
    dir: PathBuf,
}

impl AccumulatorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        AccumulatorStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, metric: Metric) -> PathBuf {
        self.dir.join(metric.file_name())
    }

    pub fn node_list_path(&self) -> PathBuf {
        self.dir.join(NODE_LIST_FILE)
    }

    /// Stored total for `metric`; an absent file counts as 0.0.
    pub async fn read(&self, metric: Metric) -> Result<f64> {
        let path = self.path(metric);
        match fs::read_to_string(&path).await {
            Ok(text) => {
                let value = text.trim();
                if value.is_empty() {
                    return Ok(0.0);
                }
                value.parse::<f64>().map_err(|_| StatusError::Parse {
                    path,
                    value: value.to_string(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0.0),
            Err(e) => Err(StatusError::io("read", path, e)),
        }
    }

    /// Add `delta` to the stored total and persist it. Returns the new total.
    pub async fn accumulate(&self, metric: Metric, delta: f64) -> Result<f64> {
        let total = self.read(metric).await? + delta;
        self.write_atomic(&self.path(metric), &format!("{total}\n"))
            .await?;
        debug!(file = metric.file_name(), delta, total, "accumulated");
        Ok(total)
    }

    pub async fn record(&self, status: &NodeStatus) -> Result<ResourceTotals> {
        let mut totals = ResourceTotals::default();
        for metric in Metric::ALL {
            let total = self.accumulate(metric, metric.of(status)).await?;
            totals.set(metric, total);
        }
        Ok(totals)
    }

    pub async fn load(&self) -> Result<ResourceTotals> {
        let mut totals = ResourceTotals::default();
        for metric in Metric::ALL {
            totals.set(metric, self.read(metric).await?);
        }
        Ok(totals)
    }

    pub async fn write_node_list(&self, nodes: &[String]) -> Result<()> {
        let mut body = nodes.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        self.write_atomic(&self.node_list_path(), &body).await
    }

    /// Remove the accumulator files and the node list.
    pub async fn reset(&self) -> Result<()> {
        let paths = Metric::ALL
            .iter()
            .map(|m| self.path(*m))
            .chain(std::iter::once(self.node_list_path()));
        for path in paths {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StatusError::io("remove", path, e)),
            }
        }
        Ok(())
    }

    async fn write_atomic(&self, path: &Path, body: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StatusError::io("create", &self.dir, e))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body)
            .await
            .map_err(|e| StatusError::io("write", &tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| StatusError::io("rename", path, e))
    }
}

use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum StatusError {
    #[error("cannot list cluster nodes via {source_desc}: {reason}")]
    Connectivity { source_desc: String, reason: String },
    #[error("status fetch failed for node '{node}': {reason}")]
    NodeStatus { node: String, reason: String },
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("accumulator file {} holds '{value}', not a number", path.display())]
    Parse { path: PathBuf, value: String },
}

impl StatusError {
    pub fn connectivity(source_desc: impl Into<String>, reason: impl ToString) -> Self {
        StatusError::Connectivity {
            source_desc: source_desc.into(),
            reason: reason.to_string(),
        }
    }

    pub fn node_status(node: &str, reason: impl ToString) -> Self {
        StatusError::NodeStatus {
            node: node.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StatusError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Control-plane and per-node failures may clear up on a later attempt;
    /// local file errors will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StatusError::Connectivity { .. } | StatusError::NodeStatus { .. }
        )
    }
}

pub type Result<T, E = StatusError> = std::result::Result<T, E>;

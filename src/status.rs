use serde::Serialize;

/// Resource figures for one node. CPU in cores, memory in GiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NodeStatus {
    pub reserved_cpu: f64,
    pub reserved_mem_gi: f64,
    pub used_cpu: f64,
    pub used_mem_gi: f64,
}

impl NodeStatus {
    pub fn new(reserved_cpu: f64, reserved_mem_gi: f64, used_cpu: f64, used_mem_gi: f64) -> Self {
        NodeStatus {
            reserved_cpu,
            reserved_mem_gi,
            used_cpu,
            used_mem_gi,
        }
    }
}

/// Parse the output of a node status script.
///
/// The script prints one data line holding four numbers in the order
/// `reserved_cpu reserved_mem_gi used_cpu used_mem_gi`, separated by
/// whitespace and/or single commas. Blank lines and `#` comments are ignored.
pub fn parse_status_output(output: &str) -> Result<NodeStatus, String> {
    let mut data = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let Some(line) = data.next() else {
        return Err("empty output".to_string());
    };
    if let Some(extra) = data.next() {
        return Err(format!("expected a single status line, found extra line '{extra}'"));
    }

    let mut parts: Vec<&str> = Vec::new();
    for piece in line.split(',') {
        if piece.trim().is_empty() {
            return Err(format!("empty field in '{line}'"));
        }
        parts.extend(piece.split_whitespace());
    }
    if parts.len() != 4 {
        return Err(format!("expected 4 fields, got {} in '{line}'", parts.len()));
    }

    let mut values = [0f64; 4];
    for (slot, raw) in values.iter_mut().zip(&parts) {
        let v = raw
            .parse::<f64>()
            .map_err(|_| format!("field '{raw}' is not a number"))?;
        if !v.is_finite() || v < 0.0 {
            return Err(format!("field '{raw}' is out of range"));
        }
        *slot = v;
    }

    Ok(NodeStatus::new(values[0], values[1], values[2], values[3]))
}

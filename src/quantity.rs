//! Kubernetes resource quantities (`250m`, `512Mi`, `1e3`) as plain numbers.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const GIB: f64 = (1u64 << 30) as f64;

/// Parse a quantity string into its base value (cores for CPU, bytes for memory).
pub fn parse_quantity(raw: &str) -> Result<f64, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty quantity".to_string());
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("bad number in quantity '{raw}'"))?;

    let scaled = match suffix {
        "Ki" => value * 1024.0,
        "Mi" => value * 1024f64.powi(2),
        "Gi" => value * 1024f64.powi(3),
        "Ti" => value * 1024f64.powi(4),
        "Pi" => value * 1024f64.powi(5),
        "Ei" => value * 1024f64.powi(6),
        _ => scale_decimal(value, decimal_exponent(suffix, raw)?),
    };
    Ok(scaled)
}

fn decimal_exponent(suffix: &str, raw: &str) -> Result<i32, String> {
    Ok(match suffix {
        "" => 0,
        "n" => -9,
        "u" => -6,
        "m" => -3,
        "k" => 3,
        "M" => 6,
        "G" => 9,
        "T" => 12,
        "P" => 15,
        "E" => 18,
        exp if exp.starts_with(['e', 'E']) => exp[1..]
            .parse()
            .map_err(|_| format!("bad exponent in quantity '{raw}'"))?,
        _ => return Err(format!("unknown suffix in quantity '{raw}'")),
    })
}

// Dividing keeps `250m` at exactly 0.25.
fn scale_decimal(value: f64, exp: i32) -> f64 {
    if exp < 0 {
        value / 10f64.powi(-exp)
    } else {
        value * 10f64.powi(exp)
    }
}

pub fn cpu_cores(q: &Quantity) -> Result<f64, String> {
    parse_quantity(&q.0)
}

pub fn memory_gi(q: &Quantity) -> Result<f64, String> {
    parse_quantity(&q.0).map(|bytes| bytes / GIB)
}

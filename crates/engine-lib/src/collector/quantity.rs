//! Platform resource-quantity parsing
//!
//! CPU quantities normalize to cores and memory quantities to GiB. Memory
//! accepts both binary (Ki, Mi, Gi, Ti) and decimal (k, M, G, T) suffixes.
//! Missing or unparseable values become zero.

use tracing::warn;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Memory suffixes and their multiplier relative to GiB
///
/// Binary suffixes come first so "Mi" is never read as "M".
const MEMORY_UNITS: &[(&str, f64)] = &[
    ("Ki", 1.0 / (1024.0 * 1024.0)),
    ("Mi", 1.0 / 1024.0),
    ("Gi", 1.0),
    ("Ti", 1024.0),
    ("k", 1e3 / BYTES_PER_GIB),
    ("M", 1e6 / BYTES_PER_GIB),
    ("G", 1e9 / BYTES_PER_GIB),
    ("T", 1e12 / BYTES_PER_GIB),
];

/// Parse a CPU quantity ("250m", "2", "0.5") into cores
pub fn parse_cpu(quantity: &str) -> f64 {
    let trimmed = quantity.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let parsed = match trimmed.strip_suffix('m') {
        Some(millis) => parse_number(millis).map(|v| v / 1000.0),
        None => parse_number(trimmed),
    };

    parsed.unwrap_or_else(|| {
        warn!(quantity = %quantity, "Unparseable CPU quantity, treating as zero");
        0.0
    })
}

/// Parse a memory quantity ("128Mi", "1Gi", "500M", "536870912") into GiB
///
/// Anything without a recognized suffix is read as a byte count.
pub fn parse_memory(quantity: &str) -> f64 {
    let trimmed = quantity.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let parsed = MEMORY_UNITS
        .iter()
        .find_map(|(suffix, multiplier)| {
            trimmed
                .strip_suffix(suffix)
                .map(|value| parse_number(value).map(|v| v * multiplier))
        })
        .unwrap_or_else(|| parse_number(trimmed).map(|bytes| bytes / BYTES_PER_GIB));

    parsed.unwrap_or_else(|| {
        warn!(quantity = %quantity, "Unparseable memory quantity, treating as zero");
        0.0
    })
}

/// Parse a plain non-negative finite number
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0))
}

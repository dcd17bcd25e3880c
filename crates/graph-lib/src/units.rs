//! Resource quantity normalization
//!
//! Every CPU and memory figure stored in the graph passes through this module,
//! so capacity, allocatable, requests, limits and usage all share one unit:
//! CPU in cores and memory in MiB. Unparsable input never fails the caller;
//! it normalizes to `0.0`.

const KIB_PER_MIB: f64 = 1024.0;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Memory suffixes, longest first so `Ki` is tried before `K`.
/// The multiplier converts the numeric part to MiB.
const MEMORY_SUFFIXES: &[(&str, f64)] = &[
    ("KI", 1.0 / KIB_PER_MIB),
    ("MI", 1.0),
    ("GI", 1024.0),
    ("TI", 1024.0 * 1024.0),
    ("K", 1.0 / KIB_PER_MIB),
    ("M", 1.0),
    ("G", 1024.0),
    ("T", 1024.0 * 1024.0),
];

/// Parse a CPU quantity into cores.
///
/// `m` is millicores, `n` is nanocores, no suffix is a literal core count.
pub fn parse_cpu(input: &str) -> f64 {
    let value = input.trim();
    if value.is_empty() {
        return 0.0;
    }

    let parsed = if let Some(milli) = value.strip_suffix('m') {
        milli.parse::<f64>().map(|v| v / 1000.0)
    } else if let Some(nano) = value.strip_suffix('n') {
        nano.parse::<f64>().map(|v| v / 1e9)
    } else {
        value.parse::<f64>()
    };

    finite_or_zero(parsed.unwrap_or(0.0))
}

/// Parse a memory quantity into MiB.
///
/// Suffixes are matched case-insensitively. A bare number is bytes.
pub fn parse_memory(input: &str) -> f64 {
    let value = input.trim().to_ascii_uppercase();
    if value.is_empty() {
        return 0.0;
    }

    for (suffix, multiplier) in MEMORY_SUFFIXES {
        if let Some(number) = value.strip_suffix(suffix) {
            return finite_or_zero(number.parse::<f64>().map(|v| v * multiplier).unwrap_or(0.0));
        }
    }

    finite_or_zero(
        value
            .parse::<f64>()
            .map(|bytes| bytes / BYTES_PER_MIB)
            .unwrap_or(0.0),
    )
}

/// Parse an optional CPU quantity, treating absence as zero
pub fn parse_cpu_opt(input: Option<&str>) -> f64 {
    input.map(parse_cpu).unwrap_or(0.0)
}

/// Parse an optional memory quantity, treating absence as zero
pub fn parse_memory_opt(input: Option<&str>) -> f64 {
    input.map(parse_memory).unwrap_or(0.0)
}

// "NaN" and "inf" parse as f64 but are not quantities
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_cpu_table() {
        assert!(approx(parse_cpu("500m"), 0.5));
        assert!(approx(parse_cpu("2"), 2.0));
        assert!(approx(parse_cpu(""), 0.0));
        assert!(approx(parse_cpu("bogus"), 0.0));
    }

    #[test]
    fn test_cpu_nanocores() {
        assert!(approx(parse_cpu("250000000n"), 0.25));
        assert!(approx(parse_cpu("1500000n"), 0.0015));
    }

    #[test]
    fn test_cpu_fractional_cores_and_whitespace() {
        assert!(approx(parse_cpu(" 1.5 "), 1.5));
        assert!(approx(parse_cpu("0.1"), 0.1));
    }

    #[test]
    fn test_cpu_rejects_non_finite() {
        assert_eq!(parse_cpu("NaN"), 0.0);
        assert_eq!(parse_cpu("inf"), 0.0);
    }

    #[test]
    fn test_memory_table() {
        assert!(approx(parse_memory("128Mi"), 128.0));
        assert!(approx(parse_memory("1Gi"), 1024.0));
        assert!(approx(parse_memory("bogus"), 0.0));
        assert!(approx(parse_memory(""), 0.0));
    }

    #[test]
    fn test_memory_suffixes_case_insensitive() {
        assert!(approx(parse_memory("2048Ki"), 2.0));
        assert!(approx(parse_memory("2048ki"), 2.0));
        assert!(approx(parse_memory("1K"), 1.0 / 1024.0));
        assert!(approx(parse_memory("256M"), 256.0));
        assert!(approx(parse_memory("2g"), 2048.0));
        assert!(approx(parse_memory("1Ti"), 1024.0 * 1024.0));
        assert!(approx(parse_memory("1T"), 1024.0 * 1024.0));
    }

    #[test]
    fn test_memory_bare_number_is_bytes() {
        assert!(approx(parse_memory("1048576"), 1.0));
        assert!(approx(parse_memory("0"), 0.0));
    }

    #[test]
    fn test_optional_inputs() {
        assert_eq!(parse_cpu_opt(None), 0.0);
        assert!(approx(parse_cpu_opt(Some("100m")), 0.1));
        assert_eq!(parse_memory_opt(None), 0.0);
        assert!(approx(parse_memory_opt(Some("64Mi")), 64.0));
    }
}

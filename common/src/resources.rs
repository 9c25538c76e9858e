//! Resource-quantity parsing and the "standard request-aggregation policy":
//! per-pod resource requests are the sum of container requests, capped by
//! init-container maxima.

use crate::error::CommonError;
use std::collections::BTreeMap;

/// Parses a Kubernetes-style resource quantity string into base units:
/// cpu into millicores, memory/other resources into whole units (bytes
/// for memory, item count for e.g. `example.com/gpu`). Supports the
/// binary (`Ki`/`Mi`/`Gi`/`Ti`) and decimal (`k`/`M`/`G`/`T`) SI suffixes
/// plus the CPU-only `m` (milli) suffix.
pub fn parse_quantity(raw: &str) -> Result<i64, CommonError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CommonError::InvalidQuantity(raw.to_string()));
    }
    if let Some(stripped) = raw.strip_suffix('m') {
        return stripped
            .parse::<i64>()
            .map_err(|_| CommonError::InvalidQuantity(raw.to_string()));
    }
    const BINARY: &[(&str, i64)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
    ];
    const DECIMAL: &[(&str, i64)] = &[
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];
    for (suffix, multiplier) in BINARY.iter().chain(DECIMAL.iter()) {
        if let Some(stripped) = raw.strip_suffix(suffix) {
            let base: f64 = stripped
                .parse()
                .map_err(|_| CommonError::InvalidQuantity(raw.to_string()))?;
            return Ok((base * *multiplier as f64).round() as i64);
        }
    }
    // Bare number: whole-unit count, or fractional CPU cores expressed as
    // e.g. "0.5" -> 500 millicores is handled by callers that know the
    // resource is `cpu`; this parser treats a bare decimal as base units
    // scaled by 1000 so cpu cores and millicores share one code path.
    if let Ok(whole) = raw.parse::<i64>() {
        return Ok(whole * 1000);
    }
    raw.parse::<f64>()
        .map(|v| (v * 1000.0).round() as i64)
        .map_err(|_| CommonError::InvalidQuantity(raw.to_string()))
}

/// Sums resource requests across containers, then caps each resource by
/// the largest single init-container request for that resource (the
/// init-containers run sequentially, never concurrently with each other
/// or — on most runtimes — with the main containers at request time).
pub fn aggregate_pod_requests(
    container_requests: &[BTreeMap<String, i64>],
    init_container_requests: &[BTreeMap<String, i64>],
) -> BTreeMap<String, i64> {
    let mut total: BTreeMap<String, i64> = BTreeMap::new();
    for reqs in container_requests {
        for (resource, qty) in reqs {
            *total.entry(resource.clone()).or_insert(0) += qty;
        }
    }
    let mut init_max: BTreeMap<String, i64> = BTreeMap::new();
    for reqs in init_container_requests {
        for (resource, qty) in reqs {
            let entry = init_max.entry(resource.clone()).or_insert(0);
            if *qty > *entry {
                *entry = *qty;
            }
        }
    }
    for (resource, max_qty) in init_max {
        let entry = total.entry(resource).or_insert(0);
        if max_qty > *entry {
            *entry = max_qty;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpu_millicores() {
        assert_eq!(parse_quantity("500m").unwrap(), 500);
        assert_eq!(parse_quantity("2").unwrap(), 2000);
    }

    #[test]
    fn parses_binary_memory_suffix() {
        assert_eq!(parse_quantity("1Gi").unwrap(), 1 << 30);
        assert_eq!(parse_quantity("512Mi").unwrap(), 512 * (1 << 20));
    }

    #[test]
    fn aggregate_sums_then_caps_by_init_max() {
        let containers = vec![
            BTreeMap::from([("cpu".to_string(), 300i64)]),
            BTreeMap::from([("cpu".to_string(), 200i64)]),
        ];
        let init = vec![BTreeMap::from([("cpu".to_string(), 1000i64)])];
        let total = aggregate_pod_requests(&containers, &init);
        assert_eq!(total["cpu"], 1000);
    }

    #[test]
    fn aggregate_does_not_cap_below_container_sum() {
        let containers = vec![BTreeMap::from([("cpu".to_string(), 2000i64)])];
        let init = vec![BTreeMap::from([("cpu".to_string(), 500i64)])];
        let total = aggregate_pod_requests(&containers, &init);
        assert_eq!(total["cpu"], 2000);
    }
}

use crate::aggregator::{Digest, Series, SeriesStats};
use crate::score::Metric;
use std::cmp::Ordering;

/// Derives per-field statistics and collapses string samples to sets,
/// once the whole stream has been folded in. Records are effectively
/// read-only afterwards.
pub fn summarize(digest: &mut Digest) {
    for record in digest.records.values_mut() {
        for metric in Metric::ALL {
            summarize_series(record.series_mut(metric));
        }
        dedup(&mut record.databases);
        dedup(&mut record.hosts);
        dedup(&mut record.users);
        dedup(&mut record.ips);
        dedup(&mut record.queries);
    }

    // Stripping runs over the already-deduplicated host sets, as a plain
    // first-occurrence substring removal.
    let domain = digest.domain.domain_to_strip().map(str::to_string);
    if let Some(domain) = domain {
        for record in digest.records.values_mut() {
            for host in &mut record.hosts {
                *host = host.replacen(&domain, "", 1);
            }
        }
    }
}

fn summarize_series(series: &mut Series) {
    if series.samples.is_empty() {
        return;
    }
    let mut sorted = series.samples.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    series.stats = Some(SeriesStats {
        min: sorted[0],
        median: median(&sorted),
        p95: percentile(&sorted, 0.95),
        max: sorted[sorted.len() - 1],
        total: sorted.iter().sum(),
    });
}

/// Standard sample median: mean of the two middle values for even counts.
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Nearest-rank percentile over an ascending sort. Small distributions
/// (fewer samples than the rank resolves to, e.g. a single sample) have
/// no defined percentile and fall back to 0 rather than faulting.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (sorted.len() as f64 * p).ceil() as usize;
    match sorted.get(rank) {
        Some(value) if value.is_finite() => *value,
        _ => 0.0,
    }
}

/// Sorted set semantics: adjacent duplicates collapse after the sort.
fn dedup(values: &mut Vec<String>) {
    values.sort_unstable();
    values.dedup();
}

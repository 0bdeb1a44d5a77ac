use crate::fingerprint::fingerprint;
use crate::parser::QueryEvent;
use crate::score::{Metric, Stat};
use std::collections::HashMap;

/// Samples for one numeric field, plus the statistics derived from them
/// once the stream is exhausted.
#[derive(Debug, Default, Clone)]
pub struct Series {
    pub samples: Vec<f64>,
    pub stats: Option<SeriesStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeriesStats {
    pub min: f64,
    pub median: f64,
    pub p95: f64,
    pub max: f64,
    pub total: f64,
}

impl Series {
    /// A derived statistic, or 0 before the statistics pass has run.
    pub fn stat(&self, stat: Stat) -> f64 {
        let Some(stats) = self.stats else {
            return 0.0;
        };
        match stat {
            Stat::Min => stats.min,
            Stat::Median => stats.median,
            Stat::P95 => stats.p95,
            Stat::Max => stats.max,
            Stat::Total => stats.total,
        }
    }
}

/// Everything accumulated for one fingerprint over the whole batch.
/// Append-only while events are folded in; read-only once the statistics
/// and scoring passes have run.
#[derive(Debug, Default)]
pub struct Record {
    pub count: u64,
    pub query_seconds: Series,
    pub lock_time: Series,
    pub rows_sent: Series,
    pub rows_examined: Series,
    pub local: Series,
    pub databases: Vec<String>,
    pub hosts: Vec<String>,
    pub users: Vec<String>,
    pub ips: Vec<String>,
    pub queries: Vec<String>,
    pub query_example: String,
    pub is_constant: bool,
    pub score: f64,
}

impl Record {
    pub fn series(&self, metric: Metric) -> &Series {
        match metric {
            Metric::QuerySeconds => &self.query_seconds,
            Metric::LockTime => &self.lock_time,
            Metric::RowsSent => &self.rows_sent,
            Metric::RowsExamined => &self.rows_examined,
            Metric::Local => &self.local,
        }
    }

    pub fn series_mut(&mut self, metric: Metric) -> &mut Series {
        match metric {
            Metric::QuerySeconds => &mut self.query_seconds,
            Metric::LockTime => &mut self.lock_time,
            Metric::RowsSent => &mut self.rows_sent,
            Metric::RowsExamined => &mut self.rows_examined,
            Metric::Local => &mut self.local,
        }
    }
}

/// Whether a DNS domain shared by every reporting host should be trimmed
/// from hostnames at report time.
///
/// The decision is asymmetric on purpose: once an IP has stood in for a
/// missing hostname there is nothing to strip and the question is closed
/// for good, while a "strip" outcome keeps being re-evaluated and a later
/// host with a different suffix can still overturn it.
#[derive(Debug, Default)]
pub struct DomainStrip {
    strip: bool,
    domain: String,
    latched: bool,
}

impl DomainStrip {
    /// An IP was substituted for a missing hostname; never strip.
    pub fn note_ip_fallback(&mut self) {
        self.strip = false;
        self.latched = true;
    }

    /// Weighs one resolved hostname against the evidence so far.
    pub fn note_host(&mut self, host: &str, local_names: &[String]) {
        if self.latched {
            return;
        }
        let suffix = host.find('.').map(|i| &host[i..]).unwrap_or("");
        if local_names.iter().any(|name| name == host) {
            self.strip = true;
        } else if !self.domain.is_empty() && suffix == self.domain {
            self.strip = true;
            self.domain = suffix.to_string();
        } else {
            self.strip = false;
            self.domain = suffix.to_string();
        }
    }

    /// The domain to remove from reported hostnames, if any.
    pub fn domain_to_strip(&self) -> Option<&str> {
        if self.strip && !self.domain.is_empty() {
            Some(&self.domain)
        } else {
            None
        }
    }
}

/// The aggregation output: one record per fingerprint plus batch-wide
/// metadata for the report header.
#[derive(Debug)]
pub struct Digest {
    pub records: HashMap<String, Record>,
    pub domain: DomainStrip,
    pub timestamps: Vec<String>,
}

impl Digest {
    /// Earliest and latest admitted timestamps. The log's timestamp format
    /// is fixed-width and zero-padded, so lexicographic order is
    /// chronological order.
    pub fn time_range(&self) -> Option<(String, String)> {
        let mut sorted: Vec<&String> =
            self.timestamps.iter().filter(|t| !t.is_empty()).collect();
        sorted.sort_unstable();
        match (sorted.first(), sorted.last()) {
            (Some(first), Some(last)) => Some((first.to_string(), last.to_string())),
            _ => None,
        }
    }
}

/// Folds admitted events into per-fingerprint records.
pub struct Aggregator {
    records: HashMap<String, Record>,
    domain: DomainStrip,
    timestamps: Vec<String>,
    local_names: Vec<String>,
}

impl Aggregator {
    pub fn new(local_names: Vec<String>) -> Self {
        Self {
            records: HashMap::new(),
            domain: DomainStrip::default(),
            timestamps: Vec::new(),
            local_names,
        }
    }

    /// Folds one admitted event into its fingerprint's record.
    pub fn fold(&mut self, event: QueryEvent, local: bool) {
        let host = if event.host.is_empty() {
            self.domain.note_ip_fallback();
            event.ip.clone()
        } else {
            self.domain.note_host(&event.host, &self.local_names);
            event.host
        };

        self.timestamps.push(event.timestamp);

        let record = self.records.entry(fingerprint(&event.query_text)).or_default();
        record.count += 1;
        record.query_seconds.samples.push(event.query_seconds);
        record.lock_time.samples.push(event.lock_time);
        record.rows_sent.samples.push(event.rows_sent as f64);
        record.rows_examined.samples.push(event.rows_examined as f64);
        record.local.samples.push(if local { 1.0 } else { 0.0 });
        record.databases.push(event.database);
        record.hosts.push(host);
        record.users.push(event.user);
        record.ips.push(event.ip);

        if record.query_example.is_empty() {
            record.query_example = event.query_text.clone();
        }
        // Reassigned on every fold: the flag reflects the latest comparison
        // against the example, not a conjunction over the whole history.
        record.is_constant = event.query_text == record.query_example;
        record.queries.push(event.query_text);
    }

    pub fn finish(self) -> Digest {
        Digest {
            records: self.records,
            domain: self.domain,
            timestamps: self.timestamps,
        }
    }
}

use crate::aggregator::{Digest, Record};
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Numeric fields a record accumulates samples for. `Local` is derived
/// by the admission filter (1 per locally issued event); the rest come
/// straight from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    QuerySeconds,
    LockTime,
    RowsSent,
    RowsExamined,
    Local,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::QuerySeconds,
        Metric::LockTime,
        Metric::RowsSent,
        Metric::RowsExamined,
        Metric::Local,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::QuerySeconds => "query_seconds",
            Metric::LockTime => "lock_time",
            Metric::RowsSent => "rows_sent",
            Metric::RowsExamined => "rows_examined",
            Metric::Local => "local",
        }
    }

    /// Human label for the report.
    pub fn label(self) -> &'static str {
        match self {
            Metric::QuerySeconds => "Query seconds",
            Metric::LockTime => "Lock time",
            Metric::RowsSent => "Rows sent",
            Metric::RowsExamined => "Rows examined",
            Metric::Local => "Local",
        }
    }

    fn from_name(name: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.name() == name)
    }
}

/// One of the derived statistics of a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Min,
    Median,
    P95,
    Max,
    Total,
}

impl Stat {
    pub fn name(self) -> &'static str {
        match self {
            Stat::Min => "min",
            Stat::Median => "median",
            Stat::P95 => "p95",
            Stat::Max => "max",
            Stat::Total => "total",
        }
    }

    fn from_name(name: &str) -> Option<Stat> {
        [Stat::Min, Stat::Median, Stat::P95, Stat::Max, Stat::Total]
            .into_iter()
            .find(|s| s.name() == name)
    }
}

/// A field identifier the scorer and sorter can resolve on a record.
/// Parsing is the only way in from user input, so unknown names are
/// rejected when the configuration is read rather than defaulting to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Count,
    Score,
    Stat(Metric, Stat),
}

impl Field {
    pub fn value(self, record: &Record) -> f64 {
        match self {
            Field::Count => record.count as f64,
            Field::Score => record.score,
            Field::Stat(metric, stat) => record.series(metric).stat(stat),
        }
    }
}

impl FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "count" => return Ok(Field::Count),
            "score" => return Ok(Field::Score),
            // Bare `local` reads as the per-record count of local events.
            "local" => return Ok(Field::Stat(Metric::Local, Stat::Total)),
            _ => {}
        }
        if let Some((metric, stat)) = name.rsplit_once('_') {
            if let (Some(metric), Some(stat)) = (Metric::from_name(metric), Stat::from_name(stat))
            {
                return Ok(Field::Stat(metric, stat));
            }
        }
        Err(anyhow!("unknown field name: {s:?}"))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Count => write!(f, "count"),
            Field::Score => write!(f, "score"),
            Field::Stat(metric, stat) => write!(f, "{}_{}", metric.name(), stat.name()),
        }
    }
}

/// A `field=value` weight override from the command line.
#[derive(Debug, Clone)]
pub struct WeightSpec {
    pub field: Field,
    pub weight: f64,
}

impl FromStr for WeightSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected field=value, got {s:?}"))?;
        let field: Field = name.parse()?;
        if field == Field::Score {
            bail!("the score itself cannot carry a weight");
        }
        let weight: f64 = value
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid weight value: {value:?}"))?;
        Ok(WeightSpec { field, weight })
    }
}

/// Linear field weights applied on top of the constant base of 1, so
/// even an all-zero record orders positively.
#[derive(Debug, Clone)]
pub struct Weights(HashMap<Field, f64>);

impl Default for Weights {
    fn default() -> Self {
        Weights(HashMap::from([
            (Field::Count, 2.5),
            (Field::Stat(Metric::Local, Stat::Total), -2.5),
            (Field::Stat(Metric::LockTime, Stat::Total), 0.25),
            (Field::Stat(Metric::RowsExamined, Stat::P95), 0.25),
            (Field::Stat(Metric::QuerySeconds, Stat::P95), 1.5),
            (Field::Stat(Metric::QuerySeconds, Stat::Total), 2.0),
        ]))
    }
}

impl Weights {
    pub fn apply_overrides(&mut self, overrides: &[WeightSpec]) {
        for spec in overrides {
            self.0.insert(spec.field, spec.weight);
        }
    }

    pub fn score(&self, record: &Record) -> f64 {
        1.0 + self
            .0
            .iter()
            .map(|(field, weight)| weight * field.value(record))
            .sum::<f64>()
    }
}

/// Stamps every record with its composite score. Runs once, after the
/// statistics pass.
pub fn apply(digest: &mut Digest, weights: &Weights) {
    for record in digest.records.values_mut() {
        record.score = weights.score(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SeriesStats;

    fn record() -> Record {
        let mut record = Record::default();
        record.count = 2;
        record.query_seconds.stats = Some(SeriesStats {
            min: 1.0,
            median: 1.5,
            p95: 0.0,
            max: 2.0,
            total: 3.0,
        });
        record.lock_time.stats = Some(SeriesStats {
            min: 0.5,
            median: 0.5,
            p95: 0.0,
            max: 0.5,
            total: 1.0,
        });
        record
    }

    #[test]
    fn test_default_weights() {
        // 1 + 2.5*2 (count) + 2.0*3.0 (query_seconds_total) + 0.25*1.0 (lock_time_total)
        let score = Weights::default().score(&record());
        assert!((score - 12.25).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_deterministic() {
        let weights = Weights::default();
        assert_eq!(weights.score(&record()), weights.score(&record()));
    }

    #[test]
    fn test_local_offsets_count() {
        let mut rec = record();
        rec.local.stats = Some(SeriesStats {
            min: 1.0,
            median: 1.0,
            p95: 0.0,
            max: 1.0,
            total: 2.0,
        });
        let all_local = Weights::default().score(&rec);
        let remote = Weights::default().score(&record());
        assert!((remote - all_local - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_stats_contribute_zero() {
        let score = Weights::default().score(&Record::default());
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_field_names_parse() {
        assert_eq!("count".parse::<Field>().unwrap(), Field::Count);
        assert_eq!("score".parse::<Field>().unwrap(), Field::Score);
        assert_eq!(
            "local".parse::<Field>().unwrap(),
            Field::Stat(Metric::Local, Stat::Total)
        );
        assert_eq!(
            "Query_seconds_p95".parse::<Field>().unwrap(),
            Field::Stat(Metric::QuerySeconds, Stat::P95)
        );
        assert_eq!(
            "rows_examined_median".parse::<Field>().unwrap(),
            Field::Stat(Metric::RowsExamined, Stat::Median)
        );
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!("rows_eaten_p95".parse::<Field>().is_err());
        assert!("".parse::<Field>().is_err());
    }

    #[test]
    fn test_weight_spec_parses_and_rejects_score() {
        let spec: WeightSpec = "rows_sent_total=0.5".parse().unwrap();
        assert_eq!(spec.field, Field::Stat(Metric::RowsSent, Stat::Total));
        assert_eq!(spec.weight, 0.5);
        assert!("score=2".parse::<WeightSpec>().is_err());
        assert!("count".parse::<WeightSpec>().is_err());
    }
}

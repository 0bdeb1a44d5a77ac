use crate::aggregator::{Digest, Record, Series};
use crate::score::{Field, Metric, Stat};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tabled::{Table, Tabled};

/// Numeric fields shown in the per-record sections, in log order.
/// The derived `local` field only feeds the score.
const REPORTED: [Metric; 4] = [
    Metric::QuerySeconds,
    Metric::LockTime,
    Metric::RowsSent,
    Metric::RowsExamined,
];

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "Total Time")]
    total_time: String,
    #[tabled(rename = "Query ID")]
    query_id: String,
    #[tabled(rename = "Query")]
    query: String,
}

/// Applies the squelch threshold, sorts descending by the sort field and
/// truncates to the top-N count. Ties order by fingerprint so repeated
/// runs agree.
pub fn select(
    records: HashMap<String, Record>,
    sort: Field,
    squelch: Option<f64>,
    top: Option<usize>,
) -> Vec<(String, Record)> {
    let mut ranked: Vec<(String, Record)> = records.into_iter().collect();
    if let Some(min) = squelch {
        ranked.retain(|(_, record)| sort.value(record) >= min);
    }
    ranked.sort_by(|a, b| {
        sort.value(&b.1)
            .partial_cmp(&sort.value(&a.1))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    if let Some(n) = top {
        ranked.truncate(n);
    }
    ranked
}

pub fn print_report(
    digest: Digest,
    sort: Field,
    squelch: Option<f64>,
    top: Option<usize>,
    output_path: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let mut writer: Box<dyn Write> = if let Some(path) = output_path {
        Box::new(std::fs::File::create(path)?)
    } else {
        Box::new(std::io::stdout())
    };

    let distinct = digest.records.len();
    let time_range = digest.time_range();
    let ranked = select(digest.records, sort, squelch, top);

    writeln!(
        writer,
        "Slow query report generated {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(writer, "{} distinct query shapes, sorted by {}", distinct, sort)?;
    if let Some((first, last)) = time_range {
        writeln!(writer, "Covering {} .. {}", first, last)?;
    }
    writeln!(writer)?;

    if ranked.is_empty() {
        writeln!(writer, "No problem queries found.")?;
        return Ok(());
    }

    let rows: Vec<Row> = ranked
        .iter()
        .enumerate()
        .map(|(i, (fp, record))| Row {
            rank: i + 1,
            score: format!("{:.1}", record.score),
            count: record.count,
            total_time: format!("{:.3}s", record.query_seconds.stat(Stat::Total)),
            query_id: format!("{:x}", md5::compute(fp)),
            query: truncate_query(&record.query_example),
        })
        .collect();
    writeln!(writer, "{}", Table::new(rows))?;

    print_detailed_sections(&ranked, &mut writer)?;
    Ok(())
}

fn print_detailed_sections(
    ranked: &[(String, Record)],
    writer: &mut dyn Write,
) -> anyhow::Result<()> {
    writeln!(writer, "\nDetailed Report\n===============")?;

    for (rank, (fp, record)) in ranked.iter().enumerate() {
        writeln!(writer, "\nQuery ID: {:x}", md5::compute(fp))?;
        writeln!(writer, "Rank: {}", rank + 1)?;
        writeln!(writer, "  Score: {:.2}", record.score)?;
        writeln!(writer, "  Count: {}", record.count)?;
        for metric in REPORTED {
            writeln!(
                writer,
                "  {}: {}",
                metric.label(),
                format_series(record.series(metric))
            )?;
        }
        writeln!(writer, "  Databases: {}", record.databases.join(", "))?;
        writeln!(writer, "  Hosts:     {}", record.hosts.join(", "))?;
        writeln!(writer, "  Users:     {}", record.users.join(", "))?;
        if !record.ips.iter().all(String::is_empty) {
            writeln!(writer, "  IPs:       {}", record.ips.join(", "))?;
        }
        if record.is_constant {
            writeln!(writer, "  Query:")?;
            writeln!(writer, "    {}", record.query_example.trim())?;
        } else {
            writeln!(writer, "  Queries ({} distinct):", record.queries.len())?;
            for query in &record.queries {
                writeln!(writer, "    {}", query.trim())?;
            }
        }
        writeln!(
            writer,
            "--------------------------------------------------------------------------------"
        )?;
    }
    Ok(())
}

/// A single collapsed value when every sample agreed, the five-number
/// summary otherwise.
fn format_series(series: &Series) -> String {
    match series.stats {
        None => "n/a".to_string(),
        Some(s) if s.min == s.max => format!("{}", s.min),
        Some(s) => format!(
            "min {} / median {} / p95 {} / max {} / total {}",
            s.min, s.median, s.p95, s.max, s.total
        ),
    }
}

fn truncate_query(query: &str) -> String {
    let mut flat = query.replace('\n', " ");
    if flat.len() > 50 {
        flat.truncate(47);
        flat.push_str("...");
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::filter::FilterConfig;
    use crate::parser::parse_log;
    use crate::score::Weights;
    use crate::stats;

    fn record_with_score(score: f64, count: u64) -> Record {
        Record {
            score,
            count,
            ..Record::default()
        }
    }

    #[test]
    fn test_squelch_drops_below_threshold() {
        let mut records = HashMap::new();
        records.insert("a".to_string(), record_with_score(10.0, 1));
        records.insert("b".to_string(), record_with_score(4.0, 1));
        records.insert("c".to_string(), record_with_score(5.0, 1));
        let ranked = select(records, Field::Score, Some(5.0), None);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|(_, r)| r.score >= 5.0));
    }

    #[test]
    fn test_top_keeps_the_n_highest() {
        let mut records = HashMap::new();
        for (fp, score) in [("a", 1.0), ("b", 9.0), ("c", 5.0), ("d", 7.0)] {
            records.insert(fp.to_string(), record_with_score(score, 1));
        }
        let ranked = select(records, Field::Score, None, Some(3));
        let scores: Vec<f64> = ranked.iter().map(|(_, r)| r.score).collect();
        assert_eq!(scores, vec![9.0, 7.0, 5.0]);
    }

    #[test]
    fn test_sort_by_another_field() {
        let mut records = HashMap::new();
        records.insert("a".to_string(), record_with_score(1.0, 3));
        records.insert("b".to_string(), record_with_score(9.0, 7));
        let ranked = select(records, Field::Count, None, None);
        assert_eq!(ranked[0].1.count, 7);
    }

    #[test]
    fn test_ties_break_deterministically() {
        let mut records = HashMap::new();
        records.insert("zz".to_string(), record_with_score(5.0, 1));
        records.insert("aa".to_string(), record_with_score(5.0, 1));
        let ranked = select(records, Field::Score, None, None);
        assert_eq!(ranked[0].0, "aa");
        assert_eq!(ranked[1].0, "zz");
    }

    #[test]
    fn test_two_statements_sharing_a_header_become_one_record() {
        let log = "\
# Time: 070119 11:12:13
# User@Host: app[app] @ web1.example.com [10.0.0.1]
# Query_time: 1.0  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 10
SELECT * FROM orders WHERE id=11;
# Query_time: 2.0  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 10
SELECT * FROM orders WHERE id=42;
";
        let filter = FilterConfig {
            include_local: true,
            include_remote: true,
            local_names: vec!["db1".to_string()],
            ..FilterConfig::default()
        };
        let mut agg = Aggregator::new(filter.local_names.clone());
        for event in parse_log(log.as_bytes()) {
            let event = event.unwrap();
            let local = filter.admit(&event).unwrap();
            agg.fold(event, local);
        }
        let mut digest = agg.finish();
        stats::summarize(&mut digest);
        crate::score::apply(&mut digest, &Weights::default());

        assert_eq!(digest.records.len(), 1);
        let ranked = select(digest.records, Field::Score, None, None);
        let record = &ranked[0].1;
        assert_eq!(record.count, 2);
        assert_eq!(record.query_seconds.stat(Stat::Min), 1.0);
        assert_eq!(record.query_seconds.stat(Stat::Max), 2.0);
        assert_eq!(record.query_seconds.stat(Stat::Total), 3.0);
        assert_eq!(record.query_seconds.stat(Stat::Median), 1.5);
        assert!(!record.is_constant);
        assert_eq!(record.queries.len(), 2);
        assert_eq!(record.query_example, "SELECT * FROM orders WHERE id=11;");
    }
}

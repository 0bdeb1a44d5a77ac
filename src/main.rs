mod parser;
mod fingerprint;
mod filter;
mod aggregator;
mod stats;
mod score;
mod report;

use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use crate::aggregator::Aggregator;
use crate::filter::{FilterConfig, QueryPattern};
use crate::score::{Field, WeightSpec, Weights};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the slow query log file(s); reads stdin when omitted
    #[arg(long = "files", num_args = 1..)]
    files: Vec<PathBuf>,

    /// Output file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Drop queries issued from this machine
    #[arg(long)]
    no_local: bool,

    /// Drop queries issued from other machines
    #[arg(long)]
    no_remote: bool,

    /// Only report these hosts (comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "hide_hosts")]
    show_hosts: Vec<String>,

    /// Never report these hosts (comma separated)
    #[arg(long, value_delimiter = ',')]
    hide_hosts: Vec<String>,

    /// Only report these users (comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "hide_users")]
    show_users: Vec<String>,

    /// Never report these users (comma separated)
    #[arg(long, value_delimiter = ',')]
    hide_users: Vec<String>,

    /// Only report these databases (comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "hide_databases")]
    show_databases: Vec<String>,

    /// Never report these databases (comma separated)
    #[arg(long, value_delimiter = ',')]
    hide_databases: Vec<String>,

    /// Only report queries matching this pattern
    #[arg(long)]
    grep: Option<QueryPattern>,

    /// Field to rank the report by
    #[arg(long, default_value = "score")]
    sort: Field,

    /// Drop entries whose sort field is below this value
    #[arg(long, conflicts_with = "top")]
    squelch: Option<f64>,

    /// Keep only the N highest entries
    #[arg(long)]
    top: Option<usize>,

    /// Override a score weight, e.g. --weight query_seconds_total=3.0
    #[arg(long = "weight")]
    weights: Vec<WeightSpec>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut weights = Weights::default();
    weights.apply_overrides(&args.weights);

    let filter = FilterConfig {
        include_local: !args.no_local,
        include_remote: !args.no_remote,
        local_names: filter::local_names(),
        show_hosts: args.show_hosts,
        hide_hosts: args.hide_hosts,
        show_users: args.show_users,
        hide_users: args.hide_users,
        show_databases: args.show_databases,
        hide_databases: args.hide_databases,
        grep: args.grep.map(|pattern| pattern.0),
    };

    let readers: Vec<Box<dyn io::BufRead>> = if !args.files.is_empty() {
        let mut list = Vec::new();
        for path in args.files {
            match File::open(&path) {
                Ok(file) => {
                    list.push(Box::new(BufReader::new(file)) as Box<dyn io::BufRead>);
                }
                Err(e) => {
                    eprintln!("Warning: Could not open file {:?}: {}", path, e);
                }
            }
        }
        list
    } else {
        vec![Box::new(BufReader::new(io::stdin()))]
    };

    let mut aggregator = Aggregator::new(filter.local_names.clone());
    for item in readers.into_iter().flat_map(parser::parse_log) {
        let event = item?;
        if let Some(local) = filter.admit(&event) {
            aggregator.fold(event, local);
        }
    }

    let mut digest = aggregator.finish();
    stats::summarize(&mut digest);
    score::apply(&mut digest, &weights);

    report::print_report(digest, args.sort, args.squelch, args.top, args.output.as_ref())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_and_hide_for_one_dimension_conflict() {
        let result = Args::try_parse_from([
            "slowlog-triage",
            "--show-hosts",
            "db1",
            "--hide-hosts",
            "db2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_squelch_and_top_conflict() {
        let result = Args::try_parse_from(["slowlog-triage", "--squelch", "5", "--top", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_sort_field_is_a_usage_error() {
        let result = Args::try_parse_from(["slowlog-triage", "--sort", "rows_eaten"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["slowlog-triage"]).unwrap();
        assert_eq!(args.sort, Field::Score);
        assert!(args.squelch.is_none());
        assert!(args.top.is_none());
        assert!(!args.no_local);
        assert!(!args.no_remote);
    }
}

use anyhow::Result;
use regex::Regex;
use std::io::BufRead;
use std::sync::OnceLock;

/// One logged statement plus the header metadata that was in effect
/// when the server wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEvent {
    pub timestamp: String,
    pub user: String,
    pub host: String,
    pub ip: String,
    pub database: String,
    pub query_seconds: f64,
    pub lock_time: f64,
    pub rows_sent: u64,
    pub rows_examined: u64,
    pub query_text: String,
}

static RE_BANNER: OnceLock<Regex> = OnceLock::new();
static RE_COLUMNS: OnceLock<Regex> = OnceLock::new();
static RE_TIME: OnceLock<Regex> = OnceLock::new();
static RE_USER_HOST: OnceLock<Regex> = OnceLock::new();
static RE_METRICS: OnceLock<Regex> = OnceLock::new();
static RE_USE: OnceLock<Regex> = OnceLock::new();
static RE_SET: OnceLock<Regex> = OnceLock::new();

/// Header values carried forward between statements. The server only
/// re-emits a header line when a value changes, so every statement is
/// stamped with the last values seen, however long ago they appeared.
#[derive(Debug, Default, Clone)]
struct Carried {
    timestamp: String,
    user: String,
    host: String,
    ip: String,
    database: String,
    query_seconds: f64,
    lock_time: f64,
    rows_sent: u64,
    rows_examined: u64,
}

impl Carried {
    fn event(&self, query_text: String) -> QueryEvent {
        QueryEvent {
            timestamp: self.timestamp.clone(),
            user: self.user.clone(),
            host: self.host.clone(),
            ip: self.ip.clone(),
            database: self.database.clone(),
            query_seconds: self.query_seconds,
            lock_time: self.lock_time,
            rows_sent: self.rows_sent,
            rows_examined: self.rows_examined,
            query_text,
        }
    }
}

/// Streams `QueryEvent`s out of a slow query log.
pub struct LogParser<R> {
    reader: R,
    carried: Carried,
    body: String,
    read_buffer: String,
}

impl<R: BufRead> LogParser<R> {
    /// Creates a new `LogParser` for the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            carried: Carried::default(),
            body: String::new(),
            read_buffer: String::new(),
        }
    }

    /// Consumes one line, returning an event when the line terminates a
    /// statement. Header lines update the carried state and emit nothing.
    fn consume_line(&mut self, line: &str) -> Option<QueryEvent> {
        if is_noise(line) {
            return None;
        }

        let re_time = RE_TIME.get_or_init(|| {
            Regex::new(r"^# Time:\s+(\d{2})(\d{2})(\d{2})\s+(\d{1,2}):(\d{2}):(\d{2})").unwrap()
        });
        if let Some(caps) = re_time.captures(line) {
            self.carried.timestamp = format!(
                "{}/{}/{} {:0>2}:{}:{}",
                &caps[1], &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]
            );
            return None;
        }

        let re_user_host = RE_USER_HOST.get_or_init(|| {
            Regex::new(r"^# User@Host:\s*(\S*?)(?:\[[^\]]*\])?\s+@\s+(\S*)\s*\[([^\]]*)\]")
                .unwrap()
        });
        if let Some(caps) = re_user_host.captures(line) {
            self.carried.user = caps[1].to_string();
            self.carried.host = caps[2].to_string();
            self.carried.ip = caps[3].to_string();
            return None;
        }

        let re_metrics = RE_METRICS.get_or_init(|| {
            Regex::new(r"^# Query_time:\s*([\d.]+)\s+Lock_time:\s*([\d.]+)\s+Rows_sent:\s*(\d+)\s+Rows_examined:\s*(\d+)").unwrap()
        });
        if let Some(caps) = re_metrics.captures(line) {
            self.carried.query_seconds = caps[1].parse().unwrap_or(0.0);
            self.carried.lock_time = caps[2].parse().unwrap_or(0.0);
            self.carried.rows_sent = caps[3].parse().unwrap_or(0);
            self.carried.rows_examined = caps[4].parse().unwrap_or(0);
            return None;
        }

        let re_use = RE_USE.get_or_init(|| Regex::new(r"(?i)^use\s+([^;\s]+)\s*;").unwrap());
        if let Some(caps) = re_use.captures(line) {
            self.carried.database = caps[1].to_string();
            return None;
        }

        // A `set` preamble belongs to the statement that follows it, even
        // though the line itself ends in a semicolon.
        let re_set = RE_SET.get_or_init(|| Regex::new(r"(?i)^set\b").unwrap());
        if re_set.is_match(line) {
            self.body.push_str(line);
            self.body.push('\n');
            return None;
        }

        if line.trim_end().ends_with(';') {
            let mut query_text = std::mem::take(&mut self.body);
            query_text.push_str(line);
            return Some(self.carried.event(query_text));
        }

        // Anything unrecognized is part of the statement under construction.
        self.body.push_str(line);
        self.body.push('\n');
        None
    }
}

fn is_noise(line: &str) -> bool {
    let re_banner = RE_BANNER.get_or_init(|| Regex::new(r"^\S+, Version: ").unwrap());
    let re_columns =
        RE_COLUMNS.get_or_init(|| Regex::new(r"^Time\s+Id\s+Command\s+Argument").unwrap());
    line.trim().is_empty()
        || line.starts_with("Tcp port:")
        || re_banner.is_match(line)
        || re_columns.is_match(line)
}

impl<R: BufRead> Iterator for LogParser<R> {
    type Item = Result<QueryEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.read_buffer.clear();
            match self.reader.read_line(&mut self.read_buffer) {
                // EOF: a body with no terminator never became a statement.
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(anyhow::anyhow!(e))),
            }

            let line = self.read_buffer.trim_end_matches(['\r', '\n']).to_string();
            if let Some(event) = self.consume_line(&line) {
                return Some(Ok(event));
            }
        }
    }
}

/// Convenience function to create a `LogParser`.
pub fn parse_log<R: BufRead>(reader: R) -> LogParser<R> {
    LogParser::new(reader)
}

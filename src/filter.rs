use crate::parser::QueryEvent;
use regex::{Regex, RegexBuilder};
use std::str::FromStr;

/// A query text pattern compiled case-insensitive and multi-line, with
/// `.` matching newlines, so it can be applied to whole statement bodies.
#[derive(Debug, Clone)]
pub struct QueryPattern(pub Regex);

impl FromStr for QueryPattern {
    type Err = regex::Error;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()
            .map(QueryPattern)
    }
}

/// Admission rules assembled from the command line. Show and hide lists
/// for the same dimension are rejected before any input is read.
#[derive(Debug, Default)]
pub struct FilterConfig {
    pub include_local: bool,
    pub include_remote: bool,
    pub local_names: Vec<String>,
    pub show_hosts: Vec<String>,
    pub hide_hosts: Vec<String>,
    pub show_users: Vec<String>,
    pub hide_users: Vec<String>,
    pub show_databases: Vec<String>,
    pub hide_databases: Vec<String>,
    pub grep: Option<Regex>,
}

impl FilterConfig {
    /// Decides whether an event enters the aggregate. Returns whether the
    /// event originated on this machine when it passes every check, `None`
    /// when it is dropped.
    pub fn admit(&self, event: &QueryEvent) -> Option<bool> {
        let local = self.local_names.iter().any(|name| name == &event.host);
        if local && !self.include_local {
            return None;
        }
        if !local && !self.include_remote {
            return None;
        }
        if !listed(&self.show_hosts, &self.hide_hosts, &event.host)
            || !listed(&self.show_users, &self.hide_users, &event.user)
            || !listed(&self.show_databases, &self.hide_databases, &event.database)
        {
            return None;
        }
        if let Some(re) = &self.grep {
            if !re.is_match(&event.query_text) {
                return None;
            }
        }
        Some(local)
    }
}

fn listed(show: &[String], hide: &[String], value: &str) -> bool {
    if !show.is_empty() && !show.iter().any(|v| v == value) {
        return false;
    }
    !hide.iter().any(|v| v == value)
}

/// Names this machine answers to, for the locality check.
pub fn local_names() -> Vec<String> {
    vec![
        machine_hostname(),
        "localhost".to_string(),
        "localhost.localdomain".to_string(),
    ]
}

fn machine_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    if let Ok(contents) = std::fs::read_to_string("/etc/hostname") {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    "localhost".to_string()
}

//! Nagios performance-data block parsing.
//!
//! A spool file holds one block per line: tab-separated `KEY::VALUE` pairs
//! as written by the monitoring host's perfdata template. Every perfdata
//! metric in a block becomes one [`Record`].

use std::collections::HashMap;

use nagflux_core::{Record, TargetFilter};
use tracing::warn;

/// Turns spool-file blocks into records.
#[derive(Debug, Clone)]
pub struct PerfdataParser {
    /// Measurement / index bucket every spool record lands in.
    table: String,
    /// Service name given to host checks, which carry none of their own.
    hostcheck_alias: String,
    /// Filter applied to every spool record.
    default_filter: TargetFilter,
}

impl PerfdataParser {
    pub fn new(
        table: impl Into<String>,
        hostcheck_alias: impl Into<String>,
        default_filter: TargetFilter,
    ) -> Self {
        Self {
            table: table.into(),
            hostcheck_alias: hostcheck_alias.into(),
            default_filter,
        }
    }

    pub fn hostcheck_alias(&self) -> &str {
        &self.hostcheck_alias
    }

    /// Parse a whole spool file. Blocks that cannot be parsed are skipped
    /// with a warning; the rest still produce records.
    pub fn parse_content(&self, content: &str) -> Vec<Record> {
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .flat_map(|line| self.parse_block(line))
            .collect()
    }

    /// Parse one performance-data block into zero or more records.
    pub fn parse_block(&self, block: &str) -> Vec<Record> {
        let entries: HashMap<&str, &str> = block
            .trim()
            .split('\t')
            .filter_map(|pair| pair.split_once("::"))
            .collect();

        let Some(&datatype) = entries.get("DATATYPE") else {
            warn!("spool block without DATATYPE, skipping");
            return Vec::new();
        };
        let (service_key, perfdata_key, command_key) = match datatype {
            "SERVICEPERFDATA" => ("SERVICEDESC", "SERVICEPERFDATA", "SERVICECHECKCOMMAND"),
            "HOSTPERFDATA" => ("", "HOSTPERFDATA", "HOSTCHECKCOMMAND"),
            other => {
                warn!(datatype = other, "unsupported spool datatype, skipping");
                return Vec::new();
            }
        };

        let Some(&host) = entries.get("HOSTNAME") else {
            warn!("spool block without HOSTNAME, skipping");
            return Vec::new();
        };
        let Some(timestamp_millis) = entries
            .get("TIMET")
            .and_then(|t| t.parse::<u64>().ok())
            .map(|secs| secs * 1000)
        else {
            warn!(host, "spool block without numeric TIMET, skipping");
            return Vec::new();
        };
        let service = if service_key.is_empty() {
            self.hostcheck_alias.as_str()
        } else {
            entries.get(service_key).copied().unwrap_or_default()
        };
        let Some(&perfdata) = entries.get(perfdata_key) else {
            return Vec::new();
        };
        // The command name is everything before the first argument marker.
        let command = entries
            .get(command_key)
            .map(|c| c.split('!').next().unwrap_or(c))
            .unwrap_or_default();

        parse_perfdata(perfdata)
            .into_iter()
            .map(|metric| {
                let mut record = Record::new(&self.table, timestamp_millis.to_string())
                    .with_filter(self.default_filter)
                    .tag("host", host)
                    .tag("performanceLabel", metric.label)
                    .field("value", metric.value);
                if !service.is_empty() {
                    record = record.tag("service", service);
                }
                if !command.is_empty() {
                    record = record.tag("command", command);
                }
                for (name, threshold) in [
                    ("warn", metric.warn),
                    ("crit", metric.crit),
                    ("min", metric.min),
                    ("max", metric.max),
                ] {
                    if let Some(value) = threshold {
                        record = record.field(name, value);
                    }
                }
                record
            })
            .collect()
    }
}

#[derive(Debug, PartialEq)]
struct PerfMetric {
    label: String,
    value: String,
    warn: Option<String>,
    crit: Option<String>,
    min: Option<String>,
    max: Option<String>,
}

/// Parse a perfdata string: space-separated metrics of the shape
/// `label=value[UOM][;warn[;crit[;min[;max]]]]`, labels optionally
/// single-quoted (and then allowed to contain spaces).
fn parse_perfdata(perfdata: &str) -> Vec<PerfMetric> {
    split_metrics(perfdata)
        .into_iter()
        .filter_map(|token| parse_metric(&token))
        .collect()
}

fn split_metrics(perfdata: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in perfdata.chars() {
        match c {
            '\'' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ' ' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_metric(token: &str) -> Option<PerfMetric> {
    let (raw_label, rest) = split_label(token)?;
    let mut parts = rest.split(';');
    let value = numeric_prefix(parts.next()?)?;
    let mut threshold = || parts.next().and_then(numeric_prefix);
    Some(PerfMetric {
        label: raw_label,
        value,
        warn: threshold(),
        crit: threshold(),
        min: threshold(),
        max: threshold(),
    })
}

fn split_label(token: &str) -> Option<(String, &str)> {
    if let Some(stripped) = token.strip_prefix('\'') {
        let (label, rest) = stripped.split_once('\'')?;
        Some((label.to_string(), rest.strip_prefix('=')?))
    } else {
        let (label, rest) = token.split_once('=')?;
        if label.is_empty() {
            return None;
        }
        Some((label.to_string(), rest))
    }
}

/// The leading numeric part of a value token, shedding any trailing unit.
/// Non-numeric tokens (ranges like `10:20` included) yield nothing.
fn numeric_prefix(token: &str) -> Option<String> {
    let token = token.trim();
    let end = token
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_digit()
                || *c == '.'
                || ((*c == '-' || *c == '+') && *i == 0)
        })
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    let numeric = &token[..end];
    numeric.parse::<f64>().ok()?;
    Some(numeric.to_string())
}

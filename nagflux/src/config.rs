//! TOML configuration of the daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use nagflux_core::{TargetFilter, TargetKind};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub main: MainConfig,
    /// Optional; without it records flow through unenriched.
    pub livestatus: Option<LivestatusConfig>,
    #[serde(default)]
    pub influx: Vec<InfluxTarget>,
    #[serde(default)]
    pub elasticsearch: Vec<ElasticTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainConfig {
    /// Directory the monitoring host writes performance-data files to.
    pub spool_directory: PathBuf,
    /// Optional drop directory for user-supplied CSV files.
    pub textfile_directory: Option<PathBuf>,
    #[serde(default = "default_textfile_separator")]
    pub textfile_separator: char,
    #[serde(default = "default_spool_workers")]
    pub spool_workers: usize,
    /// Read-buffer capacity of each parser-worker, in bytes.
    #[serde(default = "default_file_buffer_size")]
    pub file_buffer_size: usize,
    /// Measurement / index bucket of spool records.
    #[serde(default = "default_table")]
    pub table: String,
    /// Service name given to host checks.
    #[serde(default = "default_hostcheck_alias")]
    pub hostcheck_alias: String,
    /// Which targets plain spool records address.
    #[serde(default = "default_target_name")]
    pub default_target: String,
    /// How long files must sit untouched before they are consumed.
    #[serde(default = "default_min_file_age_secs")]
    pub min_file_age_secs: u64,
    /// Substring scrubbed out of line-protocol output.
    #[serde(default)]
    pub nasty_string: String,
    #[serde(default)]
    pub nasty_string_to_replace: String,
    /// `host:port` of the Prometheus scrape endpoint; omit to disable.
    pub metrics_listen: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LivestatusConfig {
    /// `host:port` for tcp, a socket path for unix.
    pub address: String,
    #[serde(default = "default_connection_type")]
    pub connection_type: String,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxTarget {
    #[serde(default = "default_influx_name")]
    pub name: String,
    /// Base URL, e.g. `http://127.0.0.1:8086`.
    pub address: String,
    #[serde(default = "default_database")]
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_influx_version")]
    pub version: String,
    pub dump_file: Option<PathBuf>,
    #[serde(default = "default_target_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_data_timeout_secs")]
    pub data_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticTarget {
    #[serde(default = "default_elastic_name")]
    pub name: String,
    /// Base URL, e.g. `http://127.0.0.1:9200`.
    pub address: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_elastic_version")]
    pub version: String,
    pub dump_file: Option<PathBuf>,
    #[serde(default = "default_target_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_data_timeout_secs")]
    pub data_timeout_secs: u64,
}

fn default_textfile_separator() -> char {
    '&'
}
fn default_spool_workers() -> usize {
    4
}
fn default_file_buffer_size() -> usize {
    8192
}
fn default_table() -> String {
    "metrics".to_string()
}
fn default_hostcheck_alias() -> String {
    "hostcheck".to_string()
}
fn default_target_name() -> String {
    "all".to_string()
}
fn default_min_file_age_secs() -> u64 {
    10
}
fn default_connection_type() -> String {
    "tcp".to_string()
}
fn default_refresh_interval_secs() -> u64 {
    5
}
fn default_influx_name() -> String {
    "influx".to_string()
}
fn default_database() -> String {
    "nagflux".to_string()
}
fn default_influx_version() -> String {
    "1.0".to_string()
}
fn default_elastic_name() -> String {
    "elastic".to_string()
}
fn default_index() -> String {
    "nagflux".to_string()
}
fn default_elastic_version() -> String {
    "2.1".to_string()
}
fn default_target_workers() -> usize {
    2
}
fn default_queue_size() -> usize {
    1024
}
fn default_max_batch_size() -> usize {
    10_000
}
fn default_data_timeout_secs() -> u64 {
    20
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file `{}`", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("could not parse config file `{}`", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.influx.is_empty() || !self.elasticsearch.is_empty(),
            "no targets configured"
        );
        let mut names: Vec<&str> = self
            .influx
            .iter()
            .map(|t| t.name.as_str())
            .chain(self.elasticsearch.iter().map(|t| t.name.as_str()))
            .collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        anyhow::ensure!(before == names.len(), "target names must be unique");
        Ok(())
    }

    /// Queue specs in construction order: influx targets first, then
    /// elasticsearch. The sender pools consume the receivers in the same
    /// order.
    pub fn target_specs(&self) -> Vec<(String, TargetKind, usize)> {
        self.influx
            .iter()
            .map(|t| (t.name.clone(), TargetKind::Influx, t.queue_size))
            .chain(
                self.elasticsearch
                    .iter()
                    .map(|t| (t.name.clone(), TargetKind::Elastic, t.queue_size)),
            )
            .collect()
    }

    pub fn min_file_age(&self) -> Duration {
        Duration::from_secs(self.main.min_file_age_secs)
    }

    pub fn default_filter(&self) -> TargetFilter {
        TargetFilter::parse(&self.main.default_target).or_all()
    }
}

impl InfluxTarget {
    pub fn dump_file(&self) -> PathBuf {
        self.dump_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.dump", self.name)))
    }
}

impl ElasticTarget {
    pub fn dump_file(&self) -> PathBuf {
        self.dump_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.dump", self.name)))
    }
}

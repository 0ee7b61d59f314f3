//! Component wiring and ordered shutdown.
//!
//! Construction: cache builder, sender pools, then the collectors.
//! Shutdown runs the reverse: collectors stop producing first, the parser
//! pool drains, every sender pool takes its last flush or spill, the cache
//! builder goes last.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use nagflux_collector::{
    SpoolCollector, SpoolCollectorConfig, TextfileCollector, TextfileCollectorConfig,
};
use nagflux_core::{MetricsCollector, PauseState, ResultQueues};
use nagflux_livestatus::{CacheBuilder, CacheReader, ConnectionType, Connector};
use nagflux_target::{
    ElasticConnector, ElasticFormatter, InfluxConnector, InfluxFormatter, RecordFormatter,
    Sanitize, SenderConfig, SenderPool, TargetConnector,
};

use crate::config::Config;

struct TargetSetup {
    connector: Arc<dyn TargetConnector>,
    formatter: Arc<dyn RecordFormatter>,
    workers: usize,
    sender_config: SenderConfig,
}

/// The running ingestion graph.
pub struct Pipeline {
    spool: SpoolCollector,
    textfile: Option<TextfileCollector>,
    senders: Vec<SenderPool>,
    cache: Option<CacheBuilder>,
}

impl Pipeline {
    pub fn start(
        config: &Config,
        pause: Arc<PauseState>,
        metrics: Arc<MetricsCollector>,
    ) -> anyhow::Result<Self> {
        let sanitize = Sanitize::new(
            &config.main.nasty_string,
            &config.main.nasty_string_to_replace,
        );

        let mut setups: Vec<TargetSetup> = Vec::new();
        for target in &config.influx {
            let credentials = target
                .username
                .clone()
                .zip(target.password.clone());
            let connector =
                InfluxConnector::new(&target.name, &target.address, &target.database, credentials)
                    .with_context(|| format!("could not build HTTP client for `{}`", target.name))?;
            let mut sender_config = SenderConfig::new(target.dump_file());
            sender_config.max_batch_size = target.max_batch_size;
            sender_config.data_timeout = Duration::from_secs(target.data_timeout_secs);
            setups.push(TargetSetup {
                connector: Arc::new(connector),
                formatter: Arc::new(InfluxFormatter::new(&target.version, sanitize.clone())),
                workers: target.workers,
                sender_config,
            });
        }
        for target in &config.elasticsearch {
            let connector = ElasticConnector::new(&target.name, &target.address, &target.index)
                .with_context(|| format!("could not build HTTP client for `{}`", target.name))?;
            let mut sender_config = SenderConfig::new(target.dump_file());
            sender_config.max_batch_size = target.max_batch_size;
            sender_config.data_timeout = Duration::from_secs(target.data_timeout_secs);
            setups.push(TargetSetup {
                connector: Arc::new(connector),
                formatter: Arc::new(ElasticFormatter::new(&target.version, &target.index)),
                workers: target.workers,
                sender_config,
            });
        }

        let (queues, receivers) = ResultQueues::bounded(&config.target_specs());

        let (cache, cache_reader) = match &config.livestatus {
            Some(livestatus) => {
                let connection_type: ConnectionType = livestatus
                    .connection_type
                    .parse()
                    .context("invalid livestatus connection type")?;
                let connector = Connector::new(&livestatus.address, connection_type);
                let builder = CacheBuilder::spawn(
                    connector,
                    Duration::from_secs(livestatus.refresh_interval_secs),
                );
                let reader = builder.reader();
                (Some(builder), reader)
            }
            None => (None, CacheReader::empty()),
        };

        let senders: Vec<SenderPool> = setups
            .into_iter()
            .zip(receivers)
            .map(|(setup, receiver)| {
                SenderPool::spawn(
                    setup.connector,
                    setup.formatter,
                    receiver,
                    setup.workers,
                    setup.sender_config,
                    pause.clone(),
                    metrics.clone(),
                )
            })
            .collect();

        let mut spool_config = SpoolCollectorConfig::new(&config.main.spool_directory);
        spool_config.workers = config.main.spool_workers;
        spool_config.file_buffer_size = config.main.file_buffer_size;
        spool_config.table = config.main.table.clone();
        spool_config.hostcheck_alias = config.main.hostcheck_alias.clone();
        spool_config.default_filter = config.default_filter();
        spool_config.min_file_age = config.min_file_age();
        let spool = SpoolCollector::spawn(
            spool_config,
            queues.clone(),
            cache_reader,
            pause.clone(),
            metrics.clone(),
        );

        let textfile = config.main.textfile_directory.as_ref().map(|directory| {
            let mut textfile_config =
                TextfileCollectorConfig::new(directory, config.main.textfile_separator);
            textfile_config.min_file_age = config.min_file_age();
            TextfileCollector::spawn(textfile_config, queues, pause.clone())
        });

        Ok(Self {
            spool,
            textfile,
            senders,
            cache,
        })
    }

    /// Ordered shutdown, reverse of construction.
    pub async fn stop(self) {
        if let Some(textfile) = self.textfile {
            textfile.stop().await;
        }
        self.spool.stop().await;
        for pool in self.senders {
            pool.stop().await;
        }
        if let Some(cache) = self.cache {
            cache.stop().await;
        }
    }
}

//! External-file (CSV) collector.
//!
//! Users drop CSV files into a directory to inject arbitrary records into
//! the pipeline. The first row is a self-describing header; `table` and
//! `time` are required, `target` selects the filter, `t_`/`f_` prefixes
//! name tags and fields.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nagflux_core::{ENQUEUE_TIMEOUT, PauseState, Record, ResultQueues, TargetFilter};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CollectError;
use crate::files::{self, DIRECTORY_SCAN_INTERVAL, MIN_FILE_AGE};

const REQUIRED_COLUMNS: &[&str] = &["table", "time"];

#[derive(Debug, Clone)]
pub struct TextfileCollectorConfig {
    pub directory: PathBuf,
    /// Cell separator of the dropped files.
    pub separator: char,
    pub scan_interval: Duration,
    pub min_file_age: Duration,
    pub enqueue_timeout: Duration,
}

impl TextfileCollectorConfig {
    pub fn new(directory: impl Into<PathBuf>, separator: char) -> Self {
        Self {
            directory: directory.into(),
            separator,
            scan_interval: DIRECTORY_SCAN_INTERVAL,
            min_file_age: MIN_FILE_AGE,
            enqueue_timeout: ENQUEUE_TIMEOUT,
        }
    }
}

/// Tick loop over the user drop directory.
pub struct TextfileCollector {
    quit: CancellationToken,
    handle: JoinHandle<()>,
}

impl TextfileCollector {
    pub fn spawn(
        config: TextfileCollectorConfig,
        results: ResultQueues,
        pause: Arc<PauseState>,
    ) -> Self {
        let quit = CancellationToken::new();
        let handle = tokio::spawn(run(config, results, pause, quit.clone()));
        Self { quit, handle }
    }

    pub async fn stop(self) {
        self.quit.cancel();
        let _ = self.handle.await;
        debug!("textfile collector stopped");
    }
}

async fn run(
    config: TextfileCollectorConfig,
    results: ResultQueues,
    pause: Arc<PauseState>,
    quit: CancellationToken,
) {
    let mut tick = tokio::time::interval(config.scan_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = quit.cancelled() => break,
            _ = tick.tick() => {
                if !collect_once(&config, &results, &pause, &quit).await {
                    break;
                }
            }
        }
    }
}

/// One pass over the drop directory. Returns `false` on quit.
async fn collect_once(
    config: &TextfileCollectorConfig,
    results: &ResultQueues,
    pause: &PauseState,
    quit: &CancellationToken,
) -> bool {
    if pause.is_any_target_on_pause() {
        debug!("textfile collector paused");
        return true;
    }

    let ready = match files::files_older_than(&config.directory, config.min_file_age) {
        Ok(ready) => ready,
        Err(error) => {
            warn!(
                directory = %config.directory.display(),
                error = %error,
                "failed to read textfile directory"
            );
            return true;
        }
    };

    for path in ready {
        match parse_file(&path, config.separator) {
            Ok(records) => {
                for record in records {
                    if !results.offer(record, quit).await {
                        // Quit mid-file: leave it for the next run.
                        return false;
                    }
                }
                if let Err(error) = std::fs::remove_file(&path) {
                    warn!(file = %path.display(), error = %error, "could not delete textfile");
                }
            }
            Err(error) if error.is_unreadable() => {
                warn!(error = %error, "leaving textfile in place");
            }
            Err(error) => {
                // Malformed but readable: consume it so the warning does
                // not repeat every tick.
                warn!(error = %error, "discarding malformed textfile");
                if let Err(remove_error) = std::fs::remove_file(&path) {
                    warn!(file = %path.display(), error = %remove_error, "could not delete textfile");
                }
            }
        }
    }
    true
}

fn parse_file(path: &Path, separator: char) -> Result<Vec<Record>, CollectError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| CollectError::unreadable(path, source))?;
    parse_content(path, &content, separator)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Table,
    Time,
    Target,
    Tag(String),
    Field(String),
    Skip,
}

fn parse_content(
    origin: &Path,
    content: &str,
    separator: char,
) -> Result<Vec<Record>, CollectError> {
    let mut lines = content.lines();
    let header = lines.next().ok_or_else(|| CollectError::EmptyFile {
        file: origin.to_path_buf(),
    })?;

    let names = split_row(header, separator);
    if REQUIRED_COLUMNS
        .iter()
        .any(|required| !names.iter().any(|name| name == required))
    {
        return Err(CollectError::MissingColumns {
            file: origin.to_path_buf(),
            required: REQUIRED_COLUMNS,
        });
    }

    let columns: Vec<Column> = names
        .iter()
        .map(|name| match name.as_str() {
            "table" => Column::Table,
            "time" => Column::Time,
            "target" => Column::Target,
            _ => {
                if let Some(tag) = name.strip_prefix("t_") {
                    Column::Tag(tag.to_string())
                } else if let Some(field) = name.strip_prefix("f_") {
                    Column::Field(field.to_string())
                } else {
                    warn!(
                        file = %origin.display(),
                        column = %name,
                        "column does not fit the requirements, tags start with t_, fields with f_"
                    );
                    Column::Skip
                }
            }
        })
        .collect();

    let mut records = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_row(line, separator);
        let mut record = Record::new("", "").with_filter(TargetFilter::None);
        for (column, cell) in columns.iter().zip(cells) {
            if cell.is_empty() {
                continue;
            }
            match column {
                Column::Table => record.table = cell,
                Column::Time => record.timestamp = cell,
                Column::Target => record.filter = TargetFilter::parse(&cell),
                Column::Tag(name) => {
                    record.tags.insert(name.clone(), cell);
                }
                Column::Field(name) => {
                    record.fields.insert(name.clone(), cell);
                }
                Column::Skip => {}
            }
        }
        record.filter = record.filter.or_all();
        match record.validate() {
            Ok(()) => records.push(record),
            Err(error) => {
                warn!(file = %origin.display(), error = %error, "skipping textfile row");
            }
        }
    }
    Ok(records)
}

/// Split one CSV row on `separator`, honoring double-quoted cells with
/// `""` as the embedded-quote escape.
fn split_row(line: &str, separator: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == separator {
            cells.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    cells.push(current);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use nagflux_core::TargetKind;

    fn parse(content: &str, separator: char) -> Result<Vec<Record>, CollectError> {
        parse_content(Path::new("drop.csv"), content, separator)
    }

    #[test]
    fn header_and_row_produce_a_record() {
        let records = parse(
            "table;time;target;t_host;f_value\ncpu;1700000000000;all;srvA;0.42\n",
            ';',
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.table, "cpu");
        assert_eq!(record.timestamp, "1700000000000");
        assert_eq!(record.filter, TargetFilter::All);
        assert_eq!(record.tags.get("host").map(String::as_str), Some("srvA"));
        assert_eq!(record.fields.get("value").map(String::as_str), Some("0.42"));
    }

    #[test]
    fn missing_required_column_aborts_the_file() {
        let result = parse("table;t_host\ncpu;srvA\n", ';');
        assert!(matches!(
            result,
            Err(CollectError::MissingColumns { required, .. }) if required == REQUIRED_COLUMNS
        ));
    }

    #[test]
    fn empty_filter_defaults_to_all_and_named_filter_narrows() {
        let records = parse(
            "table&target&time&f_value\ntest&&1489474756000&1.0\ntest&influx&1489474756000&2.0\n",
            '&',
        )
        .unwrap();
        assert_eq!(records[0].filter, TargetFilter::All);
        assert_eq!(records[1].filter, TargetFilter::Influx);
    }

    #[test]
    fn empty_cells_are_omitted() {
        let records = parse(
            "table;time;t_host;f_value;f_extra\ncpu;1;;0.42;\n",
            ';',
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].tags.is_empty());
        assert_eq!(records[0].fields.len(), 1);
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let records = parse(
            "table;time;bogus\ncpu;1;whatever\n",
            ';',
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].tags.is_empty());
        assert!(records[0].fields.is_empty());
    }

    #[test]
    fn rows_violating_record_invariants_are_skipped() {
        // Second row has no table cell, third has a non-numeric time.
        let records = parse(
            "table;time;f_v\ncpu;1;2\n;1;2\ncpu;soon;2\n",
            ';',
        )
        .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn quoted_cells_keep_separator_and_escaped_quotes() {
        let cells = split_row(r#"a;"b;c";"say ""hi""""#, ';');
        assert_eq!(cells, vec!["a", "b;c", r#"say "hi""#]);
    }

    #[tokio::test]
    async fn collector_delivers_and_deletes_dropped_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("drop.csv");
        std::fs::write(
            &file,
            "table;time;target;t_host;f_value\ncpu;1700000000000;all;srvA;0.42\n",
        )
        .unwrap();

        let specs = vec![
            ("influx".to_string(), TargetKind::Influx, 4),
            ("elastic".to_string(), TargetKind::Elastic, 4),
        ];
        let (queues, mut receivers) = ResultQueues::bounded(&specs);

        let mut config = TextfileCollectorConfig::new(dir.path(), ';');
        config.scan_interval = Duration::from_millis(50);
        config.min_file_age = Duration::ZERO;

        let collector =
            TextfileCollector::spawn(config, queues, Arc::new(PauseState::new()));

        for receiver in &mut receivers {
            let record = tokio::time::timeout(Duration::from_secs(5), receiver.rx.recv())
                .await
                .expect("no record within deadline")
                .expect("queue closed");
            assert_eq!(record.table, "cpu");
            assert_eq!(record.tags.get("host").map(String::as_str), Some("srvA"));
        }

        for _ in 0..100 {
            if !file.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!file.exists(), "textfile not deleted");

        collector.stop().await;
    }

    #[tokio::test]
    async fn malformed_file_is_consumed_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("drop.csv");
        std::fs::write(&file, "table;t_host\ncpu;srvA\n").unwrap();

        let specs = vec![("influx".to_string(), TargetKind::Influx, 4)];
        let (queues, mut receivers) = ResultQueues::bounded(&specs);

        let mut config = TextfileCollectorConfig::new(dir.path(), ';');
        config.scan_interval = Duration::from_millis(50);
        config.min_file_age = Duration::ZERO;

        let collector =
            TextfileCollector::spawn(config, queues, Arc::new(PauseState::new()));

        for _ in 0..100 {
            if !file.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!file.exists(), "malformed textfile not consumed");
        assert!(receivers[0].rx.try_recv().is_err());

        collector.stop().await;
    }
}

//! Folding a run into one result row and writing it out.

use std::fmt::{self, Display, Write as _};
use std::io;
use std::path::{Path, PathBuf};

use annbench_error::{BenchError, ErrorCodes};
use chrono::{DateTime, Local};
use thiserror::Error;

use crate::driver::{ConstructionStats, EffectiveIndexConfig};
use crate::evaluator::EvaluationReport;

pub const BACKEND_COLUMN: &str = "index_backend";
pub const DATASET_COLUMN: &str = "dataset_name";
pub const INDEX_KWARGS_COLUMN: &str = "index_kwargs";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to create results directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write results to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl BenchError for ReportError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Io
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReportValue {
    Text(String),
    Float(f64),
    Integer(u64),
}

impl ReportValue {
    fn to_csv_field(&self) -> String {
        match self {
            ReportValue::Text(text) => text.clone(),
            ReportValue::Float(value) => value.to_string(),
            ReportValue::Integer(value) => value.to_string(),
        }
    }
}

impl Display for ReportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportValue::Text(text) => f.write_str(text),
            ReportValue::Float(value) => write!(f, "{value:.4}"),
            ReportValue::Integer(value) => write!(f, "{value}"),
        }
    }
}

/// One benchmark run, as an ordered list of named columns.
#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    columns: Vec<(String, ReportValue)>,
}

impl RunResult {
    pub fn new(
        backend: &str,
        dataset: &str,
        construction: &ConstructionStats,
        evaluation: &EvaluationReport,
        effective_config: &EffectiveIndexConfig,
    ) -> Self {
        let mut columns = vec![
            (
                BACKEND_COLUMN.to_string(),
                ReportValue::Text(backend.to_string()),
            ),
            (
                DATASET_COLUMN.to_string(),
                ReportValue::Text(dataset.to_string()),
            ),
            (
                "Index construction memory [MB]".to_string(),
                ReportValue::Float(construction.peak_memory_mb),
            ),
            (
                "Index construction time [s]".to_string(),
                ReportValue::Float(construction.seconds),
            ),
        ];
        for stats in &evaluation.recalls {
            columns.push((
                format!("Recall @ {} mean", stats.k),
                ReportValue::Float(stats.recall.mean),
            ));
            columns.push((
                format!("Recall @ {} std", stats.k),
                ReportValue::Float(stats.recall.std),
            ));
        }
        columns.extend([
            (
                "Query time mean [s]".to_string(),
                ReportValue::Float(evaluation.query_time.mean),
            ),
            (
                "Query time std [s]".to_string(),
                ReportValue::Float(evaluation.query_time.std),
            ),
            (
                "Queries evaluated".to_string(),
                ReportValue::Integer(evaluation.queries_evaluated as u64),
            ),
            (
                "Queries failed".to_string(),
                ReportValue::Integer(evaluation.queries_failed as u64),
            ),
            (
                INDEX_KWARGS_COLUMN.to_string(),
                ReportValue::Text(effective_config.to_json().to_string()),
            ),
        ]);
        RunResult { columns }
    }

    pub fn columns(&self) -> &[(String, ReportValue)] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&ReportValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    fn text(&self, column: &str) -> &str {
        match self.get(column) {
            Some(ReportValue::Text(text)) => text,
            _ => "",
        }
    }

    pub fn backend(&self) -> &str {
        self.text(BACKEND_COLUMN)
    }

    pub fn dataset(&self) -> &str {
        self.text(DATASET_COLUMN)
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Benchmark results:\n");
        for (name, value) in &self.columns {
            let _ = writeln!(out, "{name}: {value}");
        }
        out
    }

    pub fn csv_file_name(&self, timestamp: &DateTime<Local>) -> String {
        format!(
            "{}_{}_{}.csv",
            self.backend(),
            self.dataset(),
            timestamp.format(TIMESTAMP_FORMAT)
        )
    }

    /// Header row and a single data row.
    pub fn write_records<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.write_record(self.columns.iter().map(|(name, _)| name.as_str()))?;
        writer.write_record(self.columns.iter().map(|(_, value)| value.to_csv_field()))?;
        writer.flush()?;
        Ok(())
    }

    /// Write the CSV into `results_dir`, creating it if needed. A file with
    /// the same name is overwritten.
    pub fn write_csv(&self, results_dir: &Path) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(results_dir).map_err(|source| ReportError::CreateDir {
            path: results_dir.to_path_buf(),
            source,
        })?;
        let path = results_dir.join(self.csv_file_name(&Local::now()));
        csv::Writer::from_path(&path)
            .and_then(|mut writer| self.write_records(&mut writer))
            .map_err(|source| ReportError::Write {
                path: path.clone(),
                source,
            })?;
        tracing::info!("Wrote results to {}", path.display());
        Ok(path)
    }
}

impl Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::RecallStats;
    use crate::stats::Summary;
    use chrono::TimeZone;

    fn result() -> RunResult {
        let mut backend_options = serde_json::Map::new();
        backend_options.insert("ef_search".to_string(), serde_json::json!(64));
        RunResult::new(
            "hnsw",
            "GeMS_A1_DreaMS_rand50k",
            &ConstructionStats {
                peak_memory_mb: 512.25,
                seconds: 12.5,
            },
            &EvaluationReport {
                recalls: vec![
                    RecallStats {
                        k: 1,
                        recall: Summary {
                            mean: 2.0 / 3.0,
                            std: 0.4714045207910317,
                        },
                    },
                    RecallStats {
                        k: 10,
                        recall: Summary {
                            mean: 0.95,
                            std: 0.05,
                        },
                    },
                ],
                query_time: Summary {
                    mean: 0.00012,
                    std: 0.00001,
                },
                queries_evaluated: 3,
                queries_failed: 0,
            },
            &EffectiveIndexConfig {
                backend: "hnsw".to_string(),
                neighbor_width: 10,
                backend_options,
            },
        )
    }

    #[test]
    fn test_column_order() {
        let result = result();
        let names: Vec<&str> = result
            .columns()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "index_backend",
                "dataset_name",
                "Index construction memory [MB]",
                "Index construction time [s]",
                "Recall @ 1 mean",
                "Recall @ 1 std",
                "Recall @ 10 mean",
                "Recall @ 10 std",
                "Query time mean [s]",
                "Query time std [s]",
                "Queries evaluated",
                "Queries failed",
                "index_kwargs",
            ]
        );
    }

    #[test]
    fn test_render_uses_four_decimals() {
        let rendered = result().render();
        assert!(rendered.starts_with("Benchmark results:\n"));
        assert!(rendered.contains("Recall @ 1 mean: 0.6667\n"));
        assert!(rendered.contains("Recall @ 1 std: 0.4714\n"));
        assert!(rendered.contains("Index construction memory [MB]: 512.2500\n"));
        assert!(rendered.contains("Query time mean [s]: 0.0001\n"));
        assert!(rendered.contains("Queries evaluated: 3\n"));
        assert!(rendered.contains("index_backend: hnsw\n"));
    }

    #[test]
    fn test_kwargs_include_width() {
        let result = result();
        let Some(ReportValue::Text(kwargs)) = result.get(INDEX_KWARGS_COLUMN) else {
            panic!("index_kwargs missing");
        };
        let parsed: serde_json::Value = serde_json::from_str(kwargs).unwrap();
        assert_eq!(parsed, serde_json::json!({"ef_search": 64, "k": 10}));
    }

    #[test]
    fn test_csv_file_name() {
        let timestamp = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            result().csv_file_name(&timestamp),
            "hnsw_GeMS_A1_DreaMS_rand50k_2024-03-09_14-05-07.csv"
        );
    }

    fn csv_text(result: &RunResult) -> String {
        let mut writer = csv::Writer::from_writer(Vec::new());
        result.write_records(&mut writer).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_csv_quotes_json() {
        let csv = csv_text(&result());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("index_backend,dataset_name,"));
        assert!(lines[1].starts_with("hnsw,GeMS_A1_DreaMS_rand50k,512.25,12.5,"));
        assert!(lines[1].ends_with(r#","{""ef_search"":64,""k"":10}""#));
    }

    #[test]
    fn test_csv_reads_back() {
        let result = result();
        let csv = csv_text(&result);
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let header = reader.headers().unwrap().clone();
        let rows: Vec<csv::StringRecord> = reader.records().map(|row| row.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(header.len(), result.columns().len());
        assert_eq!(&header[4], "Recall @ 1 mean");
        assert_eq!(&rows[0][12], r#"{"ef_search":64,"k":10}"#);
    }

    #[test]
    fn test_write_csv_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("nested").join("results");
        let path = result().write_csv(&results_dir).unwrap();
        assert!(path.starts_with(&results_dir));
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("hnsw_GeMS_A1_DreaMS_rand50k_"));
        assert!(file_name.ends_with(".csv"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), csv_text(&result()));
    }

    #[test]
    fn test_unwritable_results_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let err = result().write_csv(&blocker.join("results")).unwrap_err();
        assert_eq!(err.code(), ErrorCodes::Io);
    }
}

use std::fs::File;
use std::path::Path;
use std::process::Command;

use annbench::config::BenchmarkConfig;
use annbench::report::ReportValue;
use annbench::{run_benchmark, BenchmarkRequest};
use annbench_error::{BenchError, ErrorCodes};
use annbench_index::BackendRegistry;
use ndarray::{Array2, Array3};
use ndarray_npy::WriteNpyExt;

const CORPUS_SIZE: usize = 40;
const QUERIES: usize = 6;
const DIM: usize = 8;
const DEPTH: usize = 10;

fn row(seed: usize) -> Vec<f32> {
    (0..DIM)
        .map(|j| (1.3 * seed as f64 + 0.7 * (j * j) as f64 + 0.1).sin() as f32)
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    dot / (na * nb)
}

/// Writes `corpus.npy`, `corpus.benchmark.npy` and `queries.npy`. Queries are
/// copies of the first corpus rows, so each query's nearest neighbor is itself.
fn write_dataset(data_dir: &Path) {
    let corpus: Vec<Vec<f32>> = (0..CORPUS_SIZE).map(row).collect();
    let flat: Vec<f32> = corpus.iter().flatten().copied().collect();
    Array2::from_shape_vec((CORPUS_SIZE, DIM), flat.clone())
        .unwrap()
        .write_npy(File::create(data_dir.join("corpus.npy")).unwrap())
        .unwrap();
    Array2::from_shape_vec((QUERIES, DIM), flat[..QUERIES * DIM].to_vec())
        .unwrap()
        .write_npy(File::create(data_dir.join("queries.npy")).unwrap())
        .unwrap();

    let mut truth = Array3::<f64>::zeros((QUERIES, 2, DEPTH));
    for q in 0..QUERIES {
        let mut ranked: Vec<(usize, f64)> = corpus
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine(&corpus[q], v)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, (index, similarity)) in ranked.into_iter().take(DEPTH).enumerate() {
            truth[[q, 0, rank]] = index as f64;
            truth[[q, 1, rank]] = similarity;
        }
    }
    truth
        .write_npy(File::create(data_dir.join("corpus.benchmark.npy")).unwrap())
        .unwrap();
}

fn config(root: &Path) -> BenchmarkConfig {
    BenchmarkConfig {
        data_dir: root.join("data"),
        results_dir: root.join("results"),
        query_dataset: "queries".to_string(),
        recall_cutoffs: vec![1, 5],
        progress: false,
        ..Default::default()
    }
}

fn request(backend: &str, options: serde_json::Value) -> BenchmarkRequest {
    BenchmarkRequest {
        backend: backend.to_string(),
        dataset: "corpus".to_string(),
        options: options.as_object().cloned().unwrap(),
    }
}

fn float(value: Option<&ReportValue>) -> f64 {
    match value {
        Some(ReportValue::Float(value)) => *value,
        other => panic!("expected a float, got {other:?}"),
    }
}

fn csv_files(dir: &Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_brute_force_run_has_perfect_recall() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("data")).unwrap();
    write_dataset(&root.path().join("data"));
    let config = config(root.path());

    let result = run_benchmark(
        &config,
        request("brute_force", serde_json::json!({})),
        &BackendRegistry::default(),
    )
    .await
    .unwrap();

    assert_eq!(float(result.get("Recall @ 1 mean")), 1.0);
    assert_eq!(float(result.get("Recall @ 1 std")), 0.0);
    assert_eq!(float(result.get("Recall @ 5 mean")), 1.0);
    assert!(float(result.get("Index construction memory [MB]")) > 0.0);
    assert!(float(result.get("Query time mean [s]")) >= 0.0);
    assert_eq!(
        result.get("Queries evaluated"),
        Some(&ReportValue::Integer(QUERIES as u64))
    );
    assert_eq!(
        result.get("index_kwargs"),
        Some(&ReportValue::Text(r#"{"k":10}"#.to_string()))
    );
    assert!(result.render().starts_with("Benchmark results:\n"));

    let path = result.write_csv(&config.results_dir).unwrap();
    assert_eq!(csv_files(&config.results_dir), vec![path.clone()]);
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("brute_force_corpus_"));
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 2);
}

#[tokio::test]
async fn test_hnsw_run_reports_effective_options() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("data")).unwrap();
    write_dataset(&root.path().join("data"));

    let result = run_benchmark(
        &config(root.path()),
        request("hnsw", serde_json::json!({"k": 8, "ef_search": 100})),
        &BackendRegistry::default(),
    )
    .await
    .unwrap();

    let Some(ReportValue::Text(kwargs)) = result.get("index_kwargs") else {
        panic!("index_kwargs missing");
    };
    let kwargs: serde_json::Value = serde_json::from_str(kwargs).unwrap();
    assert_eq!(kwargs["k"], serde_json::json!(8));
    assert_eq!(kwargs["max_nb_connection"], serde_json::json!(8));
    assert_eq!(kwargs["ef_search"], serde_json::json!(100));
    assert!(float(result.get("Recall @ 1 mean")) > 0.8);
}

#[tokio::test]
async fn test_unsupported_backend_is_engine_error() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("data")).unwrap();
    write_dataset(&root.path().join("data"));
    let config = config(root.path());

    let err = run_benchmark(
        &config,
        request("pynndescent", serde_json::json!({})),
        &BackendRegistry::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCodes::Engine);
    assert!(csv_files(&config.results_dir).is_empty());
}

#[tokio::test]
async fn test_missing_dataset_is_data_error() {
    let root = tempfile::tempdir().unwrap();
    let err = run_benchmark(
        &config(root.path()),
        request("brute_force", serde_json::json!({})),
        &BackendRegistry::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCodes::Data);
}

#[test]
fn test_binary_success_writes_csv() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("data")).unwrap();
    write_dataset(&root.path().join("data"));

    let output = Command::new(env!("CARGO_BIN_EXE_annbench"))
        .current_dir(root.path())
        .args([
            "--ann-backend",
            "brute_force",
            "--dataset-name",
            "corpus",
            "--query-dataset",
            "queries",
            "--recall-cutoffs",
            "1,5",
            "--no-progress",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Benchmark results:"));
    assert!(stdout.contains("Recall @ 1 mean: 1.0000"));
    assert_eq!(csv_files(&root.path().join("results")).len(), 1);
}

#[test]
fn test_binary_failures_write_nothing() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("data")).unwrap();
    write_dataset(&root.path().join("data"));

    let cases = [
        ("pynndescent", "corpus", "{}", "EngineError: "),
        ("brute_force", "corpus", "[1, 2]", "ConfigurationError: "),
        ("brute_force", "corpus", "{not json", "ConfigurationError: "),
        ("brute_force", "corpus", r#"{"k": 0}"#, "ConfigurationError: "),
        ("brute_force", "missing", "{}", "DataError: "),
    ];
    for (backend, dataset, kwargs, prefix) in cases {
        let args = [
            "--ann-backend",
            backend,
            "--dataset-name",
            dataset,
            "--index-kwargs",
            kwargs,
            "--query-dataset",
            "queries",
            "--no-progress",
        ];
        let output = Command::new(env!("CARGO_BIN_EXE_annbench"))
            .current_dir(root.path())
            .args(&args)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1), "{args:?}");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.lines().any(|line| line.starts_with(prefix)),
            "{args:?}: {stderr}"
        );
        assert!(csv_files(&root.path().join("results")).is_empty());
    }
}

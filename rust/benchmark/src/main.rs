use std::process::ExitCode;

use annbench::cli::Args;
use annbench::config::BenchmarkConfig;
use annbench::run::{block_on_then_shutdown, run_benchmark};
use annbench::telemetry::init_tracing;
use annbench_error::{BenchError, ErrorCodes};
use annbench_index::BackendRegistry;
use clap::Parser;

async fn run(args: Args) -> anyhow::Result<()> {
    let request = args.request().map_err(|e| e.boxed())?;
    let config =
        BenchmarkConfig::load(args.config.as_deref(), args.overrides()).map_err(|e| e.boxed())?;
    let registry = BackendRegistry::with_default_backends();

    let result = run_benchmark(&config, request, &registry)
        .await
        .map_err(|e| e.boxed())?;
    println!("{}", result.render());
    result
        .write_csv(&config.results_dir)
        .map_err(|e| e.boxed())?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_tracing() {
        eprintln!("Failed to initialize logging: {err}");
    }

    // An index build abandoned after `--build-timeout-secs` keeps its blocking
    // thread; the runtime is shut down without joining it so the process exits.
    let outcome = match block_on_then_shutdown(run(args)) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("{}: Failed to start the tokio runtime: {err}", ErrorCodes::Internal.name());
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<Box<dyn BenchError>>()
                .map(|err| err.code())
                .unwrap_or(ErrorCodes::Internal);
            tracing::debug!("Benchmark failed: {err:?}");
            eprintln!("{}: {err}", code.name());
            ExitCode::FAILURE
        }
    }
}

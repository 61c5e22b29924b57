use std::any::Any;

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, Layer, Registry};

use crate::sampler::in_measured_operation;

pub fn init_global_filter_layer() -> Box<dyn Layer<Registry> + Send + Sync> {
    // Crate names use underscores here, as rustc renames them.
    let crate_names = ["annbench", "annbench_error", "annbench_index"];
    let global_filter = format!(
        "error,{}",
        crate_names
            .iter()
            .map(|name| format!("{name}=info"))
            .collect::<Vec<_>>()
            .join(",")
    );
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(global_filter)).boxed()
}

/// Logs go to stderr; stdout carries only the results.
pub fn init_stderr_layer() -> Box<dyn Layer<Registry> + Send + Sync> {
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .boxed()
}

pub fn init_tracing() -> Result<(), SetGlobalDefaultError> {
    let layers = init_global_filter_layer().and_then(init_stderr_layer());
    let subscriber = tracing_subscriber::registry().with(layers);
    tracing::subscriber::set_global_default(subscriber)?;
    init_panic_tracing_hook();
    Ok(())
}

fn panic_payload(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

/// Log panics through tracing before the default hook prints them. A panic
/// inside a measured index build is tagged, since the sampler resumes it on
/// the caller only after sampling has stopped.
pub fn init_panic_tracing_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let message = if in_measured_operation() {
            "Index build panicked; the benchmark run is aborted"
        } else {
            "A panic occurred"
        };
        tracing::error!(
            panic.payload = panic_payload(panic_info.payload()),
            panic.location = panic_info.location().map(|l| l.to_string()),
            panic.thread = thread.name(),
            "{message}"
        );

        prev_hook(panic_info);
    }));
}

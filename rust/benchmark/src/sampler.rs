//! Peak-memory and wall-clock measurement of an opaque operation.
//!
//! [`ResourceSampler::measure`] runs the operation on tokio's blocking pool
//! while a background task polls a [`MemoryProbe`] at a fixed interval. The
//! only state shared with the background task is a one-shot stop signal; the
//! peak comes back as the task's output once it has been joined.
//!
//! The reported peak is a running maximum over discrete samples, so a spike
//! shorter than the sampling interval can be missed.

use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use annbench_error::{BenchError, ErrorCodes};
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(10);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

thread_local! {
    static IN_MEASURED_OPERATION: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread runs an operation passed to
/// [`ResourceSampler::measure`]. Still true inside a panic hook fired by it.
pub fn in_measured_operation() -> bool {
    IN_MEASURED_OPERATION.try_with(Cell::get).unwrap_or(false)
}

struct MeasuredScope;

impl MeasuredScope {
    fn enter() -> Self {
        IN_MEASURED_OPERATION.with(|flag| flag.set(true));
        MeasuredScope
    }
}

impl Drop for MeasuredScope {
    fn drop(&mut self) {
        IN_MEASURED_OPERATION.with(|flag| flag.set(false));
    }
}

/// Source of resident-memory readings.
pub trait MemoryProbe: Send + Sync + 'static {
    /// Current resident set size in bytes, or `None` if it cannot be read.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads this process's RSS through `sysinfo`.
pub struct ProcessMemoryProbe {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            tracing::warn!("Cannot determine current pid; memory samples will be empty");
        }
        ProcessMemoryProbe {
            pid,
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|process| process.memory())
    }
}

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Sampling interval must be positive")]
    ZeroInterval,
    #[error("Measured operation was cancelled before completing")]
    OperationCancelled,
    #[error("Memory sampler task failed: {0}")]
    SamplerFailed(#[source] JoinError),
}

impl BenchError for SamplerError {
    fn code(&self) -> ErrorCodes {
        match self {
            SamplerError::ZeroInterval => ErrorCodes::InvalidArgument,
            SamplerError::OperationCancelled | SamplerError::SamplerFailed(_) => {
                ErrorCodes::Internal
            }
        }
    }
}

/// Output of a measured operation together with its resource cost.
#[derive(Debug)]
pub struct Measurement<T> {
    pub output: T,
    pub peak_memory_bytes: u64,
    pub elapsed: Duration,
    /// Number of successful memory readings, including the initial one.
    pub samples: usize,
}

impl<T> Measurement<T> {
    pub fn peak_memory_mb(&self) -> f64 {
        bytes_to_mb(self.peak_memory_bytes)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct PeakTracker {
    peak: u64,
    samples: usize,
}

impl PeakTracker {
    fn record(&mut self, reading: Option<u64>) {
        if let Some(bytes) = reading {
            self.peak = self.peak.max(bytes);
            self.samples += 1;
        }
    }
}

async fn sample_until_stopped<P: MemoryProbe>(
    probe: Arc<P>,
    period: Duration,
    mut tracker: PeakTracker,
    mut stop: oneshot::Receiver<()>,
) -> PeakTracker {
    // The caller already took the reading at t=0.
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            // A dropped sender also ends sampling.
            _ = &mut stop => break,
            _ = ticker.tick() => tracker.record(probe.resident_bytes()),
        }
    }
    tracing::debug!(
        "Memory sampler stopped after {} samples, peak {:.1} MB",
        tracker.samples,
        bytes_to_mb(tracker.peak)
    );
    tracker
}

pub struct ResourceSampler<P: MemoryProbe = ProcessMemoryProbe> {
    probe: Arc<P>,
    interval: Duration,
}

impl ResourceSampler<ProcessMemoryProbe> {
    pub fn for_current_process(interval: Duration) -> Result<Self, SamplerError> {
        Self::new(ProcessMemoryProbe::new(), interval)
    }
}

impl<P: MemoryProbe> ResourceSampler<P> {
    pub fn new(probe: P, interval: Duration) -> Result<Self, SamplerError> {
        if interval.is_zero() {
            return Err(SamplerError::ZeroInterval);
        }
        Ok(ResourceSampler {
            probe: Arc::new(probe),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `operation` to completion while sampling memory.
    ///
    /// The operation's own result, success or failure, is returned inside the
    /// [`Measurement`] so the peak reached before a failure is still visible.
    /// A panic in the operation is resumed on the caller once sampling has
    /// stopped.
    pub async fn measure<F, T>(&self, operation: F) -> Result<Measurement<T>, SamplerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut tracker = PeakTracker::default();
        tracker.record(self.probe.resident_bytes());

        let (stop_tx, stop_rx) = oneshot::channel();
        let sampler = tokio::spawn(sample_until_stopped(
            self.probe.clone(),
            self.interval,
            tracker,
            stop_rx,
        ));

        let joined = tokio::task::spawn_blocking(move || {
            let _scope = MeasuredScope::enter();
            let start = Instant::now();
            let output = operation();
            (output, start.elapsed())
        })
        .await;

        // The sampler is stopped and joined before the outcome is inspected.
        let _ = stop_tx.send(());
        let tracker = sampler.await.map_err(SamplerError::SamplerFailed)?;

        let (output, elapsed) = match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => return Err(SamplerError::OperationCancelled),
        };

        Ok(Measurement {
            output,
            peak_memory_bytes: tracker.peak,
            elapsed,
            samples: tracker.samples,
        })
    }
}

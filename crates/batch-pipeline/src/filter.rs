//! The filter lifecycle, connection protocol and worker-thread host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::buffer::BatchBuffer;
use crate::config::FilterConfig;
use crate::error::{PipelineError, WorkerError};
use crate::sample::Sample;

/// What a filter's worker thread runs. `SampleAligner` and the ZOH resampler
/// carry their own interpolation/hold state as fields on the implementing
/// type, the same shape as a pluggable exporter behind a trait object.
pub trait FilterWorker<T: Sample>: Send {
    fn run(&mut self, handle: &FilterHandle<T>) -> Result<(), WorkerError>;
}

/// What a running worker sees: its own inputs/sinks, the shared `running`
/// flag it must poll, and its configured default timeout.
pub struct FilterHandle<T: Sample> {
    pub name: String,
    pub inputs: Vec<Arc<BatchBuffer<T>>>,
    pub sinks: Vec<Arc<BatchBuffer<T>>>,
    pub running: Arc<AtomicBool>,
    pub timeout: Duration,
}

impl<T: Sample> FilterHandle<T> {
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Submits a `COMPLETE` sentinel to every sink that hasn't already
    /// stopped, best-effort with the handle's configured timeout. Per spec
    /// §4.3(b): a sink observed stopped is simply skipped, not treated as an
    /// error — completion only needs to reach reachable, still-live sinks.
    pub fn forward_complete(&self, batch_id: u64, period_ns: u64) {
        for sink in &self.sinks {
            if !sink.is_running() {
                continue;
            }
            let slot = sink.get_head();
            slot.reset_as_complete(batch_id, period_ns);
            if sink.submit_complete(self.timeout).is_err() {
                tracing::debug!(filter = %self.name, "COMPLETE forwarding found sink already stopped");
            }
        }
    }
}

/// A named unit owning input buffers, sink references, and a worker thread.
pub struct Filter<T: Sample> {
    config: FilterConfig,
    inputs: Vec<Arc<BatchBuffer<T>>>,
    sinks: Vec<Arc<BatchBuffer<T>>>,
    running: Arc<AtomicBool>,
    worker: Option<Box<dyn FilterWorker<T>>>,
    thread: Option<JoinHandle<()>>,
    worker_err: Arc<Mutex<Option<WorkerError>>>,
    started: bool,
}

impl<T: Sample> Filter<T> {
    /// Validates `n_inputs` against `config.max_sinks`-adjacent shape rules
    /// and allocates `n_inputs` owned input buffers, each shaped by
    /// `config.buff_config`.
    pub fn init(
        config: FilterConfig,
        n_inputs: usize,
        worker: Box<dyn FilterWorker<T>>,
    ) -> Result<Self, PipelineError> {
        if config.max_sinks == 0 {
            return Err(PipelineError::InvalidConfig);
        }
        let inputs = (0..n_inputs)
            .map(|_| Arc::new(BatchBuffer::new(config.buff_config)))
            .collect();
        Ok(Self {
            config,
            inputs,
            sinks: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            worker: Some(worker),
            thread: None,
            worker_err: Arc::new(Mutex::new(None)),
            started: false,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[inline]
    pub fn inputs(&self) -> &[Arc<BatchBuffer<T>>] {
        &self.inputs
    }

    /// Binds a sink, validating that its shape matches this filter's declared
    /// output configuration. Rejects a mismatch, exceeding `max_sinks`, or a
    /// downstream buffer already bound as one of this filter's sinks.
    pub fn sink_connect(&mut self, downstream: Arc<BatchBuffer<T>>) -> Result<(), PipelineError> {
        if self.started {
            return Err(PipelineError::AlreadyRunning);
        }
        if self.sinks.len() >= self.config.max_sinks {
            return Err(PipelineError::InvalidConfig);
        }
        if !self.config.buff_config.shape_matches(downstream.config()) {
            return Err(PipelineError::TypeMismatch);
        }
        if self.sinks.iter().any(|s| Arc::ptr_eq(s, &downstream)) {
            return Err(PipelineError::InvalidConfig);
        }
        self.sinks.push(downstream);
        Ok(())
    }

    /// Sets `running`, starts owned input buffers, and spawns the worker thread.
    pub fn start(&mut self) -> Result<(), PipelineError>
    where
        T: 'static,
    {
        if self.started {
            return Err(PipelineError::AlreadyRunning);
        }
        if self.sinks.is_empty() && self.config.requires_sink {
            return Err(PipelineError::NoSink);
        }
        let mut worker = self.worker.take().ok_or(PipelineError::AlreadyRunning)?;

        for input in &self.inputs {
            input.start();
        }
        self.running.store(true, Ordering::Release);

        let handle = FilterHandle {
            name: self.config.name.clone(),
            inputs: self.inputs.clone(),
            sinks: self.sinks.clone(),
            running: Arc::clone(&self.running),
            timeout: Duration::from_micros(self.config.timeout_us),
        };
        let worker_err = Arc::clone(&self.worker_err);
        let name = self.config.name.clone();

        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                if let Err(err) = worker.run(&handle) {
                    tracing::warn!(filter = %name, %err, "worker exited with error");
                    *worker_err.lock().unwrap() = Some(err);
                }
            })
            .expect("failed to spawn filter worker thread");

        self.thread = Some(thread);
        self.started = true;
        tracing::debug!(filter = %self.config.name, "filter started");
        Ok(())
    }

    /// Clears `running`, stops owned input buffers (unblocking any consumer
    /// waiting on them), and joins the worker. Idempotent.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.running.store(false, Ordering::Release);
        for input in &self.inputs {
            input.stop();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.started = false;
        tracing::debug!(filter = %self.config.name, "filter stopped");
    }

    /// Releases owned buffers. Must be called after `stop`.
    pub fn deinit(&mut self) {
        for input in &self.inputs {
            input.deinit();
        }
    }

    /// The first fatal error this filter's worker observed, if any.
    pub fn worker_err(&self) -> Option<WorkerError> {
        *self.worker_err.lock().unwrap()
    }
}

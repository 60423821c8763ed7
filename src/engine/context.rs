use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::backend::{OutputBackend, StreamInfo};
use crate::engine::error::EngineError;
use crate::graph::AudioGraph;

/// Pulls blocks from the graph for whoever drives the output stage. Shared
/// between the control thread (short scheduling locks) and the render
/// thread (the backend callback `try_lock`s and falls back to silence, so
/// it never blocks on the control plane).
pub struct GraphRenderer {
    graph: AudioGraph,
    output_connected: bool,
    clock: Arc<AtomicU64>,
}

impl GraphRenderer {
    pub fn new(graph: AudioGraph, clock: Arc<AtomicU64>) -> Self {
        Self {
            graph,
            output_connected: false,
            clock,
        }
    }

    /// Renders one block and advances the engine clock. The graph always
    /// runs, so LFOs keep phase across pauses, but while the output stage is
    /// disconnected the rendered signal is replaced with silence.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let start_frame = self.clock.load(Ordering::Relaxed);
        self.graph.process_block(left, right, start_frame);
        self.clock
            .fetch_add(left.len() as u64, Ordering::Relaxed);
        if !self.output_connected {
            left.fill(0.0);
            right.fill(0.0);
        }
    }

    pub fn graph_mut(&mut self) -> &mut AudioGraph {
        &mut self.graph
    }

    pub fn set_output_connected(&mut self, connected: bool) {
        self.output_connected = connected;
    }

    pub fn is_output_connected(&self) -> bool {
        self.output_connected
    }
}

pub type SharedRenderer = Arc<Mutex<GraphRenderer>>;

/// Locks a renderer, recovering from a poisoned mutex: a panic on the
/// render thread must not take the control plane down with it.
pub fn lock_renderer(renderer: &SharedRenderer) -> MutexGuard<'_, GraphRenderer> {
    match renderer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// State of the processing context (the audio device and clock).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Suspended,
    Running,
    Closed,
}

/// Owns the output backend and the engine clock. Created in the
/// uninitialized state; the device is opened lazily on the first play
/// request (platform policy forbids audio before a user gesture) and only
/// an explicit close invalidates it.
pub struct ProcessingContext {
    backend: Box<dyn OutputBackend>,
    state: ContextState,
    clock: Arc<AtomicU64>,
    stream: Option<StreamInfo>,
}

impl ProcessingContext {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        Self {
            backend,
            state: ContextState::Uninitialized,
            clock: Arc::new(AtomicU64::new(0)),
            stream: None,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn clock(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.clock)
    }

    pub fn current_frame(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    /// Seconds of audio rendered since the context opened.
    pub fn current_time(&self) -> f64 {
        match &self.stream {
            Some(info) => self.current_frame() as f64 / info.sample_rate as f64,
            None => 0.0,
        }
    }

    /// Opens the device if this is the first request and reports the stream
    /// parameters the graph must be built for. Idempotent once open.
    pub fn ensure_open(&mut self) -> Result<StreamInfo, EngineError> {
        match self.state {
            ContextState::Closed => Err(EngineError::BackendUnavailable(
                "context is closed".to_string(),
            )),
            ContextState::Uninitialized => {
                let info = self.backend.open()?;
                self.stream = Some(info);
                self.state = ContextState::Suspended;
                Ok(info)
            }
            _ => Ok(self.stream.expect("open context has stream info")),
        }
    }

    /// Resumes rendering. May block until the device confirms it is
    /// running; idempotent when already running.
    pub fn resume(&mut self, renderer: SharedRenderer) -> Result<(), EngineError> {
        match self.state {
            ContextState::Closed => Err(EngineError::BackendUnavailable(
                "context is closed".to_string(),
            )),
            ContextState::Uninitialized => Err(EngineError::BackendUnavailable(
                "context has not been opened".to_string(),
            )),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.backend.resume(renderer)?;
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            if let Err(err) = self.backend.suspend() {
                log::warn!("suspending output backend failed: {err}");
            }
            self.state = ContextState::Suspended;
        }
    }

    /// Tears the context down. This is the only path that invalidates node
    /// handles; afterwards every operation fails safely.
    pub fn close(&mut self) {
        if self.state != ContextState::Closed {
            self.backend.close();
            self.state = ContextState::Closed;
        }
    }
}

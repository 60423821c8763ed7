//! Engine lifecycle and control surface.
//!
//! One engine instance owns the processing context, builds its preset's
//! topology lazily on the first play request (the platform may only start
//! audio in response to a user gesture), and exposes the small control API
//! the UI collaborator calls: `play`/`pause`/`toggle`, clamped-and-ramped
//! parameter setters, the orbit toggle, and a state snapshot. Nothing in
//! here panics or propagates errors across the control boundary; failures
//! degrade to silence and a diagnostic log line.

mod backend;
mod context;
#[cfg(feature = "native-host")]
mod cpal_backend;
mod error;
mod state;
mod topology;

#[cfg(test)]
mod tests;

pub use backend::{OfflineBackend, OutputBackend, StreamInfo};
pub use context::{ContextState, GraphRenderer, ProcessingContext, SharedRenderer};
#[cfg(feature = "native-host")]
pub use cpal_backend::CpalBackend;
pub use error::EngineError;
pub use state::{EngineState, Lifecycle};
pub use topology::{
    assemble, param_spec, Binding, BuiltGraph, NoiseColor, OrbitSpec, ParamSpec, Preset,
    PreStage, SourceSpec, Topology, WetStage,
};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::graph::AudioGraph;

use context::lock_renderer;

pub struct Engine {
    context: ProcessingContext,
    topology: Topology,
    renderer: Option<SharedRenderer>,
    built: Option<BuiltGraph>,
    lifecycle: Lifecycle,
    is_playing: bool,
    orbit_enabled: bool,
    sample_rate: f32,
    /// Current values per parameter name. Doubles as the queue for values
    /// set before the graph exists; they are clamped and applied at build.
    values: BTreeMap<String, f32>,
}

impl Engine {
    /// An engine on the offline backend; the owner drives rendering via
    /// [`Engine::render_block`].
    pub fn new(preset: Preset) -> Self {
        Self::with_backend(preset, Box::new(OfflineBackend::default()))
    }

    /// An engine playing through the default audio device.
    #[cfg(feature = "native-host")]
    pub fn with_native_host(preset: Preset) -> Self {
        Self::with_backend(preset, Box::new(CpalBackend::new()))
    }

    pub fn with_backend(preset: Preset, backend: Box<dyn OutputBackend>) -> Self {
        Self::from_topology(preset.topology(), backend)
    }

    pub fn from_topology(topology: Topology, backend: Box<dyn OutputBackend>) -> Self {
        Self {
            context: ProcessingContext::new(backend),
            topology,
            renderer: None,
            built: None,
            lifecycle: Lifecycle::Uninitialized,
            is_playing: false,
            orbit_enabled: true,
            sample_rate: 0.0,
            values: BTreeMap::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn context_state(&self) -> ContextState {
        self.context.state()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Whether the master gain is connected to the output stage.
    pub fn output_connected(&self) -> bool {
        self.renderer
            .as_ref()
            .map(|renderer| lock_renderer(renderer).is_output_connected())
            .unwrap_or(false)
    }

    /// Seconds of audio rendered since the context opened.
    pub fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    /// Snapshot of the externally observable state.
    pub fn snapshot(&self) -> EngineState {
        let mut parameters = BTreeMap::new();
        if let Some(built) = &self.built {
            for binding in &built.bindings {
                let value = self
                    .values
                    .get(binding.spec.name)
                    .copied()
                    .unwrap_or(binding.default);
                parameters.insert(binding.spec.name.to_string(), value);
            }
        } else {
            parameters = self.values.clone();
        }
        EngineState {
            is_playing: self.is_playing,
            orbit_enabled: self.orbit_enabled,
            parameters,
        }
    }

    /// Starts playback: builds the graph if needed, resumes the context
    /// (which may block until the device confirms), and connects the master
    /// gain to the output stage. Safe to call repeatedly.
    pub fn play(&mut self) {
        if self.lifecycle == Lifecycle::Closed {
            log::warn!("play() after close is a no-op");
            return;
        }
        if let Err(err) = self.try_play() {
            log::error!("playback unavailable, staying silent: {err}");
        }
    }

    fn try_play(&mut self) -> Result<(), EngineError> {
        self.ensure_built()?;
        let renderer = self
            .renderer
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| EngineError::BuildFailure("renderer missing after build".into()))?;
        self.context.resume(Arc::clone(&renderer))?;
        lock_renderer(&renderer).set_output_connected(true);
        self.lifecycle = Lifecycle::Running;
        self.is_playing = true;
        Ok(())
    }

    /// Stops audible output by disconnecting the output stage. The graph
    /// keeps running underneath (LFOs keep phase), so resuming is
    /// seamless. Safe to call repeatedly or before anything was built.
    pub fn pause(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Closed | Lifecycle::Uninitialized) {
            return;
        }
        if let Some(renderer) = &self.renderer {
            lock_renderer(renderer).set_output_connected(false);
        }
        self.lifecycle = Lifecycle::Ready;
        self.is_playing = false;
    }

    pub fn toggle(&mut self) {
        if self.is_playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Tears the engine down. The only path that invalidates the graph;
    /// afterwards every control call is a logged no-op.
    pub fn close(&mut self) {
        if self.lifecycle == Lifecycle::Closed {
            return;
        }
        if let Some(renderer) = &self.renderer {
            lock_renderer(renderer).set_output_connected(false);
        }
        self.context.close();
        self.renderer = None;
        self.built = None;
        self.is_playing = false;
        self.lifecycle = Lifecycle::Closed;
    }

    fn ensure_built(&mut self) -> Result<(), EngineError> {
        if self.built.is_some() {
            return Ok(());
        }

        let info = self.context.ensure_open()?;
        self.sample_rate = info.sample_rate;

        let mut graph = AudioGraph::new(info.block_size);
        let built = assemble(&mut graph, &self.topology, info.sample_rate)?;

        // Apply queued and default values instantly; ramps only make sense
        // against a running clock.
        for binding in &built.bindings {
            let value = self
                .values
                .get(binding.spec.name)
                .copied()
                .unwrap_or(binding.default)
                .clamp(binding.spec.min, binding.spec.max);
            for target in &binding.targets {
                if let Some(param) = graph.node_param_mut(target.node(), target.key()) {
                    param.set(target.apply(value));
                }
            }
            self.values.insert(binding.spec.name.to_string(), value);
        }

        let renderer = Arc::new(Mutex::new(GraphRenderer::new(graph, self.context.clock())));
        if let Some(orbit) = &built.orbit {
            if !self.orbit_enabled {
                orbit.disengage(lock_renderer(&renderer).graph_mut());
            }
        }

        self.renderer = Some(renderer);
        self.built = Some(built);
        self.lifecycle = Lifecycle::Ready;
        log::info!(
            "built '{}' at {} Hz (block {})",
            self.topology.name,
            info.sample_rate,
            info.block_size
        );
        Ok(())
    }

    /// Sets a named parameter. Out-of-range values are clamped, never
    /// rejected; the change reaches the signal path as a short linear ramp
    /// anchored at the context's current time, superseding any ramp still
    /// in flight. Before the graph exists the value is queued.
    pub fn set_parameter(&mut self, name: &str, value: f32) {
        if self.lifecycle == Lifecycle::Closed {
            log::debug!("set_parameter({name}) after close is a no-op");
            return;
        }

        let (Some(built), Some(renderer)) = (&self.built, &self.renderer) else {
            // Not built yet: queue raw, clamp once the range is bound.
            self.values.insert(name.to_string(), value);
            return;
        };

        let Some(binding) = built.binding(name) else {
            log::debug!(
                "parameter '{name}' is not bound in preset '{}'",
                self.topology.name
            );
            return;
        };

        let clamped = value.clamp(binding.spec.min, binding.spec.max);
        let now = self.context.current_frame();
        let ramp_frames = (binding.spec.ramp_secs * self.sample_rate).round() as u64;

        let mut guard = lock_renderer(renderer);
        for target in &binding.targets {
            if let Some(param) = guard.graph_mut().node_param_mut(target.node(), target.key()) {
                param.ramp_to(target.apply(clamped), now, ramp_frames);
            }
        }
        drop(guard);

        self.values.insert(name.to_string(), clamped);
    }

    /// Reads a parameter's live value from the signal path (the ramped
    /// value, not the target). Falls back to the stored value before build.
    pub fn parameter_value(&mut self, name: &str) -> Option<f32> {
        if let (Some(built), Some(renderer)) = (&self.built, &self.renderer) {
            let binding = built.binding(name)?;
            let target = binding.targets.first()?;
            let mut guard = lock_renderer(renderer);
            let param = guard.graph_mut().node_param_mut(target.node(), target.key())?;
            return Some(param.value());
        }
        self.values.get(name).copied()
    }

    // Per-preset setters, each clamped to its documented range.

    pub fn set_volume(&mut self, value: f32) {
        self.set_parameter("volume", value);
    }

    pub fn set_ambiance_mix(&mut self, value: f32) {
        self.set_parameter("ambiance_mix", value);
    }

    pub fn set_flanger_speed(&mut self, value: f32) {
        self.set_parameter("flanger_speed", value);
    }

    pub fn set_flanger_depth(&mut self, value: f32) {
        self.set_parameter("flanger_depth", value);
    }

    pub fn set_reverb_time(&mut self, value: f32) {
        self.set_parameter("reverb_time", value);
    }

    pub fn set_reverb_filter(&mut self, value: f32) {
        self.set_parameter("reverb_filter", value);
    }

    pub fn set_compressor_threshold(&mut self, value: f32) {
        self.set_parameter("compressor_threshold", value);
    }

    pub fn set_lowpass_freq(&mut self, value: f32) {
        self.set_parameter("lowpass_freq", value);
    }

    pub fn set_low_shelf_gain(&mut self, value: f32) {
        self.set_parameter("low_shelf_gain", value);
    }

    pub fn set_mid_boost_freq(&mut self, value: f32) {
        self.set_parameter("mid_boost_freq", value);
    }

    pub fn set_mid_boost_gain(&mut self, value: f32) {
        self.set_parameter("mid_boost_gain", value);
    }

    pub fn set_distance(&mut self, value: f32) {
        self.set_parameter("distance", value);
    }

    pub fn set_orbit_speed(&mut self, value: f32) {
        self.set_parameter("orbit_speed", value);
    }

    /// Enables or disables the spatial orbit. Disabling disconnects the
    /// LFO routes and recenters the position to the origin in the same
    /// operation, before the next rendered block.
    pub fn set_orbit_enabled(&mut self, enabled: bool) {
        if self.lifecycle == Lifecycle::Closed {
            return;
        }
        self.orbit_enabled = enabled;
        if let (Some(built), Some(renderer)) = (&self.built, &self.renderer) {
            if let Some(orbit) = &built.orbit {
                let mut guard = lock_renderer(renderer);
                if enabled {
                    orbit.engage(guard.graph_mut());
                } else {
                    orbit.disengage(guard.graph_mut());
                }
            }
        }
    }

    pub fn toggle_orbit(&mut self) {
        self.set_orbit_enabled(!self.orbit_enabled);
    }

    pub fn orbit_enabled(&self) -> bool {
        self.orbit_enabled
    }

    /// Renders one block through the renderer. This is how the offline
    /// backend is driven (tests, bounces); with a device backend the stream
    /// callback pulls blocks itself and this should not be called.
    pub fn render_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.lifecycle == Lifecycle::Closed {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }
        match &self.renderer {
            Some(renderer) => lock_renderer(renderer).render(left, right),
            None => {
                left.fill(0.0);
                right.fill(0.0);
            }
        }
    }

    /// Direct access to the built graph for inspection. Takes the renderer
    /// lock; control-thread use only.
    pub fn with_graph<R>(&mut self, f: impl FnOnce(&mut AudioGraph) -> R) -> Option<R> {
        let renderer = self.renderer.as_ref()?;
        let mut guard = lock_renderer(renderer);
        Some(f(guard.graph_mut()))
    }

    pub fn built(&self) -> Option<&BuiltGraph> {
        self.built.as_ref()
    }
}

//! Real-time ambient audio signal-graph engine.
//!
//! A directed graph of signal nodes (noise generator, filters, delay
//! loops, oscillators, dynamics, spatializers, convolution reverb) is
//! assembled from a data-driven topology, driven by an output backend, and
//! controlled through a small API: `play`/`pause`/`toggle`, clamped and
//! ramped parameter setters, and an observable state snapshot.

pub mod dsp;
pub mod effects;
pub mod engine;
pub mod graph;
pub mod ir;
pub mod nodes;
pub mod params;
pub mod traits;

pub use engine::{
    Engine, EngineError, EngineState, Lifecycle, OfflineBackend, OutputBackend, Preset, Topology,
};
pub use graph::{AudioGraph, Connection, NodeId};
pub use params::AudioParam;
pub use traits::{AudioNode, ParamKey, PortId};

#[cfg(feature = "native-host")]
pub use engine::CpalBackend;

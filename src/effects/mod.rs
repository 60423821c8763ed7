//! Effect module builders: each composes primitive nodes into a reusable
//! subgraph with one input port, one output port, and a set of named
//! controls. No internal edge crosses the module boundary except through
//! the declared ports.

mod convolution;
mod eq;
mod flanger;
mod orbit;
mod reverb;

pub use convolution::{build_convolution_reverb, IrSource};
pub use eq::build_eq_chain;
pub use flanger::build_flanger;
pub use orbit::{build_orbit_panner, OrbitModule};
pub use reverb::build_feedback_reverb;

use crate::graph::NodeId;
use crate::traits::ParamKey;

/// How a named control maps onto a concrete node parameter.
#[derive(Debug, Clone, Copy)]
pub enum ParamTarget {
    /// Parameter receives the control value as-is.
    Direct { node: NodeId, key: ParamKey },
    /// Parameter receives `1 - value` (the dry side of a dry/wet pair).
    Complement { node: NodeId, key: ParamKey },
}

impl ParamTarget {
    pub fn node(&self) -> NodeId {
        match *self {
            ParamTarget::Direct { node, .. } | ParamTarget::Complement { node, .. } => node,
        }
    }

    pub fn key(&self) -> ParamKey {
        match *self {
            ParamTarget::Direct { key, .. } | ParamTarget::Complement { key, .. } => key,
        }
    }

    pub fn apply(&self, value: f32) -> f32 {
        match self {
            ParamTarget::Direct { .. } => value,
            ParamTarget::Complement { .. } => 1.0 - value,
        }
    }
}

/// A control exposed by an effect module, bound to one or more node
/// parameters.
#[derive(Debug, Clone)]
pub struct Control {
    pub name: &'static str,
    pub targets: Vec<ParamTarget>,
}

impl Control {
    pub fn new(name: &'static str, targets: Vec<ParamTarget>) -> Self {
        Self { name, targets }
    }
}

/// A composed subgraph: feed `input`, tap `output`, automate `controls`.
pub struct EffectModule {
    pub input: NodeId,
    pub output: NodeId,
    pub controls: Vec<Control>,
}

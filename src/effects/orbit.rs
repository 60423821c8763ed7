use super::{Control, EffectModule, ParamTarget};
use crate::graph::{AudioGraph, Connection, NodeId};
use crate::nodes::{Lfo, SpatialPanner};
use crate::traits::{ParamKey, PortId};

/// An orbit panner plus the handles the lifecycle layer needs to toggle the
/// motion: disconnecting the LFO routes and recentering the position must
/// happen in the same control operation.
pub struct OrbitModule {
    pub module: EffectModule,
    pub panner: NodeId,
    pub lfo_x: NodeId,
    pub lfo_z: NodeId,
}

impl OrbitModule {
    /// Routes the two LFOs into the panner's position inputs.
    pub fn engage(&self, graph: &mut AudioGraph) {
        for (lfo, to_port) in [
            (self.lfo_x, PortId::PositionXMod),
            (self.lfo_z, PortId::PositionZMod),
        ] {
            graph.connect(Connection {
                from_node: lfo,
                from_port: PortId::AudioOutput0,
                to_node: self.panner,
                to_port,
                amount: 1.0,
            });
        }
    }

    /// Disconnects the LFO routes and snaps the position back to the
    /// origin. Both happen before the next rendered block, so the listener
    /// hears one atomic recenter, not a freeze at an arbitrary phase.
    pub fn disengage(&self, graph: &mut AudioGraph) {
        graph.disconnect(self.lfo_x, self.panner, PortId::PositionXMod);
        graph.disconnect(self.lfo_z, self.panner, PortId::PositionZMod);
        if let Some(node) = graph.get_node_mut(self.panner) {
            if let Some(panner) = node.as_any_mut().downcast_mut::<SpatialPanner>() {
                panner.recenter();
            }
        }
    }
}

/// 3D orbit panner: a positional panner whose X and Z coordinates are
/// driven by two LFOs on the same frequency a quarter turn apart, tracing a
/// continuous circle around the listener.
///
/// Controls: `orbit_speed` (Hz, both LFOs) and `distance` (orbit radius).
pub fn build_orbit_panner(
    graph: &mut AudioGraph,
    sample_rate: f32,
    speed_hz: f32,
    radius: f32,
) -> OrbitModule {
    let panner = graph.add_node(Box::new(SpatialPanner::new(radius)));
    let lfo_x = graph.add_node(Box::new(Lfo::new(sample_rate, speed_hz)));
    let lfo_z = graph.add_node(Box::new(
        Lfo::new(sample_rate, speed_hz).with_phase_offset(0.25),
    ));

    let orbit = OrbitModule {
        module: EffectModule {
            input: panner,
            output: panner,
            controls: vec![
                Control::new(
                    "orbit_speed",
                    vec![
                        ParamTarget::Direct {
                            node: lfo_x,
                            key: ParamKey::Frequency,
                        },
                        ParamTarget::Direct {
                            node: lfo_z,
                            key: ParamKey::Frequency,
                        },
                    ],
                ),
                Control::new(
                    "distance",
                    vec![ParamTarget::Direct {
                        node: panner,
                        key: ParamKey::Radius,
                    }],
                ),
            ],
        },
        panner,
        lfo_x,
        lfo_z,
    };
    orbit.engage(graph);
    orbit
}

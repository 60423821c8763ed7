//! Presets as data: a [`Topology`] declares the fixed connection shape of a
//! preset (source, pre-chain, wet chain, mix, spatial stage) and one
//! assembler turns any of them into a live graph. Adding a preset means
//! adding a value, not a code path.

use serde::{Deserialize, Serialize};

use crate::effects::{
    build_convolution_reverb, build_eq_chain, build_feedback_reverb, build_flanger,
    build_orbit_panner, Control, IrSource, OrbitModule, ParamTarget,
};
use crate::engine::error::EngineError;
use crate::graph::{AudioGraph, Connection, NodeId};
use crate::nodes::{Compressor, Gain, NoiseGenerator, NoiseType};
use crate::traits::{ParamKey, PortId};

const DEFAULT_VOLUME: f32 = 0.5;

// Fixed compressor voicing; only the threshold is user-facing.
const COMP_KNEE_DB: f32 = 30.0;
const COMP_RATIO: f32 = 12.0;
const COMP_ATTACK_SECS: f32 = 0.003;
const COMP_RELEASE_SECS: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseColor {
    White,
    Pink,
    Brownian,
}

impl From<NoiseColor> for NoiseType {
    fn from(color: NoiseColor) -> Self {
        match color {
            NoiseColor::White => NoiseType::White,
            NoiseColor::Pink => NoiseType::Pink,
            NoiseColor::Brownian => NoiseType::Brownian,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub noise: NoiseColor,
    pub level: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreStage {
    Compressor {
        threshold_db: f32,
    },
    Eq {
        lowpass_freq: f32,
        shelf_gain_db: f32,
        peak_freq: f32,
        peak_gain_db: f32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WetStage {
    Flanger { speed_hz: f32, depth_secs: f32 },
    FeedbackReverb { time_secs: f32, tone_hz: f32 },
    Convolution { source: IrSource },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitSpec {
    pub speed_hz: f32,
    pub radius: f32,
}

/// The fixed connection shape of one preset. Never mutated while running:
/// parameter values change, graph shape does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub name: String,
    pub source: SourceSpec,
    #[serde(default)]
    pub pre_chain: Vec<PreStage>,
    #[serde(default)]
    pub wet_chain: Vec<WetStage>,
    /// Initial dry/wet balance; only meaningful with a non-empty wet chain.
    #[serde(default)]
    pub ambiance_mix: Option<f32>,
    #[serde(default)]
    pub orbit: Option<OrbitSpec>,
}

/// The built-in presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Bare pink noise through the master gain.
    PlainNoise,
    /// The reading-room chain: noise, compressor, then the EQ stack.
    EqNoise,
    /// Noise with a parallel flanger-into-reverb wet path.
    FlangerReverb,
    /// Noise orbiting the listener.
    Orbit,
    /// Noise through a convolution hall.
    ConvolutionHall,
}

impl Preset {
    pub fn topology(self) -> Topology {
        match self {
            Preset::PlainNoise => Topology {
                name: "plain_noise".to_string(),
                source: SourceSpec {
                    noise: NoiseColor::Pink,
                    level: 1.0,
                },
                pre_chain: Vec::new(),
                wet_chain: Vec::new(),
                ambiance_mix: None,
                orbit: None,
            },
            Preset::EqNoise => Topology {
                name: "eq_noise".to_string(),
                source: SourceSpec {
                    noise: NoiseColor::Pink,
                    level: 1.0,
                },
                pre_chain: vec![
                    PreStage::Compressor { threshold_db: -24.0 },
                    PreStage::Eq {
                        lowpass_freq: 8_000.0,
                        shelf_gain_db: 0.0,
                        peak_freq: 1_200.0,
                        peak_gain_db: 0.0,
                    },
                ],
                wet_chain: Vec::new(),
                ambiance_mix: None,
                orbit: None,
            },
            Preset::FlangerReverb => Topology {
                name: "flanger_reverb".to_string(),
                source: SourceSpec {
                    noise: NoiseColor::Pink,
                    level: 1.0,
                },
                pre_chain: vec![PreStage::Compressor { threshold_db: -24.0 }],
                wet_chain: vec![
                    WetStage::Flanger {
                        speed_hz: 0.05,
                        depth_secs: 0.003,
                    },
                    WetStage::FeedbackReverb {
                        time_secs: 2.0,
                        tone_hz: 2_000.0,
                    },
                ],
                ambiance_mix: Some(0.4),
                orbit: None,
            },
            Preset::Orbit => Topology {
                name: "orbit".to_string(),
                source: SourceSpec {
                    noise: NoiseColor::Pink,
                    level: 1.0,
                },
                pre_chain: Vec::new(),
                wet_chain: Vec::new(),
                ambiance_mix: None,
                orbit: Some(OrbitSpec {
                    speed_hz: 0.12,
                    radius: 1_500.0,
                }),
            },
            Preset::ConvolutionHall => Topology {
                name: "convolution_hall".to_string(),
                source: SourceSpec {
                    noise: NoiseColor::Pink,
                    level: 1.0,
                },
                pre_chain: Vec::new(),
                wet_chain: vec![WetStage::Convolution {
                    source: IrSource::Plate {
                        decay_secs: 2.0,
                        diffusion: 0.6,
                    },
                }],
                ambiance_mix: Some(0.35),
                orbit: None,
            },
        }
    }
}

/// Declared range and ramp window for an externally settable parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub ramp_secs: f32,
}

/// Every parameter the control surface may set, with its documented range.
/// The volume ramp matches the original 50 ms feel; everything else uses
/// the default 80 ms window.
const PARAM_SPECS: &[ParamSpec] = &[
    ParamSpec { name: "volume", min: 0.0, max: 1.0, ramp_secs: 0.05 },
    ParamSpec { name: "ambiance_mix", min: 0.0, max: 1.0, ramp_secs: 0.08 },
    ParamSpec { name: "flanger_speed", min: 0.01, max: 0.2, ramp_secs: 0.08 },
    ParamSpec { name: "flanger_depth", min: 0.001, max: 0.01, ramp_secs: 0.08 },
    ParamSpec { name: "reverb_time", min: 0.5, max: 5.0, ramp_secs: 0.08 },
    ParamSpec { name: "reverb_filter", min: 500.0, max: 10_000.0, ramp_secs: 0.08 },
    ParamSpec { name: "compressor_threshold", min: -100.0, max: 0.0, ramp_secs: 0.08 },
    ParamSpec { name: "lowpass_freq", min: 200.0, max: 12_000.0, ramp_secs: 0.08 },
    ParamSpec { name: "low_shelf_gain", min: -10.0, max: 15.0, ramp_secs: 0.08 },
    ParamSpec { name: "mid_boost_freq", min: 500.0, max: 5_000.0, ramp_secs: 0.08 },
    ParamSpec { name: "mid_boost_gain", min: -10.0, max: 12.0, ramp_secs: 0.08 },
    ParamSpec { name: "distance", min: 500.0, max: 10_000.0, ramp_secs: 0.08 },
    ParamSpec { name: "orbit_speed", min: 0.05, max: 0.5, ramp_secs: 0.08 },
];

pub fn param_spec(name: &str) -> Option<ParamSpec> {
    PARAM_SPECS.iter().find(|spec| spec.name == name).copied()
}

/// A named parameter resolved to live node controls.
#[derive(Debug, Clone)]
pub struct Binding {
    pub spec: ParamSpec,
    pub default: f32,
    pub targets: Vec<ParamTarget>,
}

/// Everything the engine needs to drive a built graph.
pub struct BuiltGraph {
    pub master: NodeId,
    pub bindings: Vec<Binding>,
    pub orbit: Option<OrbitModule>,
}

impl BuiltGraph {
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.spec.name == name)
    }
}

/// Connects every node in `from` into `to`'s stereo inputs; mono sources
/// feed both channels.
fn connect_into(graph: &mut AudioGraph, from: &[(NodeId, bool)], to: NodeId) {
    for &(from_node, stereo) in from {
        let pairs = if stereo {
            [
                (PortId::AudioOutput0, PortId::AudioInput0),
                (PortId::AudioOutput1, PortId::AudioInput1),
            ]
        } else {
            [
                (PortId::AudioOutput0, PortId::AudioInput0),
                (PortId::AudioOutput0, PortId::AudioInput1),
            ]
        };
        for (from_port, to_port) in pairs {
            graph.connect(Connection {
                from_node,
                from_port,
                to_node: to,
                to_port,
                amount: 1.0,
            });
        }
    }
}

/// Verifies each control against a live parameter (bind-time checking) and
/// records it, capturing the node's initial value as the binding default.
fn bind_controls(
    graph: &mut AudioGraph,
    controls: &[Control],
    bindings: &mut Vec<Binding>,
) -> Result<(), EngineError> {
    for control in controls {
        let spec = param_spec(control.name).ok_or_else(|| {
            EngineError::BuildFailure(format!("control '{}' has no declared range", control.name))
        })?;
        let mut default = None;
        for target in &control.targets {
            let param = graph
                .node_param_mut(target.node(), target.key())
                .ok_or_else(|| {
                    EngineError::BuildFailure(format!(
                        "control '{}' does not resolve to a node parameter",
                        control.name
                    ))
                })?;
            if default.is_none() {
                if let ParamTarget::Direct { .. } = target {
                    default = Some(param.value());
                }
            }
        }
        bindings.push(Binding {
            spec,
            default: default.unwrap_or(spec.min),
            targets: control.targets.clone(),
        });
    }
    Ok(())
}

/// Builds one topology into the graph: generator → pre-chain → dry path ∥
/// wet chain → mixer → spatial stage → master gain. The master is left
/// unconnected from the output stage; the lifecycle layer owns that edge.
pub fn assemble(
    graph: &mut AudioGraph,
    topology: &Topology,
    sample_rate: f32,
) -> Result<BuiltGraph, EngineError> {
    let mut bindings = Vec::new();

    let source = graph.add_node(Box::new(NoiseGenerator::new(
        sample_rate,
        topology.source.noise.into(),
        topology.source.level,
    )));
    let mut cursor: Vec<(NodeId, bool)> = vec![(source, false)];

    for stage in &topology.pre_chain {
        match stage {
            PreStage::Compressor { threshold_db } => {
                let node = graph.add_node(Box::new(Compressor::new(
                    sample_rate,
                    *threshold_db,
                    COMP_KNEE_DB,
                    COMP_RATIO,
                    COMP_ATTACK_SECS,
                    COMP_RELEASE_SECS,
                )));
                connect_into(graph, &cursor, node);
                bind_controls(
                    graph,
                    &[Control::new(
                        "compressor_threshold",
                        vec![ParamTarget::Direct {
                            node,
                            key: ParamKey::Threshold,
                        }],
                    )],
                    &mut bindings,
                )?;
                cursor = vec![(node, true)];
            }
            PreStage::Eq {
                lowpass_freq,
                shelf_gain_db,
                peak_freq,
                peak_gain_db,
            } => {
                let module = build_eq_chain(
                    graph,
                    sample_rate,
                    *lowpass_freq,
                    *shelf_gain_db,
                    *peak_freq,
                    *peak_gain_db,
                );
                connect_into(graph, &cursor, module.input);
                bind_controls(graph, &module.controls, &mut bindings)?;
                cursor = vec![(module.output, true)];
            }
        }
    }

    if !topology.wet_chain.is_empty() {
        let mix = topology.ambiance_mix.unwrap_or(0.5).clamp(0.0, 1.0);
        let dry_gain = graph.add_node(Box::new(Gain::new(1.0 - mix)));
        let wet_gain = graph.add_node(Box::new(Gain::new(mix)));

        connect_into(graph, &cursor, dry_gain);

        let mut wet_cursor = cursor.clone();
        for stage in &topology.wet_chain {
            let module = match stage {
                WetStage::Flanger {
                    speed_hz,
                    depth_secs,
                } => build_flanger(graph, sample_rate, *speed_hz, *depth_secs),
                WetStage::FeedbackReverb { time_secs, tone_hz } => {
                    build_feedback_reverb(graph, sample_rate, *time_secs, *tone_hz)
                }
                WetStage::Convolution { source } => {
                    build_convolution_reverb(graph, sample_rate, source)
                }
            };
            connect_into(graph, &wet_cursor, module.input);
            bind_controls(graph, &module.controls, &mut bindings)?;
            wet_cursor = vec![(module.output, true)];
        }
        connect_into(graph, &wet_cursor, wet_gain);

        bind_controls(
            graph,
            &[Control::new(
                "ambiance_mix",
                vec![
                    ParamTarget::Direct {
                        node: wet_gain,
                        key: ParamKey::Level,
                    },
                    ParamTarget::Complement {
                        node: dry_gain,
                        key: ParamKey::Level,
                    },
                ],
            )],
            &mut bindings,
        )?;

        cursor = vec![(dry_gain, true), (wet_gain, true)];
    }

    let orbit = match &topology.orbit {
        Some(spec) => {
            let orbit = build_orbit_panner(graph, sample_rate, spec.speed_hz, spec.radius);
            connect_into(graph, &cursor, orbit.module.input);
            bind_controls(graph, &orbit.module.controls, &mut bindings)?;
            cursor = vec![(orbit.module.output, true)];
            Some(orbit)
        }
        None => None,
    };

    let master = graph.add_node(Box::new(Gain::new(DEFAULT_VOLUME)));
    connect_into(graph, &cursor, master);
    bind_controls(
        graph,
        &[Control::new(
            "volume",
            vec![ParamTarget::Direct {
                node: master,
                key: ParamKey::Level,
            }],
        )],
        &mut bindings,
    )?;
    graph.set_output_node(master);

    Ok(BuiltGraph {
        master,
        bindings,
        orbit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_assembles_with_resolving_bindings() {
        for preset in [
            Preset::PlainNoise,
            Preset::EqNoise,
            Preset::FlangerReverb,
            Preset::Orbit,
            Preset::ConvolutionHall,
        ] {
            let mut graph = AudioGraph::new(128);
            let built = assemble(&mut graph, &preset.topology(), 48_000.0)
                .unwrap_or_else(|err| panic!("{preset:?}: {err}"));

            assert!(built.binding("volume").is_some(), "{preset:?}");
            for binding in &built.bindings {
                for target in &binding.targets {
                    assert!(
                        graph.node_param_mut(target.node(), target.key()).is_some(),
                        "{preset:?}: {} lost its target",
                        binding.spec.name
                    );
                }
            }
        }
    }

    #[test]
    fn flanger_reverb_preset_exposes_its_documented_controls() {
        let mut graph = AudioGraph::new(128);
        let built = assemble(&mut graph, &Preset::FlangerReverb.topology(), 48_000.0).unwrap();
        for name in [
            "volume",
            "ambiance_mix",
            "compressor_threshold",
            "flanger_speed",
            "flanger_depth",
            "reverb_time",
            "reverb_filter",
        ] {
            assert!(built.binding(name).is_some(), "missing {name}");
        }
        assert!(built.binding("orbit_speed").is_none());
    }

    #[test]
    fn topologies_serialize_as_data() {
        let topology = Preset::FlangerReverb.topology();
        let json = serde_json::to_string(&topology).unwrap();
        let back: Topology = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, topology.name);
        assert_eq!(back.wet_chain.len(), topology.wet_chain.len());
    }

    #[test]
    fn rendered_preset_reaches_the_master() {
        let block = 128;
        let mut graph = AudioGraph::new(block);
        assemble(&mut graph, &Preset::EqNoise.topology(), 8_000.0).unwrap();

        let mut left = vec![0.0; block];
        let mut right = vec![0.0; block];
        let mut energy = 0.0;
        for i in 0..16 {
            graph.process_block(&mut left, &mut right, (i * block) as u64);
            energy += left.iter().map(|x| x * x).sum::<f32>();
        }
        assert!(energy > 0.0);
    }
}

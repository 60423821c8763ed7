use super::{Control, EffectModule, ParamTarget};
use crate::graph::{AudioGraph, Connection};
use crate::nodes::{DelayLine, Gain, Lfo};
use crate::traits::{AudioNode, ParamKey, PortId};

/// Base delay around which the LFO sweeps. Deep enough that the maximum
/// modulation depth (0.01 s) never pushes the read tap to zero.
const BASE_DELAY_SECS: f32 = 0.012;
const MAX_DELAY_SECS: f32 = 0.1;
const FEEDBACK: f32 = 0.5;

/// Flanger: a short delay whose time is swept by an LFO, fed back on
/// itself, with the dry signal bypassing in parallel. The comb notches
/// sweeping up and down the spectrum are the characteristic "whoosh".
///
/// Controls: `flanger_speed` (LFO Hz) and `flanger_depth` (sweep amplitude
/// in seconds).
pub fn build_flanger(
    graph: &mut AudioGraph,
    sample_rate: f32,
    speed_hz: f32,
    depth_secs: f32,
) -> EffectModule {
    let input = graph.add_node(Box::new(Gain::new(1.0)));
    let output = graph.add_node(Box::new(Gain::new(1.0)));

    // Keep the loop bright; damping is the reverb's business.
    let mut delay = DelayLine::new(
        sample_rate,
        MAX_DELAY_SECS,
        BASE_DELAY_SECS,
        FEEDBACK,
        sample_rate * 0.45,
    );
    if let Some(param) = delay.param_mut(ParamKey::ModDepth) {
        param.set(depth_secs);
    }
    let delay = graph.add_node(Box::new(delay));
    let lfo = graph.add_node(Box::new(Lfo::new(sample_rate, speed_hz)));

    for (from_port, to_port) in [
        (PortId::AudioOutput0, PortId::AudioInput0),
        (PortId::AudioOutput1, PortId::AudioInput1),
    ] {
        // input -> delay -> output, plus the parallel dry bypass.
        graph.connect(Connection {
            from_node: input,
            from_port,
            to_node: delay,
            to_port,
            amount: 1.0,
        });
        graph.connect(Connection {
            from_node: delay,
            from_port,
            to_node: output,
            to_port,
            amount: 1.0,
        });
        graph.connect(Connection {
            from_node: input,
            from_port,
            to_node: output,
            to_port,
            amount: 1.0,
        });
    }

    graph.connect(Connection {
        from_node: lfo,
        from_port: PortId::AudioOutput0,
        to_node: delay,
        to_port: PortId::TimeMod,
        amount: 1.0,
    });

    EffectModule {
        input,
        output,
        controls: vec![
            Control::new(
                "flanger_speed",
                vec![ParamTarget::Direct {
                    node: lfo,
                    key: ParamKey::Frequency,
                }],
            ),
            Control::new(
                "flanger_depth",
                vec![ParamTarget::Direct {
                    node: delay,
                    key: ParamKey::ModDepth,
                }],
            ),
        ],
    }
}

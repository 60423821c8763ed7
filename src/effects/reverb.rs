use super::{Control, EffectModule, ParamTarget};
use crate::dsp::FilterType;
use crate::graph::{AudioGraph, Connection};
use crate::nodes::{BiquadFilter, DelayLine, Gain};
use crate::traits::{ParamKey, PortId};

/// Reverb loop gain. High enough for an audible tail, low enough that the
/// loop always decays.
const FEEDBACK: f32 = 0.6;

/// Detune ratio for the right channel's read tap. Chosen so the two loop
/// periods share no small common multiple and resonances don't pile up.
const RIGHT_DETUNE: f32 = 0.745;

/// Longest supported loop time; delay buffers are pre-allocated for this.
const MAX_TIME_SECS: f32 = 6.0;

/// Feedback-delay reverb: a damped delay loop tapped to the output, with
/// the two channels detuned against each other and an allpass stage for
/// diffusion. The in-loop lowpass doubles as the tone control.
///
/// Controls: `reverb_time` (loop delay in seconds) and `reverb_filter`
/// (damping cutoff in Hz).
pub fn build_feedback_reverb(
    graph: &mut AudioGraph,
    sample_rate: f32,
    time_secs: f32,
    tone_hz: f32,
) -> EffectModule {
    let input = graph.add_node(Box::new(Gain::new(1.0)));
    let delay = graph.add_node(Box::new(
        DelayLine::new(sample_rate, MAX_TIME_SECS, time_secs, FEEDBACK, tone_hz)
            .with_right_scale(RIGHT_DETUNE),
    ));
    let diffusion = graph.add_node(Box::new(BiquadFilter::new(
        FilterType::Allpass,
        sample_rate,
        800.0,
        0.707,
        0.0,
    )));
    let output = graph.add_node(Box::new(Gain::new(1.0)));

    for (from_port, to_port) in [
        (PortId::AudioOutput0, PortId::AudioInput0),
        (PortId::AudioOutput1, PortId::AudioInput1),
    ] {
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
            to_node: diffusion,
            to_port,
            amount: 1.0,
        });
        graph.connect(Connection {
            from_node: diffusion,
            from_port,
            to_node: output,
            to_port,
            amount: 1.0,
        });
    }

    EffectModule {
        input,
        output,
        controls: vec![
            Control::new(
                "reverb_time",
                vec![ParamTarget::Direct {
                    node: delay,
                    key: ParamKey::DelayTime,
                }],
            ),
            Control::new(
                "reverb_filter",
                vec![ParamTarget::Direct {
                    node: delay,
                    key: ParamKey::Damp,
                }],
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{NoiseGenerator, NoiseType};

    #[test]
    fn tail_rings_after_input_stops_then_decays() {
        let sample_rate = 1_000.0;
        let block = 100;
        let mut graph = AudioGraph::new(block);

        let source = graph.add_node(Box::new(NoiseGenerator::new(
            sample_rate,
            NoiseType::White,
            1.0,
        )));
        let module = build_feedback_reverb(&mut graph, sample_rate, 0.2, 450.0);
        for to_port in [PortId::AudioInput0, PortId::AudioInput1] {
            graph.connect(Connection {
                from_node: source,
                from_port: PortId::AudioOutput0,
                to_node: module.input,
                to_port,
                amount: 1.0,
            });
        }
        graph.set_output_node(module.output);

        let mut left = vec![0.0; block];
        let mut right = vec![0.0; block];
        let mut frame = 0u64;
        let mut render = |graph: &mut AudioGraph,
                          left: &mut Vec<f32>,
                          right: &mut Vec<f32>,
                          frame: &mut u64| {
            graph.process_block(left, right, *frame);
            *frame += block as u64;
            left.iter().map(|x| x * x).sum::<f32>()
        };

        // One second of excitation, then silence the source.
        for _ in 0..10 {
            render(&mut graph, &mut left, &mut right, &mut frame);
        }
        graph.get_node_mut(source).unwrap().set_active(false);

        // The loop (0.2 s period, feedback 0.6) must still ring...
        let early: f32 = (0..5)
            .map(|_| render(&mut graph, &mut left, &mut right, &mut frame))
            .sum();
        assert!(early > 1e-4, "no tail: {early}");

        // ...and decay rather than self-oscillate.
        for _ in 0..40 {
            render(&mut graph, &mut left, &mut right, &mut frame);
        }
        let late: f32 = (0..5)
            .map(|_| render(&mut graph, &mut left, &mut right, &mut frame))
            .sum();
        assert!(late < early * 0.5, "tail not decaying: {early} -> {late}");
    }

    #[test]
    fn exposes_time_and_tone_controls() {
        let mut graph = AudioGraph::new(128);
        let module = build_feedback_reverb(&mut graph, 48_000.0, 2.0, 1_000.0);
        let names: Vec<_> = module.controls.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["reverb_time", "reverb_filter"]);
        for control in &module.controls {
            for target in &control.targets {
                assert!(graph.node_param_mut(target.node(), target.key()).is_some());
            }
        }
    }
}

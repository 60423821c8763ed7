use super::{Control, EffectModule, ParamTarget};
use crate::dsp::FilterType;
use crate::graph::{AudioGraph, Connection};
use crate::nodes::BiquadFilter;
use crate::traits::{ParamKey, PortId};

/// Low-shelf corner frequency. Fixed: the shelf's gain is the user-facing
/// control, its corner is voicing.
const SHELF_FREQ_HZ: f32 = 300.0;

/// Parametric EQ chain: lowpass cutoff, low-shelf bass lift, mid peaking
/// boost, in series. Each stage exposes its own frequency/gain controls.
pub fn build_eq_chain(
    graph: &mut AudioGraph,
    sample_rate: f32,
    lowpass_freq: f32,
    shelf_gain_db: f32,
    peak_freq: f32,
    peak_gain_db: f32,
) -> EffectModule {
    let lowpass = graph.add_node(Box::new(BiquadFilter::new(
        FilterType::LowPass,
        sample_rate,
        lowpass_freq,
        0.707,
        0.0,
    )));
    let shelf = graph.add_node(Box::new(BiquadFilter::new(
        FilterType::LowShelf,
        sample_rate,
        SHELF_FREQ_HZ,
        0.707,
        shelf_gain_db,
    )));
    let peaking = graph.add_node(Box::new(BiquadFilter::new(
        FilterType::Peaking,
        sample_rate,
        peak_freq,
        1.0,
        peak_gain_db,
    )));

    for (from_node, to_node) in [(lowpass, shelf), (shelf, peaking)] {
        for (from_port, to_port) in [
            (PortId::AudioOutput0, PortId::AudioInput0),
            (PortId::AudioOutput1, PortId::AudioInput1),
        ] {
            graph.connect(Connection {
                from_node,
                from_port,
                to_node,
                to_port,
                amount: 1.0,
            });
        }
    }

    EffectModule {
        input: lowpass,
        output: peaking,
        controls: vec![
            Control::new(
                "lowpass_freq",
                vec![ParamTarget::Direct {
                    node: lowpass,
                    key: ParamKey::Frequency,
                }],
            ),
            Control::new(
                "low_shelf_gain",
                vec![ParamTarget::Direct {
                    node: shelf,
                    key: ParamKey::GainDb,
                }],
            ),
            Control::new(
                "mid_boost_freq",
                vec![ParamTarget::Direct {
                    node: peaking,
                    key: ParamKey::Frequency,
                }],
            ),
            Control::new(
                "mid_boost_gain",
                vec![ParamTarget::Direct {
                    node: peaking,
                    key: ParamKey::GainDb,
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
    fn chain_passes_audio_and_resolves_controls() {
        let sample_rate = 8_000.0;
        let block = 128;
        let mut graph = AudioGraph::new(block);

        let source = graph.add_node(Box::new(NoiseGenerator::new(
            sample_rate,
            NoiseType::Pink,
            1.0,
        )));
        let module = build_eq_chain(&mut graph, sample_rate, 3_000.0, 6.0, 1_000.0, 3.0);
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
        let mut energy = 0.0;
        for i in 0..16 {
            graph.process_block(&mut left, &mut right, (i * block) as u64);
            energy += left.iter().map(|x| x * x).sum::<f32>();
        }
        assert!(energy > 0.0);

        let names: Vec<_> = module.controls.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec![
                "lowpass_freq",
                "low_shelf_gain",
                "mid_boost_freq",
                "mid_boost_gain"
            ]
        );
        for control in &module.controls {
            for target in &control.targets {
                assert!(graph.node_param_mut(target.node(), target.key()).is_some());
            }
        }
    }

    #[test]
    fn lowering_the_lowpass_darkens_the_output() {
        let sample_rate = 8_000.0;
        let block = 256;

        let render_hf = |cutoff: f32| {
            let mut graph = AudioGraph::new(block);
            let source = graph.add_node(Box::new(NoiseGenerator::new(
                sample_rate,
                NoiseType::White,
                1.0,
            )));
            let module = build_eq_chain(&mut graph, sample_rate, cutoff, 0.0, 1_000.0, 0.0);
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
            let mut collected = Vec::new();
            for i in 0..16 {
                graph.process_block(&mut left, &mut right, (i * block) as u64);
                collected.extend_from_slice(&left);
            }
            // High-frequency share via first differences.
            let total: f32 = collected.iter().map(|x| x * x).sum();
            let diff: f32 = collected.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
            diff / total.max(1e-9)
        };

        assert!(render_hf(400.0) < render_hf(3_500.0) * 0.7);
    }
}

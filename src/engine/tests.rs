//! Engine-level tests driven through the offline backend: lifecycle
//! transitions, idempotent play/pause, clamped and re-anchored ramps, the
//! dry/wet invariant, the orbit toggle, and graceful degradation when an
//! impulse response cannot be loaded.

use std::path::PathBuf;

use super::*;
use crate::effects::IrSource;
use crate::nodes::SpatialPanner;

const BLOCK: usize = 128;
const SAMPLE_RATE: f32 = 48_000.0;

fn render_secs(engine: &mut Engine, secs: f32) -> f32 {
    let blocks = ((secs * SAMPLE_RATE) as usize / BLOCK) + 1;
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    let mut energy = 0.0;
    for _ in 0..blocks {
        engine.render_block(&mut left, &mut right);
        energy += left.iter().map(|x| x * x).sum::<f32>();
    }
    energy
}

#[test]
fn play_walks_the_lifecycle_and_connects_output() {
    let mut engine = Engine::new(Preset::FlangerReverb);
    assert_eq!(engine.lifecycle(), Lifecycle::Uninitialized);
    assert_eq!(engine.context_state(), ContextState::Uninitialized);
    assert!(!engine.output_connected());

    engine.play();
    assert_eq!(engine.lifecycle(), Lifecycle::Running);
    assert_eq!(engine.context_state(), ContextState::Running);
    assert!(engine.is_playing());
    assert!(engine.output_connected());

    engine.pause();
    assert_eq!(engine.lifecycle(), Lifecycle::Ready);
    assert!(!engine.is_playing());
    assert!(!engine.output_connected());
}

#[test]
fn repeated_play_and_pause_are_idempotent() {
    let mut engine = Engine::new(Preset::PlainNoise);
    engine.play();
    let nodes = engine.with_graph(|graph| graph.node_count()).unwrap();
    let edges = engine.with_graph(|graph| graph.connection_count()).unwrap();

    engine.play();
    engine.play();
    assert_eq!(engine.with_graph(|graph| graph.node_count()).unwrap(), nodes);
    assert_eq!(
        engine.with_graph(|graph| graph.connection_count()).unwrap(),
        edges
    );
    assert!(engine.output_connected());

    engine.pause();
    engine.pause();
    assert!(!engine.is_playing());

    engine.play();
    assert!(engine.is_playing());
    assert!(render_secs(&mut engine, 0.1) > 0.0);
}

#[test]
fn out_of_range_values_are_clamped_not_rejected() {
    let mut engine = Engine::new(Preset::FlangerReverb);
    engine.play();

    engine.set_volume(3.5);
    engine.set_reverb_time(99.0);
    engine.set_flanger_speed(-1.0);
    render_secs(&mut engine, 0.2);

    assert!((engine.parameter_value("volume").unwrap() - 1.0).abs() < 1e-4);
    assert!((engine.parameter_value("reverb_time").unwrap() - 5.0).abs() < 1e-4);
    assert!((engine.parameter_value("flanger_speed").unwrap() - 0.01).abs() < 1e-4);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.parameters["volume"], 1.0);
    assert_eq!(snapshot.parameters["reverb_time"], 5.0);
}

#[test]
fn set_reaches_target_after_ramp_window() {
    let mut engine = Engine::new(Preset::FlangerReverb);
    engine.play();

    engine.set_reverb_filter(4_000.0);
    // Mid-ramp the live value is still in transit.
    render_secs(&mut engine, 0.01);
    let mid = engine.parameter_value("reverb_filter").unwrap();
    assert!(mid < 4_000.0);

    render_secs(&mut engine, 0.2);
    let settled = engine.parameter_value("reverb_filter").unwrap();
    assert!((settled - 4_000.0).abs() < 1.0, "settled at {settled}");
}

#[test]
fn rapid_sets_supersede_no_stale_ramp_wins() {
    let mut engine = Engine::new(Preset::FlangerReverb);
    engine.play();

    engine.set_reverb_time(0.5);
    engine.set_reverb_time(5.0);
    render_secs(&mut engine, 0.2);

    let settled = engine.parameter_value("reverb_time").unwrap();
    assert!(
        (settled - 5.0).abs() < 1e-3,
        "stale ramp survived: {settled}"
    );
}

#[test]
fn dry_and_wet_gains_always_sum_to_one() {
    let mut engine = Engine::new(Preset::FlangerReverb);
    engine.play();

    for mix in [0.0, 0.25, 0.6, 1.0] {
        engine.set_ambiance_mix(mix);
        render_secs(&mut engine, 0.2);

        let targets = engine
            .built()
            .unwrap()
            .binding("ambiance_mix")
            .unwrap()
            .targets
            .clone();
        let sum: f32 = targets
            .iter()
            .map(|target| {
                engine
                    .with_graph(|graph| {
                        graph
                            .node_param_mut(target.node(), target.key())
                            .map(|param| param.value())
                            .unwrap_or(0.0)
                    })
                    .unwrap()
            })
            .sum();
        assert!((sum - 1.0).abs() < 1e-3, "mix {mix}: wet+dry = {sum}");
    }
}

#[test]
fn orbit_disable_recenters_synchronously() {
    let mut engine = Engine::new(Preset::Orbit);
    engine.play();
    render_secs(&mut engine, 0.5);

    engine.toggle_orbit();
    assert!(!engine.orbit_enabled());

    // The position is already at the origin, before any further rendering.
    let panner = engine.built().unwrap().orbit.as_ref().unwrap().panner;
    let position = engine
        .with_graph(|graph| {
            graph
                .get_node(panner)
                .unwrap()
                .as_any()
                .downcast_ref::<SpatialPanner>()
                .unwrap()
                .position()
        })
        .unwrap();
    assert_eq!(position, (0.0, 0.0, 0.0));

    engine.toggle_orbit();
    assert!(engine.orbit_enabled());
}

#[test]
fn parameters_set_before_build_are_applied_at_build() {
    let mut engine = Engine::new(Preset::EqNoise);
    // No graph yet; these must queue, not crash.
    engine.set_volume(0.2);
    engine.set_lowpass_freq(1_234.0);
    engine.set_mid_boost_gain(99.0); // clamped at build

    engine.play();
    assert!((engine.parameter_value("volume").unwrap() - 0.2).abs() < 1e-6);
    assert!((engine.parameter_value("lowpass_freq").unwrap() - 1_234.0).abs() < 1e-3);
    assert!((engine.parameter_value("mid_boost_gain").unwrap() - 12.0).abs() < 1e-6);
}

#[test]
fn unbound_parameter_is_a_logged_no_op() {
    let mut engine = Engine::new(Preset::PlainNoise);
    engine.play();
    // No flanger in this preset; the call must neither crash nor bind.
    engine.set_flanger_depth(0.005);
    assert!(engine.parameter_value("flanger_depth").is_none());
}

#[test]
fn failed_impulse_response_still_reaches_running_with_audio() {
    let mut topology = Preset::ConvolutionHall.topology();
    topology.wet_chain = vec![WetStage::Convolution {
        source: IrSource::File(PathBuf::from("/nonexistent/cathedral.wav")),
    }];
    let mut engine = Engine::from_topology(topology, Box::new(OfflineBackend::default()));

    engine.play();
    assert_eq!(engine.lifecycle(), Lifecycle::Running);

    // Dry signal keeps flowing while (and after) the load fails.
    let energy = render_secs(&mut engine, 0.5);
    assert!(energy > 0.0, "no audio reached the output");
}

#[test]
fn close_invalidates_every_control_path_safely() {
    let mut engine = Engine::new(Preset::PlainNoise);
    engine.play();
    engine.close();
    assert_eq!(engine.lifecycle(), Lifecycle::Closed);
    assert_eq!(engine.context_state(), ContextState::Closed);

    // All of these are no-ops, none of them faults.
    engine.play();
    engine.pause();
    engine.toggle();
    engine.set_volume(0.3);
    engine.toggle_orbit();
    assert_eq!(engine.lifecycle(), Lifecycle::Closed);
    assert!(!engine.is_playing());

    let mut left = vec![1.0; BLOCK];
    let mut right = vec![1.0; BLOCK];
    engine.render_block(&mut left, &mut right);
    assert!(left.iter().all(|&x| x == 0.0));
}

#[test]
fn pause_keeps_lfo_phase_running() {
    let mut engine = Engine::new(Preset::Orbit);
    engine.play();
    let t0 = engine.current_time();
    render_secs(&mut engine, 0.1);

    engine.pause();
    // The output stage is disconnected but the graph keeps rendering, so
    // the clock (and with it every LFO phase) keeps advancing.
    let paused_energy = render_secs(&mut engine, 0.1);
    assert_eq!(paused_energy, 0.0);
    assert!(engine.current_time() > t0 + 0.15);
}

#[test]
fn snapshot_reflects_state_and_serializes() {
    let mut engine = Engine::new(Preset::FlangerReverb);
    engine.play();
    engine.set_volume(0.8);

    let snapshot = engine.snapshot();
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.parameters["volume"], 0.8);
    assert!(snapshot.parameters.contains_key("reverb_time"));

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"is_playing\":true"));
}

use std::any::Any;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::params::AudioParam;
use crate::traits::{AudioNode, ParamKey, PortId};

const TABLE_SIZE: usize = 1024;
const TABLE_MASK: usize = TABLE_SIZE - 1;

static SINE_TABLE: Lazy<Vec<f32>> = Lazy::new(|| {
    (0..TABLE_SIZE)
        .map(|i| (2.0 * std::f32::consts::PI * i as f32 / TABLE_SIZE as f32).sin())
        .collect()
});

/// Sine low-frequency oscillator emitting a control signal in [-1, 1].
///
/// Two LFOs sharing a frequency but offset in phase drive the orbit panner:
/// one at phase 0 feeds X, one a quarter turn later feeds Z, tracing a
/// circle.
pub struct Lfo {
    active: bool,
    sample_rate: f32,
    frequency: AudioParam,
    phase: f32,
    phase_offset: f32,
}

impl Lfo {
    pub fn new(sample_rate: f32, frequency: f32) -> Self {
        Lazy::force(&SINE_TABLE);
        Self {
            active: true,
            sample_rate,
            frequency: AudioParam::new(frequency.max(0.0)),
            phase: 0.0,
            phase_offset: 0.0,
        }
    }

    /// Phase offset in cycles (0.25 = quarter turn).
    pub fn with_phase_offset(mut self, phase_offset: f32) -> Self {
        self.phase_offset = phase_offset.rem_euclid(1.0);
        self
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline(always)]
    fn sample_at(phase: f32) -> f32 {
        let position = phase * TABLE_SIZE as f32;
        let i0 = position as usize & TABLE_MASK;
        let i1 = (i0 + 1) & TABLE_MASK;
        let frac = position - position.floor();
        SINE_TABLE[i0] * (1.0 - frac) + SINE_TABLE[i1] * frac
    }
}

impl AudioNode for Lfo {
    fn get_ports(&self) -> FxHashMap<PortId, bool> {
        let mut ports = FxHashMap::default();
        ports.insert(PortId::AudioOutput0, true);
        ports
    }

    fn process(
        &mut self,
        _inputs: &FxHashMap<PortId, &[f32]>,
        outputs: &mut FxHashMap<PortId, &mut [f32]>,
        buffer_size: usize,
        start_frame: u64,
    ) {
        let Some(out) = outputs.remove(&PortId::AudioOutput0) else {
            return;
        };
        if !self.active {
            out[..buffer_size].fill(0.0);
            return;
        }

        for i in 0..buffer_size {
            let frequency = self.frequency.advance_to(start_frame + i as u64).max(0.0);
            out[i] = Self::sample_at((self.phase + self.phase_offset).rem_euclid(1.0));
            self.phase = (self.phase + frequency / self.sample_rate).rem_euclid(1.0);
        }
    }

    fn param_mut(&mut self, key: ParamKey) -> Option<&mut AudioParam> {
        match key {
            ParamKey::Frequency => Some(&mut self.frequency),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn node_type(&self) -> &'static str {
        "lfo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(lfo: &mut Lfo, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        let mut outputs = FxHashMap::default();
        outputs.insert(PortId::AudioOutput0, out.as_mut_slice());
        lfo.process(&FxHashMap::default(), &mut outputs, frames, 0);
        out
    }

    #[test]
    fn completes_one_cycle_at_its_frequency() {
        // 1 Hz at 1 kHz: a full cycle in 1000 samples.
        let mut lfo = Lfo::new(1_000.0, 1.0);
        let out = render(&mut lfo, 1_000);

        assert!(out[0].abs() < 1e-3);
        assert!((out[250] - 1.0).abs() < 1e-2);
        assert!((out[750] + 1.0).abs() < 1e-2);
        assert!(out.iter().all(|&x| x.abs() <= 1.001));
    }

    #[test]
    fn quarter_phase_offset_is_in_quadrature() {
        let mut a = Lfo::new(1_000.0, 1.0);
        let mut b = Lfo::new(1_000.0, 1.0).with_phase_offset(0.25);
        let out_a = render(&mut a, 1_000);
        let out_b = render(&mut b, 1_000);

        // sin²+cos² = 1 along the whole cycle.
        for i in (0..1_000).step_by(50) {
            let radius = out_a[i] * out_a[i] + out_b[i] * out_b[i];
            assert!((radius - 1.0).abs() < 0.05, "at {i}: {radius}");
        }
    }

    #[test]
    fn phase_persists_across_blocks() {
        let mut lfo = Lfo::new(1_000.0, 1.0);
        let first = render(&mut lfo, 500);
        let second = render(&mut lfo, 500);
        // Second block picks up mid-cycle, not back at zero.
        assert!((first[499] - second[0]).abs() < 0.02);
        assert!(second[0] > 0.0 || second[1] < second[0]);
    }
}

//! Noise source producing white, pink, or brownian noise.
//!
//! Pink noise uses Paul Kellett's filter-bank approximation; brownian noise
//! is a leaky random walk over white noise.

use std::any::Any;

use rustc_hash::FxHashMap;

use crate::params::AudioParam;
use crate::traits::{AudioNode, ParamKey, PortId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseType {
    White,
    Pink,
    Brownian,
}

pub struct NoiseGenerator {
    sample_rate: f32,
    active: bool,
    noise_type: NoiseType,
    level: AudioParam,

    // Xorshift32 state; never zero.
    rng_state: u32,

    // Pink noise state, b0..b6 of Kellett's method.
    pink_b: [f32; 7],

    // Brownian noise state.
    brown_state: f32,
}

impl NoiseGenerator {
    pub fn new(sample_rate: f32, noise_type: NoiseType, level: f32) -> Self {
        assert!(sample_rate > 0.0, "sample rate must be positive");
        Self {
            sample_rate,
            active: true,
            noise_type,
            level: AudioParam::new(level.max(0.0)),
            rng_state: 0x2545_F491,
            pink_b: [0.0; 7],
            brown_state: 0.0,
        }
    }

    pub fn set_noise_type(&mut self, noise_type: NoiseType) {
        if noise_type != self.noise_type {
            self.noise_type = noise_type;
            self.reset_noise_state();
        }
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.rng_state = seed.max(1);
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn reset_noise_state(&mut self) {
        self.pink_b = [0.0; 7];
        self.brown_state = 0.0;
    }

    /// One pseudo-random sample in [-1.0, 1.0).
    #[inline(always)]
    fn white(&mut self) -> f32 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 17;
        self.rng_state ^= self.rng_state << 5;
        (self.rng_state as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    #[inline(always)]
    fn pink(&mut self) -> f32 {
        const P: [f32; 6] = [0.99886, 0.99332, 0.96900, 0.86650, 0.55000, -0.76160];
        const W: [f32; 6] = [
            0.0555179, 0.0750759, 0.1538520, 0.3104856, 0.5329522, -0.0168980,
        ];

        let white = self.white();
        let mut sum = 0.0;
        for i in 0..6 {
            self.pink_b[i] = P[i] * self.pink_b[i] + W[i] * white;
            sum += self.pink_b[i];
        }
        self.pink_b[6] = white * 0.115926;
        sum += self.pink_b[6] + white * 0.5362;
        sum * 0.0625
    }

    #[inline(always)]
    fn brownian(&mut self) -> f32 {
        const DECAY: f32 = 0.995;
        const SCALE: f32 = 0.05;
        let white = self.white();
        self.brown_state = DECAY * self.brown_state + SCALE * white;
        self.brown_state
    }
}

impl AudioNode for NoiseGenerator {
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
            let level = self.level.advance_to(start_frame + i as u64).max(0.0);
            let noise = match self.noise_type {
                NoiseType::White => self.white(),
                NoiseType::Pink => self.pink(),
                NoiseType::Brownian => self.brownian(),
            };
            out[i] = noise * level;
        }
    }

    fn param_mut(&mut self, key: ParamKey) -> Option<&mut AudioParam> {
        match key {
            ParamKey::Level => Some(&mut self.level),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.reset_noise_state();
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
        if !active {
            self.reset_noise_state();
        }
    }

    fn node_type(&self) -> &'static str {
        "noise_generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(generator: &mut NoiseGenerator, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        let mut outputs = FxHashMap::default();
        outputs.insert(PortId::AudioOutput0, out.as_mut_slice());
        generator.process(&FxHashMap::default(), &mut outputs, frames, 0);
        out
    }

    #[test]
    fn produces_bounded_nonzero_signal() {
        for noise_type in [NoiseType::White, NoiseType::Pink, NoiseType::Brownian] {
            let mut generator = NoiseGenerator::new(48_000.0, noise_type, 1.0);
            let out = render(&mut generator, 4096);
            assert!(out.iter().any(|&x| x != 0.0));
            assert!(out.iter().all(|&x| x.abs() <= 2.5), "{noise_type:?}");
        }
    }

    #[test]
    fn pink_noise_has_less_high_frequency_energy_than_white() {
        let mut white = NoiseGenerator::new(48_000.0, NoiseType::White, 1.0);
        let mut pink = NoiseGenerator::new(48_000.0, NoiseType::Pink, 1.0);
        let white_out = render(&mut white, 1 << 14);
        let pink_out = render(&mut pink, 1 << 14);

        // First difference boosts high frequencies; pink noise, rolling off
        // at ~3 dB/octave, should carry relatively less of them.
        let hf = |buf: &[f32]| {
            let total: f32 = buf.iter().map(|x| x * x).sum();
            let diff: f32 = buf.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
            diff / total
        };
        assert!(hf(&pink_out) < hf(&white_out) * 0.5);
    }

    #[test]
    fn inactive_generator_is_silent() {
        let mut generator = NoiseGenerator::new(48_000.0, NoiseType::Pink, 1.0);
        generator.set_active(false);
        let out = render(&mut generator, 256);
        assert!(out.iter().all(|&x| x == 0.0));
    }
}

use std::any::Any;

use rustc_hash::FxHashMap;

use crate::params::AudioParam;
use crate::traits::{AudioNode, ParamKey, PortId};

/// Stereo dynamics compressor with peak detection. Only the threshold is
/// automatable; knee, ratio, attack, and release are fixed at construction,
/// tuned for taming a broadband noise bed rather than musical dynamics.
pub struct Compressor {
    active: bool,
    threshold_db: AudioParam,
    knee_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(
        sample_rate: f32,
        threshold_db: f32,
        knee_db: f32,
        ratio: f32,
        attack_secs: f32,
        release_secs: f32,
    ) -> Self {
        Self {
            active: true,
            threshold_db: AudioParam::new(threshold_db),
            knee_db: knee_db.max(0.0),
            ratio: ratio.max(1.0),
            attack_coeff: Self::time_to_coeff(attack_secs, sample_rate),
            release_coeff: Self::time_to_coeff(release_secs, sample_rate),
            envelope: 0.0,
        }
    }

    #[inline]
    fn time_to_coeff(time_secs: f32, sample_rate: f32) -> f32 {
        let clamped = time_secs.max(1e-5);
        (-1.0 / (clamped * sample_rate)).exp()
    }

    #[inline]
    fn db_to_linear(db: f32) -> f32 {
        10.0_f32.powf(db * 0.05)
    }

    /// Gain for a detector level, with a quadratic soft knee around the
    /// threshold.
    fn compute_gain(&self, level: f32, threshold_db: f32) -> f32 {
        if level <= 1e-6 {
            return 1.0;
        }

        let level_db = 20.0 * level.log10();
        let half_knee = self.knee_db * 0.5;
        let over = level_db - threshold_db;

        let compressed_db = if over <= -half_knee {
            level_db
        } else if over < half_knee {
            let t = over + half_knee;
            level_db + (1.0 / self.ratio - 1.0) * t * t / (2.0 * self.knee_db.max(1e-3))
        } else {
            threshold_db + over / self.ratio
        };

        Self::db_to_linear(compressed_db - level_db)
    }

    #[inline]
    fn update_envelope(&self, current: f32, input: f32) -> f32 {
        if input > current {
            input + self.attack_coeff * (current - input)
        } else {
            input + self.release_coeff * (current - input)
        }
    }
}

impl AudioNode for Compressor {
    fn get_ports(&self) -> FxHashMap<PortId, bool> {
        let mut ports = FxHashMap::default();
        ports.insert(PortId::AudioInput0, false);
        ports.insert(PortId::AudioInput1, false);
        ports.insert(PortId::AudioOutput0, true);
        ports.insert(PortId::AudioOutput1, true);
        ports
    }

    fn process(
        &mut self,
        inputs: &FxHashMap<PortId, &[f32]>,
        outputs: &mut FxHashMap<PortId, &mut [f32]>,
        buffer_size: usize,
        start_frame: u64,
    ) {
        let Some(out_left) = outputs.remove(&PortId::AudioOutput0) else {
            return;
        };
        let Some(out_right) = outputs.remove(&PortId::AudioOutput1) else {
            return;
        };

        let left_in = inputs.get(&PortId::AudioInput0).copied();
        let right_in = inputs.get(&PortId::AudioInput1).copied();

        for i in 0..buffer_size {
            let threshold = self.threshold_db.advance_to(start_frame + i as u64);
            let l = left_in.map_or(0.0, |buf| buf[i]);
            let r = right_in.map_or(0.0, |buf| buf[i]);

            let detector = l.abs().max(r.abs());
            self.envelope = self.update_envelope(self.envelope, detector);
            let gain = self.compute_gain(self.envelope, threshold);

            out_left[i] = l * gain;
            out_right[i] = r * gain;
        }
    }

    fn param_mut(&mut self, key: ParamKey) -> Option<&mut AudioParam> {
        match key {
            ParamKey::Threshold => Some(&mut self.threshold_db),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
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
            self.reset();
        }
    }

    fn node_type(&self) -> &'static str {
        "compressor"
    }
}

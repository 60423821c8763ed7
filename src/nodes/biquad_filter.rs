use std::any::Any;

use rustc_hash::FxHashMap;

use crate::dsp::{Biquad, FilterType};
use crate::params::AudioParam;
use crate::traits::{AudioNode, ParamKey, PortId};

/// Stereo biquad filter stage. Frequency, gain, and Q are automatable;
/// coefficients are recomputed once per block while a ramp is in flight,
/// which keeps sweeps smooth without per-sample trigonometry.
pub struct BiquadFilter {
    active: bool,
    filter_type: FilterType,
    frequency: AudioParam,
    gain_db: AudioParam,
    q: AudioParam,
    left: Biquad,
    right: Biquad,
}

impl BiquadFilter {
    pub fn new(
        filter_type: FilterType,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain_db: f32,
    ) -> Self {
        Self {
            active: true,
            filter_type,
            frequency: AudioParam::new(frequency),
            gain_db: AudioParam::new(gain_db),
            q: AudioParam::new(q),
            left: Biquad::new(filter_type, sample_rate, frequency, q, gain_db),
            right: Biquad::new(filter_type, sample_rate, frequency, q, gain_db),
        }
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    fn sync_coefficients(&mut self, end_frame: u64) {
        let frequency = self.frequency.advance_to(end_frame);
        let gain_db = self.gain_db.advance_to(end_frame);
        let q = self.q.advance_to(end_frame);
        if frequency != self.left.frequency || gain_db != self.left.gain_db || q != self.left.q {
            for filter in [&mut self.left, &mut self.right] {
                filter.frequency = frequency.clamp(10.0, filter.sample_rate * 0.499);
                filter.gain_db = gain_db;
                filter.q = q.max(0.01);
                filter.update_coefficients();
            }
        }
    }
}

impl AudioNode for BiquadFilter {
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

        self.sync_coefficients(start_frame + buffer_size as u64);

        let left_in = inputs.get(&PortId::AudioInput0).copied();
        let right_in = inputs.get(&PortId::AudioInput1).copied();

        for i in 0..buffer_size {
            let l = left_in.map_or(0.0, |buf| buf[i]);
            let r = right_in.map_or(0.0, |buf| buf[i]);
            out_left[i] = self.left.process(l);
            out_right[i] = self.right.process(r);
        }
    }

    fn param_mut(&mut self, key: ParamKey) -> Option<&mut AudioParam> {
        match key {
            ParamKey::Frequency => Some(&mut self.frequency),
            ParamKey::GainDb => Some(&mut self.gain_db),
            ParamKey::Q => Some(&mut self.q),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
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
        "biquad_filter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn lowpass_node_attenuates_above_cutoff() {
        let sample_rate = 48_000.0;
        let mut node = BiquadFilter::new(FilterType::LowPass, sample_rate, 400.0, 0.707, 0.0);

        let n = 4096;
        let input: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 8_000.0 * i as f32 / sample_rate).sin())
            .collect();
        let mut out_l = vec![0.0; n];
        let mut out_r = vec![0.0; n];
        let mut inputs = FxHashMap::default();
        inputs.insert(PortId::AudioInput0, input.as_slice());
        inputs.insert(PortId::AudioInput1, input.as_slice());
        let mut outputs = FxHashMap::default();
        outputs.insert(PortId::AudioOutput0, out_l.as_mut_slice());
        outputs.insert(PortId::AudioOutput1, out_r.as_mut_slice());
        node.process(&inputs, &mut outputs, n, 0);

        let in_rms: f32 = input.iter().map(|x| x * x).sum::<f32>().sqrt();
        let out_rms: f32 = out_l.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!(out_rms < in_rms * 0.1);
    }

    #[test]
    fn frequency_ramp_updates_coefficients() {
        let mut node = BiquadFilter::new(FilterType::LowPass, 48_000.0, 400.0, 0.707, 0.0);
        node.param_mut(ParamKey::Frequency)
            .unwrap()
            .ramp_to(2_000.0, 0, 64);

        let input = vec![0.0f32; 128];
        let mut out_l = vec![0.0; 128];
        let mut out_r = vec![0.0; 128];
        let mut inputs = FxHashMap::default();
        inputs.insert(PortId::AudioInput0, input.as_slice());
        inputs.insert(PortId::AudioInput1, input.as_slice());
        let mut outputs = FxHashMap::default();
        outputs.insert(PortId::AudioOutput0, out_l.as_mut_slice());
        outputs.insert(PortId::AudioOutput1, out_r.as_mut_slice());
        node.process(&inputs, &mut outputs, 128, 0);

        assert!((node.left.frequency - 2_000.0).abs() < 1e-3);
    }
}

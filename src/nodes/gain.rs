use std::any::Any;

use rustc_hash::FxHashMap;

use crate::params::AudioParam;
use crate::traits::{AudioNode, ParamKey, PortId};

/// Stereo gain stage. The level is ramped per sample so external changes
/// (volume, dry/wet balance) never step discontinuously.
pub struct Gain {
    active: bool,
    level: AudioParam,
}

impl Gain {
    pub fn new(level: f32) -> Self {
        Self {
            active: true,
            level: AudioParam::new(level.max(0.0)),
        }
    }

    pub fn level(&self) -> f32 {
        self.level.value()
    }
}

impl AudioNode for Gain {
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
            let level = self.level.advance_to(start_frame + i as u64).max(0.0);
            let l = left_in.map_or(0.0, |buf| buf[i]);
            let r = right_in.map_or(0.0, |buf| buf[i]);
            out_left[i] = l * level;
            out_right[i] = r * level;
        }
    }

    fn param_mut(&mut self, key: ParamKey) -> Option<&mut AudioParam> {
        match key {
            ParamKey::Level => Some(&mut self.level),
            _ => None,
        }
    }

    fn reset(&mut self) {}

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
        "gain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_both_channels() {
        let mut gain = Gain::new(0.5);
        let left = vec![1.0f32; 8];
        let right = vec![-1.0f32; 8];
        let mut out_l = vec![0.0; 8];
        let mut out_r = vec![0.0; 8];

        let mut inputs = FxHashMap::default();
        inputs.insert(PortId::AudioInput0, left.as_slice());
        inputs.insert(PortId::AudioInput1, right.as_slice());
        let mut outputs = FxHashMap::default();
        outputs.insert(PortId::AudioOutput0, out_l.as_mut_slice());
        outputs.insert(PortId::AudioOutput1, out_r.as_mut_slice());

        gain.process(&inputs, &mut outputs, 8, 0);
        assert!(out_l.iter().all(|&x| (x - 0.5).abs() < 1e-6));
        assert!(out_r.iter().all(|&x| (x + 0.5).abs() < 1e-6));
    }

    #[test]
    fn ramped_level_lands_on_target() {
        let mut gain = Gain::new(0.0);
        gain.param_mut(ParamKey::Level).unwrap().ramp_to(1.0, 0, 64);

        let input = vec![1.0f32; 128];
        let mut out_l = vec![0.0; 128];
        let mut out_r = vec![0.0; 128];
        let mut inputs = FxHashMap::default();
        inputs.insert(PortId::AudioInput0, input.as_slice());
        inputs.insert(PortId::AudioInput1, input.as_slice());
        let mut outputs = FxHashMap::default();
        outputs.insert(PortId::AudioOutput0, out_l.as_mut_slice());
        outputs.insert(PortId::AudioOutput1, out_r.as_mut_slice());
        gain.process(&inputs, &mut outputs, 128, 0);

        // Monotonic rise, then pinned at the target after the window.
        assert!(out_l[0] < 0.1);
        assert!(out_l[32] > 0.3 && out_l[32] < 0.7);
        assert!((out_l[127] - 1.0).abs() < 1e-6);
    }
}

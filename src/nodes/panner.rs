use std::any::Any;

use rustc_hash::FxHashMap;

use crate::params::AudioParam;
use crate::traits::{AudioNode, ParamKey, PortId};

/// Distance at which the attenuation model leaves the source at unity gain.
const REF_DISTANCE: f32 = 500.0;

/// Positional panner: places a mono source in 3D space, rendering it to
/// stereo with inverse-distance attenuation and equal-power azimuth panning.
///
/// Position is `base + radius * modulation` per axis; the `PositionXMod` /
/// `PositionZMod` ports accept LFO signals in [-1, 1], so two quadrature
/// LFOs trace a circular orbit of radius `Radius`. With the mod ports
/// disconnected and bases at zero the source sits at the origin: centered
/// and at full level.
pub struct SpatialPanner {
    active: bool,
    position_x: AudioParam,
    position_y: AudioParam,
    position_z: AudioParam,
    radius: AudioParam,
}

impl SpatialPanner {
    pub fn new(radius: f32) -> Self {
        Self {
            active: true,
            position_x: AudioParam::new(0.0),
            position_y: AudioParam::new(0.0),
            position_z: AudioParam::new(0.0),
            radius: AudioParam::new(radius.max(0.0)),
        }
    }

    pub fn position(&self) -> (f32, f32, f32) {
        (
            self.position_x.value(),
            self.position_y.value(),
            self.position_z.value(),
        )
    }

    /// Recenter to the origin immediately, cancelling any ramps in flight.
    /// Called together with disconnecting the orbit LFOs so the recenter is
    /// atomic from the listener's perspective.
    pub fn recenter(&mut self) {
        self.position_x.set(0.0);
        self.position_y.set(0.0);
        self.position_z.set(0.0);
    }
}

impl AudioNode for SpatialPanner {
    fn get_ports(&self) -> FxHashMap<PortId, bool> {
        let mut ports = FxHashMap::default();
        ports.insert(PortId::AudioInput0, false);
        ports.insert(PortId::AudioInput1, false);
        ports.insert(PortId::PositionXMod, false);
        ports.insert(PortId::PositionZMod, false);
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
        let mod_x = inputs.get(&PortId::PositionXMod).copied();
        let mod_z = inputs.get(&PortId::PositionZMod).copied();

        for i in 0..buffer_size {
            let frame = start_frame + i as u64;
            let radius = self.radius.advance_to(frame).max(0.0);
            let x = self.position_x.advance_to(frame) + radius * mod_x.map_or(0.0, |m| m[i]);
            let y = self.position_y.advance_to(frame);
            let z = self.position_z.advance_to(frame) + radius * mod_z.map_or(0.0, |m| m[i]);

            let distance = (x * x + y * y + z * z).sqrt();
            let distance_gain = REF_DISTANCE / (REF_DISTANCE + distance);
            let pan = if distance > 1e-3 {
                (x / distance).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;

            // Fold both channels into the positioned source.
            let input =
                (left_in.map_or(0.0, |b| b[i]) + right_in.map_or(0.0, |b| b[i])) * 0.5;
            let positioned = input * distance_gain;
            out_left[i] = positioned * angle.cos();
            out_right[i] = positioned * angle.sin();
        }
    }

    fn param_mut(&mut self, key: ParamKey) -> Option<&mut AudioParam> {
        match key {
            ParamKey::PositionX => Some(&mut self.position_x),
            ParamKey::PositionY => Some(&mut self.position_y),
            ParamKey::PositionZ => Some(&mut self.position_z),
            ParamKey::Radius => Some(&mut self.radius),
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
        "spatial_panner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        panner: &mut SpatialPanner,
        input: &[f32],
        mod_x: Option<&[f32]>,
        mod_z: Option<&[f32]>,
    ) -> (Vec<f32>, Vec<f32>) {
        let n = input.len();
        let mut out_l = vec![0.0; n];
        let mut out_r = vec![0.0; n];
        let mut inputs = FxHashMap::default();
        inputs.insert(PortId::AudioInput0, input);
        inputs.insert(PortId::AudioInput1, input);
        if let Some(m) = mod_x {
            inputs.insert(PortId::PositionXMod, m);
        }
        if let Some(m) = mod_z {
            inputs.insert(PortId::PositionZMod, m);
        }
        let mut outputs = FxHashMap::default();
        outputs.insert(PortId::AudioOutput0, out_l.as_mut_slice());
        outputs.insert(PortId::AudioOutput1, out_r.as_mut_slice());
        panner.process(&inputs, &mut outputs, n, 0);
        (out_l, out_r)
    }

    #[test]
    fn centered_source_is_equal_and_full_level() {
        let mut panner = SpatialPanner::new(1_000.0);
        let input = vec![1.0f32; 16];
        let (out_l, out_r) = run(&mut panner, &input, None, None);

        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!(out_l.iter().all(|&x| (x - expected).abs() < 1e-4));
        assert!(out_r.iter().all(|&x| (x - expected).abs() < 1e-4));
    }

    #[test]
    fn source_to_the_left_favors_left_channel() {
        let mut panner = SpatialPanner::new(1_000.0);
        let input = vec![1.0f32; 16];
        let mod_x = vec![-1.0f32; 16];
        let (out_l, out_r) = run(&mut panner, &input, Some(&mod_x), None);
        assert!(out_l[8] > out_r[8] * 10.0);
    }

    #[test]
    fn larger_radius_attenuates_more() {
        let input = vec![1.0f32; 16];
        let mod_x = vec![1.0f32; 16];

        let mut near = SpatialPanner::new(500.0);
        let (near_l, near_r) = run(&mut near, &input, Some(&mod_x), None);
        let mut far = SpatialPanner::new(10_000.0);
        let (far_l, far_r) = run(&mut far, &input, Some(&mod_x), None);

        let level = |l: &[f32], r: &[f32]| l[8].hypot(r[8]);
        assert!(level(&far_l, &far_r) < level(&near_l, &near_r) * 0.2);
    }

    #[test]
    fn recenter_is_immediate() {
        let mut panner = SpatialPanner::new(1_000.0);
        panner
            .param_mut(ParamKey::PositionX)
            .unwrap()
            .ramp_to(4_000.0, 0, 10_000);
        panner.recenter();
        assert_eq!(panner.position(), (0.0, 0.0, 0.0));

        let input = vec![1.0f32; 16];
        let (out_l, out_r) = run(&mut panner, &input, None, None);
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!(out_l.iter().all(|&x| (x - expected).abs() < 1e-4));
        assert!(out_r.iter().all(|&x| (x - expected).abs() < 1e-4));
    }
}

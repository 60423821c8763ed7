use std::any::Any;

use rustc_hash::FxHashMap;

use crate::params::AudioParam;
use crate::traits::{AudioNode, ParamKey, PortId};

/// Stereo delay line with an internal feedback loop and in-loop damping.
///
/// The buffer is pre-allocated for the maximum delay declared at
/// construction; changing the delay time never reallocates. Reads are
/// fractional (linear interpolation) so a modulated delay time sweeps
/// without zipper noise; the `TimeMod` port accepts a control signal
/// (typically an LFO) whose contribution is scaled by `ModDepth` seconds.
///
/// The feedback path runs through a one-pole lowpass (`Damp`, cutoff in Hz)
/// and the wet tap is taken after that filter, so the damping shapes both
/// the recirculation and the audible tail. The right channel reads at
/// `time * right_scale`, which detunes the two channels for stereo
/// diffusion; ratios near mutually prime keep the loops from piling up on a
/// common resonance.
pub struct DelayLine {
    active: bool,
    sample_rate: f32,
    max_delay_samples: usize,
    buffer_left: Vec<f32>,
    buffer_right: Vec<f32>,
    write_index: usize,
    right_scale: f32,
    time: AudioParam,
    feedback: AudioParam,
    damp: AudioParam,
    mod_depth: AudioParam,
    damp_state_l: f32,
    damp_state_r: f32,
}

impl DelayLine {
    /// * `max_delay_secs` - upper bound for the (modulated) delay time.
    /// * `time_secs` - initial delay time.
    /// * `feedback` - loop gain, kept below 1 for stability.
    /// * `damp_hz` - lowpass cutoff inside the loop.
    pub fn new(
        sample_rate: f32,
        max_delay_secs: f32,
        time_secs: f32,
        feedback: f32,
        damp_hz: f32,
    ) -> Self {
        let max_delay_samples = ((max_delay_secs * sample_rate).ceil() as usize).max(8);
        Self {
            active: true,
            sample_rate,
            max_delay_samples,
            buffer_left: vec![0.0; max_delay_samples],
            buffer_right: vec![0.0; max_delay_samples],
            write_index: 0,
            right_scale: 1.0,
            time: AudioParam::new(time_secs),
            feedback: AudioParam::new(feedback.clamp(0.0, 0.98)),
            damp: AudioParam::new(damp_hz),
            mod_depth: AudioParam::new(0.0),
            damp_state_l: 0.0,
            damp_state_r: 0.0,
        }
    }

    /// Detune ratio for the right channel's read tap.
    pub fn with_right_scale(mut self, right_scale: f32) -> Self {
        self.right_scale = right_scale.max(0.01);
        self
    }

    pub fn max_delay_secs(&self) -> f32 {
        self.max_delay_samples as f32 / self.sample_rate
    }

    #[inline(always)]
    fn read_fractional(buffer: &[f32], write_index: usize, delay_samples: f32) -> f32 {
        let len = buffer.len();
        let read_pos = write_index as f32 - delay_samples + len as f32;
        let i0 = read_pos.floor();
        let frac = read_pos - i0;
        let i0 = i0 as usize % len;
        let i1 = (i0 + 1) % len;
        buffer[i0] * (1.0 - frac) + buffer[i1] * frac
    }

    #[inline(always)]
    fn damp_coeff(&self, cutoff_hz: f32) -> f32 {
        let cutoff = cutoff_hz.clamp(20.0, self.sample_rate * 0.49);
        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff);
        let dt = 1.0 / self.sample_rate;
        dt / (rc + dt)
    }
}

impl AudioNode for DelayLine {
    fn get_ports(&self) -> FxHashMap<PortId, bool> {
        let mut ports = FxHashMap::default();
        ports.insert(PortId::AudioInput0, false);
        ports.insert(PortId::AudioInput1, false);
        ports.insert(PortId::TimeMod, false);
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
        let time_mod = inputs.get(&PortId::TimeMod).copied();

        let max_delay = (self.max_delay_samples - 2) as f32;

        for i in 0..buffer_size {
            let frame = start_frame + i as u64;
            let base_time = self.time.advance_to(frame);
            let depth = self.mod_depth.advance_to(frame);
            let feedback = self.feedback.advance_to(frame).clamp(0.0, 0.98);
            let damp_alpha = {
                let cutoff = self.damp.advance_to(frame);
                self.damp_coeff(cutoff)
            };

            let modulation = time_mod.map_or(0.0, |buf| buf[i]) * depth;
            let time = base_time + modulation;
            let delay_l = (time * self.sample_rate).clamp(1.0, max_delay);
            let delay_r = (time * self.right_scale * self.sample_rate).clamp(1.0, max_delay);

            let delayed_l = Self::read_fractional(&self.buffer_left, self.write_index, delay_l);
            let delayed_r = Self::read_fractional(&self.buffer_right, self.write_index, delay_r);

            // One-pole damping inside the loop; the wet tap follows it.
            self.damp_state_l += damp_alpha * (delayed_l - self.damp_state_l);
            self.damp_state_r += damp_alpha * (delayed_r - self.damp_state_r);

            let in_l = left_in.map_or(0.0, |buf| buf[i]);
            let in_r = right_in.map_or(0.0, |buf| buf[i]);
            self.buffer_left[self.write_index] = in_l + self.damp_state_l * feedback;
            self.buffer_right[self.write_index] = in_r + self.damp_state_r * feedback;

            out_left[i] = self.damp_state_l;
            out_right[i] = self.damp_state_r;

            self.write_index = (self.write_index + 1) % self.max_delay_samples;
        }
    }

    fn param_mut(&mut self, key: ParamKey) -> Option<&mut AudioParam> {
        match key {
            ParamKey::DelayTime => Some(&mut self.time),
            ParamKey::Feedback => Some(&mut self.feedback),
            ParamKey::Damp => Some(&mut self.damp),
            ParamKey::ModDepth => Some(&mut self.mod_depth),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.buffer_left.fill(0.0);
        self.buffer_right.fill(0.0);
        self.write_index = 0;
        self.damp_state_l = 0.0;
        self.damp_state_r = 0.0;
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
        "delay_line"
    }
}

//! Impulse response sourcing for the convolution reverb: programmatic
//! generators, WAV ingestion, sample-rate conversion, and the background
//! loader that feeds the convolver's slot without ever blocking the control
//! thread.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::nodes::{IrSlot, IrState, PreparedIr};

struct SinglePoleLpf {
    a0: f32,
    b1: f32,
    z: f32,
}

impl SinglePoleLpf {
    fn new(cutoff: f32, sample_rate: f32) -> Self {
        let cutoff = cutoff.clamp(20.0, 20_000.0);
        let sample_rate = sample_rate.clamp(1.0, 192_000.0);

        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff);
        let dt = 1.0 / sample_rate;
        let alpha = dt / (rc + dt).max(1e-9);

        Self {
            a0: alpha.clamp(0.0, 1.0),
            b1: (1.0 - alpha).clamp(0.0, 1.0),
            z: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let input = input.clamp(-1.0, 1.0);
        self.z = (input * self.a0 + self.z * self.b1).clamp(-1.0, 1.0);
        self.z
    }
}

/// Synthesizes impulse responses so convolution presets have a usable
/// default even when no recorded IR asset is available.
pub struct ImpulseResponseGenerator {
    sample_rate: f32,
}

impl ImpulseResponseGenerator {
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }

    /// Exponentially decaying envelope.
    pub fn exponential_decay(&self, length_secs: f32, decay_rate: f32) -> Vec<f32> {
        let num_samples = (length_secs * self.sample_rate) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / self.sample_rate;
                (-decay_rate * t).exp()
            })
            .collect()
    }

    /// Sine tone under an exponential decay.
    pub fn sine_decay(&self, length_secs: f32, freq: f32, decay_rate: f32) -> Vec<f32> {
        let num_samples = (length_secs * self.sample_rate) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / self.sample_rate;
                let decay = (-decay_rate * t).exp();
                let sine = (2.0 * std::f32::consts::PI * freq * t).sin();
                decay * sine
            })
            .collect()
    }

    /// Repeating echo pattern with geometric falloff.
    pub fn comb(&self, delay_secs: f32, feedback: f32, length_secs: f32) -> Vec<f32> {
        let num_samples = (length_secs * self.sample_rate) as usize;
        let delay_samples = ((delay_secs * self.sample_rate) as usize).max(1);
        let mut ir = vec![0.0; num_samples];

        let mut amplitude = 1.0;
        let mut pos = 0;
        while pos < num_samples && amplitude > 0.001 {
            ir[pos] = amplitude;
            amplitude *= feedback;
            pos += delay_samples;
        }

        ir
    }

    /// Plate-style reverb: decaying white noise, diffusion smoothing, and a
    /// spectral roll-off.
    pub fn plate(&self, decay_time: f32, diffusion: f32) -> Vec<f32> {
        let decay_time = decay_time.clamp(0.1, 10.0);
        let diffusion = diffusion.clamp(0.0, 1.0);
        let sample_rate = self.sample_rate.clamp(1.0, 192_000.0);
        let num_samples = ((decay_time * sample_rate) as usize).clamp(1, 60 * 48_000);

        let mut rng = StdRng::from_entropy();
        let mut ir: Vec<f32> = (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate;
                let envelope = (-t / decay_time).exp();
                envelope * rng.gen_range(-1.0_f32..1.0_f32)
            })
            .collect();

        // Recursive smoothing diffuses the grain without the periodicity a
        // moving average would introduce.
        if diffusion > 0.0 {
            let smoothing_coeff = diffusion * 0.1;
            for i in 1..num_samples {
                ir[i] = (1.0 - smoothing_coeff) * ir[i - 1] + smoothing_coeff * ir[i];
            }
        }

        let cutoff = (5_000.0_f32 - 4_500.0_f32 * diffusion).clamp(20.0, 20_000.0);
        let mut filter = SinglePoleLpf::new(cutoff, sample_rate);
        for sample in ir.iter_mut() {
            *sample = filter.process(*sample);
        }

        let max_val = ir.iter().fold(1e-9_f32, |max, &x| max.max(x.abs()));
        for sample in ir.iter_mut() {
            *sample /= max_val;
        }

        ir
    }

    /// Normalizes an impulse response to a peak amplitude of 1.0.
    pub fn normalize(mut ir: Vec<f32>) -> Vec<f32> {
        let max = ir.iter().map(|x| x.abs()).fold(0.0_f32, f32::max);
        if max > 0.0 {
            for sample in ir.iter_mut() {
                *sample /= max;
            }
        }
        ir
    }
}

/// Decodes WAV bytes into (left, optional right, source sample rate).
/// Handles 16/24/32-bit int and 32-bit float, mono or stereo.
pub fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, Option<Vec<f32>>, u32)> {
    let cursor = Cursor::new(data);
    let mut reader = hound::WavReader::new(cursor).context("reading WAV header")?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    if channels == 0 || channels > 2 {
        bail!("WAV files with {} channels are not supported", channels);
    }

    let raw_samples: Vec<f32> = match (spec.bits_per_sample, spec.sample_format) {
        (32, hound::SampleFormat::Float) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        (16, hound::SampleFormat::Int) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()?,
        (24, hound::SampleFormat::Int) => {
            let shift = 32 - 24;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v << shift >> shift) as f32 / 8_388_607.0))
                .collect::<std::result::Result<_, _>>()?
        }
        (32, hound::SampleFormat::Int) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
            .collect::<std::result::Result<_, _>>()?,
        (bits, format) => bail!(
            "unsupported WAV format: bits_per_sample={} sample_format={:?}",
            bits,
            format
        ),
    };

    match channels {
        1 => Ok((raw_samples, None, spec.sample_rate)),
        2 => {
            let mut left = Vec::with_capacity(raw_samples.len() / 2);
            let mut right = Vec::with_capacity(raw_samples.len() / 2);
            for chunk in raw_samples.chunks_exact(2) {
                left.push(chunk[0]);
                right.push(chunk[1]);
            }
            Ok((left, Some(right), spec.sample_rate))
        }
        _ => unreachable!(),
    }
}

/// Sinc-resamples a mono impulse response from `from_rate` to `to_rate`.
pub fn resample_ir(ir: &[f32], from_rate: f32, to_rate: f32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    if ir.is_empty() {
        bail!("impulse response is empty");
    }
    if (from_rate - to_rate).abs() < f32::EPSILON {
        return Ok(ir.to_vec());
    }

    let conversion_ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f64>::new(conversion_ratio, 2.0, params, chunk_size, 1)
        .context("creating resampler")?;

    let ir_f64: Vec<f64> = ir.iter().map(|&x| x as f64).collect();
    let mut resampled: Vec<f64> = Vec::new();

    let mut pos = 0;
    while pos < ir_f64.len() {
        let end = (pos + chunk_size).min(ir_f64.len());
        let mut block = ir_f64[pos..end].to_vec();
        if block.len() < chunk_size {
            block.resize(chunk_size, 0.0);
        }
        let input_block = vec![block];
        let out = resampler
            .process(&input_block, None)
            .context("resampling block")?;
        resampled.extend(out[0].iter());
        pos += chunk_size;
    }

    let partial = resampler
        .process_partial::<Vec<f64>>(None, None)
        .context("flushing resampler")?;
    resampled.extend(partial[0].iter());

    Ok(resampled.into_iter().map(|x| x as f32).collect())
}

/// Loads, resamples, and partitions an IR file for a convolver running at
/// `sample_rate` with the given partition size.
pub fn prepare_ir_file(path: &Path, sample_rate: f32, partition: usize) -> Result<PreparedIr> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (mut left, mut right, source_rate) = decode_wav(&data)?;

    if source_rate as f32 != sample_rate {
        left = resample_ir(&left, source_rate as f32, sample_rate)?;
        right = match right {
            Some(channel) => Some(resample_ir(&channel, source_rate as f32, sample_rate)?),
            None => None,
        };
    }

    if left.is_empty() {
        bail!("impulse response is empty after decoding");
    }

    Ok(PreparedIr::prepare(&left, right.as_deref(), partition))
}

/// Loads an IR file off the control thread and delivers it through the
/// convolver's slot. A failed load marks the slot `Failed` (the convolver
/// stays passthrough) and logs the cause; it never reaches the caller.
pub fn load_ir_async(path: PathBuf, sample_rate: f32, partition: usize, slot: IrSlot) {
    thread::spawn(move || {
        let result = prepare_ir_file(&path, sample_rate, partition);
        let mut state = match slot.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match result {
            Ok(ir) => {
                log::info!(
                    "impulse response {} ready ({} partitions)",
                    path.display(),
                    ir.partition_count()
                );
                *state = IrState::Ready(ir);
            }
            Err(err) => {
                log::warn!(
                    "impulse response {} failed to load, reverb stays dry: {:#}",
                    path.display(),
                    err
                );
                *state = IrState::Failed;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay_is_monotonic() {
        let generator = ImpulseResponseGenerator::new(1_000.0);
        let ir = generator.exponential_decay(0.5, 8.0);
        assert_eq!(ir.len(), 500);
        assert!(ir.windows(2).all(|w| w[1] <= w[0]));
        assert!((ir[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn plate_is_normalized_and_decaying() {
        let generator = ImpulseResponseGenerator::new(8_000.0);
        let ir = generator.plate(0.5, 0.6);
        let peak = ir.iter().map(|x| x.abs()).fold(0.0_f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-3);

        let head: f32 = ir[..ir.len() / 4].iter().map(|x| x.abs()).sum();
        let tail: f32 = ir[3 * ir.len() / 4..].iter().map(|x| x.abs()).sum();
        assert!(tail < head);
    }

    #[test]
    fn decode_wav_roundtrip_mono_i16() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut bytes, spec).unwrap();
            for i in 0..64i16 {
                writer.write_sample(i * 256).unwrap();
            }
            writer.finalize().unwrap();
        }

        let (left, right, rate) = decode_wav(bytes.get_ref()).unwrap();
        assert_eq!(rate, 22_050);
        assert!(right.is_none());
        assert_eq!(left.len(), 64);
        assert!((left[32] - (32.0 * 256.0 / i16::MAX as f32)).abs() < 1e-4);
    }

    #[test]
    fn decode_wav_splits_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut bytes = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut bytes, spec).unwrap();
            for _ in 0..16 {
                writer.write_sample(0.25f32).unwrap();
                writer.write_sample(-0.5f32).unwrap();
            }
            writer.finalize().unwrap();
        }

        let (left, right, _) = decode_wav(bytes.get_ref()).unwrap();
        let right = right.unwrap();
        assert!(left.iter().all(|&x| (x - 0.25).abs() < 1e-6));
        assert!(right.iter().all(|&x| (x + 0.5).abs() < 1e-6));
    }

    #[test]
    fn resample_changes_length_by_ratio() {
        let ir = vec![1.0f32; 4_410];
        let out = resample_ir(&ir, 44_100.0, 22_050.0).unwrap();
        // The chunked sinc resampler pads the final block and carries
        // filter delay, so the length lands near half, not exactly.
        assert!(
            (1_800..=3_200).contains(&out.len()),
            "unexpected length {}",
            out.len()
        );
    }

    #[test]
    fn missing_file_reports_failed_slot() {
        let slot = crate::nodes::new_ir_slot();
        load_ir_async(
            PathBuf::from("/nonexistent/impulse.wav"),
            48_000.0,
            128,
            slot.clone(),
        );
        // The worker owns the slot; wait for it to settle.
        for _ in 0..100 {
            std::thread::sleep(std::time::Duration::from_millis(5));
            if matches!(*slot.lock().unwrap(), IrState::Failed) {
                return;
            }
        }
        panic!("loader did not mark the slot failed");
    }
}

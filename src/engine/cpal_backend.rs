//! cpal output backend: device selection, stream configuration, and sample
//! format conversion for playback on real hardware.
//!
//! The device callback may request any number of frames and they rarely
//! line up with the engine block size, so a carry buffer accumulates
//! interleaved samples between the fixed-size renderer blocks and the
//! variable-size host buffers.

use anyhow::{anyhow, Context as _};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample, StreamConfig};
use dasp_sample::FromSample;

use crate::engine::backend::{OutputBackend, StreamInfo};
use crate::engine::context::SharedRenderer;
use crate::engine::error::EngineError;

const ENGINE_BLOCK_SIZE: usize = 128;

pub struct CpalBackend {
    device: Option<cpal::Device>,
    config: Option<StreamConfig>,
    sample_format: Option<SampleFormat>,
    stream: Option<cpal::Stream>,
    info: Option<StreamInfo>,
    running: bool,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            device: None,
            config: None,
            sample_format: None,
            stream: None,
            info: None,
            running: false,
        }
    }

    fn open_device(&mut self) -> anyhow::Result<StreamInfo> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?;
        let supported = device
            .default_output_config()
            .context("querying default output config")?;

        let sample_format = supported.sample_format();
        if !matches!(
            sample_format,
            SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
        ) {
            anyhow::bail!("unsupported sample format: {sample_format:?}");
        }

        let config: StreamConfig = supported.config();
        let info = StreamInfo {
            sample_rate: config.sample_rate.0 as f32,
            block_size: ENGINE_BLOCK_SIZE,
        };

        log::info!(
            "output device '{}': {} Hz, {} channels, {:?}",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        self.device = Some(device);
        self.config = Some(config);
        self.sample_format = Some(sample_format);
        self.info = Some(info);
        Ok(info)
    }

    fn build_stream(&mut self, renderer: SharedRenderer) -> anyhow::Result<cpal::Stream> {
        let device = self.device.as_ref().ok_or_else(|| anyhow!("no device"))?;
        let config = self.config.clone().ok_or_else(|| anyhow!("no config"))?;
        let sample_format = self
            .sample_format
            .ok_or_else(|| anyhow!("no sample format"))?;

        match sample_format {
            SampleFormat::F32 => build_stream::<f32>(device, config, renderer),
            SampleFormat::I16 => build_stream::<i16>(device, config, renderer),
            SampleFormat::U16 => build_stream::<u16>(device, config, renderer),
            other => Err(anyhow!("unsupported sample format: {other:?}")),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for CpalBackend {
    fn open(&mut self) -> Result<StreamInfo, EngineError> {
        if let Some(info) = self.info {
            return Ok(info);
        }
        self.open_device()
            .map_err(|err| EngineError::BackendUnavailable(format!("{err:#}")))
    }

    fn resume(&mut self, renderer: SharedRenderer) -> Result<(), EngineError> {
        if self.stream.is_none() {
            let stream = self
                .build_stream(renderer)
                .map_err(|err| EngineError::BackendUnavailable(format!("{err:#}")))?;
            self.stream = Some(stream);
        }
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|err| EngineError::BackendUnavailable(err.to_string()))?;
        }
        self.running = true;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        if let Some(stream) = &self.stream {
            stream
                .pause()
                .map_err(|err| EngineError::BackendUnavailable(err.to_string()))?;
        }
        self.running = false;
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
        self.device = None;
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: StreamConfig,
    renderer: SharedRenderer,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let block = ENGINE_BLOCK_SIZE;

    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];
    let mut carry: Vec<f32> = Vec::with_capacity(block * channels);
    let mut carry_pos = 0usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [T], _| {
                for slot in data.iter_mut() {
                    if carry_pos >= carry.len() {
                        // Render the next fixed-size engine block. A failed
                        // try_lock means the control thread holds the
                        // renderer; emit silence rather than block the
                        // device thread.
                        match renderer.try_lock() {
                            Ok(mut r) => r.render(&mut left, &mut right),
                            Err(_) => {
                                left.fill(0.0);
                                right.fill(0.0);
                            }
                        }
                        carry.clear();
                        carry_pos = 0;
                        for frame in 0..block {
                            for channel in 0..channels {
                                carry.push(match channel {
                                    0 => left[frame],
                                    1 => right[frame],
                                    _ => 0.0,
                                });
                            }
                        }
                    }
                    *slot = T::from_sample(carry[carry_pos]);
                    carry_pos += 1;
                }
            },
            move |err| {
                log::warn!("output stream error: {err}");
            },
            None,
        )
        .context("building output stream")?;

    Ok(stream)
}

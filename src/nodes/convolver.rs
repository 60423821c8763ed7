use std::any::Any;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::traits::{AudioNode, PortId};

/// An impulse response pre-transformed for uniformly partitioned
/// convolution: the IR is cut into `partition`-sized chunks, each
/// zero-padded to `2 * partition` and moved to the frequency domain.
/// Preparation is the expensive part and runs off the render thread (the
/// loader worker or build time); the node only multiplies spectra.
pub struct PreparedIr {
    partition: usize,
    parts_l: Vec<Vec<Complex<f32>>>,
    parts_r: Vec<Vec<Complex<f32>>>,
}

impl PreparedIr {
    pub fn prepare(ir_left: &[f32], ir_right: Option<&[f32]>, partition: usize) -> Self {
        let fft_size = partition * 2;
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);

        let transform = |ir: &[f32]| -> Vec<Vec<Complex<f32>>> {
            ir.chunks(partition)
                .map(|chunk| {
                    let mut buffer = vec![Complex::new(0.0, 0.0); fft_size];
                    for (slot, &sample) in buffer.iter_mut().zip(chunk) {
                        *slot = Complex::new(sample, 0.0);
                    }
                    forward.process(&mut buffer);
                    buffer
                })
                .collect()
        };

        let parts_l = transform(ir_left);
        let parts_r = match ir_right {
            Some(ir) => transform(ir),
            None => parts_l.clone(),
        };

        Self {
            partition,
            parts_l,
            parts_r,
        }
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn partition_count(&self) -> usize {
        self.parts_l.len()
    }
}

/// Shared slot through which the asynchronous loader hands a prepared IR to
/// the convolver. The render thread only ever `try_lock`s it.
pub type IrSlot = Arc<Mutex<IrState>>;

pub enum IrState {
    Pending,
    Ready(PreparedIr),
    Failed,
}

pub fn new_ir_slot() -> IrSlot {
    Arc::new(Mutex::new(IrState::Pending))
}

/// Stereo convolution node using uniformly partitioned overlap-save.
///
/// Until an impulse response is installed the node passes audio through
/// dry, so a chain containing it is never silent while a load is in flight
/// (or after one has failed).
pub struct Convolver {
    active: bool,
    partition: usize,
    fft_size: usize,
    forward_fft: Arc<dyn Fft<f32>>,
    inverse_fft: Arc<dyn Fft<f32>>,
    ir: Option<PreparedIr>,
    slot: Option<IrSlot>,
    fdl_l: Vec<Vec<Complex<f32>>>,
    fdl_r: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    prev_in_l: Vec<f32>,
    prev_in_r: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
}

impl Convolver {
    /// A convolver that starts as passthrough and installs whatever the
    /// slot eventually delivers.
    pub fn with_slot(partition: usize, slot: IrSlot) -> Self {
        Self::build(partition, None, Some(slot))
    }

    /// A convolver with an IR available up front.
    pub fn with_ir(ir: PreparedIr) -> Self {
        let partition = ir.partition();
        Self::build(partition, Some(ir), None)
    }

    fn build(partition: usize, ir: Option<PreparedIr>, slot: Option<IrSlot>) -> Self {
        let partition = partition.max(8);
        let fft_size = partition * 2;
        let mut planner = FftPlanner::new();
        let forward_fft = planner.plan_fft_forward(fft_size);
        let inverse_fft = planner.plan_fft_inverse(fft_size);

        let mut convolver = Self {
            active: true,
            partition,
            fft_size,
            forward_fft,
            inverse_fft,
            ir: None,
            slot,
            fdl_l: Vec::new(),
            fdl_r: Vec::new(),
            fdl_pos: 0,
            prev_in_l: vec![0.0; partition],
            prev_in_r: vec![0.0; partition],
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            accum: vec![Complex::new(0.0, 0.0); fft_size],
        };
        if let Some(ir) = ir {
            convolver.install(ir);
        }
        convolver
    }

    pub fn has_impulse_response(&self) -> bool {
        self.ir.is_some()
    }

    /// Installs a prepared IR. Allocates the frequency delay line; this
    /// happens once per load, not in the steady-state path.
    pub fn install(&mut self, ir: PreparedIr) {
        if ir.partition() != self.partition || ir.partition_count() == 0 {
            log::warn!(
                "impulse response prepared for partition {} does not match convolver partition {}; keeping passthrough",
                ir.partition(),
                self.partition
            );
            return;
        }
        let parts = ir.partition_count();
        self.fdl_l = vec![vec![Complex::new(0.0, 0.0); self.fft_size]; parts];
        self.fdl_r = vec![vec![Complex::new(0.0, 0.0); self.fft_size]; parts];
        self.fdl_pos = 0;
        self.ir = Some(ir);
    }

    fn poll_slot(&mut self) {
        if self.ir.is_some() {
            return;
        }
        let Some(slot) = self.slot.clone() else {
            return;
        };
        let Ok(mut state) = slot.try_lock() else {
            return;
        };
        match &*state {
            IrState::Pending => {}
            IrState::Failed => {
                // Loader already logged the cause; stay passthrough.
                drop(state);
                self.slot = None;
            }
            IrState::Ready(_) => {
                if let IrState::Ready(ir) = std::mem::replace(&mut *state, IrState::Pending) {
                    drop(state);
                    self.install(ir);
                    self.slot = None;
                }
            }
        }
    }

    fn convolve_channel(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        left: bool,
    ) {
        let partition = self.partition;
        let fft_size = self.fft_size;
        let ir = self.ir.as_ref().expect("convolve without IR");
        let (fdl, prev_in, parts) = if left {
            (&mut self.fdl_l, &mut self.prev_in_l, &ir.parts_l)
        } else {
            (&mut self.fdl_r, &mut self.prev_in_r, &ir.parts_r)
        };

        // Overlap-save segment: previous block then current block.
        for i in 0..partition {
            self.spectrum[i] = Complex::new(prev_in[i], 0.0);
            self.spectrum[partition + i] = Complex::new(input[i], 0.0);
        }
        self.forward_fft.process(&mut self.spectrum);
        fdl[self.fdl_pos].copy_from_slice(&self.spectrum);

        let n_parts = parts.len();
        self.accum.fill(Complex::new(0.0, 0.0));
        for (k, part) in parts.iter().enumerate() {
            let idx = (self.fdl_pos + n_parts - k) % n_parts;
            let delayed = &fdl[idx];
            for i in 0..fft_size {
                self.accum[i] += delayed[i] * part[i];
            }
        }

        self.inverse_fft.process(&mut self.accum);
        let scale = 1.0 / fft_size as f32;
        for i in 0..partition {
            output[i] = self.accum[partition + i].re * scale;
        }

        prev_in.copy_from_slice(input);
    }
}

impl AudioNode for Convolver {
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
        _start_frame: u64,
    ) {
        let Some(out_left) = outputs.remove(&PortId::AudioOutput0) else {
            return;
        };
        let Some(out_right) = outputs.remove(&PortId::AudioOutput1) else {
            return;
        };

        self.poll_slot();

        static ZERO_BUFFER: [f32; 4096] = [0.0; 4096];
        let left_in = inputs
            .get(&PortId::AudioInput0)
            .copied()
            .unwrap_or(&ZERO_BUFFER[..buffer_size.min(ZERO_BUFFER.len())]);
        let right_in = inputs
            .get(&PortId::AudioInput1)
            .copied()
            .unwrap_or(&ZERO_BUFFER[..buffer_size.min(ZERO_BUFFER.len())]);

        // No IR (still loading, failed, or block-size mismatch): dry.
        if self.ir.is_none() || buffer_size != self.partition {
            out_left[..buffer_size].copy_from_slice(&left_in[..buffer_size]);
            out_right[..buffer_size].copy_from_slice(&right_in[..buffer_size]);
            return;
        }

        self.convolve_channel(left_in, out_left, true);
        self.convolve_channel(right_in, out_right, false);
        self.fdl_pos = (self.fdl_pos + 1) % self.fdl_l.len();
    }

    fn reset(&mut self) {
        for buffer in self.fdl_l.iter_mut().chain(self.fdl_r.iter_mut()) {
            buffer.fill(Complex::new(0.0, 0.0));
        }
        self.fdl_pos = 0;
        self.prev_in_l.fill(0.0);
        self.prev_in_r.fill(0.0);
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
        "convolver"
    }
}

mod biquad_filter;
mod compressor;
mod convolver;
mod delay;
mod gain;
mod lfo;
mod noise_generator;
mod panner;

pub use biquad_filter::BiquadFilter;
pub use compressor::Compressor;
pub use convolver::{new_ir_slot, Convolver, IrSlot, IrState, PreparedIr};
pub use delay::DelayLine;
pub use gain::Gain;
pub use lfo::Lfo;
pub use noise_generator::{NoiseGenerator, NoiseType};
pub use panner::SpatialPanner;

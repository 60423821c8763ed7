mod biquad;

pub use biquad::{Biquad, FilterType};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::EffectModule;
use crate::graph::AudioGraph;
use crate::ir::{self, ImpulseResponseGenerator};
use crate::nodes::{new_ir_slot, Convolver, PreparedIr};

/// Where the convolution reverb gets its impulse response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrSource {
    /// Synthesized plate response, available immediately.
    Plate { decay_secs: f32, diffusion: f32 },
    /// WAV asset loaded off the control thread; the reverb is dry until it
    /// arrives and stays dry if the load fails.
    File(PathBuf),
}

/// Convolution reverb: the signal convolved with a recorded (or generated)
/// impulse response. Construction never blocks on I/O.
pub fn build_convolution_reverb(
    graph: &mut AudioGraph,
    sample_rate: f32,
    source: &IrSource,
) -> EffectModule {
    let partition = graph.buffer_size();
    let convolver = match source {
        IrSource::Plate {
            decay_secs,
            diffusion,
        } => {
            let generator = ImpulseResponseGenerator::new(sample_rate);
            let plate = generator.plate(*decay_secs, *diffusion);
            Convolver::with_ir(PreparedIr::prepare(&plate, None, partition))
        }
        IrSource::File(path) => {
            let slot = new_ir_slot();
            ir::load_ir_async(path.clone(), sample_rate, partition, slot.clone());
            Convolver::with_slot(partition, slot)
        }
    };
    let convolver = graph.add_node(Box::new(convolver));

    EffectModule {
        input: convolver,
        output: convolver,
        controls: Vec::new(),
    }
}

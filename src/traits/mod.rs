use std::any::Any;

use rustc_hash::FxHashMap;

use crate::params::AudioParam;

/// Identifies a port on a node. Audio ports carry the signal path; the
/// modulation ports carry control-rate signals (an LFO sweeping a delay
/// time or a panner position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    AudioInput0,
    AudioInput1,
    AudioOutput0,
    AudioOutput1,
    TimeMod,
    PositionXMod,
    PositionZMod,
}

impl PortId {
    pub fn is_audio_input(&self) -> bool {
        matches!(self, PortId::AudioInput0 | PortId::AudioInput1)
    }

    pub fn is_audio_output(&self) -> bool {
        matches!(self, PortId::AudioOutput0 | PortId::AudioOutput1)
    }
}

/// Identifies an automatable control parameter on a node. Parameter
/// bindings are resolved against these keys when the graph is built, so a
/// binding to a key the node does not expose fails at bind time instead of
/// at playback time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Level,
    Frequency,
    GainDb,
    Q,
    DelayTime,
    Feedback,
    Damp,
    ModDepth,
    Threshold,
    PositionX,
    PositionY,
    PositionZ,
    Radius,
}

pub trait AudioNode: Any {
    /// Port map: `true` marks an output port.
    fn get_ports(&self) -> FxHashMap<PortId, bool>;

    /// Renders one block. `inputs` holds the pre-mixed signal for each
    /// connected input port; `start_frame` is the engine clock at the first
    /// sample of the block, which anchors parameter ramps.
    fn process(
        &mut self,
        inputs: &FxHashMap<PortId, &[f32]>,
        outputs: &mut FxHashMap<PortId, &mut [f32]>,
        buffer_size: usize,
        start_frame: u64,
    );

    /// Access to an automatable parameter, if the node exposes it.
    fn param_mut(&mut self, _key: ParamKey) -> Option<&mut AudioParam> {
        None
    }

    fn reset(&mut self);

    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn as_any(&self) -> &dyn Any;

    fn is_active(&self) -> bool;
    fn set_active(&mut self, active: bool);

    fn node_type(&self) -> &'static str;

    fn should_process(&self) -> bool {
        self.is_active()
    }
}

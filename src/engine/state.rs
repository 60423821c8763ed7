use std::collections::BTreeMap;

use serde::Serialize;

/// Snapshot of what the UI collaborator observes. Mutated only through the
/// control API; the live graph converges on this state within one ramp
/// window.
#[derive(Debug, Clone, Serialize)]
pub struct EngineState {
    pub is_playing: bool,
    pub orbit_enabled: bool,
    pub parameters: BTreeMap<String, f32>,
}

/// Engine lifecycle, driven by `play`/`pause`/`close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    /// No graph yet; nothing has requested playback.
    Uninitialized,
    /// Graph built, output stage disconnected.
    Ready,
    /// Output stage connected, context running.
    Running,
    /// Torn down; every further control call is a logged no-op.
    Closed,
}

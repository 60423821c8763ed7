use thiserror::Error;

/// Failure taxonomy for the engine. Nothing here ever crosses the control
/// API as a panic or a propagated error: build failures leave the engine
/// unbuilt and playback a no-op, resource failures degrade modules to
/// passthrough, and out-of-range parameters are clamped before they get
/// anywhere near an error path. The variants exist so internal code and
/// logs can say precisely what degraded.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio graph build failed: {0}")]
    BuildFailure(String),

    #[error("resource failed to load: {0}")]
    ResourceLoadFailure(String),

    #[error("output backend unavailable: {0}")]
    BackendUnavailable(String),
}

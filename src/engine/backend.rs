use crate::engine::context::SharedRenderer;
use crate::engine::error::EngineError;

/// Parameters of the opened output stream; the graph is built to match.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub sample_rate: f32,
    pub block_size: usize,
}

/// The output stage: whatever ultimately pulls rendered blocks. The cpal
/// backend (feature `native-host`) drives a real device; the offline
/// backend lets a caller (tests, offline bounces, headless builds) drive
/// rendering manually through [`Engine::render_block`].
///
/// [`Engine::render_block`]: crate::engine::Engine::render_block
pub trait OutputBackend {
    /// Acquires the device (or decides the offline format). Called once,
    /// lazily, on the first play request.
    fn open(&mut self) -> Result<StreamInfo, EngineError>;

    /// Starts pulling from the renderer. Blocks until the device confirms
    /// it is running; idempotent when already running.
    fn resume(&mut self, renderer: SharedRenderer) -> Result<(), EngineError>;

    /// Stops pulling without releasing the device.
    fn suspend(&mut self) -> Result<(), EngineError>;

    /// Releases the device. The backend is not reusable afterwards.
    fn close(&mut self);

    fn is_running(&self) -> bool;
}

/// Backend with no device behind it: rendering happens when the owner asks
/// for blocks. Also the stand-in on platforms without `native-host`.
pub struct OfflineBackend {
    info: StreamInfo,
    running: bool,
}

impl OfflineBackend {
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            info: StreamInfo {
                sample_rate,
                block_size,
            },
            running: false,
        }
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new(48_000.0, 128)
    }
}

impl OutputBackend for OfflineBackend {
    fn open(&mut self) -> Result<StreamInfo, EngineError> {
        Ok(self.info)
    }

    fn resume(&mut self, _renderer: SharedRenderer) -> Result<(), EngineError> {
        self.running = true;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        self.running = false;
        Ok(())
    }

    fn close(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

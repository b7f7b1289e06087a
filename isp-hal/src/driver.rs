//! Driver traits implemented by the kernel-facing layer (or the simulator).

use thiserror::Error;

use crate::block::{BlockKind, SliceGeometry, Size, TuningBlock};
use crate::irq::IrqMask;
use crate::stats::{AeStatistics, AfStatistics, AwbStatistics};
use crate::HandleId;

/// Errors reported by the hardware layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    /// The ISP device node could not be opened or is closed
    #[error("ISP device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Programming a tuning block failed
    #[error("Failed to program {block:?}: {reason}")]
    Program {
        /// Block that was being written
        block: BlockKind,
        /// Driver-provided reason
        reason: String,
    },

    /// Reading a statistics monitor failed
    #[error("Statistics read failed: {0}")]
    Statistics(String),

    /// Register access failed
    #[error("Register access at {addr:#010x} failed")]
    Register {
        /// Register address
        addr: u32,
    },

    /// The interrupt source was shut down
    #[error("Interrupt source closed")]
    InterruptClosed,

    /// Generic driver failure
    #[error("Driver error: {0}")]
    Driver(String),
}

/// Result alias for hardware calls.
pub type HalResult<T> = Result<T, HalError>;

/// Register-programming driver.
///
/// Only the runtime's worker threads call into the driver; implementations
/// must still be `Sync` because control and proc workers share one instance.
pub trait RegisterDriver: Send + Sync {
    /// Open the ISP device.
    fn open(&self) -> HalResult<()>;

    /// Close the ISP device.
    fn close(&self) -> HalResult<()>;

    /// Gate the module clock of one pipeline.
    fn enable_clock(&self, handle: HandleId, on: bool) -> HalResult<()>;

    /// Reset the pipeline registers to power-on defaults.
    fn reset(&self, handle: HandleId) -> HalResult<()>;

    /// Select which interrupts are delivered.
    fn set_irq_mask(&self, handle: HandleId, mask: IrqMask) -> HalResult<()>;

    /// Program one tuning block. Takes effect after [`Self::shadow`].
    fn apply(&self, handle: HandleId, block: &TuningBlock) -> HalResult<()>;

    /// Latch all programmed blocks into the active register bank.
    fn shadow(&self, handle: HandleId) -> HalResult<()>;

    /// Enable or bypass the AE/AWB statistics monitor; `skip` frames are
    /// dropped by the monitor between samples.
    fn set_stat_monitor(&self, handle: HandleId, enable: bool, skip: u32) -> HalResult<()>;

    /// Program the geometry of the next processing slice.
    fn configure_slice(&self, handle: HandleId, slice: &SliceGeometry) -> HalResult<()>;

    /// Start the pipeline.
    fn start(&self, handle: HandleId) -> HalResult<()>;

    /// Stop the pipeline. The interrupt source reports [`IrqMask::STOP`]
    /// once the hardware has drained.
    fn stop(&self, handle: HandleId) -> HalResult<()>;

    /// Read the latest AE luminance zones.
    fn read_ae_stats(&self, handle: HandleId) -> HalResult<AeStatistics>;

    /// Read the latest white-balance channel sums.
    fn read_awb_stats(&self, handle: HandleId) -> HalResult<AwbStatistics>;

    /// Read the latest focus sharpness values.
    fn read_af_stats(&self, handle: HandleId) -> HalResult<AfStatistics>;

    /// Read a raw register.
    fn read_register(&self, addr: u32) -> HalResult<u32>;

    /// Largest frame the pipeline accepts in continuous mode, if known.
    fn video_size_limit(&self) -> Option<Size>;

    /// Largest frame the pipeline accepts in single-frame mode, if known.
    fn capture_size_limit(&self) -> Option<Size>;
}

/// Blocking interrupt-wait primitive.
pub trait InterruptSource: Send + Sync {
    /// Block until at least one interrupt is pending and return the mask.
    fn wait(&self) -> HalResult<IrqMask>;

    /// Make one blocked [`Self::wait`] return with an empty mask without
    /// any hardware event.
    fn wake(&self) -> HalResult<()>;
}

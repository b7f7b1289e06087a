//! Hardware collaborators consumed by the ISP control runtime.
//!
//! The runtime never touches registers itself. Everything it pushes to the
//! image signal processor goes through a [`RegisterDriver`], and every frame
//! event it reacts to comes out of an [`InterruptSource`]. Both are traits so
//! the runtime can be driven by the real kernel driver or, with the `mock`
//! feature, by the [`mock::SimulatedIsp`].
//!
//! Tuning is expressed as whole hardware blocks ([`TuningBlock`]); the
//! driver programs one block per call and latches everything with
//! [`RegisterDriver::shadow`].

pub mod block;
pub mod driver;
pub mod irq;
pub mod stats;

#[cfg(feature = "mock")]
pub mod mock;

pub use block::{
    AwbGain, BlockKind, ColorMatrix, DenoiseParams, Exposure, GammaCurve, LensShading, Rect,
    RegWrite, SliceGeometry, Size, TuningBlock,
};
pub use driver::{HalError, HalResult, InterruptSource, RegisterDriver};
pub use irq::IrqMask;
pub use stats::{AeStatistics, AfStatistics, AwbStatistics};

/// Opaque identifier of one ISP pipeline instance (camera session).
pub type HandleId = u32;

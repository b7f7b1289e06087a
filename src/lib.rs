//! ISP control runtime.
//!
//! Coordinates an image signal processor between three worker threads and
//! any number of client threads:
//!
//! - the **monitor** blocks on the hardware interrupt source and turns each
//!   interrupt into control messages, applying frame-skip backpressure to
//!   statistics events;
//! - the **control** worker owns every state transition: process and video
//!   lifecycle, IOCTL dispatch, and the commit of pending tuning at start of
//!   frame;
//! - the **proc** worker runs the external AE/AWB/AF algorithms and drives
//!   the continuous-autofocus sub-machine.
//!
//! Clients use [`IspRuntime`], whose calls are serialized and block on a
//! per-call completion. Hardware access goes through the [`isp_hal`] traits,
//! so the whole runtime can be exercised against
//! `isp_hal::mock::SimulatedIsp`.

pub mod algorithm;
pub mod completion;
pub mod config;
pub mod context;
mod ctrl_worker;
pub mod error;
pub mod focus;
pub mod frame_skip;
pub mod ioctl;
pub mod messages;
mod monitor;
pub mod msg_queue;
pub mod params;
mod proc_worker;
pub mod runtime;
pub mod sensor;
mod system;
pub mod tracing_init;

pub use isp_hal;

pub use algorithm::{AfProgress, AeOutput, AlgorithmSuite, AwbOutput, BasicAlgorithms};
pub use config::IspConfig;
pub use error::{IspError, IspResult};
pub use ioctl::{IoctlCmd, IoctlOutput, IoctlParam};
pub use params::{
    Callback, CallbackEvent, CapabilityCmd, CapabilityValue, FocusMove, FrameDesc, InitParam,
    InputFormat, ProcNextParam, ProcStartParam, VideoStartParam, WorkMode,
};
pub use runtime::IspRuntime;
pub use sensor::{SensorTuning, StaticTuning};
pub use system::{SharedAlgorithms, SystemStatus};

//! State shared by the worker threads of one running session.
//!
//! An [`IspSystem`] exists from the first `init` to the last `deinit`. It
//! owns the two worker queues and the per-handle contexts, and records which
//! handle currently owns the pipeline so that interrupts, which carry no
//! handle, can be attributed.

use std::sync::Arc;

use isp_hal::{HandleId, RegisterDriver};
use parking_lot::Mutex;

use crate::algorithm::AlgorithmSuite;
use crate::config::{IspConfig, MAX_HANDLE_SLOTS};
use crate::context::ContextStore;
use crate::error::IspResult;
use crate::frame_skip::FrameSkip;
use crate::messages::{CtrlMsg, ProcMsg};
use crate::msg_queue::MessageQueue;

/// Process-level state of the control worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemStatus {
    /// Device open, no handle initialized
    Idle,
    /// At least one handle initialized, pipeline stopped
    Run,
    /// Device closed (before the first init and after the last deinit)
    #[default]
    Close,
    /// Single-frame slice processing in progress
    Signal,
    /// Continuous video running
    Continue,
}

/// Shared algorithm suite; locked for the duration of one call.
pub type SharedAlgorithms = Arc<Mutex<Box<dyn AlgorithmSuite>>>;

pub(crate) struct IspSystem {
    pub config: IspConfig,
    pub driver: Arc<dyn RegisterDriver>,
    pub algorithms: SharedAlgorithms,
    pub contexts: ContextStore,
    pub ctrl_queue: MessageQueue<CtrlMsg>,
    pub proc_queue: MessageQueue<ProcMsg>,
    pub frame_skip: Mutex<FrameSkip>,
    status: Mutex<SystemStatus>,
    pipeline_owner: Mutex<Option<HandleId>>,
}

impl IspSystem {
    pub fn new(
        config: IspConfig,
        driver: Arc<dyn RegisterDriver>,
        algorithms: SharedAlgorithms,
    ) -> IspResult<Self> {
        let capacity = config.runtime.queue_capacity;
        Ok(Self {
            ctrl_queue: MessageQueue::create("isp-ctrl", capacity)?,
            proc_queue: MessageQueue::create("isp-proc", capacity)?,
            contexts: ContextStore::new(MAX_HANDLE_SLOTS)?,
            frame_skip: Mutex::new(FrameSkip::new(&config.frame_skip)),
            status: Mutex::new(SystemStatus::Close),
            pipeline_owner: Mutex::new(None),
            config,
            driver,
            algorithms,
        })
    }

    pub fn status(&self) -> SystemStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: SystemStatus) {
        *self.status.lock() = status;
    }

    /// Handle whose pipeline is running, if any.
    pub fn pipeline_owner(&self) -> Option<HandleId> {
        *self.pipeline_owner.lock()
    }

    pub fn set_pipeline_owner(&self, handle: Option<HandleId>) {
        *self.pipeline_owner.lock() = handle;
    }

    /// Tear down both queues; blocked workers wake with `QueueDestroyed`.
    pub fn destroy_queues(&self) {
        self.ctrl_queue.destroy();
        self.proc_queue.destroy();
    }
}

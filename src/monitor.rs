//! Interrupt monitor: turns hardware interrupts into control messages.

use std::sync::Arc;

use isp_hal::{InterruptSource, IrqMask};
use tracing::{debug, error, info, trace, warn};

use crate::messages::{CtrlEvent, CtrlMsg};
use crate::system::IspSystem;

/// Order in which events reported by a single wait are forwarded.
const FAN_OUT: [(IrqMask, CtrlEvent); 6] = [
    (IrqMask::AF, CtrlEvent::Af),
    (IrqMask::AWB, CtrlEvent::Awb),
    (IrqMask::AE, CtrlEvent::Ae),
    (IrqMask::EOF, CtrlEvent::Eof),
    (IrqMask::SOF, CtrlEvent::Sof),
    (IrqMask::TX, CtrlEvent::Tx),
];

pub(crate) struct MonitorWorker {
    system: Arc<IspSystem>,
    irq: Arc<dyn InterruptSource>,
}

impl MonitorWorker {
    pub fn new(system: Arc<IspSystem>, irq: Arc<dyn InterruptSource>) -> Self {
        Self { system, irq }
    }

    /// Wait for interrupts until `STOP`, then tell the control worker.
    ///
    /// Once the session's queues are destroyed the next wakeup ends the
    /// loop without forwarding anything.
    pub fn run(self) {
        info!("interrupt monitor started");
        loop {
            let mask = match self.irq.wait() {
                Ok(mask) => mask,
                Err(e) => {
                    error!(error = %e, "interrupt wait failed");
                    break;
                }
            };
            if self.system.ctrl_queue.is_destroyed() {
                debug!(mask = ?mask, "session ended, interrupt monitor exiting");
                return;
            }
            trace!(mask = ?mask, "interrupt");

            if mask.intersects(IrqMask::ERRORS) {
                warn!(errors = ?(mask & IrqMask::ERRORS), "ISP reported errors");
            }
            if mask.contains(IrqMask::STOP) {
                debug!("hardware stopped");
                break;
            }
            self.dispatch(mask);
        }

        // A deinit parked on the control worker waits for this.
        if let Err(e) = self
            .system
            .ctrl_queue
            .post(CtrlMsg::new(CtrlEvent::MonitorStop, 0))
        {
            warn!(error = %e, "failed to report monitor stop");
        }
        info!("interrupt monitor exiting");
    }

    fn dispatch(&self, mask: IrqMask) {
        let Some(handle) = self.system.pipeline_owner() else {
            trace!(mask = ?mask, "interrupt with no running pipeline");
            return;
        };
        for (bit, event) in FAN_OUT {
            if !mask.contains(bit) || !self.admit(event) {
                continue;
            }
            if let Err(e) = self.system.ctrl_queue.post(CtrlMsg::new(event, handle)) {
                warn!(handle, event = ?event, error = %e, "dropped interrupt event");
            }
        }
    }

    fn admit(&self, event: CtrlEvent) -> bool {
        let mut skip = self.system.frame_skip.lock();
        match event {
            CtrlEvent::Ae => skip.ae.admit(),
            CtrlEvent::Awb => skip.awb.admit(),
            _ => true,
        }
    }
}

//! One-shot completion slots for synchronous client calls.
//!
//! Every blocking call creates a fresh [`channel`], a
//! `crossbeam_channel::bounded(1)` pair. The [`Notifier`] travels inside the
//! message to the worker, the [`Completion`] stays with the caller, so a
//! wakeup can only ever deliver the result of the operation it belongs to.
//!
//! Dropping a `Notifier` without calling [`Notifier::notify`] (for example
//! because the message was flushed with its queue, or its worker died)
//! disconnects the channel and wakes the waiter with
//! [`IspError::Abandoned`].

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{IspError, IspResult};

/// Operation a completion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPoint {
    /// Handle initialization
    Init,
    /// Handle release
    Deinit,
    /// Video start
    Continue,
    /// Video stop
    ContinueStop,
    /// IOCTL and CTRL_SYNC round trips
    Ioctl,
    /// Worker start and stop
    Common,
}

/// Sending half; consumed by [`Notifier::notify`].
pub struct Notifier<T> {
    point: SyncPoint,
    tx: Sender<T>,
}

/// Receiving half held by the blocked caller.
pub struct Completion<T> {
    point: SyncPoint,
    rx: Receiver<T>,
}

/// Create a linked notifier/completion pair for `point`.
pub fn channel<T>(point: SyncPoint) -> (Notifier<T>, Completion<T>) {
    let (tx, rx) = bounded(1);
    (Notifier { point, tx }, Completion { point, rx })
}

impl<T> Notifier<T> {
    /// Deposit the result and wake the waiter.
    pub fn notify(self, value: T) {
        // The only send on a capacity-one channel never blocks; a caller
        // that stopped waiting is not an error.
        let _ = self.tx.send(value);
    }
}

impl<T> std::fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("point", &self.point)
            .finish()
    }
}

impl<T> Completion<T> {
    /// Block until the notifier fires or is dropped. There is no timeout.
    pub fn wait(self) -> IspResult<T> {
        self.rx
            .recv()
            .map_err(|_| IspError::Abandoned(self.point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_notify_before_wait() {
        let (tx, rx) = channel(SyncPoint::Ioctl);
        tx.notify(42u32);
        assert_eq!(rx.wait().unwrap(), 42);
    }

    #[test]
    fn test_notify_from_other_thread() {
        let (tx, rx) = channel(SyncPoint::Init);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.notify("done");
        });
        assert_eq!(rx.wait().unwrap(), "done");
        worker.join().unwrap();
    }

    #[test]
    fn test_dropped_notifier_abandons() {
        let (tx, rx) = channel::<()>(SyncPoint::Deinit);
        drop(tx);
        assert!(matches!(
            rx.wait(),
            Err(IspError::Abandoned(SyncPoint::Deinit))
        ));
    }

    #[test]
    fn test_notifier_dropped_by_dying_thread() {
        let (tx, rx) = channel::<u8>(SyncPoint::Common);
        let worker = thread::spawn(move || {
            let _held = tx;
            panic!("worker died");
        });
        assert!(worker.join().is_err());
        assert!(matches!(
            rx.wait(),
            Err(IspError::Abandoned(SyncPoint::Common))
        ));
    }

    #[test]
    fn test_slots_are_independent() {
        let (init_tx, init_rx) = channel(SyncPoint::Init);
        let (ioctl_tx, ioctl_rx) = channel(SyncPoint::Ioctl);
        ioctl_tx.notify(2);
        init_tx.notify(1);
        assert_eq!(init_rx.wait().unwrap(), 1);
        assert_eq!(ioctl_rx.wait().unwrap(), 2);
    }
}

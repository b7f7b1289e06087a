//! Bounded FIFO mailbox used between all runtime threads.
//!
//! Each worker owns exactly one queue and is its only consumer; any thread
//! may post. Messages travel over a `crossbeam_channel::bounded` channel. A
//! second, never-written channel signals teardown: dropping its sender wakes
//! a consumer blocked in [`MessageQueue::get`] with
//! [`IspError::QueueDestroyed`] instead of leaving it parked.
//!
//! Messages still queued when the queue is flushed or destroyed are dropped
//! there, so an owned payload is released exactly once whichever side ends
//! up holding it.

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{IspError, IspResult};

/// Bounded multi-producer, single-consumer message queue.
pub struct MessageQueue<T> {
    name: &'static str,
    capacity: usize,
    tx: Sender<T>,
    rx: Receiver<T>,
    /// Teardown signal; `None` once destroyed. Posts hold this lock so none
    /// can slip in behind the final drain.
    shutdown: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    /// Message taken off the channel by [`Self::peek`]; always delivered first
    head: Mutex<Option<T>>,
}

impl<T> MessageQueue<T> {
    /// Create a queue holding at most `capacity` messages.
    ///
    /// # Errors
    ///
    /// `Param` for a zero capacity.
    pub fn create(name: &'static str, capacity: usize) -> IspResult<Self> {
        if capacity == 0 {
            return Err(IspError::Param(format!("queue '{name}' capacity must be > 0")));
        }
        let (tx, rx) = bounded(capacity);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        debug!(queue = name, capacity, "message queue created");
        Ok(Self {
            name,
            capacity,
            tx,
            rx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            head: Mutex::new(None),
        })
    }

    /// Enqueue a message and wake the consumer.
    ///
    /// # Errors
    ///
    /// `QueueFull` when `capacity` messages are pending, `QueueDestroyed`
    /// after [`Self::destroy`]. The rejected message is dropped.
    pub fn post(&self, msg: T) -> IspResult<()> {
        let shutdown = self.shutdown.lock();
        if shutdown.is_none() {
            return Err(IspError::QueueDestroyed);
        }
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(queue = self.name, capacity = self.capacity, "message queue full");
                Err(IspError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(IspError::QueueDestroyed),
        }
    }

    /// Block until a message is available and dequeue it.
    ///
    /// # Errors
    ///
    /// `QueueDestroyed` if the queue is (or becomes) destroyed.
    pub fn get(&self) -> IspResult<T> {
        if let Some(msg) = self.head.lock().take() {
            return Ok(msg);
        }
        select! {
            recv(self.rx) -> msg => msg.map_err(|_| IspError::QueueDestroyed),
            recv(self.shutdown_rx) -> _ => Err(IspError::QueueDestroyed),
        }
    }

    /// Inspect the next message without dequeuing it. Consumer side only.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let mut head = self.head.lock();
        if head.is_none() {
            *head = self.rx.try_recv().ok();
        }
        head.as_ref().map(f)
    }

    /// Drop every pending message; returns how many were dropped.
    pub fn flush(&self) -> usize {
        let dropped = usize::from(self.head.lock().take().is_some()) + self.rx.try_iter().count();
        if dropped > 0 {
            debug!(queue = self.name, dropped, "message queue flushed");
        }
        dropped
    }

    /// Tear the queue down: pending messages are dropped, a blocked consumer
    /// wakes with `QueueDestroyed`, and further posts fail.
    pub fn destroy(&self) {
        let mut shutdown = self.shutdown.lock();
        if shutdown.take().is_none() {
            return;
        }
        let pending = self.flush();
        debug!(queue = self.name, pending, "message queue destroyed");
    }

    /// Destroy the queue when the returned guard goes out of scope, also
    /// during unwinding. Held by the consumer for the life of its loop.
    pub(crate) fn destroy_on_drop(&self) -> DestroyOnDrop<'_, T> {
        DestroyOnDrop(self)
    }

    /// Whether [`Self::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.shutdown.lock().is_none()
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        usize::from(self.head.lock().is_some()) + self.rx.len()
    }

    /// Whether no message is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guard returned by [`MessageQueue::destroy_on_drop`].
pub(crate) struct DestroyOnDrop<'a, T>(&'a MessageQueue<T>);

impl<T> Drop for DestroyOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::create("test", 8).unwrap();
        for i in 0..5 {
            queue.post(i).unwrap();
        }
        let drained: Vec<i32> = (0..5).map(|_| queue.get().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_fifo_across_threads() {
        let queue = Arc::new(MessageQueue::create("test", 256).unwrap());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..200 {
                    while queue.post(i).is_err() {
                        thread::yield_now();
                    }
                }
            })
        };
        let mut last = -1;
        for _ in 0..200 {
            let value = queue.get().unwrap();
            assert!(value > last, "{value} dequeued after {last}");
            last = value;
        }
        producer.join().unwrap();
    }

    #[test]
    fn test_post_full() {
        let queue = MessageQueue::create("test", 2).unwrap();
        queue.post(1).unwrap();
        queue.post(2).unwrap();
        let err = queue.post(3).unwrap_err();
        assert!(matches!(err, IspError::QueueFull { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            MessageQueue::<u8>::create("test", 0),
            Err(IspError::Param(_))
        ));
    }

    #[test]
    fn test_destroy_wakes_blocked_consumer() {
        let queue = Arc::new(MessageQueue::<u32>::create("test", 4).unwrap());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get())
        };
        thread::sleep(Duration::from_millis(50));
        queue.destroy();

        let result = consumer.join().unwrap();
        assert!(matches!(result, Err(IspError::QueueDestroyed)));
        assert!(matches!(queue.post(1), Err(IspError::QueueDestroyed)));
        assert!(queue.is_destroyed());
    }

    #[test]
    fn test_guard_destroys_on_panicking_consumer() {
        let drops = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(MessageQueue::create("test", 4).unwrap());
        queue.post(Tracked(Arc::clone(&drops))).unwrap();
        queue.post(Tracked(Arc::clone(&drops))).unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let _guard = queue.destroy_on_drop();
                let _first = queue.get();
                panic!("consumer died");
            })
        };
        assert!(consumer.join().is_err());

        assert!(queue.is_destroyed());
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        assert!(matches!(
            queue.post(Tracked(Arc::clone(&drops))),
            Err(IspError::QueueDestroyed)
        ));
    }

    #[test]
    fn test_consumed_payload_dropped_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let queue = MessageQueue::create("test", 4).unwrap();
        queue.post(Tracked(Arc::clone(&drops))).unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        let msg = queue.get().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(msg);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        queue.destroy();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_and_destroy_drop_pending() {
        let drops = Arc::new(AtomicUsize::new(0));
        let queue = MessageQueue::create("test", 4).unwrap();
        queue.post(Tracked(Arc::clone(&drops))).unwrap();
        queue.post(Tracked(Arc::clone(&drops))).unwrap();
        assert_eq!(queue.flush(), 2);
        assert_eq!(drops.load(Ordering::SeqCst), 2);

        queue.post(Tracked(Arc::clone(&drops))).unwrap();
        queue.destroy();
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_peek_keeps_order() {
        let queue = MessageQueue::create("test", 4).unwrap();
        assert_eq!(queue.peek(|v: &u8| *v), None);
        queue.post(7u8).unwrap();
        queue.post(8u8).unwrap();
        assert_eq!(queue.peek(|v| *v), Some(7));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().unwrap(), 7);
        assert_eq!(queue.get().unwrap(), 8);
        assert!(queue.is_empty());
    }
}

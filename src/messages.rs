//! Messages exchanged between the client API and the worker threads.
//!
//! A [`Message`] names an event, the handle it concerns, an optional owned
//! payload and an optional completion. Whoever holds the message owns the
//! payload and drops it exactly once after processing; [`Message::alloc_flag`]
//! reports whether there is one.
//!
//! Constructors that expect an answer return the message together with the
//! [`Completion`] the caller blocks on.

use isp_hal::HandleId;

use crate::completion::{self, Completion, Notifier, SyncPoint};
use crate::error::IspResult;
use crate::ioctl::{IoctlOutput, IoctlRequest};
use crate::params::{InitParam, ProcNextParam, ProcStartParam, VideoStartParam};

/// Events consumed by the control worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CtrlEvent {
    /// Worker started
    Start,
    /// Close the device and exit
    Stop,
    /// Open a handle
    Init,
    /// Release a handle
    Deinit,
    /// Start video
    Continue,
    /// Stop video
    ContinueStop,
    /// Start slice processing
    Signal,
    /// Feed the next slice
    SignalNext,
    /// Run one IOCTL
    Ioctl,
    /// Queue barrier
    CtrlSync,
    /// Slice transfer done
    Tx,
    /// Start of frame
    Sof,
    /// End of frame
    Eof,
    /// AE statistics ready
    Ae,
    /// AWB statistics ready
    Awb,
    /// AF statistics ready
    Af,
    /// Continuous-AF re-evaluation tick
    ContinueAf,
    /// Interrupt monitor exited
    MonitorStop,
}

/// Events consumed by the proc worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcEvent {
    /// Worker started
    Start,
    /// Exit the loop
    Stop,
    /// Run an AE step
    Ae,
    /// Run an AWB step
    Awb,
    /// Run an AF step
    Af,
    /// Abort the focus sweep
    AfStop,
    /// Video stopped; end sweeps and ticks
    StopHandler,
}

/// Owned parameter block carried by a message.
#[derive(Debug)]
pub enum Payload {
    /// Parameters of INIT
    Init(Box<InitParam>),
    /// Parameters of video start
    VideoStart(Box<VideoStartParam>),
    /// Parameters of slice process start
    ProcStart(Box<ProcStartParam>),
    /// Parameters of the next slice
    ProcNext(Box<ProcNextParam>),
    /// IOCTL request
    Ioctl(Box<IoctlRequest>),
    /// The handle being released is the last active one
    Deinit {
        /// Whether to stop the hardware
        last: bool,
    },
}

/// What a worker answers to a synchronous request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Request handled; nothing to return
    Done,
    /// Output of an IOCTL
    Ioctl(IoctlOutput),
    /// Echo of a CTRL_SYNC tag
    Sync(u32),
}

/// Completion slot carried by a message.
pub type Respond = Notifier<IspResult<Reply>>;

/// Caller side of [`Respond`].
pub type Pending = Completion<IspResult<Reply>>;

/// One queued event.
#[derive(Debug)]
pub struct Message<E> {
    /// What the consumer should do
    pub event: E,
    /// Handle the event is about
    pub handle: HandleId,
    /// Event-specific qualifier, such as the CTRL_SYNC tag
    pub sub_type: u32,
    /// Owned payload, dropped by the consumer
    pub data: Option<Payload>,
    /// Completion to signal once handled
    pub respond: Option<Respond>,
}

impl<E> Message<E> {
    /// Fire-and-forget message without payload.
    pub fn new(event: E, handle: HandleId) -> Self {
        Self {
            event,
            handle,
            sub_type: 0,
            data: None,
            respond: None,
        }
    }

    /// Attach an owned payload.
    pub fn with_data(mut self, payload: Payload) -> Self {
        self.data = Some(payload);
        self
    }

    /// Set the qualifier.
    pub fn with_sub_type(mut self, sub_type: u32) -> Self {
        self.sub_type = sub_type;
        self
    }

    /// Attach a completion for `point` and return the caller's half.
    pub fn expecting_reply(mut self, point: SyncPoint) -> (Self, Pending) {
        let (notifier, pending) = completion::channel(point);
        self.respond = Some(notifier);
        (self, pending)
    }

    /// Lifecycle request (worker start/stop) answered on the common point.
    pub fn common(event: E, handle: HandleId) -> (Self, Pending) {
        Self::new(event, handle).expecting_reply(SyncPoint::Common)
    }

    /// Whether the consumer owns a payload to release.
    pub fn alloc_flag(&self) -> bool {
        self.data.is_some()
    }

    /// Whether a caller is blocked on this message.
    pub fn is_sync(&self) -> bool {
        self.respond.is_some()
    }

    /// Signal the completion, if any, with `result`.
    pub fn reply(&mut self, result: IspResult<Reply>) {
        if let Some(respond) = self.respond.take() {
            respond.notify(result);
        }
    }
}

/// Message for the control worker.
pub type CtrlMsg = Message<CtrlEvent>;

/// Message for the proc worker.
pub type ProcMsg = Message<ProcEvent>;

impl CtrlMsg {
    /// INIT with a heap copy of the caller's parameters.
    pub fn init(handle: HandleId, param: InitParam) -> (Self, Pending) {
        Self::new(CtrlEvent::Init, handle)
            .with_data(Payload::Init(Box::new(param)))
            .expecting_reply(SyncPoint::Init)
    }

    /// DEINIT; `last` stops the hardware and waits for the monitor.
    pub fn deinit(handle: HandleId, last: bool) -> (Self, Pending) {
        Self::new(CtrlEvent::Deinit, handle)
            .with_data(Payload::Deinit { last })
            .expecting_reply(SyncPoint::Deinit)
    }

    /// Video start with a heap copy of `param`.
    pub fn video_start(handle: HandleId, param: VideoStartParam) -> (Self, Pending) {
        Self::new(CtrlEvent::Continue, handle)
            .with_data(Payload::VideoStart(Box::new(param)))
            .expecting_reply(SyncPoint::Continue)
    }

    /// Video stop.
    pub fn video_stop(handle: HandleId) -> (Self, Pending) {
        Self::new(CtrlEvent::ContinueStop, handle).expecting_reply(SyncPoint::ContinueStop)
    }

    /// IOCTL carrying `request`.
    pub fn ioctl(handle: HandleId, request: IoctlRequest) -> (Self, Pending) {
        Self::new(CtrlEvent::Ioctl, handle)
            .with_data(Payload::Ioctl(Box::new(request)))
            .expecting_reply(SyncPoint::Ioctl)
    }

    /// Queue barrier echoing `tag`.
    pub fn sync(handle: HandleId, tag: u32) -> (Self, Pending) {
        Self::new(CtrlEvent::CtrlSync, handle)
            .with_sub_type(tag)
            .expecting_reply(SyncPoint::Ioctl)
    }

    /// Fire-and-forget slice process start.
    pub fn proc_start(handle: HandleId, param: ProcStartParam) -> Self {
        Self::new(CtrlEvent::Signal, handle).with_data(Payload::ProcStart(Box::new(param)))
    }

    /// Fire-and-forget next slice.
    pub fn proc_next(handle: HandleId, param: ProcNextParam) -> Self {
        Self::new(CtrlEvent::SignalNext, handle).with_data(Payload::ProcNext(Box::new(param)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IspError;

    #[test]
    fn test_reply_reaches_caller() {
        let (mut msg, pending) = CtrlMsg::sync(0, 7);
        assert!(msg.is_sync());
        assert!(!msg.alloc_flag());
        msg.reply(Ok(Reply::Sync(msg.sub_type)));
        assert!(!msg.is_sync());
        assert_eq!(pending.wait().unwrap().unwrap(), Reply::Sync(7));
    }

    #[test]
    fn test_dropped_message_abandons_caller() {
        let (msg, pending) = CtrlMsg::video_stop(1);
        drop(msg);
        assert!(matches!(
            pending.wait(),
            Err(IspError::Abandoned(SyncPoint::ContinueStop))
        ));
    }

    #[test]
    fn test_payload_marks_alloc_flag() {
        let msg = CtrlMsg::proc_next(
            0,
            ProcNextParam {
                src_slice_height: 16,
                src_avail_height: 16,
                dst_addr: 0,
            },
        );
        assert!(msg.alloc_flag());
        assert!(!msg.is_sync());
        assert_eq!(msg.event, CtrlEvent::SignalNext);
    }
}

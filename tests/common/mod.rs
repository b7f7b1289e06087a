//! Shared fixtures: a runtime wired to one `SimulatedIsp` and a callback
//! channel.

#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use isp_ctrl::config::{FrameSkipConfig, SkipGate};
use isp_ctrl::isp_hal::mock::SimulatedIsp;
use isp_ctrl::isp_hal::{HandleId, Size};
use isp_ctrl::{
    AlgorithmSuite, BasicAlgorithms, Callback, CallbackEvent, InitParam, IspConfig, IspRuntime,
    StaticTuning,
};
use parking_lot::Mutex;

pub const ISP_ID: u32 = 0x8830;
pub const TIMEOUT: Duration = Duration::from_secs(2);

pub fn hd() -> Size {
    Size::new(1280, 720)
}

/// Config that forwards every AE/AWB interrupt.
pub fn test_config() -> IspConfig {
    let mut config = IspConfig::default();
    config.frame_skip = FrameSkipConfig {
        awb: SkipGate::Forward,
        ae: SkipGate::Forward,
    };
    config
}

pub struct Fixture {
    pub hal: Arc<SimulatedIsp>,
    pub runtime: IspRuntime,
}

pub fn fixture() -> Fixture {
    fixture_with(test_config())
}

pub fn fixture_with(config: IspConfig) -> Fixture {
    fixture_with_algorithms(config, Box::new(BasicAlgorithms::default()))
}

pub fn fixture_with_algorithms(config: IspConfig, algorithms: Box<dyn AlgorithmSuite>) -> Fixture {
    let hal = Arc::new(SimulatedIsp::new());
    let runtime =
        IspRuntime::new(config, hal.clone(), hal.clone(), algorithms).expect("valid config");
    Fixture { hal, runtime }
}

/// Callback that forwards every event to the returned receiver.
pub fn channel_callback() -> (Callback, Receiver<(HandleId, CallbackEvent)>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let callback: Callback = Arc::new(move |handle, event| {
        let _ = tx.lock().send((handle, event));
    });
    (callback, rx)
}

pub struct Callbacks {
    pub ctrl: Receiver<(HandleId, CallbackEvent)>,
    pub sof: Receiver<(HandleId, CallbackEvent)>,
}

/// Init parameters for `size` with both callbacks routed to channels.
pub fn init_param(size: Size) -> (InitParam, Callbacks) {
    let (ctrl, ctrl_rx) = channel_callback();
    let (sof, sof_rx) = channel_callback();
    let param = InitParam::new(ISP_ID, size, Arc::new(StaticTuning::new(ISP_ID)), ctrl)
        .with_self_callback(sof);
    (
        param,
        Callbacks {
            ctrl: ctrl_rx,
            sof: sof_rx,
        },
    )
}

/// Receive events until one matches `wanted`, failing after [`TIMEOUT`].
pub fn expect_event(
    rx: &Receiver<(HandleId, CallbackEvent)>,
    wanted: impl Fn(&CallbackEvent) -> bool,
) -> CallbackEvent {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok((_, event)) if wanted(&event) => return event,
            Ok(_) => continue,
            Err(e) => panic!("expected callback event not received: {e}"),
        }
    }
}

/// Block until the next start-of-frame commit was reported.
pub fn wait_sof(callbacks: &Callbacks) {
    expect_event(&callbacks.sof, |e| *e == CallbackEvent::Sof);
}

/// Poll `condition` until it holds, failing after [`TIMEOUT`].
pub fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Run `f` on its own thread and fail if it does not return within
/// [`TIMEOUT`].
pub fn within_timeout<T: Send + 'static>(what: &str, f: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(TIMEOUT)
        .unwrap_or_else(|_| panic!("{what} did not return within {TIMEOUT:?}"))
}

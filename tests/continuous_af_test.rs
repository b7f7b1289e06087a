//! Autofocus sweeps: single AF, continuous-AF triggering and stopping.

mod common;

use common::*;
use isp_ctrl::isp_hal::{
    AeStatistics, AfStatistics, AwbStatistics, BlockKind, IrqMask, Rect, TuningBlock,
};
use isp_ctrl::{CallbackEvent, FocusMove, IoctlCmd, IoctlParam, IspConfig, VideoStartParam};

const AF_STEPS: usize = 8;

fn running_with(config: IspConfig) -> (Fixture, Callbacks) {
    let fixture = fixture_with(config);
    let (param, callbacks) = init_param(hd());
    fixture.runtime.init(0, param).unwrap();
    fixture
        .runtime
        .video_start(0, VideoStartParam::preview(hd()))
        .unwrap();
    fixture.hal.set_af_stats(AfStatistics {
        focus_values: vec![12, 40],
    });
    (fixture, callbacks)
}

fn is_notice(wanted: FocusMove) -> impl Fn(&CallbackEvent) -> bool {
    move |e| *e == CallbackEvent::AfNotice(wanted)
}

/// Enter continuous mode and feed one AE and one AWB result that moves the
/// exposure far enough to trigger a sweep; returns once the sweep's AF
/// monitor reached the hardware.
fn trigger_continuous_sweep(fixture: &Fixture, callbacks: &Callbacks) {
    fixture
        .runtime
        .ioctl(0, IoctlCmd::AfMode.raw(), IoctlParam::Value(2))
        .unwrap();
    fixture.hal.set_ae_stats(AeStatistics { zones: vec![1, 1] });
    fixture.hal.set_awb_stats(AwbStatistics {
        r: 100,
        g: 100,
        b: 100,
    });
    fixture.hal.raise(IrqMask::AE);
    fixture.hal.raise(IrqMask::AWB);
    expect_event(&callbacks.ctrl, is_notice(FocusMove::Start));

    fixture.hal.raise(IrqMask::SOF);
    wait_sof(callbacks);
    assert!(matches!(
        fixture.hal.active_block(0, BlockKind::AfMonitor),
        Some(TuningBlock::AfMonitor(_))
    ));
}

#[test]
fn test_continuous_sweep_runs_to_completion() {
    let (fixture, callbacks) = running_with(test_config());
    trigger_continuous_sweep(&fixture, &callbacks);

    for _ in 0..AF_STEPS {
        fixture.hal.raise(IrqMask::AF);
    }
    expect_event(&callbacks.ctrl, is_notice(FocusMove::End));
}

#[test]
fn test_leaving_continuous_mode_stops_the_sweep() {
    let (fixture, callbacks) = running_with(test_config());
    trigger_continuous_sweep(&fixture, &callbacks);

    fixture
        .runtime
        .ioctl(0, IoctlCmd::AfMode.raw(), IoctlParam::Value(0))
        .unwrap();
    expect_event(&callbacks.ctrl, is_notice(FocusMove::End));
}

#[test]
fn test_video_stop_ends_running_sweep() {
    let (fixture, callbacks) = running_with(test_config());
    trigger_continuous_sweep(&fixture, &callbacks);

    fixture.runtime.video_stop(0).unwrap();
    expect_event(&callbacks.ctrl, is_notice(FocusMove::End));
}

#[test]
fn test_no_sweep_without_both_statistics() {
    let (fixture, callbacks) = running_with(test_config());
    fixture
        .runtime
        .ioctl(0, IoctlCmd::AfMode.raw(), IoctlParam::Value(2))
        .unwrap();
    fixture.hal.set_ae_stats(AeStatistics { zones: vec![1] });

    // AE alone never arms the sub-machine.
    for _ in 0..3 {
        fixture.hal.raise(IrqMask::AE);
    }
    fixture.hal.raise(IrqMask::SOF);
    wait_sof(&callbacks);
    fixture.runtime.sync(0, 0).unwrap();
    assert!(!callbacks
        .ctrl
        .try_iter()
        .any(|(_, e)| e == CallbackEvent::AfNotice(FocusMove::Start)));
}

#[test]
fn test_single_sweep_reports_done() {
    let (fixture, callbacks) = running_with(test_config());
    fixture
        .runtime
        .ioctl(
            0,
            IoctlCmd::Af.raw(),
            IoctlParam::AfWindow {
                mode: 0,
                windows: vec![Rect::new(600, 320, 80, 80)],
            },
        )
        .unwrap();
    fixture.hal.raise(IrqMask::SOF);
    wait_sof(&callbacks);

    for _ in 0..AF_STEPS {
        fixture.hal.raise(IrqMask::AF);
    }
    let done = expect_event(&callbacks.ctrl, |e| matches!(e, CallbackEvent::AfDone { .. }));
    assert_eq!(done, CallbackEvent::AfDone { success: true });
}

#[test]
fn test_awb_interrupts_feed_af_when_configured() {
    let mut config = test_config();
    config.focus.af_uses_awb_stats = true;
    let (fixture, callbacks) = running_with(config);
    fixture
        .runtime
        .ioctl(
            0,
            IoctlCmd::Af.raw(),
            IoctlParam::AfWindow {
                mode: 1,
                windows: vec![Rect::new(0, 0, 64, 64)],
            },
        )
        .unwrap();
    fixture.hal.raise(IrqMask::SOF);
    wait_sof(&callbacks);

    for _ in 0..AF_STEPS {
        fixture.hal.raise(IrqMask::AWB);
    }
    expect_event(&callbacks.ctrl, |e| *e == CallbackEvent::AfDone { success: true });
}

#[test]
fn test_af_out_of_frame_window_rejected() {
    let (fixture, _callbacks) = running_with(test_config());
    let err = fixture
        .runtime
        .ioctl(
            0,
            IoctlCmd::Af.raw(),
            IoctlParam::AfWindow {
                mode: 0,
                windows: vec![Rect::new(1270, 0, 64, 64)],
            },
        )
        .unwrap_err();
    assert!(err.is_param());
}

//! Interrupt fan-out, frame-skip gating and monitor shutdown.

mod common;

use common::*;
use isp_ctrl::config::FrameSkipConfig;
use isp_ctrl::ioctl::AeCtrl;
use isp_ctrl::isp_hal::{AeStatistics, BlockKind, Exposure, IrqMask, TuningBlock};
use isp_ctrl::{CallbackEvent, IoctlCmd, IoctlOutput, IoctlParam, SystemStatus, VideoStartParam};

fn running_with(config: isp_ctrl::IspConfig) -> (Fixture, Callbacks) {
    let fixture = fixture_with(config);
    let (param, callbacks) = init_param(hd());
    fixture.runtime.init(0, param).unwrap();
    fixture
        .runtime
        .video_start(0, VideoStartParam::preview(hd()))
        .unwrap();
    (fixture, callbacks)
}

#[test]
fn test_interrupts_without_pipeline_are_ignored() {
    let fixture = fixture();
    let (param, callbacks) = init_param(hd());
    fixture.runtime.init(0, param).unwrap();

    fixture.hal.raise(IrqMask::SOF | IrqMask::AE | IrqMask::AWB);
    std::thread::sleep(std::time::Duration::from_millis(50));
    fixture
        .runtime
        .video_start(0, VideoStartParam::preview(hd()))
        .unwrap();
    fixture.hal.raise(IrqMask::SOF);
    wait_sof(&callbacks);

    // Exactly one commit: the frame raised before video start was dropped.
    assert_eq!(fixture.hal.shadow_count(0), 1);
    assert_eq!(fixture.hal.stats_reads(), 0);
    assert!(callbacks.sof.try_recv().is_err());
}

#[test]
fn test_combined_mask_is_fanned_out() {
    let (fixture, callbacks) = running_with(test_config());
    fixture.hal.set_ae_stats(AeStatistics {
        zones: vec![128; 4],
    });

    fixture
        .hal
        .raise(IrqMask::AE | IrqMask::AWB | IrqMask::EOF | IrqMask::SOF);
    wait_sof(&callbacks);
    assert_eq!(fixture.hal.stats_reads(), 2);

    // The AE result is committed on a later frame.
    eventually("AE result", || {
        matches!(
            fixture.runtime.ioctl(0, IoctlCmd::AeInfo.raw(), IoctlParam::None),
            Ok(IoctlOutput::AeInfo(info)) if info.lum == 128
        )
    });
    fixture.hal.raise(IrqMask::SOF);
    wait_sof(&callbacks);
    assert_eq!(
        fixture.hal.active_block(0, BlockKind::Exposure),
        Some(TuningBlock::Exposure(Exposure {
            line: 1,
            gain: 128
        }))
    );
}

#[test]
fn test_error_bits_do_not_stop_processing() {
    let (fixture, callbacks) = running_with(test_config());
    fixture
        .hal
        .raise(IrqMask::DCAM_ERR | IrqMask::STORE_ERR | IrqMask::SOF);
    wait_sof(&callbacks);
    assert_eq!(fixture.runtime.status(), SystemStatus::Continue);
}

#[test]
fn test_every_gate_forwards_one_in_two() {
    let mut config = test_config();
    config.frame_skip = FrameSkipConfig::sc8825(1);
    let (fixture, callbacks) = running_with(config);

    for _ in 0..4 {
        fixture.hal.raise(IrqMask::AWB);
    }
    // AE is never forwarded on this variant.
    fixture.hal.raise(IrqMask::AE);
    fixture.hal.raise(IrqMask::SOF);
    wait_sof(&callbacks);
    assert_eq!(fixture.hal.stats_reads(), 2);
}

#[test]
fn test_settle_gate_restarts_with_video() {
    let mut config = test_config();
    config.frame_skip = FrameSkipConfig::sc8830(2);
    let (fixture, callbacks) = running_with(config);

    for _ in 0..3 {
        fixture.hal.raise(IrqMask::AE);
    }
    fixture.hal.raise(IrqMask::SOF);
    wait_sof(&callbacks);
    assert_eq!(fixture.hal.stats_reads(), 1);

    fixture.runtime.video_stop(0).unwrap();
    fixture
        .runtime
        .video_start(0, VideoStartParam::preview(hd()))
        .unwrap();
    for _ in 0..2 {
        fixture.hal.raise(IrqMask::AE);
    }
    fixture.hal.raise(IrqMask::SOF);
    wait_sof(&callbacks);
    assert_eq!(fixture.hal.stats_reads(), 1);
}

#[test]
fn test_last_deinit_waits_for_hardware_stop() {
    let (fixture, callbacks) = running_with(test_config());
    fixture.runtime.deinit(0).unwrap();

    assert!(!fixture.hal.is_open());
    assert!(!fixture.hal.is_running(0));
    assert_eq!(fixture.runtime.status(), SystemStatus::Close);
    // Interrupts after the session closed reach nobody.
    fixture.hal.raise(IrqMask::SOF);
    assert!(callbacks
        .sof
        .recv_timeout(std::time::Duration::from_millis(50))
        .is_err());
}

#[test]
fn test_deinit_after_interrupt_source_failure() {
    let (fixture, _callbacks) = running_with(test_config());
    fixture.hal.close_interrupts();
    fixture.runtime.sync(0, 1).unwrap();

    // The monitor is gone; the last deinit must still return.
    fixture.runtime.deinit(0).unwrap();
    assert!(!fixture.hal.is_open());
}

#[test]
fn test_ae_bypass_notice_once() {
    let (fixture, callbacks) = running_with(test_config());
    fixture
        .runtime
        .ioctl(
            0,
            IoctlCmd::AeCtrl.raw(),
            IoctlParam::AeCtrl(AeCtrl::Set(Exposure {
                line: 300,
                gain: 256,
            })),
        )
        .unwrap();
    for _ in 0..2 {
        fixture.hal.raise(IrqMask::SOF);
        wait_sof(&callbacks);
    }
    let notices = callbacks
        .ctrl
        .try_iter()
        .filter(|(_, e)| *e == CallbackEvent::AeBypass)
        .count();
    assert_eq!(notices, 1);
}

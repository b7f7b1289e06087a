//! IOCTL command set and its dispatch.
//!
//! Commands arrive as raw `u32` ids. The high bit asks the client API to
//! skip the post-completion callback; the rest names an [`IoctlCmd`]. An id
//! that names no command, and the registered-but-unhandled `FLASH_CTRL`, are
//! logged and succeed without effect.
//!
//! Handlers only touch the per-handle [`IspContext`]. Hardware changes are
//! recorded in its pending configuration and reach the registers at the
//! next start of frame. Work that belongs to another thread is returned as
//! an [`IoctlEffect`] for the control worker to carry out.

use isp_hal::{AwbGain, Exposure, Rect, RegWrite, RegisterDriver, TuningBlock};
use tracing::{debug, warn};

use crate::context::{
    AeMode, AfStatus, AwbMode, Flicker, FocusMode, FrameRateMode, IspContext, MeterWeight,
};
use crate::error::{IspError, IspResult};
use crate::focus;
use crate::sensor::SpecialEffect;

/// Bit that suppresses the `ctrl_callback` after the IOCTL completes.
pub const SUPPRESS_CALLBACK: u32 = 0x8000_0000;

/// Mask selecting the command id from a raw IOCTL id.
pub const CMD_MASK: u32 = 0x7fff_ffff;

/// ISO applied by the sport scene mode.
const SPORT_ISO: u32 = 1600;

/// IOCTL commands, numbered in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum IoctlCmd {
    /// White-balance mode or preset
    AwbMode,
    /// Exposure scene mode
    AeMode,
    /// Metering weight
    AeMeasureLum,
    /// Exposure compensation
    Ev,
    /// Anti-flicker frequency
    Flicker,
    /// AE algorithm selector
    Alg,
    /// Color effect
    SpecialEffect,
    /// Brightness level
    Brightness,
    /// Contrast level
    Contrast,
    /// Histogram statistics on or off
    Hist,
    /// Automatic contrast on or off
    AutoContrast,
    /// Saturation level
    Saturation,
    /// Start a focus sweep
    Af,
    /// Focus mode
    AfMode,
    /// Chroma suppression on or off
    Css,
    /// Dynamic range compression level
    Hdr,
    /// Global digital gain
    GlobalGain,
    /// Per-channel digital gain
    ChnGain,
    /// Image metadata snapshot
    GetExifInfo,
    /// Manual ISO
    Iso,
    /// White-balance statistics window
    WbTrim,
    /// Reload tuning defaults
    ParamUpdate,
    /// Flash energy mode
    FlashEg,
    /// Target video frame rate
    VideoMode,
    /// Abort the focus sweep
    AfStop,
    /// Touch metering zone
    AeTouch,
    /// AE summary
    AeInfo,
    /// Edge enhancement level
    Sharpness,
    /// Whether AE is loosely converged
    GetFastAeStab,
    /// Whether AE is converged
    GetAeStab,
    /// Whether the last AE step changed anything
    GetAeChg,
    /// Whether AWB is converged
    GetAwbStat,
    /// Focus sweep state
    GetAfStat,
    /// Gamma curve index
    Gamma,
    /// Denoise level
    Denoise,
    /// Smart AE strength
    SmartAe,
    /// Continuous-AF control
    ContinueAf,
    /// Denoise level during focus sweeps
    AfDenoise,
    /// Flash control, accepted and ignored
    FlashCtrl,
    /// Direct exposure access
    AeCtrl,
    /// Direct lens access
    AfCtrl,
    /// Raw register access
    RegCtrl,
    /// Result of the last sweep
    AfEndInfo,
    /// Hue level
    Hue,
}

impl IoctlCmd {
    const ALL: [IoctlCmd; 44] = [
        Self::AwbMode,
        Self::AeMode,
        Self::AeMeasureLum,
        Self::Ev,
        Self::Flicker,
        Self::Alg,
        Self::SpecialEffect,
        Self::Brightness,
        Self::Contrast,
        Self::Hist,
        Self::AutoContrast,
        Self::Saturation,
        Self::Af,
        Self::AfMode,
        Self::Css,
        Self::Hdr,
        Self::GlobalGain,
        Self::ChnGain,
        Self::GetExifInfo,
        Self::Iso,
        Self::WbTrim,
        Self::ParamUpdate,
        Self::FlashEg,
        Self::VideoMode,
        Self::AfStop,
        Self::AeTouch,
        Self::AeInfo,
        Self::Sharpness,
        Self::GetFastAeStab,
        Self::GetAeStab,
        Self::GetAeChg,
        Self::GetAwbStat,
        Self::GetAfStat,
        Self::Gamma,
        Self::Denoise,
        Self::SmartAe,
        Self::ContinueAf,
        Self::AfDenoise,
        Self::FlashCtrl,
        Self::AeCtrl,
        Self::AfCtrl,
        Self::RegCtrl,
        Self::AfEndInfo,
        Self::Hue,
    ];

    /// Decode a raw id, ignoring the suppress bit.
    pub fn from_raw(raw: u32) -> Option<Self> {
        let index = usize::try_from(raw & CMD_MASK).ok()?;
        Self::ALL.get(index).copied()
    }

    /// Raw id without the suppress bit.
    pub fn raw(self) -> u32 {
        self as u32
    }
}

/// Set or read the sensor exposure directly (calibration tools).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeCtrl {
    /// Program this exposure
    Set(Exposure),
    /// Read the current exposure
    Get,
}

/// Set or read the lens position directly (calibration tools).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfCtrl {
    /// Move the lens to this position
    Set(u32),
    /// Read the lens position
    Get,
}

/// Raw register access (calibration tools).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegCtrl {
    /// Queue writes for the next start of frame
    Set(Vec<RegWrite>),
    /// Read the listed addresses now
    Get(Vec<u32>),
}

/// Parameter block of an IOCTL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IoctlParam {
    /// No parameter
    #[default]
    None,
    /// Single value
    Value(u32),
    /// Focus mode and statistics windows
    AfWindow {
        /// Focus mode for the sweep
        mode: u32,
        /// Statistics windows, at most one per hardware window
        windows: Vec<Rect>,
    },
    /// Window in frame coordinates
    Rect(Rect),
    /// Channel gains
    Gain(AwbGain),
    /// Direct exposure request
    AeCtrl(AeCtrl),
    /// Direct lens request
    AfCtrl(AfCtrl),
    /// Register request
    RegCtrl(RegCtrl),
}

/// A raw IOCTL as posted to the control worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoctlRequest {
    /// Command id, high bit suppresses the callback
    pub raw: u32,
    /// Parameter block
    pub param: IoctlParam,
}

impl IoctlRequest {
    /// Request for the raw id `raw`.
    pub fn new(raw: u32, param: IoctlParam) -> Self {
        Self { raw, param }
    }

    /// Decoded command, `None` for an unknown id.
    pub fn cmd(&self) -> Option<IoctlCmd> {
        IoctlCmd::from_raw(self.raw)
    }

    /// Whether the caller asked to skip the completion callback.
    pub fn suppress_callback(&self) -> bool {
        self.raw & SUPPRESS_CALLBACK != 0
    }
}

/// AE summary returned by `AE_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AeInfo {
    /// Mean luma of the last step
    pub lum: u32,
    /// Current exposure
    pub exposure: Exposure,
    /// Current ISO
    pub iso: u32,
    /// AE converged
    pub stable: bool,
    /// Scene is too dark
    pub low_lux: bool,
}

/// Snapshot of the tuning state for image metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExifInfo {
    /// Sensor tuning version
    pub version_id: u32,
    /// AE disabled
    pub ae_bypass: bool,
    /// AWB disabled
    pub awb_bypass: bool,
    /// AF disabled
    pub af_bypass: bool,
    /// Current ISO
    pub iso: u32,
    /// Current exposure
    pub exposure: Exposure,
    /// White-balance gains
    pub awb_gain: AwbGain,
    /// Brightness level
    pub brightness: u8,
    /// Contrast level
    pub contrast: u8,
    /// Saturation level
    pub saturation: u8,
    /// Hue level
    pub hue: u8,
    /// Edge enhancement level
    pub edge: u8,
    /// Color effect
    pub effect: SpecialEffect,
    /// Gamma curve index
    pub gamma_index: u32,
    /// Denoise level
    pub denoise_level: u32,
    /// Global digital gain
    pub global_gain: u32,
    /// Per-channel digital gain
    pub channel_gain: AwbGain,
    /// Flash energy mode on
    pub flash: bool,
}

/// What an IOCTL returns to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IoctlOutput {
    /// Setter commands
    #[default]
    None,
    /// Boolean getters
    Flag(bool),
    /// AE summary
    AeInfo(AeInfo),
    /// Metadata snapshot
    Exif(Box<ExifInfo>),
    /// Current exposure
    Exposure(Exposure),
    /// Register values in request order
    Registers(Vec<RegWrite>),
    /// Current sweep state
    FocusStatus(AfStatus),
    /// Lens position and the latest focus values
    Focus {
        /// Lens position
        position: u32,
        /// Sharpness per window
        values: Vec<u32>,
    },
    /// Result of the last finished sweep
    AfEnd {
        /// Whether a sharpness peak was found
        success: bool,
        /// Final lens position
        position: u32,
    },
}

/// Follow-up the control worker performs after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlEffect {
    /// Post `AF_STOP` to the proc worker
    StopFocus,
    /// Ask the algorithm suite to move the lens
    MoveFocus(u32),
}

/// Handler result.
pub type Dispatched = (IoctlOutput, Option<IoctlEffect>);

/// Run one IOCTL against `ctx`.
///
/// `driver` is only used for register reads; writes are always deferred to
/// the start of frame.
///
/// # Errors
///
/// `Param` when the parameter block has the wrong shape or a value is out
/// of range; `Hardware` when a register read fails.
pub fn dispatch(
    ctx: &mut IspContext,
    driver: &dyn RegisterDriver,
    request: &IoctlRequest,
) -> IspResult<Dispatched> {
    let Some(cmd) = request.cmd() else {
        warn!(handle = ctx.handle, raw = request.raw, "unknown ioctl dropped");
        return Ok((IoctlOutput::None, None));
    };
    debug!(handle = ctx.handle, cmd = ?cmd, "ioctl");
    let param = &request.param;

    let output = match cmd {
        IoctlCmd::AwbMode => set_awb_mode(ctx, value(cmd, param)?)?,
        IoctlCmd::AeMode => set_ae_mode(ctx, value(cmd, param)?)?,
        IoctlCmd::AeMeasureLum => {
            ctx.ae.weight = decode(cmd, value(cmd, param)?, MeterWeight::from_raw)?;
            IoctlOutput::None
        }
        IoctlCmd::Ev => {
            let index = value(cmd, param)?;
            if index >= ctx.ae.ev_levels {
                return Err(out_of_range(cmd, index));
            }
            ctx.ae.ev_index = index;
            IoctlOutput::None
        }
        IoctlCmd::Flicker => {
            ctx.ae.flicker = match value(cmd, param)? {
                0 => Flicker::Hz50,
                1 => Flicker::Hz60,
                other => return Err(out_of_range(cmd, other)),
            };
            IoctlOutput::None
        }
        IoctlCmd::Alg => {
            ctx.ae.alg_mode = value(cmd, param)?;
            IoctlOutput::None
        }
        IoctlCmd::SpecialEffect => {
            let effect = decode(cmd, value(cmd, param)?, SpecialEffect::from_raw)?;
            ctx.values.effect = effect;
            let matrix = ctx.sensor.effect_matrix(effect);
            ctx.pending.set(TuningBlock::SpecialEffect {
                matrix: matrix.matrix,
                shift: matrix.shift,
                emboss: effect == SpecialEffect::Emboss,
            });
            IoctlOutput::None
        }
        IoctlCmd::Brightness => {
            let level = level(cmd, param)?;
            ctx.values.brightness = level;
            ctx.pending.set(TuningBlock::Brightness(level));
            IoctlOutput::None
        }
        IoctlCmd::Contrast => {
            let level = level(cmd, param)?;
            ctx.values.contrast = level;
            ctx.pending.set(TuningBlock::Contrast(level));
            IoctlOutput::None
        }
        IoctlCmd::Hist => {
            let on = value(cmd, param)? != 0;
            ctx.values.histogram = on;
            ctx.pending.set(TuningBlock::Histogram(on));
            IoctlOutput::None
        }
        IoctlCmd::AutoContrast => {
            let on = value(cmd, param)? != 0;
            ctx.values.auto_contrast = on;
            ctx.pending.set(TuningBlock::AutoContrast(on));
            IoctlOutput::None
        }
        IoctlCmd::Saturation => {
            let level = level(cmd, param)?;
            ctx.values.saturation = level;
            ctx.pending.set(TuningBlock::Saturation(level));
            IoctlOutput::None
        }
        IoctlCmd::Hue => {
            let level = level(cmd, param)?;
            ctx.values.hue = level;
            ctx.pending.set(TuningBlock::Hue(level));
            IoctlOutput::None
        }
        IoctlCmd::Af => return start_focus(ctx, cmd, param),
        IoctlCmd::AfMode => {
            let mode = decode(cmd, value(cmd, param)?, FocusMode::from_raw)?;
            let change = focus::set_mode(ctx, mode);
            let effect = change.stop_sweep.then_some(IoctlEffect::StopFocus);
            return Ok((IoctlOutput::None, effect));
        }
        IoctlCmd::Css => {
            let on = value(cmd, param)? != 0;
            ctx.values.css = on;
            ctx.pending.set(TuningBlock::Css(on));
            IoctlOutput::None
        }
        IoctlCmd::Hdr => {
            let level = level(cmd, param)?;
            ctx.values.hdr = level;
            ctx.pending.set(TuningBlock::Hdr(level));
            IoctlOutput::None
        }
        IoctlCmd::GlobalGain => {
            let gain = value(cmd, param)?;
            ctx.values.global_gain = gain;
            ctx.pending.set(TuningBlock::GlobalGain(gain));
            IoctlOutput::None
        }
        IoctlCmd::ChnGain => {
            let IoctlParam::Gain(gain) = param else {
                return Err(wrong_param(cmd, "channel gains"));
            };
            ctx.values.channel_gain = *gain;
            ctx.pending.set(TuningBlock::ChannelGain(*gain));
            IoctlOutput::None
        }
        IoctlCmd::GetExifInfo => IoctlOutput::Exif(Box::new(exif_info(ctx))),
        IoctlCmd::Iso => {
            ctx.ae.iso = value(cmd, param)?;
            IoctlOutput::None
        }
        IoctlCmd::WbTrim => {
            let window = rect(cmd, param)?;
            if !window.fits_in(ctx.video_size) {
                return Err(IspError::Param(format!(
                    "white-balance window {window:?} exceeds {}x{}",
                    ctx.video_size.w, ctx.video_size.h
                )));
            }
            ctx.values.wb_window = window;
            ctx.wb_trim.arm();
            IoctlOutput::None
        }
        IoctlCmd::ParamUpdate => {
            ctx.reload_defaults();
            IoctlOutput::None
        }
        IoctlCmd::FlashEg => {
            ctx.ae.flash = value(cmd, param)? != 0;
            IoctlOutput::None
        }
        IoctlCmd::VideoMode => {
            ctx.ae.video_fps = value(cmd, param)?;
            IoctlOutput::None
        }
        IoctlCmd::AfStop => return Ok((IoctlOutput::None, Some(IoctlEffect::StopFocus))),
        IoctlCmd::AeTouch => {
            let zone = rect(cmd, param)?;
            if zone.w == 0 || zone.h == 0 {
                ctx.ae.touch = None;
            } else if zone.fits_in(ctx.video_size) {
                ctx.ae.touch = Some(zone);
            } else {
                return Err(IspError::Param(format!("touch zone {zone:?} outside frame")));
            }
            IoctlOutput::None
        }
        IoctlCmd::AeInfo => IoctlOutput::AeInfo(AeInfo {
            lum: ctx.ae.lum,
            exposure: ctx.ae.exposure,
            iso: ctx.ae.current_iso,
            stable: ctx.ae.stable,
            low_lux: ctx.ae.low_lux,
        }),
        IoctlCmd::Sharpness => {
            let level = level(cmd, param)?;
            ctx.values.edge = level;
            ctx.pending.set(TuningBlock::Edge(level));
            IoctlOutput::None
        }
        IoctlCmd::GetFastAeStab => IoctlOutput::Flag(ctx.ae.fast_stable),
        IoctlCmd::GetAeStab => IoctlOutput::Flag(ctx.ae.stable),
        IoctlCmd::GetAeChg => IoctlOutput::Flag(ctx.ae.changed),
        IoctlCmd::GetAwbStat => IoctlOutput::Flag(ctx.awb.stable),
        IoctlCmd::GetAfStat => IoctlOutput::FocusStatus(ctx.af.status),
        IoctlCmd::Gamma => {
            let index = value(cmd, param)?;
            let curve = ctx
                .sensor
                .gamma(index)
                .ok_or_else(|| out_of_range(cmd, index))?;
            ctx.values.gamma_index = index;
            ctx.pending.set(TuningBlock::Gamma(curve));
            IoctlOutput::None
        }
        IoctlCmd::Denoise => {
            let level = value(cmd, param)?;
            let denoise = ctx
                .sensor
                .denoise(level)
                .ok_or_else(|| out_of_range(cmd, level))?;
            ctx.values.denoise_level = level;
            ctx.pending.set(TuningBlock::Denoise(denoise));
            IoctlOutput::None
        }
        IoctlCmd::SmartAe => {
            ctx.ae.smart = value(cmd, param)?;
            IoctlOutput::None
        }
        IoctlCmd::ContinueAf => {
            focus::start_continuous(ctx);
            IoctlOutput::None
        }
        IoctlCmd::AfDenoise => {
            ctx.af.denoise_level = value(cmd, param)?;
            IoctlOutput::None
        }
        IoctlCmd::FlashCtrl => {
            debug!(handle = ctx.handle, "FLASH_CTRL has no handler");
            IoctlOutput::None
        }
        IoctlCmd::AeCtrl => match param {
            IoctlParam::AeCtrl(AeCtrl::Set(exposure)) => {
                // manual exposure stops the AE loop until the next AE_MODE
                ctx.ae.bypass = true;
                ctx.pending.set(TuningBlock::Exposure(*exposure));
                IoctlOutput::None
            }
            IoctlParam::AeCtrl(AeCtrl::Get) => IoctlOutput::Exposure(ctx.ae.exposure),
            _ => return Err(wrong_param(cmd, "AE control")),
        },
        IoctlCmd::AfCtrl => match param {
            IoctlParam::AfCtrl(AfCtrl::Set(position)) => {
                ctx.af.position = *position;
                return Ok((IoctlOutput::None, Some(IoctlEffect::MoveFocus(*position))));
            }
            IoctlParam::AfCtrl(AfCtrl::Get) => IoctlOutput::Focus {
                position: ctx.af.position,
                values: ctx
                    .stats
                    .af
                    .as_ref()
                    .map(|s| s.focus_values.clone())
                    .unwrap_or_default(),
            },
            _ => return Err(wrong_param(cmd, "AF control")),
        },
        IoctlCmd::RegCtrl => match param {
            IoctlParam::RegCtrl(RegCtrl::Set(writes)) => {
                ctx.pending.add_registers(writes);
                IoctlOutput::None
            }
            IoctlParam::RegCtrl(RegCtrl::Get(addrs)) => {
                let values = addrs
                    .iter()
                    .map(|&addr| {
                        driver
                            .read_register(addr)
                            .map(|value| RegWrite { addr, value })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                IoctlOutput::Registers(values)
            }
            _ => return Err(wrong_param(cmd, "register control")),
        },
        IoctlCmd::AfEndInfo => IoctlOutput::AfEnd {
            success: ctx.af.last_success,
            position: ctx.af.position,
        },
    };
    Ok((output, None))
}

fn set_awb_mode(ctx: &mut IspContext, raw: u32) -> IspResult<IoctlOutput> {
    if raw == 0 {
        ctx.awb.mode = AwbMode::Auto;
        ctx.awb.bypass = false;
        return Ok(IoctlOutput::None);
    }
    let gain = ctx
        .sensor
        .awb_preset(raw - 1)
        .ok_or_else(|| out_of_range(IoctlCmd::AwbMode, raw))?;
    ctx.awb.mode = AwbMode::Preset(raw - 1);
    ctx.awb.bypass = true;
    ctx.pending.set(TuningBlock::AwbGain(gain));
    Ok(IoctlOutput::None)
}

fn set_ae_mode(ctx: &mut IspContext, raw: u32) -> IspResult<IoctlOutput> {
    let mode = decode(IoctlCmd::AeMode, raw, AeMode::from_raw)?;
    ctx.ae.mode = mode;
    ctx.ae.iso = 0;
    ctx.ae.frame_rate = FrameRateMode::Auto;
    ctx.ae.bypass = false;
    ctx.ae.bypass_notified = false;
    match mode {
        AeMode::Auto | AeMode::Night => {}
        AeMode::Sport => {
            ctx.ae.iso = SPORT_ISO;
            ctx.ae.frame_rate = FrameRateMode::Fixed;
        }
        AeMode::Portrait => ctx.ae.weight = MeterWeight::Center,
        AeMode::Landscape => ctx.ae.weight = MeterWeight::Average,
    }
    ctx.ae.changed = true;
    Ok(IoctlOutput::None)
}

fn start_focus(ctx: &mut IspContext, cmd: IoctlCmd, param: &IoctlParam) -> IspResult<Dispatched> {
    let IoctlParam::AfWindow { mode, windows } = param else {
        return Err(wrong_param(cmd, "AF window"));
    };
    let mode = decode(cmd, *mode, FocusMode::from_raw)?;
    if ctx.af.bypass || ctx.af.status == AfStatus::Continue {
        debug!(handle = ctx.handle, "AF request ignored during continuous sweep");
        return Ok((IoctlOutput::None, None));
    }
    if let Some(outside) = windows.iter().find(|w| !w.fits_in(ctx.video_size)) {
        return Err(IspError::Param(format!("AF window {outside:?} outside frame")));
    }
    ctx.af.mode = mode;
    ctx.af.windows.clone_from(windows);
    ctx.awb_window.disarm();
    if mode != FocusMode::Window {
        ctx.hold_3a_for_focus();
        ctx.ae.monitor_enabled = false;
        ctx.awb.monitor_enabled = false;
        ctx.pending.set(TuningBlock::AfMonitor(windows.clone()));
    }
    Ok((IoctlOutput::None, None))
}

fn exif_info(ctx: &IspContext) -> ExifInfo {
    let (ae_bypass, awb_bypass) = ctx
        .af
        .saved_bypass
        .unwrap_or((ctx.ae.bypass, ctx.awb.bypass));
    ExifInfo {
        version_id: ctx.sensor.version_id(),
        ae_bypass,
        awb_bypass,
        af_bypass: ctx.af.bypass,
        iso: ctx.ae.current_iso,
        exposure: ctx.ae.exposure,
        awb_gain: ctx.awb.gain,
        brightness: ctx.values.brightness,
        contrast: ctx.values.contrast,
        saturation: ctx.values.saturation,
        hue: ctx.values.hue,
        edge: ctx.values.edge,
        effect: ctx.values.effect,
        gamma_index: ctx.values.gamma_index,
        denoise_level: ctx.values.denoise_level,
        global_gain: ctx.values.global_gain,
        channel_gain: ctx.values.channel_gain,
        flash: ctx.ae.flash,
    }
}

fn value(cmd: IoctlCmd, param: &IoctlParam) -> IspResult<u32> {
    match param {
        IoctlParam::Value(v) => Ok(*v),
        _ => Err(wrong_param(cmd, "a value")),
    }
}

fn level(cmd: IoctlCmd, param: &IoctlParam) -> IspResult<u8> {
    let raw = value(cmd, param)?;
    u8::try_from(raw).map_err(|_| out_of_range(cmd, raw))
}

fn rect(cmd: IoctlCmd, param: &IoctlParam) -> IspResult<Rect> {
    match param {
        IoctlParam::Rect(r) => Ok(*r),
        _ => Err(wrong_param(cmd, "a rectangle")),
    }
}

fn decode<T>(cmd: IoctlCmd, raw: u32, from_raw: impl FnOnce(u32) -> Option<T>) -> IspResult<T> {
    from_raw(raw).ok_or_else(|| out_of_range(cmd, raw))
}

fn wrong_param(cmd: IoctlCmd, expected: &str) -> IspError {
    IspError::Param(format!("{cmd:?} expects {expected}"))
}

fn out_of_range(cmd: IoctlCmd, raw: u32) -> IspError {
    IspError::Param(format!("{cmd:?} value {raw} out of range"))
}

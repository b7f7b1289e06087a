//! Per-handle tuning context and the store that holds it.
//!
//! An [`IspContext`] is created by the control worker when it handles
//! `INIT` and is only mutated from the control and proc worker threads.
//! Tunable values live next to a [`PendingConfig`]: IOCTL handlers and 3A
//! results record *what* changed there, and the start-of-frame handler
//! decides *when* it reaches the hardware.

use std::collections::BTreeMap;
use std::sync::Arc;

use isp_hal::{
    AeStatistics, AfStatistics, AwbGain, AwbStatistics, BlockKind, Exposure, HandleId, Rect,
    RegWrite, Size, TuningBlock,
};
use parking_lot::Mutex;

use crate::config::FocusConfig;
use crate::error::{IspError, IspResult};
use crate::params::{Callback, FrameDesc, InitParam, InputFormat, WorkMode};
use crate::sensor::{SensorTuning, SpecialEffect, TuningDefaults};

/// Auto-exposure scene mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AeMode {
    /// Automatic scene
    #[default]
    Auto,
    /// Long exposures for low light
    Night,
    /// Fixed high ISO for motion
    Sport,
    /// Portrait scene
    Portrait,
    /// Landscape scene
    Landscape,
}

impl AeMode {
    /// Decode the AE_MODE wire value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Auto,
            1 => Self::Night,
            2 => Self::Sport,
            3 => Self::Portrait,
            4 => Self::Landscape,
            _ => return None,
        })
    }
}

/// Luminance metering weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeterWeight {
    /// Whole-frame average
    Average,
    /// Center-weighted
    #[default]
    Center,
    /// Center spot only
    Spot,
}

impl MeterWeight {
    /// Decode the AE_MEASURE_LUM wire value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Average,
            1 => Self::Center,
            2 => Self::Spot,
            _ => return None,
        })
    }
}

/// Whether AE may trade frame rate for exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameRateMode {
    /// Exposure may lower the frame rate
    #[default]
    Auto,
    /// Frame rate held; gain follows the requested ISO
    Fixed,
}

/// Mains frequency to avoid banding against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flicker {
    /// 50 Hz lighting
    #[default]
    Hz50,
    /// 60 Hz lighting
    Hz60,
}

/// White-balance mode: automatic or a fixed preset from the tuning data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AwbMode {
    /// Gains from the AWB algorithm
    #[default]
    Auto,
    /// Index into the tuning presets
    Preset(u32),
}

/// Focus mode selected with AF_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusMode {
    /// Single sweep on request
    #[default]
    Normal,
    /// Single sweep over the near range
    Macro,
    /// Sweeps triggered by scene changes
    Continue,
    /// Window-only: reposition statistics windows without pausing AE/AWB
    Window,
}

impl FocusMode {
    /// Decode the AF_MODE wire value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Normal,
            1 => Self::Macro,
            2 => Self::Continue,
            3 => Self::Window,
            _ => return None,
        })
    }
}

/// State of the focus sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfStatus {
    /// No sweep running
    #[default]
    Stop,
    /// Single sweep running
    Start,
    /// Sweep started by continuous AF running
    Continue,
}

/// Continuous-AF idle/run sub-machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinueStatus {
    /// Continuous AF disabled
    #[default]
    End,
    /// Waiting for fresh AE and AWB statistics
    Idle,
    /// Re-evaluation scheduled or sweep running
    Run,
}

/// Which statistics arrived since the last continuous-AF decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatFlags {
    /// AE statistics seen
    pub ae: bool,
    /// AWB statistics seen
    pub awb: bool,
}

/// Auto-exposure settings and last result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AeState {
    /// Algorithm initialized for this handle
    pub init: bool,
    /// AE disabled
    pub bypass: bool,
    /// Bypass already reported to the algorithm
    pub bypass_notified: bool,
    /// Statistics monitor programmed
    pub monitor_enabled: bool,
    /// Frames to skip after an exposure change
    pub skip_frames: u32,
    /// Scene mode
    pub mode: AeMode,
    /// Metering weight
    pub weight: MeterWeight,
    /// Frame-rate policy
    pub frame_rate: FrameRateMode,
    /// Anti-flicker frequency
    pub flicker: Flicker,
    /// Exposure compensation step
    pub ev_index: u32,
    /// Number of compensation steps
    pub ev_levels: u32,
    /// 0 selects automatic ISO
    pub iso: u32,
    /// ISO of the last step
    pub current_iso: u32,
    /// Algorithm selector
    pub alg_mode: u32,
    /// Smart AE strength
    pub smart: u32,
    /// Target frame rate
    pub video_fps: u32,
    /// Flash energy mode
    pub flash: bool,
    /// Touch metering zone
    pub touch: Option<Rect>,
    /// Exposure of the last step
    pub exposure: Exposure,
    /// Mean luma of the last step
    pub lum: u32,
    /// Converged
    pub stable: bool,
    /// Loosely converged
    pub fast_stable: bool,
    /// Last step changed luma or stability
    pub changed: bool,
    /// Scene is too dark
    pub low_lux: bool,
}

/// White-balance settings and last result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AwbState {
    /// Algorithm initialized for this handle
    pub init: bool,
    /// AWB disabled
    pub bypass: bool,
    /// Statistics monitor programmed
    pub monitor_enabled: bool,
    /// Automatic or preset
    pub mode: AwbMode,
    /// Gains of the last step
    pub gain: AwbGain,
    /// Converged
    pub stable: bool,
    /// Detected illuminant
    pub illuminant: u32,
}

/// Autofocus settings and sweep state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AfState {
    /// Algorithm initialized for this handle
    pub init: bool,
    /// AF disabled
    pub bypass: bool,
    /// Focus mode
    pub mode: FocusMode,
    /// Sweep state
    pub status: AfStatus,
    /// Continuous-AF state
    pub continue_status: ContinueStatus,
    /// Statistics seen since the last decision
    pub stat_flags: StatFlags,
    /// Statistics windows
    pub windows: Vec<Rect>,
    /// AE/AWB bypass state saved while a sweep holds them
    pub saved_bypass: Option<(bool, bool)>,
    /// Lens position
    pub position: u32,
    /// Whether the last sweep found a peak
    pub last_success: bool,
    /// Denoise level during sweeps
    pub denoise_level: u32,
}

/// Current values of the simple tunable blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningValues {
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
    /// Dynamic range compression level
    pub hdr: u8,
    /// Gamma curve index
    pub gamma_index: u32,
    /// Denoise level
    pub denoise_level: u32,
    /// Global digital gain
    pub global_gain: u32,
    /// Per-channel digital gain
    pub channel_gain: AwbGain,
    /// Color effect
    pub effect: SpecialEffect,
    /// Histogram statistics on
    pub histogram: bool,
    /// Automatic contrast on
    pub auto_contrast: bool,
    /// Chroma suppression on
    pub css: bool,
    /// White-balance statistics window
    pub wb_window: Rect,
}

impl TuningValues {
    fn from_defaults(defaults: &TuningDefaults) -> Self {
        Self {
            brightness: defaults.brightness,
            contrast: defaults.contrast,
            saturation: defaults.saturation,
            hue: defaults.hue,
            edge: defaults.edge,
            hdr: 0,
            gamma_index: defaults.gamma_index,
            denoise_level: defaults.denoise_level,
            global_gain: defaults.global_gain,
            channel_gain: AwbGain::default(),
            effect: SpecialEffect::Normal,
            histogram: false,
            auto_contrast: false,
            css: false,
            wb_window: defaults.wb_window,
        }
    }
}

/// Changelist of hardware blocks waiting for the next start of frame.
///
/// Setting a block that is already pending replaces the earlier value, so
/// the same change issued twice between two frames commits once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingConfig {
    blocks: BTreeMap<BlockKind, TuningBlock>,
}

impl PendingConfig {
    /// Record `block` for the next commit.
    pub fn set(&mut self, block: TuningBlock) {
        self.blocks.insert(block.kind(), block);
    }

    /// Queue register writes, merging with writes already pending. A later
    /// write to the same address replaces the earlier one.
    pub fn add_registers(&mut self, writes: &[RegWrite]) {
        let mut merged = match self.blocks.remove(&BlockKind::Registers) {
            Some(TuningBlock::Registers(existing)) => existing,
            _ => Vec::new(),
        };
        for write in writes {
            match merged.iter_mut().find(|w| w.addr == write.addr) {
                Some(slot) => slot.value = write.value,
                None => merged.push(*write),
            }
        }
        self.set(TuningBlock::Registers(merged));
    }

    /// Pending value of `kind`.
    pub fn get(&self, kind: BlockKind) -> Option<&TuningBlock> {
        self.blocks.get(&kind)
    }

    /// Whether `kind` is pending.
    pub fn contains(&self, kind: BlockKind) -> bool {
        self.blocks.contains_key(&kind)
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of pending blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Remove every pending block, in commit order.
    pub fn take(&mut self) -> Vec<TuningBlock> {
        std::mem::take(&mut self.blocks).into_values().collect()
    }
}

/// Counts start-of-frame events after being armed and fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCountdown {
    frames: u32,
    elapsed: Option<u32>,
}

impl FrameCountdown {
    /// Disarmed countdown of `frames` frames.
    pub fn new(frames: u32) -> Self {
        Self {
            frames,
            elapsed: None,
        }
    }

    /// Start counting from zero.
    pub fn arm(&mut self) {
        self.elapsed = Some(0);
    }

    /// Stop counting without firing.
    pub fn disarm(&mut self) {
        self.elapsed = None;
    }

    /// Whether a countdown is running.
    pub fn is_armed(&self) -> bool {
        self.elapsed.is_some()
    }

    /// Count one frame; returns `true` on the frame the countdown completes.
    pub fn tick(&mut self) -> bool {
        let Some(elapsed) = self.elapsed.as_mut() else {
            return false;
        };
        *elapsed += 1;
        if *elapsed >= self.frames {
            self.elapsed = None;
            true
        } else {
            false
        }
    }
}

/// Progress of a sliced single-frame process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceState {
    /// Source frame
    pub src: FrameDesc,
    /// Destination frame
    pub dst: FrameDesc,
    /// Number of slices
    pub count: u32,
    /// Index of the slice in flight
    pub current: u32,
    /// Source lines per slice
    pub slice_height: u32,
    /// Source lines in memory
    pub avail_height: u32,
    /// Output lines finished
    pub complete_line: u32,
}

/// Statistics read at the last interrupt of each kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestStats {
    /// AE zones
    pub ae: Option<AeStatistics>,
    /// AWB sums
    pub awb: Option<AwbStatistics>,
    /// AF sharpness
    pub af: Option<AfStatistics>,
}

/// Tuning session of one handle.
pub struct IspContext {
    /// Owning handle
    pub handle: HandleId,
    /// Sensor output size given at init
    pub size: Size,
    /// Read-only tuning tables
    pub sensor: Arc<dyn SensorTuning>,
    /// Client callback for completions and notices
    pub ctrl_callback: Option<Callback>,
    /// Start-of-frame callback
    pub self_callback: Option<Callback>,
    /// Preview or single capture
    pub work_mode: WorkMode,
    /// Frame size of the running video
    pub video_size: Size,
    /// Sensor output format
    pub input_format: InputFormat,
    /// Auto exposure
    pub ae: AeState,
    /// Auto white balance
    pub awb: AwbState,
    /// Autofocus
    pub af: AfState,
    /// Simple tunable blocks
    pub values: TuningValues,
    /// Blocks waiting for the next start of frame
    pub pending: PendingConfig,
    /// Sliced process progress
    pub slice: SliceState,
    /// Delays the white-balance window trim after WB_TRIM
    pub wb_trim: FrameCountdown,
    /// Delays restoring AE/AWB after a focus sweep
    pub awb_window: FrameCountdown,
    /// Last statistics read
    pub stats: LatestStats,
}

impl std::fmt::Debug for IspContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IspContext")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("work_mode", &self.work_mode)
            .field("af", &self.af)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl IspContext {
    /// Build the context for `handle` from a validated init parameter block.
    ///
    /// # Errors
    ///
    /// `ParamNull` if the tuning provider is missing.
    pub fn new(handle: HandleId, param: &InitParam, focus: &FocusConfig) -> IspResult<Self> {
        let sensor = param.tuning.clone().ok_or(IspError::ParamNull("tuning"))?;
        let defaults = sensor.defaults();
        let ae = AeState {
            skip_frames: defaults.ae_skip_frames,
            ev_levels: defaults.ev_levels,
            ev_index: defaults.ev_levels / 2,
            ..Default::default()
        };
        let awb = AwbState {
            gain: defaults.awb_gain,
            ..Default::default()
        };
        Ok(Self {
            handle,
            size: param.size,
            sensor,
            ctrl_callback: param.ctrl_callback.clone(),
            self_callback: param.self_callback.clone(),
            work_mode: WorkMode::Continue,
            video_size: param.size,
            input_format: InputFormat::default(),
            ae,
            awb,
            af: AfState::default(),
            values: TuningValues::from_defaults(&defaults),
            pending: PendingConfig::default(),
            slice: SliceState::default(),
            wb_trim: FrameCountdown::new(focus.wb_trim_frames),
            awb_window: FrameCountdown::new(focus.awb_window_frames),
            stats: LatestStats::default(),
        })
    }

    /// Reload every tunable value from the sensor defaults and queue the
    /// complete configuration for the next commit.
    pub fn reload_defaults(&mut self) {
        let defaults = self.sensor.defaults();
        self.values = TuningValues::from_defaults(&defaults);
        self.awb.gain = defaults.awb_gain;
        self.ae.skip_frames = defaults.ae_skip_frames;
        self.queue_full_config();
    }

    /// Queue every block derived from the current values.
    pub fn queue_full_config(&mut self) {
        let effect = self.sensor.effect_matrix(self.values.effect);
        let blocks = [
            TuningBlock::Exposure(self.ae.exposure),
            TuningBlock::AwbGain(self.awb.gain),
            TuningBlock::WbTrim(self.values.wb_window),
            TuningBlock::SpecialEffect {
                matrix: effect.matrix,
                shift: effect.shift,
                emboss: self.values.effect == SpecialEffect::Emboss,
            },
            TuningBlock::Brightness(self.values.brightness),
            TuningBlock::Contrast(self.values.contrast),
            TuningBlock::Histogram(self.values.histogram),
            TuningBlock::AutoContrast(self.values.auto_contrast),
            TuningBlock::Saturation(self.values.saturation),
            TuningBlock::Hue(self.values.hue),
            TuningBlock::Css(self.values.css),
            TuningBlock::Hdr(self.values.hdr),
            TuningBlock::GlobalGain(self.values.global_gain),
            TuningBlock::ChannelGain(self.values.channel_gain),
            TuningBlock::Edge(self.values.edge),
        ];
        for block in blocks {
            self.pending.set(block);
        }
        if let Some(denoise) = self.sensor.denoise(self.values.denoise_level) {
            self.pending.set(TuningBlock::Denoise(denoise));
        }
        if let Some(gamma) = self.sensor.gamma(self.values.gamma_index) {
            self.pending.set(TuningBlock::Gamma(gamma));
        }
        self.change_illuminant(self.awb.illuminant);
    }

    /// Load the lens-shading and color-correction tables matching an
    /// illuminant reported by AWB.
    pub fn change_illuminant(&mut self, illuminant: u32) {
        self.awb.illuminant = illuminant;
        if let Some(lnc) = self.sensor.lens_shading(illuminant) {
            self.pending.set(TuningBlock::LensShading(lnc));
        }
        if let Some(cmc) = self.sensor.color_correction(illuminant) {
            self.pending.set(TuningBlock::ColorCorrection(cmc));
        }
    }

    /// Save the AE/AWB bypass state and pause both loops for a focus sweep.
    pub fn hold_3a_for_focus(&mut self) {
        if self.af.saved_bypass.is_none() {
            self.af.saved_bypass = Some((self.ae.bypass, self.awb.bypass));
        }
        self.ae.bypass = true;
        self.awb.bypass = true;
        self.awb_window.disarm();
    }

    /// Restore the AE/AWB bypass state saved by [`Self::hold_3a_for_focus`]
    /// and re-enable the statistics monitors of loops that run again.
    pub fn release_3a_after_focus(&mut self) {
        if let Some((ae, awb)) = self.af.saved_bypass.take() {
            self.ae.bypass = ae;
            self.awb.bypass = awb;
        }
        self.ae.monitor_enabled = false;
        self.awb.monitor_enabled = false;
    }

    /// Bookkeeping after `block` reached the hardware.
    pub fn on_committed(&mut self, block: &TuningBlock) {
        match block {
            TuningBlock::AfMonitor(_) => {
                self.af.status = if self.af.mode == FocusMode::Continue {
                    AfStatus::Continue
                } else {
                    AfStatus::Start
                };
            }
            TuningBlock::Exposure(exposure) => self.ae.exposure = *exposure,
            TuningBlock::AwbGain(gain) => self.awb.gain = *gain,
            _ => {}
        }
    }

    /// Whether the AE or AWB loop needs its statistics monitor turned on.
    pub fn stat_monitor_wanted(&self) -> bool {
        let ae_running = self.ae.init && !self.ae.bypass && !self.ae.monitor_enabled;
        let awb_running = self.awb.init && !self.awb.bypass && !self.awb.monitor_enabled;
        ae_running || awb_running
    }
}

/// Per-handle contexts, allocated on first init.
pub struct ContextStore {
    slots: Vec<Mutex<Option<IspContext>>>,
}

impl ContextStore {
    /// Allocate `max_handles` empty slots.
    ///
    /// # Errors
    ///
    /// `Alloc` if the slot table cannot be reserved.
    pub fn new(max_handles: usize) -> IspResult<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(max_handles)
            .map_err(|e| IspError::Alloc(format!("context table: {e}")))?;
        slots.extend((0..max_handles).map(|_| Mutex::new(None)));
        Ok(Self { slots })
    }

    fn slot(&self, handle: HandleId) -> IspResult<&Mutex<Option<IspContext>>> {
        usize::try_from(handle)
            .ok()
            .and_then(|i| self.slots.get(i))
            .ok_or_else(|| IspError::Param(format!("handle {handle} out of range")))
    }

    /// Install a freshly built context, replacing any previous one.
    pub fn install(&self, ctx: IspContext) -> IspResult<()> {
        let slot = self.slot(ctx.handle)?;
        *slot.lock() = Some(ctx);
        Ok(())
    }

    /// Drop the context of `handle`.
    pub fn remove(&self, handle: HandleId) -> IspResult<Option<IspContext>> {
        Ok(self.slot(handle)?.lock().take())
    }

    /// Drop every context.
    pub fn clear(&self) {
        for slot in &self.slots {
            slot.lock().take();
        }
    }

    /// Whether a context is installed for `handle`.
    pub fn contains(&self, handle: HandleId) -> bool {
        self.slot(handle).is_ok_and(|slot| slot.lock().is_some())
    }

    /// Run `f` with exclusive access to the context of `handle`.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if no context is installed for `handle`.
    pub fn with<R>(
        &self,
        handle: HandleId,
        f: impl FnOnce(&mut IspContext) -> R,
    ) -> IspResult<R> {
        let mut slot = self.slot(handle)?.lock();
        let ctx = slot.as_mut().ok_or(IspError::NotInitialized(handle))?;
        Ok(f(ctx))
    }
}

//! Parameter blocks and callback types of the client API.
//!
//! Parameters are plain same-process values. Each `validate` runs on the
//! calling thread before anything is posted to a worker.

use std::fmt;
use std::sync::Arc;

use isp_hal::{HandleId, Size};

use crate::error::{IspError, IspResult};
use crate::sensor::SensorTuning;

/// Direction of a focus-motor sweep reported through [`CallbackEvent::AfNotice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMove {
    /// A continuous-AF sweep started; the lens is moving
    Start,
    /// The sweep finished or was interrupted
    End,
}

/// Events delivered to `ctrl_callback` and `self_callback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    /// An IOCTL completed; `cmd` is the command id without the suppress bit
    Ctrl {
        /// Raw command id
        cmd: u32,
    },
    /// A single-frame process finished; `height` output lines are ready
    ProcEnd {
        /// Output height in lines
        height: u32,
    },
    /// Continuous-AF motor notice
    AfNotice(FocusMove),
    /// A single focus sweep finished
    AfDone {
        /// Whether a sharp position was found
        success: bool,
    },
    /// AE was bypassed and its statistics gate is locked
    AeBypass,
    /// Pending configuration was committed at start of frame
    Sof,
}

/// Callback invoked with the originating handle.
pub type Callback = Arc<dyn Fn(HandleId, CallbackEvent) + Send + Sync>;

/// Input data format of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// Packed YUV 4:2:2
    #[default]
    Yuv422,
    /// Planar YUV 4:2:0
    Yuv420,
    /// 10-bit Bayer raw
    RawBayer10,
}

/// Video operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkMode {
    /// Frame-by-frame preview with 3A running
    #[default]
    Continue,
    /// Statistics-free single capture
    Single,
}

/// Parameters of [`crate::IspRuntime::init`].
#[derive(Clone)]
pub struct InitParam {
    /// Hardware variant id; must match the tuning provider's version id
    pub isp_id: u32,
    /// Sensor output size
    pub size: Size,
    /// Tuning tables for the attached sensor
    pub tuning: Option<Arc<dyn SensorTuning>>,
    /// Receives IOCTL completions and asynchronous notices
    pub ctrl_callback: Option<Callback>,
    /// Invoked from the control worker at every start of frame
    pub self_callback: Option<Callback>,
}

impl InitParam {
    /// Parameters with both required collaborators present.
    pub fn new(
        isp_id: u32,
        size: Size,
        tuning: Arc<dyn SensorTuning>,
        ctrl_callback: Callback,
    ) -> Self {
        Self {
            isp_id,
            size,
            tuning: Some(tuning),
            ctrl_callback: Some(ctrl_callback),
            self_callback: None,
        }
    }

    /// Attach a start-of-frame callback.
    pub fn with_self_callback(mut self, callback: Callback) -> Self {
        self.self_callback = Some(callback);
        self
    }

    /// Check the parameter block before it is handed to a worker.
    ///
    /// # Errors
    ///
    /// `ParamNull` for a missing tuning provider or control callback,
    /// `Param` for a version mismatch or odd/empty size.
    pub fn validate(&self) -> IspResult<()> {
        let tuning = self.tuning.as_ref().ok_or(IspError::ParamNull("tuning"))?;
        if tuning.version_id() != self.isp_id {
            return Err(IspError::Param(format!(
                "tuning version {:#x} does not match isp id {:#x}",
                tuning.version_id(),
                self.isp_id
            )));
        }
        check_frame("sensor size", self.size)?;
        if self.ctrl_callback.is_none() {
            return Err(IspError::ParamNull("ctrl_callback"));
        }
        Ok(())
    }
}

impl fmt::Debug for InitParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitParam")
            .field("isp_id", &self.isp_id)
            .field("size", &self.size)
            .field("tuning", &self.tuning.is_some())
            .field("ctrl_callback", &self.ctrl_callback.is_some())
            .field("self_callback", &self.self_callback.is_some())
            .finish()
    }
}

/// Parameters of [`crate::IspRuntime::video_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStartParam {
    /// Frame size, even and non-zero
    pub size: Size,
    /// Sensor output format
    pub format: InputFormat,
    /// Preview or single capture
    pub mode: WorkMode,
}

impl VideoStartParam {
    /// Continuous YUV422 preview of `size`.
    pub fn preview(size: Size) -> Self {
        Self {
            size,
            format: InputFormat::Yuv422,
            mode: WorkMode::Continue,
        }
    }

    /// Reject an empty or odd frame size.
    pub fn validate(&self) -> IspResult<()> {
        check_frame("video size", self.size)
    }
}

/// Memory frame handed to single-frame processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDesc {
    /// Frame size
    pub size: Size,
    /// Pixel format
    pub format: InputFormat,
    /// Physical address of the first line
    pub addr: u64,
}

/// Parameters of [`crate::IspRuntime::proc_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStartParam {
    /// Source frame
    pub src: FrameDesc,
    /// Destination frame
    pub dst: FrameDesc,
    /// Lines of source delivered per slice
    pub src_slice_height: u32,
    /// Lines of source already in memory
    pub src_avail_height: u32,
    /// Lines written per output slice
    pub dst_slice_height: u32,
}

impl ProcStartParam {
    /// Reject a bad source size or odd slice heights.
    pub fn validate(&self) -> IspResult<()> {
        check_frame("source size", self.src.size)?;
        check_even("source slice height", self.src_slice_height)?;
        check_even("source available height", self.src_avail_height)
    }
}

/// Parameters of [`crate::IspRuntime::proc_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcNextParam {
    /// Lines of source delivered per slice
    pub src_slice_height: u32,
    /// Lines of source now in memory
    pub src_avail_height: u32,
    /// Destination address for the next slice
    pub dst_addr: u64,
}

impl ProcNextParam {
    /// Reject odd slice heights.
    pub fn validate(&self) -> IspResult<()> {
        check_even("source slice height", self.src_slice_height)?;
        check_even("source available height", self.src_avail_height)
    }
}

/// Read-only queries answered without going through the control worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityCmd {
    /// Largest video frame
    VideoSize,
    /// Largest single-frame capture
    CaptureSize,
    /// Whether low-light mode is on
    LowLuxEnabled,
    /// ISO of the last AE step
    CurrentIso,
    /// Current denoise level
    DenoiseLevel,
}

/// Answer to a [`CapabilityCmd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityValue {
    /// Frame size
    Size(Size),
    /// On or off
    Flag(bool),
    /// Numeric value
    Value(u32),
}

fn check_frame(what: &str, size: Size) -> IspResult<()> {
    if size.is_empty() || !size.is_even() {
        return Err(IspError::Param(format!(
            "{what} {}x{} must be non-zero and even",
            size.w, size.h
        )));
    }
    Ok(())
}

fn check_even(what: &str, value: u32) -> IspResult<()> {
    if value % 2 != 0 {
        return Err(IspError::Param(format!("{what} {value} must be even")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::StaticTuning;

    fn callback() -> Callback {
        Arc::new(|_, _| {})
    }

    #[test]
    fn test_init_param_validation() {
        let tuning: Arc<dyn SensorTuning> = Arc::new(StaticTuning::new(2));
        let ok = InitParam::new(2, Size::new(1280, 720), Arc::clone(&tuning), callback());
        assert!(ok.validate().is_ok());

        let odd = InitParam::new(2, Size::new(1281, 720), Arc::clone(&tuning), callback());
        assert!(matches!(odd.validate(), Err(IspError::Param(_))));

        let mismatch = InitParam::new(3, Size::new(1280, 720), Arc::clone(&tuning), callback());
        assert!(matches!(mismatch.validate(), Err(IspError::Param(_))));

        let mut no_callback = ok.clone();
        no_callback.ctrl_callback = None;
        assert!(matches!(
            no_callback.validate(),
            Err(IspError::ParamNull("ctrl_callback"))
        ));

        let mut no_tuning = ok;
        no_tuning.tuning = None;
        assert!(matches!(
            no_tuning.validate(),
            Err(IspError::ParamNull("tuning"))
        ));
    }

    #[test]
    fn test_proc_param_validation() {
        let frame = FrameDesc {
            size: Size::new(640, 480),
            ..Default::default()
        };
        let mut param = ProcStartParam {
            src: frame,
            dst: frame,
            src_slice_height: 480,
            src_avail_height: 480,
            dst_slice_height: 480,
        };
        assert!(param.validate().is_ok());
        param.src_slice_height = 479;
        assert!(param.validate().is_err());

        let next = ProcNextParam {
            src_slice_height: 16,
            src_avail_height: 15,
            dst_addr: 0,
        };
        assert!(next.validate().is_err());
    }

    #[test]
    fn test_empty_video_size_rejected() {
        assert!(VideoStartParam::preview(Size::new(0, 0)).validate().is_err());
        assert!(VideoStartParam::preview(Size::new(1280, 720))
            .validate()
            .is_ok());
    }
}

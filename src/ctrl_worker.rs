//! Control worker: the central dispatcher.
//!
//! Runs on the `isp-ctrl` thread and is the only place that programs the
//! hardware. Client requests, interrupt events from the monitor and
//! follow-ups from the proc worker all arrive on its queue and are handled
//! one at a time.
//!
//! A failed hardware call is logged and the loop carries on; the loop only
//! ends on `STOP` or when its queue is destroyed.

use std::sync::Arc;

use isp_hal::{HandleId, IrqMask, Rect, SliceGeometry, TuningBlock};
use tracing::{debug, error, info, trace, warn};

use crate::context::{AfStatus, IspContext, SliceState};
use crate::error::{IspError, IspResult};
use crate::focus;
use crate::ioctl::{self, IoctlEffect, IoctlRequest};
use crate::messages::{CtrlEvent, CtrlMsg, Payload, ProcEvent, ProcMsg, Reply};
use crate::params::{
    Callback, CallbackEvent, InitParam, ProcNextParam, ProcStartParam, VideoStartParam, WorkMode,
};
use crate::system::{IspSystem, SystemStatus};

pub(crate) struct CtrlWorker {
    system: Arc<IspSystem>,
    /// Deinit of the last handle, answered once the monitor has stopped
    parked_deinit: Option<CtrlMsg>,
    monitor_stopped: bool,
}

impl CtrlWorker {
    pub fn new(system: Arc<IspSystem>) -> Self {
        Self {
            system,
            parked_deinit: None,
            monitor_stopped: false,
        }
    }

    /// Process messages until `STOP` or a queue failure. The queue is
    /// destroyed on the way out, so nothing posted afterwards waits forever.
    pub fn run(mut self) {
        let system = Arc::clone(&self.system);
        let _queue = system.ctrl_queue.destroy_on_drop();
        info!("control worker started");
        loop {
            let msg = match self.system.ctrl_queue.get() {
                Ok(msg) => msg,
                Err(e) => {
                    error!(error = %e, "control queue get failed");
                    break;
                }
            };
            if !self.handle(msg) {
                break;
            }
        }
        info!("control worker exiting");
    }

    /// Handle one message; returns `false` when the loop must exit.
    fn handle(&mut self, mut msg: CtrlMsg) -> bool {
        let handle = msg.handle;
        let payload = msg.data.take();
        trace!(handle, event = ?msg.event, "ctrl event");

        match (msg.event, payload) {
            (CtrlEvent::Start, _) => {
                let result = self.system.driver.open().map_err(IspError::from);
                if result.is_ok() {
                    self.system.set_status(SystemStatus::Idle);
                }
                msg.reply(result.map(|()| Reply::Done));
            }
            (CtrlEvent::Stop, _) => {
                if let Err(e) = self.system.driver.close() {
                    warn!(error = %e, "failed to close ISP device");
                }
                self.system.set_status(SystemStatus::Close);
                msg.reply(Ok(Reply::Done));
                return false;
            }
            (CtrlEvent::Init, Some(Payload::Init(param))) => {
                let result = self.init(handle, &param);
                msg.reply(result.map(|()| Reply::Done));
            }
            (CtrlEvent::Deinit, Some(Payload::Deinit { last })) => match self.deinit(handle, last) {
                Ok(true) if !self.monitor_stopped => self.parked_deinit = Some(msg),
                Ok(_) => msg.reply(Ok(Reply::Done)),
                Err(e) => msg.reply(Err(e)),
            },
            (CtrlEvent::MonitorStop, _) => {
                self.monitor_stopped = true;
                match self.parked_deinit.take() {
                    Some(mut parked) => {
                        debug!(handle = parked.handle, "monitor stopped, releasing deinit");
                        parked.reply(Ok(Reply::Done));
                    }
                    None => debug!("monitor stopped with no deinit waiting"),
                }
            }
            (CtrlEvent::Continue, Some(Payload::VideoStart(param))) => {
                let result = self.video_start(handle, &param);
                if let Err(e) = &result {
                    warn!(handle, error = %e, "video start failed");
                }
                msg.reply(result.map(|()| Reply::Done));
            }
            (CtrlEvent::ContinueStop, _) => {
                let result = self.video_stop(handle);
                msg.reply(result.map(|()| Reply::Done));
            }
            (CtrlEvent::Signal, Some(Payload::ProcStart(param))) => {
                if let Err(e) = self.proc_start(handle, &param) {
                    warn!(handle, error = %e, "slice process start failed");
                }
            }
            (CtrlEvent::SignalNext, Some(Payload::ProcNext(param))) => {
                if let Err(e) = self.proc_next(handle, &param) {
                    warn!(handle, error = %e, "slice process continue failed");
                }
            }
            (CtrlEvent::Ioctl, Some(Payload::Ioctl(request))) => {
                let result = self.ioctl(handle, &request);
                msg.reply(result);
            }
            (CtrlEvent::CtrlSync, _) => msg.reply(Ok(Reply::Sync(msg.sub_type))),
            (CtrlEvent::Sof, _) => self.on_sof(handle),
            (CtrlEvent::Eof, _) => trace!(handle, "end of frame"),
            (CtrlEvent::Tx, _) => self.on_tx(handle),
            (event @ (CtrlEvent::Ae | CtrlEvent::Awb | CtrlEvent::Af), _) => {
                self.on_statistics(event, handle);
            }
            (CtrlEvent::ContinueAf, _) => self.on_continue_af(handle),
            (event, payload) => {
                warn!(handle, event = ?event, payload = ?payload, "malformed control message");
                msg.reply(Err(IspError::Param(format!("{event:?} without its parameters"))));
            }
        }
        true
    }

    fn init(&self, handle: HandleId, param: &InitParam) -> IspResult<()> {
        let ctx = IspContext::new(handle, param, &self.system.config.focus)?;
        self.system.contexts.install(ctx)?;
        if self.system.status() == SystemStatus::Idle {
            self.system.set_status(SystemStatus::Run);
        }
        info!(handle, width = param.size.w, height = param.size.h, "handle initialized");
        Ok(())
    }

    /// Release `handle`. Returns `true` when the reply has to wait for the
    /// monitor to report that the hardware stopped.
    ///
    /// # Errors
    ///
    /// The hardware error when the last handle could not stop the pipeline;
    /// the context is released regardless.
    fn deinit(&self, handle: HandleId, last: bool) -> IspResult<bool> {
        if self.system.pipeline_owner() == Some(handle) {
            self.system.set_pipeline_owner(None);
        }
        match self.system.contexts.remove(handle) {
            Ok(Some(ctx)) => {
                if ctx.ae.init {
                    self.system.algorithms.lock().deinit(handle);
                }
                info!(handle, last, "handle released");
            }
            Ok(None) => debug!(handle, "deinit of handle without context"),
            Err(e) => warn!(handle, error = %e, "deinit failed"),
        }
        if !last {
            return Ok(false);
        }
        self.system.set_status(SystemStatus::Idle);
        if let Err(e) = self.system.driver.stop(handle) {
            warn!(handle, error = %e, "failed to stop hardware");
            return Err(e.into());
        }
        Ok(true)
    }

    fn video_start(&self, handle: HandleId, param: &VideoStartParam) -> IspResult<()> {
        let driver = &self.system.driver;
        driver.enable_clock(handle, true)?;

        let continuous = param.mode == WorkMode::Continue;
        let mut algorithms_ready = false;
        let started = (|| -> IspResult<()> {
            driver.reset(handle)?;
            self.system.contexts.with(handle, |ctx| {
                ctx.video_size = param.size;
                ctx.input_format = param.format;
                ctx.work_mode = param.mode;
                ctx.ae.init = continuous;
                ctx.awb.init = continuous;
                ctx.af.init = continuous;
                ctx.ae.monitor_enabled = false;
                ctx.awb.monitor_enabled = false;
                ctx.queue_full_config();
            })?;

            let mask = if continuous {
                IrqMask::VIDEO | IrqMask::ERRORS
            } else {
                IrqMask::SOF | IrqMask::EOF | IrqMask::ERRORS
            };
            driver.set_irq_mask(handle, mask)?;
            if continuous {
                self.system.algorithms.lock().init(handle)?;
                algorithms_ready = true;
            }
            self.system.frame_skip.lock().reset();
            self.system.set_pipeline_owner(Some(handle));
            driver.start(handle)?;
            Ok(())
        })();

        if let Err(e) = started {
            warn!(handle, error = %e, "video start failed");
            self.abort_video_start(handle, algorithms_ready);
            return Err(e);
        }
        self.system.set_status(SystemStatus::Continue);
        info!(handle, width = param.size.w, height = param.size.h, mode = ?param.mode, "video started");
        Ok(())
    }

    /// Undo a partial [`Self::video_start`]; the system stays in `Run`.
    fn abort_video_start(&self, handle: HandleId, algorithms_ready: bool) {
        let driver = &self.system.driver;
        if let Err(e) = driver.set_irq_mask(handle, IrqMask::empty()) {
            warn!(handle, error = %e, "failed to mask interrupts");
        }
        let _ = self.system.contexts.with(handle, |ctx| {
            ctx.ae.init = false;
            ctx.awb.init = false;
            ctx.af.init = false;
        });
        if algorithms_ready {
            self.system.algorithms.lock().deinit(handle);
        }
        self.system.set_pipeline_owner(None);
        if let Err(e) = driver.enable_clock(handle, false) {
            warn!(handle, error = %e, "failed to gate clock");
        }
    }

    fn video_stop(&self, handle: HandleId) -> IspResult<()> {
        let driver = &self.system.driver;
        if let Err(e) = driver.set_irq_mask(handle, IrqMask::empty()) {
            warn!(handle, error = %e, "failed to mask interrupts");
        }
        let continuous = self.system.contexts.with(handle, |ctx| {
            let continuous = ctx.ae.init;
            ctx.ae.init = false;
            ctx.awb.init = false;
            ctx.af.init = false;
            continuous
        })?;
        if let Err(e) = self
            .system
            .proc_queue
            .post(ProcMsg::new(ProcEvent::StopHandler, handle))
        {
            warn!(handle, error = %e, "failed to notify proc worker of video stop");
        }
        if continuous {
            self.system.algorithms.lock().deinit(handle);
        }
        if let Err(e) = driver.enable_clock(handle, false) {
            warn!(handle, error = %e, "failed to gate clock");
        }
        self.system.set_pipeline_owner(None);
        self.system.set_status(SystemStatus::Run);
        info!(handle, "video stopped");
        Ok(())
    }

    fn proc_start(&self, handle: HandleId, param: &ProcStartParam) -> IspResult<()> {
        let max_width = self.system.config.runtime.max_slice_width;
        let first = self.system.contexts.with(handle, |ctx| {
            ctx.slice = SliceState {
                src: param.src,
                dst: param.dst,
                count: param.src.size.w.div_ceil(max_width),
                current: 0,
                slice_height: param.src_slice_height,
                avail_height: param.src_avail_height,
                complete_line: 0,
            };
            slice_geometry(&ctx.slice)
        })?;

        let driver = &self.system.driver;
        driver.enable_clock(handle, true)?;
        driver.set_irq_mask(handle, IrqMask::PROC | IrqMask::ERRORS)?;
        driver.configure_slice(handle, &first)?;
        self.system.set_pipeline_owner(Some(handle));
        driver.start(handle)?;
        self.system.set_status(SystemStatus::Signal);
        debug!(handle, slices = first.count, "slice process started");
        Ok(())
    }

    fn proc_next(&self, handle: HandleId, param: &ProcNextParam) -> IspResult<()> {
        let geometry = self.system.contexts.with(handle, |ctx| {
            if ctx.slice.current >= ctx.slice.count {
                return Err(IspError::Param(format!(
                    "no slice process running on handle {handle}"
                )));
            }
            ctx.slice.slice_height = param.src_slice_height;
            ctx.slice.avail_height = param.src_avail_height;
            ctx.slice.dst.addr = param.dst_addr;
            Ok(slice_geometry(&ctx.slice))
        })??;
        self.system.driver.configure_slice(handle, &geometry)?;
        self.system.driver.start(handle)?;
        Ok(())
    }

    /// A slice finished: start the next one or report the whole frame.
    fn on_tx(&self, handle: HandleId) {
        let step = self.system.contexts.with(handle, |ctx| {
            let slice = &mut ctx.slice;
            if slice.current >= slice.count {
                return None;
            }
            slice.complete_line = slice.avail_height.min(slice.src.size.h);
            slice.current += 1;
            Some(if slice.current < slice.count {
                SliceStep::Next(slice_geometry(slice))
            } else {
                SliceStep::Done {
                    callback: ctx.ctrl_callback.clone(),
                    height: slice.dst.size.h,
                }
            })
        });
        match step {
            Ok(Some(SliceStep::Next(next))) => {
                let driver = &self.system.driver;
                if let Err(e) = driver
                    .configure_slice(handle, &next)
                    .and_then(|()| driver.start(handle))
                {
                    warn!(handle, slice = next.index, error = %e, "failed to start next slice");
                }
            }
            Ok(Some(SliceStep::Done { callback, height })) => {
                if let Err(e) = self.system.driver.enable_clock(handle, false) {
                    warn!(handle, error = %e, "failed to gate clock");
                }
                self.system.set_pipeline_owner(None);
                self.system.set_status(SystemStatus::Run);
                debug!(handle, height, "slice process finished");
                if let Some(callback) = callback {
                    callback(handle, CallbackEvent::ProcEnd { height });
                }
            }
            Ok(None) => debug!(handle, "transfer done without slice process"),
            Err(e) => debug!(handle, error = %e, "transfer done for released handle"),
        }
    }

    fn ioctl(&self, handle: HandleId, request: &IoctlRequest) -> IspResult<Reply> {
        let driver = Arc::clone(&self.system.driver);
        let (output, effect) = self
            .system
            .contexts
            .with(handle, |ctx| ioctl::dispatch(ctx, driver.as_ref(), request))??;
        match effect {
            Some(IoctlEffect::StopFocus) => {
                self.system
                    .proc_queue
                    .post(ProcMsg::new(ProcEvent::AfStop, handle))?;
            }
            Some(IoctlEffect::MoveFocus(position)) => {
                self.system
                    .algorithms
                    .lock()
                    .set_focus_position(handle, position)?;
            }
            None => {}
        }
        Ok(Reply::Ioctl(output))
    }

    /// Commit pending configuration at start of frame.
    fn on_sof(&self, handle: HandleId) {
        let driver = Arc::clone(&self.system.driver);
        let committed = self.system.contexts.with(handle, |ctx| {
            if ctx.wb_trim.tick() {
                ctx.pending.set(TuningBlock::WbTrim(ctx.values.wb_window));
            }
            if ctx.awb_window.tick() {
                debug!(handle, "resuming AE/AWB after focus");
                ctx.release_3a_after_focus();
            }

            let mut notices = Vec::new();
            if ctx.ae.bypass && ctx.af.saved_bypass.is_none() && !ctx.ae.bypass_notified {
                ctx.ae.bypass_notified = true;
                notices.push(CallbackEvent::AeBypass);
            }

            if ctx.stat_monitor_wanted() {
                match driver.set_stat_monitor(handle, true, ctx.ae.skip_frames) {
                    Ok(()) => {
                        ctx.ae.monitor_enabled = !ctx.ae.bypass;
                        ctx.awb.monitor_enabled = !ctx.awb.bypass;
                    }
                    Err(e) => warn!(handle, error = %e, "failed to enable statistics monitor"),
                }
            }

            for block in ctx.pending.take() {
                match driver.apply(handle, &block) {
                    Ok(()) => ctx.on_committed(&block),
                    Err(e) => warn!(handle, block = ?block.kind(), error = %e, "failed to program block"),
                }
            }
            if let Err(e) = driver.shadow(handle) {
                warn!(handle, error = %e, "shadow latch failed");
            }
            (ctx.ctrl_callback.clone(), ctx.self_callback.clone(), notices)
        });

        match committed {
            Ok((ctrl_callback, self_callback, notices)) => {
                if let Some(callback) = ctrl_callback {
                    for notice in notices {
                        callback(handle, notice);
                    }
                }
                if let Some(callback) = self_callback {
                    callback(handle, CallbackEvent::Sof);
                }
            }
            Err(e) => debug!(handle, error = %e, "start of frame for released handle"),
        }
    }

    /// Read the statistics for `event` and hand them to the proc worker.
    fn on_statistics(&self, event: CtrlEvent, handle: HandleId) {
        let driver = Arc::clone(&self.system.driver);
        let af_uses_awb = self.system.config.focus.af_uses_awb_stats;
        let routed = self.system.contexts.with(handle, |ctx| -> IspResult<Option<ProcEvent>> {
            let sweeping = ctx.af.status != AfStatus::Stop;
            let proc_event = match event {
                CtrlEvent::Ae => {
                    ctx.stats.ae = Some(driver.read_ae_stats(handle)?);
                    ProcEvent::Ae
                }
                CtrlEvent::Awb if af_uses_awb && sweeping => {
                    ctx.stats.af = Some(driver.read_af_stats(handle)?);
                    ProcEvent::Af
                }
                CtrlEvent::Awb => {
                    ctx.stats.awb = Some(driver.read_awb_stats(handle)?);
                    ProcEvent::Awb
                }
                // AF statistics only matter while a sweep runs
                _ if !sweeping => return Ok(None),
                _ => {
                    ctx.stats.af = Some(driver.read_af_stats(handle)?);
                    ProcEvent::Af
                }
            };
            Ok(Some(proc_event))
        });
        match routed {
            Ok(Ok(Some(proc_event))) => {
                if let Err(e) = self.system.proc_queue.post(ProcMsg::new(proc_event, handle)) {
                    warn!(handle, event = ?proc_event, error = %e, "failed to forward statistics");
                }
            }
            Ok(Ok(None)) => trace!(handle, "AF statistics outside a sweep"),
            Ok(Err(e)) => warn!(handle, event = ?event, error = %e, "failed to read statistics"),
            Err(e) => debug!(handle, error = %e, "statistics for released handle"),
        }
    }

    fn on_continue_af(&self, handle: HandleId) {
        let started = self
            .system
            .contexts
            .with(handle, |ctx| (focus::trigger_sweep(ctx), ctx.ctrl_callback.clone()));
        if let Ok((Some(notice), Some(callback))) = started {
            debug!(handle, "continuous focus sweep started");
            callback(handle, notice);
        }
    }
}

enum SliceStep {
    Next(SliceGeometry),
    Done {
        callback: Option<Callback>,
        height: u32,
    },
}

/// Geometry of the current slice: the source is cut into `count` vertical
/// strips of even width.
fn slice_geometry(slice: &SliceState) -> SliceGeometry {
    let width = slice.src.size.w;
    let count = slice.count.max(1);
    let strip = (width.div_ceil(count) + 1) & !1;
    let x = strip.saturating_mul(slice.current).min(width);
    SliceGeometry {
        src: slice.src.size,
        region: Rect::new(x, 0, strip.min(width - x), slice.src.size.h),
        index: slice.current,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FrameDesc;
    use isp_hal::Size;

    fn slicing(width: u32, count: u32) -> SliceState {
        SliceState {
            src: FrameDesc {
                size: Size::new(width, 480),
                ..Default::default()
            },
            count,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_slice_covers_frame() {
        let geometry = slice_geometry(&slicing(640, 1));
        assert_eq!(geometry.region, Rect::new(0, 0, 640, 480));
        assert_eq!(geometry.count, 1);
    }

    #[test]
    fn test_slices_tile_the_width() {
        let mut state = slicing(3000, 2);
        let first = slice_geometry(&state);
        state.current = 1;
        let second = slice_geometry(&state);
        assert_eq!(first.region.x, 0);
        assert_eq!(first.region.w, 1500);
        assert_eq!(second.region.x, 1500);
        assert_eq!(first.region.w + second.region.w, 3000);
        assert_eq!(second.index, 1);
    }

    #[test]
    fn test_odd_strip_rounds_to_even() {
        let mut state = slicing(2602, 2);
        let first = slice_geometry(&state);
        assert_eq!(first.region.w % 2, 0);
        state.current = 1;
        let last = slice_geometry(&state);
        assert_eq!(first.region.w + last.region.w, 2602);
    }
}

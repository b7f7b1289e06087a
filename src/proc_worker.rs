//! Proc worker: runs the 3A algorithms off the control thread.
//!
//! Each statistics event is handled in three steps so the context lock and
//! the algorithm lock are never held together: copy settings and statistics
//! out of the context, run the algorithm, then write the result back as
//! pending configuration for the next start of frame.

use std::sync::Arc;

use isp_hal::{HandleId, TuningBlock};
use tracing::{debug, error, info, trace, warn};

use crate::algorithm::AfProgress;
use crate::context::{AfStatus, AwbMode};
use crate::focus::{self, ReevaluationTick, StatSource};
use crate::messages::{CtrlEvent, CtrlMsg, ProcEvent, ProcMsg, Reply};
use crate::params::{Callback, CallbackEvent};
use crate::system::IspSystem;

pub(crate) struct ProcWorker {
    system: Arc<IspSystem>,
    tick: ReevaluationTick,
}

impl ProcWorker {
    pub fn new(system: Arc<IspSystem>) -> Self {
        Self {
            system,
            tick: ReevaluationTick::default(),
        }
    }

    /// Process messages until `STOP` or a queue failure; destroys the proc
    /// queue on exit, unwinding included.
    pub fn run(mut self) {
        let system = Arc::clone(&self.system);
        let _queue = system.proc_queue.destroy_on_drop();
        info!("proc worker started");
        loop {
            let mut msg = match self.system.proc_queue.get() {
                Ok(msg) => msg,
                Err(e) => {
                    error!(error = %e, "proc queue get failed");
                    break;
                }
            };
            let keep_running = self.handle(&mut msg);
            self.drain_tick();
            if !keep_running {
                break;
            }
        }
        info!("proc worker exiting");
    }

    fn handle(&mut self, msg: &mut ProcMsg) -> bool {
        let handle = msg.handle;
        trace!(handle, event = ?msg.event, "proc event");
        match msg.event {
            ProcEvent::Start => msg.reply(Ok(Reply::Done)),
            ProcEvent::Stop => {
                msg.reply(Ok(Reply::Done));
                return false;
            }
            ProcEvent::Ae => self.on_ae(handle),
            ProcEvent::Awb => self.on_awb(handle),
            ProcEvent::Af => self.on_af(handle),
            ProcEvent::AfStop => self.stop_sweep(handle),
            ProcEvent::StopHandler => {
                let sweeping = self
                    .system
                    .contexts
                    .with(handle, |ctx| ctx.af.status != AfStatus::Stop)
                    .unwrap_or(false);
                if sweeping {
                    self.stop_sweep(handle);
                }
                self.tick.cancel(handle);
            }
        }
        true
    }

    fn on_ae(&mut self, handle: HandleId) {
        let Ok(Some((settings, stats))) = self.system.contexts.with(handle, |ctx| {
            if ctx.ae.bypass {
                return None;
            }
            ctx.stats.ae.clone().map(|stats| (ctx.ae.clone(), stats))
        }) else {
            return;
        };

        let output = match self.system.algorithms.lock().ae(handle, &settings, &stats) {
            Ok(output) => output,
            Err(e) => {
                warn!(handle, error = %e, "AE step failed");
                return;
            }
        };

        let armed = self.system.contexts.with(handle, |ctx| {
            if !ctx.ae.bypass {
                ctx.pending.set(TuningBlock::Exposure(output.exposure));
            }
            let ae = &mut ctx.ae;
            ae.changed = ae.lum != output.lum || ae.stable != output.stable;
            ae.lum = output.lum;
            ae.current_iso = output.iso;
            ae.stable = output.stable;
            ae.fast_stable = output.fast_stable;
            ae.low_lux = output.low_lux;
            focus::record_statistic(ctx, StatSource::Ae);
            focus::try_arm(ctx)
        });
        if let Ok(true) = armed {
            self.tick.schedule(handle);
        }
    }

    fn on_awb(&mut self, handle: HandleId) {
        let Ok(Some(stats)) = self.system.contexts.with(handle, |ctx| {
            if ctx.awb.bypass {
                return None;
            }
            ctx.stats.awb
        }) else {
            return;
        };

        let output = match self.system.algorithms.lock().awb(handle, &stats) {
            Ok(output) => output,
            Err(e) => {
                warn!(handle, error = %e, "AWB step failed");
                return;
            }
        };

        let armed = self.system.contexts.with(handle, |ctx| {
            if ctx.awb.mode == AwbMode::Auto && !ctx.awb.bypass {
                ctx.pending.set(TuningBlock::AwbGain(output.gain));
            }
            ctx.awb.stable = output.stable;
            if output.illuminant != ctx.awb.illuminant {
                debug!(handle, illuminant = output.illuminant, "illuminant changed");
                ctx.change_illuminant(output.illuminant);
            }
            focus::record_statistic(ctx, StatSource::Awb);
            focus::try_arm(ctx)
        });
        if let Ok(true) = armed {
            self.tick.schedule(handle);
        }
    }

    fn on_af(&mut self, handle: HandleId) {
        let Ok(Some(stats)) = self.system.contexts.with(handle, |ctx| {
            if ctx.af.status == AfStatus::Stop {
                return None;
            }
            ctx.stats.af.clone()
        }) else {
            return;
        };

        let progress = match self.system.algorithms.lock().af(handle, &stats) {
            Ok(progress) => progress,
            Err(e) => {
                warn!(handle, error = %e, "AF step failed");
                return;
            }
        };

        match progress {
            AfProgress::Running { position } => {
                let _ = self
                    .system
                    .contexts
                    .with(handle, |ctx| ctx.af.position = position);
            }
            AfProgress::Finished { success, position } => {
                let finished = self.system.contexts.with(handle, |ctx| {
                    (
                        focus::finish_sweep(ctx, success, position),
                        ctx.ctrl_callback.clone(),
                    )
                });
                self.system.algorithms.lock().af_end(handle, false);
                debug!(handle, success, position, "focus sweep finished");
                if let Ok((notice, callback)) = finished {
                    notify(handle, notice, callback);
                }
            }
        }
    }

    /// End a running sweep at its current lens position.
    fn stop_sweep(&mut self, handle: HandleId) {
        let finished = self.system.contexts.with(handle, |ctx| {
            let position = ctx.af.position;
            (
                focus::finish_sweep(ctx, false, position),
                ctx.ctrl_callback.clone(),
            )
        });
        match finished {
            Ok((Some(notice), callback)) => {
                self.system.algorithms.lock().af_end(handle, true);
                debug!(handle, "focus sweep stopped");
                notify(handle, Some(notice), callback);
            }
            Ok((None, _)) => trace!(handle, "no sweep to stop"),
            Err(e) => debug!(handle, error = %e, "focus stop for released handle"),
        }
    }

    /// Run due continuous-AF re-evaluations.
    fn drain_tick(&mut self) {
        while let Some(handle) = self.tick.next_due() {
            let refocus = self.system.algorithms.lock().continue_af(handle);
            if refocus {
                debug!(handle, "scene changed, requesting focus sweep");
                if let Err(e) = self
                    .system
                    .ctrl_queue
                    .post(CtrlMsg::new(CtrlEvent::ContinueAf, handle))
                {
                    warn!(handle, error = %e, "failed to request focus sweep");
                }
            } else {
                let _ = self.system.contexts.with(handle, focus::settle);
            }
        }
    }
}

fn notify(handle: HandleId, notice: Option<CallbackEvent>, callback: Option<Callback>) {
    if let (Some(notice), Some(callback)) = (notice, callback) {
        callback(handle, notice);
    }
}

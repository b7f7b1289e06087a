//! Autofocus state transitions.
//!
//! Two layers:
//!
//! - the sweep status (`STOP / START / CONTINUE`), driven by the AF and
//!   AF_MODE commands and by the end of a sweep;
//! - the continuous-AF sub-machine (`END / IDLE / RUN`). In `IDLE` it waits
//!   until both an AE and an AWB result arrived since the last decision,
//!   then moves to `RUN` and schedules a re-evaluation on the
//!   [`ReevaluationTick`]. The proc worker drains the tick after the current
//!   message, so re-evaluation is serialized with the other 3A steps and
//!   never recurses.
//!
//! Everything here is pure state manipulation on an [`IspContext`]; the
//! workers decide what to post or call based on the return values.

use std::collections::VecDeque;

use isp_hal::{HandleId, TuningBlock};

use crate::context::{AfStatus, ContinueStatus, FocusMode, IspContext};
use crate::params::{CallbackEvent, FocusMove};

/// Statistics source feeding the continuous-AF readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatSource {
    /// Auto exposure
    Ae,
    /// Auto white balance
    Awb,
}

/// Side effect requested by [`set_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeChange {
    /// A running sweep must be stopped through the proc worker
    pub stop_sweep: bool,
}

/// Apply an AF_MODE change.
///
/// Leaving continuous mode ends the continuous sub-machine and stops a
/// running sweep. Entering continuous mode arms the sub-machine.
pub fn set_mode(ctx: &mut IspContext, mode: FocusMode) -> ModeChange {
    let mut change = ModeChange::default();
    if ctx.af.mode == FocusMode::Continue && mode != FocusMode::Continue {
        ctx.af.continue_status = ContinueStatus::End;
        change.stop_sweep = ctx.af.status != AfStatus::Stop;
    }
    ctx.af.mode = mode;
    if mode == FocusMode::Continue {
        start_continuous(ctx);
    }
    change
}

/// Arm continuous AF: `END` becomes `IDLE` with cleared statistics flags.
///
/// A continuous sweep that is still holding AE/AWB is left alone; the end
/// of that sweep re-arms the sub-machine.
pub fn start_continuous(ctx: &mut IspContext) {
    let sweeping = !ctx.af.bypass
        && ctx.af.status == AfStatus::Continue
        && ctx.af.saved_bypass.is_some();
    if sweeping {
        return;
    }
    if ctx.af.continue_status == ContinueStatus::End {
        ctx.af.continue_status = ContinueStatus::Idle;
        ctx.af.stat_flags = Default::default();
    }
}

/// Note that `source` produced a fresh result.
pub fn record_statistic(ctx: &mut IspContext, source: StatSource) {
    if ctx.af.continue_status == ContinueStatus::End {
        ctx.af.stat_flags = Default::default();
        return;
    }
    match source {
        StatSource::Ae => ctx.af.stat_flags.ae = true,
        StatSource::Awb => ctx.af.stat_flags.awb = true,
    }
}

/// Move `IDLE` to `RUN` once both AE and AWB reported and no sweep runs.
///
/// Returns `true` when a re-evaluation must be scheduled.
pub fn try_arm(ctx: &mut IspContext) -> bool {
    let af = &mut ctx.af;
    let ready = af.mode == FocusMode::Continue
        && af.continue_status == ContinueStatus::Idle
        && af.status == AfStatus::Stop
        && af.stat_flags.ae
        && af.stat_flags.awb;
    if ready {
        af.continue_status = ContinueStatus::Run;
        af.stat_flags = Default::default();
    }
    ready
}

/// The re-evaluation decided not to refocus.
pub fn settle(ctx: &mut IspContext) {
    if ctx.af.continue_status == ContinueStatus::Run {
        ctx.af.continue_status = ContinueStatus::Idle;
    }
}

/// Start a continuous-AF sweep: pause AE/AWB and queue the AF monitor.
///
/// Returns the notice for `ctrl_callback`, or `None` when no sweep starts.
pub fn trigger_sweep(ctx: &mut IspContext) -> Option<CallbackEvent> {
    if ctx.af.bypass || ctx.af.status == AfStatus::Continue || ctx.af.mode != FocusMode::Continue
    {
        settle(ctx);
        return None;
    }
    ctx.hold_3a_for_focus();
    ctx.af.status = AfStatus::Continue;
    let windows = ctx.af.windows.clone();
    ctx.pending.set(TuningBlock::AfMonitor(windows));
    Some(CallbackEvent::AfNotice(FocusMove::Start))
}

/// Finish the current sweep.
///
/// AE/AWB resume after the AWB-window countdown. In continuous mode the
/// sub-machine returns to `IDLE`. Returns the notice to deliver.
pub fn finish_sweep(ctx: &mut IspContext, success: bool, position: u32) -> Option<CallbackEvent> {
    let previous = ctx.af.status;
    if previous == AfStatus::Stop {
        return None;
    }
    ctx.af.status = AfStatus::Stop;
    ctx.af.last_success = success;
    ctx.af.position = position;
    if ctx.af.saved_bypass.is_some() {
        ctx.awb_window.arm();
    }
    if ctx.af.mode == FocusMode::Continue {
        ctx.af.continue_status = ContinueStatus::End;
        start_continuous(ctx);
    }
    Some(match previous {
        AfStatus::Continue => CallbackEvent::AfNotice(FocusMove::End),
        _ => CallbackEvent::AfDone { success },
    })
}

/// Recurring re-evaluation requests, drained by the proc worker between
/// messages.
#[derive(Debug, Default)]
pub struct ReevaluationTick {
    due: VecDeque<HandleId>,
}

impl ReevaluationTick {
    /// Request a re-evaluation for `handle`; duplicates collapse.
    pub fn schedule(&mut self, handle: HandleId) {
        if !self.due.contains(&handle) {
            self.due.push_back(handle);
        }
    }

    /// Next handle due for re-evaluation.
    pub fn next_due(&mut self) -> Option<HandleId> {
        self.due.pop_front()
    }

    /// Forget pending requests for `handle`.
    pub fn cancel(&mut self, handle: HandleId) {
        self.due.retain(|&h| h != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use isp_hal::BlockKind;

    #[test]
    fn test_continue_mode_arms_from_stop() {
        let mut ctx = test_context();
        assert_eq!(ctx.af.continue_status, ContinueStatus::End);
        let change = set_mode(&mut ctx, FocusMode::Continue);
        assert!(!change.stop_sweep);
        assert_eq!(ctx.af.continue_status, ContinueStatus::Idle);
    }

    #[test]
    fn test_leaving_continue_ends_and_stops_sweep() {
        let mut ctx = test_context();
        set_mode(&mut ctx, FocusMode::Continue);
        ctx.af.status = AfStatus::Continue;

        let change = set_mode(&mut ctx, FocusMode::Normal);
        assert!(change.stop_sweep);
        assert_eq!(ctx.af.continue_status, ContinueStatus::End);
        assert_eq!(ctx.af.mode, FocusMode::Normal);
    }

    #[test]
    fn test_leaving_continue_while_stopped_needs_no_stop() {
        let mut ctx = test_context();
        set_mode(&mut ctx, FocusMode::Continue);
        let change = set_mode(&mut ctx, FocusMode::Macro);
        assert!(!change.stop_sweep);
        assert_eq!(ctx.af.continue_status, ContinueStatus::End);
    }

    #[test]
    fn test_arm_requires_both_sources() {
        let mut ctx = test_context();
        set_mode(&mut ctx, FocusMode::Continue);

        record_statistic(&mut ctx, StatSource::Awb);
        assert!(!try_arm(&mut ctx));
        record_statistic(&mut ctx, StatSource::Awb);
        assert!(!try_arm(&mut ctx));
        record_statistic(&mut ctx, StatSource::Ae);
        assert!(try_arm(&mut ctx));
        assert_eq!(ctx.af.continue_status, ContinueStatus::Run);

        // edge triggered: flags were consumed
        settle(&mut ctx);
        assert_eq!(ctx.af.continue_status, ContinueStatus::Idle);
        assert!(!try_arm(&mut ctx));
    }

    #[test]
    fn test_statistics_ignored_when_ended() {
        let mut ctx = test_context();
        record_statistic(&mut ctx, StatSource::Ae);
        record_statistic(&mut ctx, StatSource::Awb);
        assert_eq!(ctx.af.stat_flags, Default::default());
        assert!(!try_arm(&mut ctx));
    }

    #[test]
    fn test_trigger_and_finish_continuous_sweep() {
        let mut ctx = test_context();
        set_mode(&mut ctx, FocusMode::Continue);
        ctx.af.continue_status = ContinueStatus::Run;

        let notice = trigger_sweep(&mut ctx);
        assert_eq!(notice, Some(CallbackEvent::AfNotice(FocusMove::Start)));
        assert!(ctx.ae.bypass && ctx.awb.bypass);
        assert!(ctx.pending.contains(BlockKind::AfMonitor));
        assert_eq!(ctx.af.status, AfStatus::Continue);

        let block = ctx.pending.take().remove(0);
        ctx.on_committed(&block);
        assert_eq!(ctx.af.status, AfStatus::Continue);

        // a second trigger while sweeping is refused
        assert_eq!(trigger_sweep(&mut ctx), None);

        let notice = finish_sweep(&mut ctx, true, 5);
        assert_eq!(notice, Some(CallbackEvent::AfNotice(FocusMove::End)));
        assert_eq!(ctx.af.status, AfStatus::Stop);
        assert_eq!(ctx.af.continue_status, ContinueStatus::Idle);
        assert!(ctx.awb_window.is_armed());
        assert_eq!(ctx.af.position, 5);
    }

    #[test]
    fn test_finish_single_sweep_reports_result() {
        let mut ctx = test_context();
        ctx.af.status = AfStatus::Start;
        assert_eq!(
            finish_sweep(&mut ctx, false, 0),
            Some(CallbackEvent::AfDone { success: false })
        );
        assert_eq!(finish_sweep(&mut ctx, false, 0), None);
    }

    #[test]
    fn test_tick_collapses_duplicates() {
        let mut tick = ReevaluationTick::default();
        tick.schedule(0);
        tick.schedule(1);
        tick.schedule(0);
        assert_eq!(tick.next_due(), Some(0));
        tick.cancel(1);
        assert_eq!(tick.next_due(), None);
    }
}

//! Simulated ISP for tests and development without hardware.
//!
//! [`SimulatedIsp`] implements both [`RegisterDriver`] and
//! [`InterruptSource`]. Programmed blocks land in a staging bank and become
//! visible in the active bank on [`RegisterDriver::shadow`], mirroring the
//! double-buffered register file of the real part. Interrupts are injected
//! with [`SimulatedIsp::raise`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::block::{BlockKind, RegWrite, SliceGeometry, Size, TuningBlock};
use crate::driver::{HalError, HalResult, InterruptSource, RegisterDriver};
use crate::irq::IrqMask;
use crate::stats::{AeStatistics, AfStatistics, AwbStatistics};
use crate::HandleId;

#[derive(Default)]
struct PipelineState {
    clock: bool,
    running: bool,
    irq_mask: IrqMask,
    staged: BTreeMap<BlockKind, TuningBlock>,
    active: BTreeMap<BlockKind, TuningBlock>,
    stat_monitor: Option<(bool, u32)>,
    slices: Vec<SliceGeometry>,
    shadows: usize,
}

#[derive(Default)]
struct SimState {
    open: bool,
    open_count: usize,
    close_count: usize,
    closed_irq: bool,
    pipelines: HashMap<HandleId, PipelineState>,
    apply_counts: HashMap<BlockKind, usize>,
    failing: HashSet<BlockKind>,
    fail_start: bool,
    fail_stop: bool,
    pending_irqs: VecDeque<IrqMask>,
    registers: HashMap<u32, u32>,
    ae_stats: AeStatistics,
    awb_stats: AwbStatistics,
    af_stats: AfStatistics,
    stats_reads: usize,
}

/// In-memory ISP.
pub struct SimulatedIsp {
    state: Mutex<SimState>,
    irq_ready: Condvar,
    video_limit: Size,
    capture_limit: Size,
}

impl Default for SimulatedIsp {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedIsp {
    /// Create a simulator with 1080p video and 5 MP capture limits.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            irq_ready: Condvar::new(),
            video_limit: Size::new(1920, 1080),
            capture_limit: Size::new(2592, 1944),
        }
    }

    /// Inject an interrupt; wakes the monitor blocked in [`InterruptSource::wait`].
    pub fn raise(&self, mask: IrqMask) {
        let mut state = self.state.lock();
        state.pending_irqs.push_back(mask);
        self.irq_ready.notify_all();
    }

    /// Make [`InterruptSource::wait`] fail once the pending interrupts drain.
    pub fn close_interrupts(&self) {
        let mut state = self.state.lock();
        state.closed_irq = true;
        self.irq_ready.notify_all();
    }

    /// Make every subsequent write of `kind` fail.
    pub fn fail_block(&self, kind: BlockKind) {
        self.state.lock().failing.insert(kind);
    }

    /// Make [`RegisterDriver::start`] fail while `fail` is set.
    pub fn fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    /// Make [`RegisterDriver::stop`] fail, without raising `STOP`, while
    /// `fail` is set.
    pub fn fail_stop(&self, fail: bool) {
        self.state.lock().fail_stop = fail;
    }

    /// Value of `kind` in the active (shadowed) register bank.
    pub fn active_block(&self, handle: HandleId, kind: BlockKind) -> Option<TuningBlock> {
        let state = self.state.lock();
        state
            .pipelines
            .get(&handle)
            .and_then(|p| p.active.get(&kind).cloned())
    }

    /// Snapshot of the whole active register bank of one pipeline.
    pub fn active_bank(&self, handle: HandleId) -> BTreeMap<BlockKind, TuningBlock> {
        let state = self.state.lock();
        state
            .pipelines
            .get(&handle)
            .map(|p| p.active.clone())
            .unwrap_or_default()
    }

    /// How many times `kind` was programmed across all pipelines.
    pub fn apply_count(&self, kind: BlockKind) -> usize {
        self.state.lock().apply_counts.get(&kind).copied().unwrap_or(0)
    }

    /// Number of shadow latches performed on a pipeline.
    pub fn shadow_count(&self, handle: HandleId) -> usize {
        let state = self.state.lock();
        state.pipelines.get(&handle).map_or(0, |p| p.shadows)
    }

    /// Whether the device is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// `(open, close)` call counts.
    pub fn open_close_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.open_count, state.close_count)
    }

    /// Whether `start` ran on the pipeline and no `stop` followed.
    pub fn is_running(&self, handle: HandleId) -> bool {
        let state = self.state.lock();
        state.pipelines.get(&handle).is_some_and(|p| p.running)
    }

    /// Whether the pipeline clock is on.
    pub fn clock_enabled(&self, handle: HandleId) -> bool {
        let state = self.state.lock();
        state.pipelines.get(&handle).is_some_and(|p| p.clock)
    }

    /// Currently selected interrupt mask of a pipeline.
    pub fn irq_mask(&self, handle: HandleId) -> IrqMask {
        let state = self.state.lock();
        state
            .pipelines
            .get(&handle)
            .map(|p| p.irq_mask)
            .unwrap_or_default()
    }

    /// Last statistics-monitor setting `(enabled, skip)`.
    pub fn stat_monitor(&self, handle: HandleId) -> Option<(bool, u32)> {
        let state = self.state.lock();
        state.pipelines.get(&handle).and_then(|p| p.stat_monitor)
    }

    /// Every slice geometry programmed so far.
    pub fn slices(&self, handle: HandleId) -> Vec<SliceGeometry> {
        let state = self.state.lock();
        state
            .pipelines
            .get(&handle)
            .map(|p| p.slices.clone())
            .unwrap_or_default()
    }

    /// Number of statistics reads served.
    pub fn stats_reads(&self) -> usize {
        self.state.lock().stats_reads
    }

    /// AE statistics returned by subsequent reads.
    pub fn set_ae_stats(&self, stats: AeStatistics) {
        self.state.lock().ae_stats = stats;
    }

    /// AWB statistics returned by subsequent reads.
    pub fn set_awb_stats(&self, stats: AwbStatistics) {
        self.state.lock().awb_stats = stats;
    }

    /// AF statistics returned by subsequent reads.
    pub fn set_af_stats(&self, stats: AfStatistics) {
        self.state.lock().af_stats = stats;
    }

    /// Current value of a raw register (0 if never written).
    pub fn register(&self, addr: u32) -> u32 {
        self.state.lock().registers.get(&addr).copied().unwrap_or(0)
    }

    fn require_open(state: &SimState) -> HalResult<()> {
        if state.open {
            Ok(())
        } else {
            Err(HalError::DeviceUnavailable("device not open".into()))
        }
    }
}

impl RegisterDriver for SimulatedIsp {
    fn open(&self) -> HalResult<()> {
        let mut state = self.state.lock();
        state.open = true;
        state.open_count += 1;
        state.closed_irq = false;
        state.pending_irqs.clear();
        debug!("simulated ISP opened");
        Ok(())
    }

    fn close(&self) -> HalResult<()> {
        let mut state = self.state.lock();
        state.open = false;
        state.close_count += 1;
        debug!("simulated ISP closed");
        Ok(())
    }

    fn enable_clock(&self, handle: HandleId, on: bool) -> HalResult<()> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        state.pipelines.entry(handle).or_default().clock = on;
        Ok(())
    }

    fn reset(&self, handle: HandleId) -> HalResult<()> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        let pipeline = state.pipelines.entry(handle).or_default();
        pipeline.staged.clear();
        pipeline.active.clear();
        Ok(())
    }

    fn set_irq_mask(&self, handle: HandleId, mask: IrqMask) -> HalResult<()> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        state.pipelines.entry(handle).or_default().irq_mask = mask;
        Ok(())
    }

    fn apply(&self, handle: HandleId, block: &TuningBlock) -> HalResult<()> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        let kind = block.kind();
        if state.failing.contains(&kind) {
            return Err(HalError::Program {
                block: kind,
                reason: "injected failure".into(),
            });
        }
        if let TuningBlock::Registers(writes) = block {
            for &RegWrite { addr, value } in writes {
                state.registers.insert(addr, value);
            }
        }
        *state.apply_counts.entry(kind).or_insert(0) += 1;
        state
            .pipelines
            .entry(handle)
            .or_default()
            .staged
            .insert(kind, block.clone());
        Ok(())
    }

    fn shadow(&self, handle: HandleId) -> HalResult<()> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        let pipeline = state.pipelines.entry(handle).or_default();
        let staged = std::mem::take(&mut pipeline.staged);
        pipeline.active.extend(staged);
        pipeline.shadows += 1;
        Ok(())
    }

    fn set_stat_monitor(&self, handle: HandleId, enable: bool, skip: u32) -> HalResult<()> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        state.pipelines.entry(handle).or_default().stat_monitor = Some((enable, skip));
        Ok(())
    }

    fn configure_slice(&self, handle: HandleId, slice: &SliceGeometry) -> HalResult<()> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        state.pipelines.entry(handle).or_default().slices.push(*slice);
        Ok(())
    }

    fn start(&self, handle: HandleId) -> HalResult<()> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        if state.fail_start {
            return Err(HalError::Driver("injected start failure".into()));
        }
        state.pipelines.entry(handle).or_default().running = true;
        Ok(())
    }

    fn stop(&self, handle: HandleId) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.fail_stop {
            return Err(HalError::Driver("injected stop failure".into()));
        }
        if let Some(pipeline) = state.pipelines.get_mut(&handle) {
            pipeline.running = false;
        }
        state.pending_irqs.push_back(IrqMask::STOP);
        self.irq_ready.notify_all();
        Ok(())
    }

    fn read_ae_stats(&self, _handle: HandleId) -> HalResult<AeStatistics> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        state.stats_reads += 1;
        Ok(state.ae_stats.clone())
    }

    fn read_awb_stats(&self, _handle: HandleId) -> HalResult<AwbStatistics> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        state.stats_reads += 1;
        Ok(state.awb_stats)
    }

    fn read_af_stats(&self, _handle: HandleId) -> HalResult<AfStatistics> {
        let mut state = self.state.lock();
        Self::require_open(&state)?;
        state.stats_reads += 1;
        Ok(state.af_stats.clone())
    }

    fn read_register(&self, addr: u32) -> HalResult<u32> {
        let state = self.state.lock();
        Self::require_open(&state)?;
        Ok(state.registers.get(&addr).copied().unwrap_or(0))
    }

    fn video_size_limit(&self) -> Option<Size> {
        Some(self.video_limit)
    }

    fn capture_size_limit(&self) -> Option<Size> {
        Some(self.capture_limit)
    }
}

impl InterruptSource for SimulatedIsp {
    fn wait(&self) -> HalResult<IrqMask> {
        let mut state = self.state.lock();
        loop {
            if let Some(mask) = state.pending_irqs.pop_front() {
                return Ok(mask);
            }
            if state.closed_irq {
                return Err(HalError::InterruptClosed);
            }
            self.irq_ready.wait(&mut state);
        }
    }

    fn wake(&self) -> HalResult<()> {
        let mut state = self.state.lock();
        state.pending_irqs.push_back(IrqMask::empty());
        self.irq_ready.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Rect;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_blocks_visible_after_shadow() {
        let isp = SimulatedIsp::new();
        isp.open().unwrap();
        isp.apply(0, &TuningBlock::Brightness(4)).unwrap();
        assert_eq!(isp.active_block(0, BlockKind::Brightness), None);

        isp.shadow(0).unwrap();
        assert_eq!(
            isp.active_block(0, BlockKind::Brightness),
            Some(TuningBlock::Brightness(4))
        );
        assert_eq!(isp.apply_count(BlockKind::Brightness), 1);
        assert_eq!(isp.shadow_count(0), 1);
    }

    #[test]
    fn test_requires_open_device() {
        let isp = SimulatedIsp::new();
        let err = isp.apply(0, &TuningBlock::Contrast(1)).unwrap_err();
        assert!(matches!(err, HalError::DeviceUnavailable(_)));
    }

    #[test]
    fn test_injected_failure() {
        let isp = SimulatedIsp::new();
        isp.open().unwrap();
        isp.fail_block(BlockKind::Gamma);
        let err = isp
            .apply(0, &TuningBlock::Gamma(Default::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            HalError::Program {
                block: BlockKind::Gamma,
                ..
            }
        ));
        isp.apply(0, &TuningBlock::WbTrim(Rect::new(0, 0, 8, 8)))
            .unwrap();
    }

    #[test]
    fn test_register_writes() {
        let isp = SimulatedIsp::new();
        isp.open().unwrap();
        isp.apply(
            0,
            &TuningBlock::Registers(vec![RegWrite {
                addr: 0x2000,
                value: 7,
            }]),
        )
        .unwrap();
        assert_eq!(isp.read_register(0x2000).unwrap(), 7);
    }

    #[test]
    fn test_wait_wakes_on_raise_and_stop() {
        let isp = Arc::new(SimulatedIsp::new());
        isp.open().unwrap();

        let waiter = {
            let isp = Arc::clone(&isp);
            thread::spawn(move || {
                let first = isp.wait().unwrap();
                let second = isp.wait().unwrap();
                (first, second)
            })
        };

        isp.raise(IrqMask::SOF | IrqMask::AWB);
        isp.stop(0).unwrap();

        let (first, second) = waiter.join().unwrap();
        assert_eq!(first, IrqMask::SOF | IrqMask::AWB);
        assert_eq!(second, IrqMask::STOP);
    }

    #[test]
    fn test_closed_interrupts_fail_wait() {
        let isp = SimulatedIsp::new();
        isp.close_interrupts();
        assert_eq!(isp.wait().unwrap_err(), HalError::InterruptClosed);
    }

    #[test]
    fn test_wake_returns_empty_mask() {
        let isp = Arc::new(SimulatedIsp::new());
        let waiter = {
            let isp = Arc::clone(&isp);
            thread::spawn(move || isp.wait())
        };
        isp.wake().unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), IrqMask::empty());
    }

    #[test]
    fn test_injected_start_and_stop_failures() {
        let isp = SimulatedIsp::new();
        isp.open().unwrap();
        isp.fail_start(true);
        isp.fail_stop(true);
        assert!(matches!(isp.start(0), Err(HalError::Driver(_))));
        assert!(!isp.is_running(0));
        assert!(matches!(isp.stop(0), Err(HalError::Driver(_))));

        isp.fail_start(false);
        isp.fail_stop(false);
        isp.start(0).unwrap();
        isp.stop(0).unwrap();
        assert_eq!(isp.wait().unwrap(), IrqMask::STOP);
    }
}

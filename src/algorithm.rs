//! 3A algorithm seam.
//!
//! The numeric content of AE, AWB and AF lives outside this crate. The proc
//! worker calls an [`AlgorithmSuite`] with the latest statistics and the
//! handle's settings, and records what comes back as pending configuration.
//! [`BasicAlgorithms`] is a small deterministic implementation for bring-up
//! and tests.

use std::collections::HashMap;

use isp_hal::{AeStatistics, AfStatistics, AwbGain, AwbStatistics, Exposure, HandleId};

use crate::context::{AeState, FrameRateMode};
use crate::error::IspResult;

/// Result of one AE step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AeOutput {
    /// Exposure to program at the next frame
    pub exposure: Exposure,
    /// Measured mean luma
    pub lum: u32,
    /// ISO equivalent of the chosen gain
    pub iso: u32,
    /// Luma is within the tight tolerance of the target
    pub stable: bool,
    /// Luma is within the loose tolerance of the target
    pub fast_stable: bool,
    /// Scene is too dark for the target
    pub low_lux: bool,
}

/// Result of one AWB step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AwbOutput {
    /// Channel gains to program
    pub gain: AwbGain,
    /// Gains converged
    pub stable: bool,
    /// Detected illuminant; selects lens-shading and color-correction tables
    pub illuminant: u32,
}

/// Progress of a focus sweep after one AF step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfProgress {
    /// Keep feeding statistics
    Running {
        /// Lens position for the next frame
        position: u32,
    },
    /// Sweep done
    Finished {
        /// Whether a sharp position was found
        success: bool,
        /// Final lens position
        position: u32,
    },
}

/// External AE/AWB/AF implementation.
pub trait AlgorithmSuite: Send {
    /// Prepare per-handle state when video starts.
    fn init(&mut self, handle: HandleId) -> IspResult<()>;

    /// Release per-handle state when video stops.
    fn deinit(&mut self, handle: HandleId);

    /// One exposure step from the latest luminance statistics.
    fn ae(&mut self, handle: HandleId, settings: &AeState, stats: &AeStatistics)
        -> IspResult<AeOutput>;

    /// One white-balance step from the latest channel sums.
    fn awb(&mut self, handle: HandleId, stats: &AwbStatistics) -> IspResult<AwbOutput>;

    /// One focus-sweep step from the latest sharpness values.
    fn af(&mut self, handle: HandleId, stats: &AfStatistics) -> IspResult<AfProgress>;

    /// A sweep ended; `forced` when it was stopped by AF_STOP.
    fn af_end(&mut self, _handle: HandleId, _forced: bool) {}

    /// Decide whether the scene changed enough for a continuous-AF sweep.
    fn continue_af(&mut self, handle: HandleId) -> bool;

    /// Move the lens to an absolute position (tuning tools).
    fn set_focus_position(&mut self, handle: HandleId, position: u32) -> IspResult<()>;
}

#[derive(Debug, Default)]
struct SweepState {
    step: u32,
    best: (u32, u32),
}

/// Deterministic reference algorithms.
///
/// AE scales exposure lines toward a target luma; AWB applies gray-world
/// gains; AF steps the lens through a fixed range and keeps the sharpest
/// position; continuous AF triggers when the exposure moved by more than
/// `refocus_threshold` lines since the previous decision.
#[derive(Debug)]
pub struct BasicAlgorithms {
    /// Target mean luma
    pub target_lum: u32,
    /// Number of lens positions visited per sweep
    pub af_steps: u32,
    /// Exposure delta (lines) that triggers a continuous-AF sweep
    pub refocus_threshold: u32,
    sweeps: HashMap<HandleId, SweepState>,
    last_exposure: HashMap<HandleId, u32>,
    decided_exposure: HashMap<HandleId, u32>,
}

impl Default for BasicAlgorithms {
    fn default() -> Self {
        Self {
            target_lum: 128,
            af_steps: 8,
            refocus_threshold: 64,
            sweeps: HashMap::new(),
            last_exposure: HashMap::new(),
            decided_exposure: HashMap::new(),
        }
    }
}

/// `value * num / den` in 64-bit, clamped to `u32`. ISO and gain come
/// straight from client IOCTLs.
fn scale(value: u32, num: u32, den: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(num) / u64::from(den);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

impl AlgorithmSuite for BasicAlgorithms {
    fn init(&mut self, handle: HandleId) -> IspResult<()> {
        self.sweeps.remove(&handle);
        self.last_exposure.insert(handle, 0);
        self.decided_exposure.insert(handle, 0);
        Ok(())
    }

    fn deinit(&mut self, handle: HandleId) {
        self.sweeps.remove(&handle);
        self.last_exposure.remove(&handle);
        self.decided_exposure.remove(&handle);
    }

    fn ae(
        &mut self,
        handle: HandleId,
        settings: &AeState,
        stats: &AeStatistics,
    ) -> IspResult<AeOutput> {
        let lum = stats.mean();
        let current = settings.exposure.line.max(1);
        let line = if lum == 0 {
            current.saturating_mul(2)
        } else {
            let scaled = u64::from(current) * u64::from(self.target_lum) / u64::from(lum);
            u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
        };
        let gain = if settings.frame_rate == FrameRateMode::Fixed && settings.iso > 0 {
            scale(settings.iso, 128, 100)
        } else {
            settings.exposure.gain.max(128)
        };
        let error = lum.abs_diff(self.target_lum);
        self.last_exposure.insert(handle, line);
        Ok(AeOutput {
            exposure: Exposure { line, gain },
            lum,
            iso: scale(gain, 100, 128),
            stable: error <= 8,
            fast_stable: error <= 24,
            low_lux: lum < self.target_lum / 4,
        })
    }

    fn awb(&mut self, _handle: HandleId, stats: &AwbStatistics) -> IspResult<AwbOutput> {
        let ratio = |channel: u32| -> u16 {
            if channel == 0 {
                1024
            } else {
                let gain = u64::from(stats.g) * 1024 / u64::from(channel);
                u16::try_from(gain.min(4095)).unwrap_or(4095)
            }
        };
        let gain = AwbGain {
            r: ratio(stats.r),
            g: 1024,
            b: ratio(stats.b),
        };
        let illuminant = match (gain.r, gain.b) {
            (r, b) if b > r + 256 => 1,
            (r, b) if r > b + 256 => 2,
            _ => 0,
        };
        Ok(AwbOutput {
            gain,
            stable: gain.r.abs_diff(gain.b) < 64,
            illuminant,
        })
    }

    fn af(&mut self, handle: HandleId, stats: &AfStatistics) -> IspResult<AfProgress> {
        let sharpness = stats.focus_values.iter().copied().max().unwrap_or(0);
        let sweep = self.sweeps.entry(handle).or_default();
        if sharpness >= sweep.best.1 {
            sweep.best = (sweep.step, sharpness);
        }
        sweep.step += 1;
        if sweep.step >= self.af_steps {
            let (position, best) = sweep.best;
            self.sweeps.remove(&handle);
            return Ok(AfProgress::Finished {
                success: best > 0,
                position,
            });
        }
        Ok(AfProgress::Running {
            position: sweep.step,
        })
    }

    fn af_end(&mut self, handle: HandleId, _forced: bool) {
        self.sweeps.remove(&handle);
    }

    fn continue_af(&mut self, handle: HandleId) -> bool {
        let current = self.last_exposure.get(&handle).copied().unwrap_or(0);
        let decided = self.decided_exposure.entry(handle).or_insert(0);
        let moved = current.abs_diff(*decided) > self.refocus_threshold;
        if moved {
            *decided = current;
        }
        moved
    }

    fn set_focus_position(&mut self, handle: HandleId, _position: u32) -> IspResult<()> {
        self.sweeps.remove(&handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ae_moves_toward_target() {
        let mut alg = BasicAlgorithms::default();
        let settings = AeState {
            exposure: Exposure {
                line: 100,
                gain: 128,
            },
            ..Default::default()
        };
        let dark = AeStatistics {
            zones: vec![64; 4],
        };
        let out = alg.ae(0, &settings, &dark).unwrap();
        assert_eq!(out.exposure.line, 200);
        assert!(!out.stable);

        let on_target = AeStatistics {
            zones: vec![128; 4],
        };
        assert!(alg.ae(0, &settings, &on_target).unwrap().stable);
    }

    #[test]
    fn test_ae_clamps_extreme_iso_and_gain() {
        let mut alg = BasicAlgorithms::default();
        let stats = AeStatistics { zones: vec![128] };
        let sport = AeState {
            frame_rate: FrameRateMode::Fixed,
            iso: u32::MAX,
            ..Default::default()
        };
        let out = alg.ae(0, &sport, &stats).unwrap();
        assert_eq!(out.exposure.gain, u32::MAX);
        assert_eq!(out.iso, scale(u32::MAX, 100, 128));

        let manual = AeState {
            exposure: Exposure {
                line: u32::MAX,
                gain: u32::MAX,
            },
            ..Default::default()
        };
        let out = alg.ae(0, &manual, &AeStatistics::default()).unwrap();
        assert_eq!(out.exposure.line, u32::MAX);
        assert_eq!(out.exposure.gain, u32::MAX);
    }

    #[test]
    fn test_awb_gray_world() {
        let mut alg = BasicAlgorithms::default();
        let out = alg
            .awb(0, &AwbStatistics { r: 512, g: 1024, b: 1024 })
            .unwrap();
        assert_eq!(out.gain.r, 2048);
        assert_eq!(out.gain.b, 1024);
        assert_eq!(out.illuminant, 2);
    }

    #[test]
    fn test_af_sweep_finishes_at_sharpest() {
        let mut alg = BasicAlgorithms {
            af_steps: 3,
            ..Default::default()
        };
        let values = [10, 50, 20];
        let mut last = None;
        for v in values {
            last = Some(
                alg.af(0, &AfStatistics {
                    focus_values: vec![v],
                })
                .unwrap(),
            );
        }
        assert_eq!(
            last,
            Some(AfProgress::Finished {
                success: true,
                position: 1
            })
        );
    }

    #[test]
    fn test_continue_af_triggers_on_exposure_jump() {
        let mut alg = BasicAlgorithms::default();
        alg.init(0).unwrap();
        assert!(!alg.continue_af(0));
        alg.last_exposure.insert(0, 500);
        assert!(alg.continue_af(0));
        assert!(!alg.continue_af(0));
    }
}

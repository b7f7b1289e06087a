//! Backpressure for AE/AWB statistics interrupts.
//!
//! Statistics arrive every frame, but the algorithms do not need every
//! frame. Each event kind gets a [`SkipCounter`] driven by its configured
//! [`SkipGate`]; the monitor worker only forwards an event when the counter
//! lets it through.

use crate::config::{FrameSkipConfig, SkipGate};

/// Counter state for one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipCounter {
    gate: SkipGate,
    remaining: u32,
}

impl SkipCounter {
    /// Counter for `gate`, in its video-start state.
    pub fn new(gate: SkipGate) -> Self {
        let mut counter = Self { gate, remaining: 0 };
        counter.reset();
        counter
    }

    /// Restart counting, as at video start.
    pub fn reset(&mut self) {
        self.remaining = match self.gate {
            SkipGate::Settle { skip } => skip,
            _ => 0,
        };
    }

    /// Account for one event; returns whether it is forwarded.
    pub fn admit(&mut self) -> bool {
        match self.gate {
            SkipGate::Forward => true,
            SkipGate::Drop => false,
            SkipGate::Every { skip } => {
                if self.remaining == 0 {
                    self.remaining = skip;
                    true
                } else {
                    self.remaining -= 1;
                    false
                }
            }
            SkipGate::Settle { .. } => {
                if self.remaining == 0 {
                    true
                } else {
                    self.remaining -= 1;
                    false
                }
            }
        }
    }
}

/// AE and AWB counters of one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSkip {
    /// AWB statistics gate
    pub awb: SkipCounter,
    /// AE statistics gate
    pub ae: SkipCounter,
}

impl FrameSkip {
    /// Counters for the configured gates.
    pub fn new(config: &FrameSkipConfig) -> Self {
        Self {
            awb: SkipCounter::new(config.awb),
            ae: SkipCounter::new(config.ae),
        }
    }

    /// Re-arm both counters, as at video start.
    pub fn reset(&mut self) {
        self.awb.reset();
        self.ae.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(counter: &mut SkipCounter, n: usize) -> Vec<bool> {
        (0..n).map(|_| counter.admit()).collect()
    }

    #[test]
    fn test_every_forwards_one_in_skip_plus_one() {
        let mut counter = SkipCounter::new(SkipGate::Every { skip: 2 });
        assert_eq!(
            pattern(&mut counter, 7),
            vec![true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn test_settle_drops_leading_events_only() {
        let mut counter = SkipCounter::new(SkipGate::Settle { skip: 2 });
        assert_eq!(pattern(&mut counter, 5), vec![false, false, true, true, true]);
        counter.reset();
        assert!(!counter.admit());
    }

    #[test]
    fn test_variant_presets() {
        let mut sc8825 = FrameSkip::new(&FrameSkipConfig::sc8825(1));
        assert!(!sc8825.ae.admit());
        assert_eq!(pattern(&mut sc8825.awb, 4), vec![true, false, true, false]);

        let mut sc8830 = FrameSkip::new(&FrameSkipConfig::sc8830(0));
        assert!(sc8830.ae.admit());
        assert!(sc8830.awb.admit());
    }
}

//! Statistics snapshots read back from the ISP monitors.

/// Luminance statistics: mean luma per metering zone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AeStatistics {
    /// Mean luma of each zone, row-major
    pub zones: Vec<u32>,
}

impl AeStatistics {
    /// Average luma across all zones, 0 when no zones were reported.
    pub fn mean(&self) -> u32 {
        if self.zones.is_empty() {
            return 0;
        }
        let sum: u64 = self.zones.iter().map(|&z| u64::from(z)).sum();
        u32::try_from(sum / self.zones.len() as u64).unwrap_or(u32::MAX)
    }
}

/// White-balance channel accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AwbStatistics {
    /// Red channel sum
    pub r: u32,
    /// Green channel sum
    pub g: u32,
    /// Blue channel sum
    pub b: u32,
}

/// Focus sharpness per AF window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AfStatistics {
    /// Focus value of each configured window
    pub focus_values: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ae_mean() {
        assert_eq!(AeStatistics::default().mean(), 0);
        let stats = AeStatistics {
            zones: vec![10, 20, 30, 40],
        };
        assert_eq!(stats.mean(), 25);
    }
}

//! Interrupt status bits reported by the ISP.

use bitflags::bitflags;

bitflags! {
    /// Bitmask returned by [`crate::InterruptSource::wait`].
    ///
    /// A single wait may report several events at once; the monitor worker
    /// fans them out in a fixed order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IrqMask: u32 {
        /// Hardware stopped; no further interrupts follow
        const STOP = 1 << 0;
        /// Start of frame
        const SOF = 1 << 1;
        /// End of frame
        const EOF = 1 << 2;
        /// AE statistics ready
        const AE = 1 << 3;
        /// AWB statistics ready
        const AWB = 1 << 4;
        /// AF statistics ready
        const AF = 1 << 5;
        /// Slice transfer complete
        const TX = 1 << 6;
        /// Input fetch error
        const FETCH_ERR = 1 << 16;
        /// Camera interface error
        const DCAM_ERR = 1 << 17;
        /// Output store error
        const STORE_ERR = 1 << 18;

        /// Error bits that are only logged
        const ERRORS = Self::FETCH_ERR.bits() | Self::DCAM_ERR.bits() | Self::STORE_ERR.bits();
    }
}

impl IrqMask {
    /// Interrupts needed for continuous (video) mode.
    pub const VIDEO: Self = Self::SOF
        .union(Self::EOF)
        .union(Self::AE)
        .union(Self::AWB)
        .union(Self::AF);

    /// Interrupts needed for single-frame slice processing.
    pub const PROC: Self = Self::TX;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_bits() {
        let mask = IrqMask::SOF | IrqMask::DCAM_ERR;
        assert!(mask.intersects(IrqMask::ERRORS));
        assert!(!IrqMask::VIDEO.intersects(IrqMask::ERRORS));
        assert!(!IrqMask::VIDEO.contains(IrqMask::TX));
    }
}

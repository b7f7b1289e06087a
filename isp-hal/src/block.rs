//! Geometry and tuning-block value types.
//!
//! A [`TuningBlock`] is the unit of hardware programming: one value per ISP
//! sub-module. [`BlockKind`] orders blocks the way they are committed at the
//! start of a frame, so an ordered map keyed by kind yields the commit order
//! directly.

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Size {
    /// Width in pixels
    pub w: u32,
    /// Height in pixels
    pub h: u32,
}

impl Size {
    /// Create a new size.
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// The ISP works on 2x2 Bayer quads; both dimensions must be even.
    pub const fn is_even(&self) -> bool {
        self.w % 2 == 0 && self.h % 2 == 0
    }

    /// Whether either dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// Axis-aligned rectangle in sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub w: u32,
    /// Height
    pub h: u32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Whether the rectangle lies completely inside an image of `size`.
    pub fn fits_in(&self, size: Size) -> bool {
        self.x.saturating_add(self.w) <= size.w && self.y.saturating_add(self.h) <= size.h
    }
}

/// Sensor exposure: integration time in lines plus analog gain (x128).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exposure {
    /// Integration time in sensor lines
    pub line: u32,
    /// Analog gain, 128 = 1x
    pub gain: u32,
}

/// Per-channel white-balance gain, 1024 = 1x.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwbGain {
    /// Red channel gain
    pub r: u16,
    /// Green channel gain
    pub g: u16,
    /// Blue channel gain
    pub b: u16,
}

impl Default for AwbGain {
    fn default() -> Self {
        Self {
            r: 1024,
            g: 1024,
            b: 1024,
        }
    }
}

/// 3x3 color matrix in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMatrix(pub [u16; 9]);

impl ColorMatrix {
    /// Identity matrix (1024 = 1.0).
    pub const IDENTITY: Self = Self([1024, 0, 0, 0, 1024, 0, 0, 0, 1024]);
}

impl Default for ColorMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Gamma curve as monotonically increasing `(input, output)` knee points.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GammaCurve {
    /// Curve knee points
    pub points: Vec<(u16, u16)>,
}

/// Spatial noise-reduction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DenoiseParams {
    /// Filter strength, 0 disables
    pub strength: u8,
    /// Strength preferred by the sensor tuning
    pub pref_strength: u8,
    /// How much edge detail survives filtering
    pub edge_preserve: u8,
}

/// Lens-shading correction table selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LensShading {
    /// Index of the table in the sensor tuning data
    pub table: u32,
    /// Grid pitch in pixels
    pub grid: u32,
}

/// Raw register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    /// Register offset
    pub addr: u32,
    /// Value to store
    pub value: u32,
}

/// Geometry of one processing slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceGeometry {
    /// Full source frame
    pub src: Size,
    /// Region covered by this slice
    pub region: Rect,
    /// Zero-based slice index
    pub index: u32,
    /// Total number of slices in the frame
    pub count: u32,
}

/// Hardware sub-module addressed by a [`TuningBlock`].
///
/// Declaration order is the commit order at SOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockKind {
    /// Autofocus statistics windows
    AfMonitor,
    /// Sensor exposure and gain
    Exposure,
    /// White-balance channel gains
    AwbGain,
    /// White-balance fine trim
    WbTrim,
    /// Color effect
    SpecialEffect,
    /// Brightness offset
    Brightness,
    /// Contrast curve
    Contrast,
    /// Histogram statistics window
    Histogram,
    /// Automatic contrast stretch
    AutoContrast,
    /// Color saturation
    Saturation,
    /// Hue rotation
    Hue,
    /// Chroma suppression
    Css,
    /// Dynamic range compression
    Hdr,
    /// Global digital gain
    GlobalGain,
    /// Per-channel digital gain
    ChannelGain,
    /// Noise reduction
    Denoise,
    /// Edge enhancement
    Edge,
    /// Color correction matrix
    ColorCorrection,
    /// Lens-shading correction
    LensShading,
    /// Gamma curve
    Gamma,
    /// Raw register writes
    Registers,
}

/// One pending hardware configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuningBlock {
    /// Autofocus statistics windows; starts a focus sweep
    AfMonitor(Vec<Rect>),
    /// Sensor exposure and gain
    Exposure(Exposure),
    /// White-balance channel gains
    AwbGain(AwbGain),
    /// White-balance statistics window
    WbTrim(Rect),
    /// Color effect matrix plus emboss enable
    SpecialEffect {
        /// Effect color matrix (RGB to YUV)
        matrix: ColorMatrix,
        /// Y, U and V offsets applied after the matrix
        shift: [u16; 3],
        /// Emboss filter enabled
        emboss: bool,
    },
    /// Brightness offset level
    Brightness(u8),
    /// Contrast level
    Contrast(u8),
    /// Histogram statistics enable
    Histogram(bool),
    /// Automatic contrast stretch enable
    AutoContrast(bool),
    /// Saturation level
    Saturation(u8),
    /// Hue rotation level
    Hue(u8),
    /// Color saturation suppression enable
    Css(bool),
    /// High-dynamic-range level
    Hdr(u8),
    /// Global digital gain
    GlobalGain(u32),
    /// Per-channel digital gain
    ChannelGain(AwbGain),
    /// Noise reduction
    Denoise(DenoiseParams),
    /// Edge enhancement (sharpness) level
    Edge(u8),
    /// Color-correction matrix
    ColorCorrection(ColorMatrix),
    /// Lens-shading correction table
    LensShading(LensShading),
    /// Gamma curve
    Gamma(GammaCurve),
    /// Raw register writes from tuning tools
    Registers(Vec<RegWrite>),
}

impl TuningBlock {
    /// The sub-module this block programs.
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::AfMonitor(_) => BlockKind::AfMonitor,
            Self::Exposure(_) => BlockKind::Exposure,
            Self::AwbGain(_) => BlockKind::AwbGain,
            Self::WbTrim(_) => BlockKind::WbTrim,
            Self::SpecialEffect { .. } => BlockKind::SpecialEffect,
            Self::Brightness(_) => BlockKind::Brightness,
            Self::Contrast(_) => BlockKind::Contrast,
            Self::Histogram(_) => BlockKind::Histogram,
            Self::AutoContrast(_) => BlockKind::AutoContrast,
            Self::Saturation(_) => BlockKind::Saturation,
            Self::Hue(_) => BlockKind::Hue,
            Self::Css(_) => BlockKind::Css,
            Self::Hdr(_) => BlockKind::Hdr,
            Self::GlobalGain(_) => BlockKind::GlobalGain,
            Self::ChannelGain(_) => BlockKind::ChannelGain,
            Self::Denoise(_) => BlockKind::Denoise,
            Self::Edge(_) => BlockKind::Edge,
            Self::ColorCorrection(_) => BlockKind::ColorCorrection,
            Self::LensShading(_) => BlockKind::LensShading,
            Self::Gamma(_) => BlockKind::Gamma,
            Self::Registers(_) => BlockKind::Registers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_parity() {
        assert!(Size::new(1280, 720).is_even());
        assert!(!Size::new(1281, 720).is_even());
        assert!(!Size::new(1280, 721).is_even());
        assert!(Size::new(0, 720).is_empty());
    }

    #[test]
    fn test_rect_fits() {
        let frame = Size::new(640, 480);
        assert!(Rect::new(0, 0, 640, 480).fits_in(frame));
        assert!(!Rect::new(10, 0, 640, 480).fits_in(frame));
        assert!(!Rect::new(u32::MAX, 0, 2, 2).fits_in(frame));
    }

    #[test]
    fn test_commit_order_follows_declaration() {
        assert!(BlockKind::AfMonitor < BlockKind::Exposure);
        assert!(BlockKind::Exposure < BlockKind::AwbGain);
        assert!(BlockKind::LensShading < BlockKind::Gamma);
        assert_eq!(TuningBlock::Brightness(3).kind(), BlockKind::Brightness);
    }
}

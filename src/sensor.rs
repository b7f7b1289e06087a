//! Read-only sensor tuning data.
//!
//! The runtime never parses tuning files. The camera layer hands it an
//! implementation of [`SensorTuning`] at `init` and the runtime only looks
//! values up from it. [`StaticTuning`] is an in-memory table that is good
//! enough for bring-up and tests.

use std::fmt;

use isp_hal::{AwbGain, ColorMatrix, DenoiseParams, GammaCurve, LensShading, Rect};

/// Color effect selectable through the SPECIAL_EFFECT command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialEffect {
    /// No effect
    Normal,
    /// Monochrome
    Gray,
    /// Warm tint
    Warm,
    /// Green tint
    Green,
    /// Cool tint
    Cool,
    /// Orange tint
    Orange,
    /// Inverted colors
    Negative,
    /// Sepia
    Old,
    /// Relief effect
    Emboss,
}

impl SpecialEffect {
    /// Decode the wire value used by the camera layer.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Normal,
            1 => Self::Gray,
            2 => Self::Warm,
            3 => Self::Green,
            4 => Self::Cool,
            5 => Self::Orange,
            6 => Self::Negative,
            7 => Self::Old,
            8 => Self::Emboss,
            _ => return None,
        })
    }
}

/// RGB to YUV effect matrix plus Y/U/V offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectMatrix {
    /// RGB to YUV coefficients
    pub matrix: ColorMatrix,
    /// Y, U and V offsets
    pub shift: [u16; 3],
}

const fn effect(m: [u16; 9], shift: [u16; 3]) -> EffectMatrix {
    EffectMatrix {
        matrix: ColorMatrix(m),
        shift,
    }
}

const COLOR: [u16; 9] = [
    0x004d, 0x0096, 0x001d, 0xffd5, 0xffab, 0x0080, 0x0080, 0xff95, 0xffeb,
];
const MONO: [u16; 9] = [0x004d, 0x0096, 0x001d, 0, 0, 0, 0, 0, 0];

/// Built-in effect matrices, used when the tuning data carries none.
pub fn builtin_effect(effect_kind: SpecialEffect) -> EffectMatrix {
    match effect_kind {
        SpecialEffect::Normal | SpecialEffect::Emboss => effect(COLOR, [0xff00, 0, 0]),
        SpecialEffect::Gray => effect(MONO, [0xff00, 0, 0]),
        SpecialEffect::Warm => effect(COLOR, [0xff00, 0xffd4, 0x0080]),
        SpecialEffect::Green => effect(COLOR, [0xff00, 0xffd5, 0xffca]),
        SpecialEffect::Cool => effect(COLOR, [0xff00, 0x0040, 0x000a]),
        SpecialEffect::Orange => effect(COLOR, [0xff00, 0xff00, 0x0028]),
        SpecialEffect::Negative => effect(
            [
                0xffb3, 0xff6a, 0xffe3, 0x002b, 0x0055, 0xff80, 0xff80, 0x006b, 0x0015,
            ],
            [0x00ff, 0, 0],
        ),
        SpecialEffect::Old => effect(MONO, [0xff00, 0xffe2, 0x0028]),
    }
}

/// Power-on values for the tunable blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningDefaults {
    /// Brightness level
    pub brightness: u8,
    /// Contrast level
    pub contrast: u8,
    /// Saturation level
    pub saturation: u8,
    /// Hue level
    pub hue: u8,
    /// Edge enhancement level
    pub edge: u8,
    /// Index into the gamma table
    pub gamma_index: u32,
    /// Index into the denoise table
    pub denoise_level: u32,
    /// Global digital gain, 1024 = 1x
    pub global_gain: u32,
    /// Initial white-balance gains
    pub awb_gain: AwbGain,
    /// White-balance statistics window
    pub wb_window: Rect,
    /// Frames skipped after an exposure change
    pub ae_skip_frames: u32,
    /// Number of exposure-compensation steps
    pub ev_levels: u32,
}

impl Default for TuningDefaults {
    fn default() -> Self {
        Self {
            brightness: 3,
            contrast: 3,
            saturation: 3,
            hue: 3,
            edge: 3,
            gamma_index: 0,
            denoise_level: 0,
            global_gain: 1024,
            awb_gain: AwbGain::default(),
            wb_window: Rect::new(0, 0, 32, 32),
            ae_skip_frames: 1,
            ev_levels: 7,
        }
    }
}

/// Opaque provider of per-sensor tuning tables.
pub trait SensorTuning: Send + Sync {
    /// Must match the `isp_id` passed to `init`.
    fn version_id(&self) -> u32;

    /// Power-on values.
    fn defaults(&self) -> TuningDefaults;

    /// Gamma curve `index`, `None` if out of range.
    fn gamma(&self, index: u32) -> Option<GammaCurve>;

    /// Denoise parameters for `level`, `None` if out of range.
    fn denoise(&self, level: u32) -> Option<DenoiseParams>;

    /// Fixed white-balance gains for a manual AWB preset.
    fn awb_preset(&self, index: u32) -> Option<AwbGain>;

    /// Lens-shading table for an illuminant.
    fn lens_shading(&self, illuminant: u32) -> Option<LensShading>;

    /// Color-correction matrix for an illuminant.
    fn color_correction(&self, illuminant: u32) -> Option<ColorMatrix>;

    /// Effect matrix; tuning data may override the built-in table.
    fn effect_matrix(&self, effect_kind: SpecialEffect) -> EffectMatrix {
        builtin_effect(effect_kind)
    }
}

impl fmt::Debug for dyn SensorTuning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorTuning")
            .field("version_id", &self.version_id())
            .finish()
    }
}

/// In-memory tuning tables.
#[derive(Debug, Clone)]
pub struct StaticTuning {
    /// Sensor tuning version
    pub version_id: u32,
    /// Power-on block values
    pub defaults: TuningDefaults,
    /// Gamma curves by index
    pub gammas: Vec<GammaCurve>,
    /// Denoise settings by level
    pub denoise: Vec<DenoiseParams>,
    /// Manual white-balance presets
    pub awb_presets: Vec<AwbGain>,
    /// Lens-shading tables by illuminant
    pub lens_shading: Vec<LensShading>,
    /// Color-correction matrices by illuminant
    pub color_correction: Vec<ColorMatrix>,
}

impl StaticTuning {
    /// Tables with a handful of plausible entries for `version_id`.
    pub fn new(version_id: u32) -> Self {
        let gammas = (0..4u16)
            .map(|i| GammaCurve {
                points: vec![(0, 0), (256, 300 + i * 40), (1023, 1023)],
            })
            .collect();
        let denoise = (0..6u8)
            .map(|i| DenoiseParams {
                strength: i * 8,
                pref_strength: i * 4,
                edge_preserve: 16 - i,
            })
            .collect();
        let awb_presets = vec![
            AwbGain {
                r: 1024,
                g: 1024,
                b: 1024,
            },
            AwbGain {
                r: 1400,
                g: 1024,
                b: 800,
            },
            AwbGain {
                r: 900,
                g: 1024,
                b: 1500,
            },
        ];
        let lens_shading = (0..3)
            .map(|table| LensShading { table, grid: 32 })
            .collect();
        let color_correction = vec![ColorMatrix::IDENTITY; 3];
        Self {
            version_id,
            defaults: TuningDefaults::default(),
            gammas,
            denoise,
            awb_presets,
            lens_shading,
            color_correction,
        }
    }
}

fn lookup<T: Clone>(table: &[T], index: u32) -> Option<T> {
    usize::try_from(index).ok().and_then(|i| table.get(i)).cloned()
}

impl SensorTuning for StaticTuning {
    fn version_id(&self) -> u32 {
        self.version_id
    }

    fn defaults(&self) -> TuningDefaults {
        self.defaults.clone()
    }

    fn gamma(&self, index: u32) -> Option<GammaCurve> {
        lookup(&self.gammas, index)
    }

    fn denoise(&self, level: u32) -> Option<DenoiseParams> {
        lookup(&self.denoise, level)
    }

    fn awb_preset(&self, index: u32) -> Option<AwbGain> {
        lookup(&self.awb_presets, index)
    }

    fn lens_shading(&self, illuminant: u32) -> Option<LensShading> {
        lookup(&self.lens_shading, illuminant)
    }

    fn color_correction(&self, illuminant: u32) -> Option<ColorMatrix> {
        lookup(&self.color_correction, illuminant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_decoding() {
        assert_eq!(SpecialEffect::from_raw(0), Some(SpecialEffect::Normal));
        assert_eq!(SpecialEffect::from_raw(8), Some(SpecialEffect::Emboss));
        assert_eq!(SpecialEffect::from_raw(9), None);
    }

    #[test]
    fn test_emboss_uses_normal_matrix() {
        assert_eq!(
            builtin_effect(SpecialEffect::Emboss),
            builtin_effect(SpecialEffect::Normal)
        );
        assert_ne!(
            builtin_effect(SpecialEffect::Gray),
            builtin_effect(SpecialEffect::Normal)
        );
    }

    #[test]
    fn test_static_lookup_bounds() {
        let tuning = StaticTuning::new(2);
        assert!(tuning.gamma(0).is_some());
        assert!(tuning.gamma(4).is_none());
        assert!(tuning.denoise(5).is_some());
        assert!(tuning.denoise(6).is_none());
        assert_eq!(tuning.version_id(), 2);
    }
}

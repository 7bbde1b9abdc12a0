//! Gain codec.
//!
//! This module converts between the linear gains requested by the user and the
//! fixed-point shift/scale representation used by the channelizer multipliers,
//! and between sample rates and the frame count register.
//!
//! The hardware applies a gain of `2^shift * scale / 65535` on top of the
//! intrinsic gain of the channelizer, so a gain is encoded by first choosing
//! the smallest power of two that is not below the requested gain
//! (compensated by the intrinsic gain), and then the 16-bit fractional scale
//! that gives the remaining factor.

use crate::error::{Result, VccError};
use crate::vcc::constants;

/// Maximum value of the shift field.
pub const MAX_SHIFT: u8 = (1 << constants::FS_SFT_BITS) - 1;

/// Value of the scale field that represents a factor of one.
pub const SCALE_FULL: u16 = u16::MAX;

const SFT_MASK: u32 = (1 << constants::FS_SFT_BITS) - 1;
const SCL_MASK: u32 = (1 << constants::FS_SCL_BITS) - 1;

/// Intrinsic gain of the channelizer.
///
/// This is the gain that the channelizer applies to the signal when the
/// shift/scale multiplier is set to one.
pub fn intrinsic_gain() -> f64 {
    1.0 / (constants::OUTPUT_NORMALIZATION * (2.0 * f64::from(constants::CHANNELS_OUT)).sqrt())
}

/// Fixed-point gain.
///
/// This is the content of a `config_fs_sft_scl` register.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct ShiftScale {
    /// Power-of-two pre-scale. Only the 4 LSBs are used by the hardware.
    pub shift: u8,
    /// Fractional multiplier, in units of `1 / 65535`.
    pub scale: u16,
}

impl ShiftScale {
    /// Unpacks the fields of a shift/scale register value.
    ///
    /// Bits above the scale field are ignored.
    pub fn from_register(value: u32) -> ShiftScale {
        ShiftScale {
            shift: ((value >> constants::FS_SFT_BIT_OFFSET) & SFT_MASK) as u8,
            scale: ((value >> constants::FS_SCL_BIT_OFFSET) & SCL_MASK) as u16,
        }
    }

    /// Packs the fields into a shift/scale register value.
    pub fn to_register(self) -> u32 {
        ((u32::from(self.shift) & SFT_MASK) << constants::FS_SFT_BIT_OFFSET)
            | ((u32::from(self.scale) & SCL_MASK) << constants::FS_SCL_BIT_OFFSET)
    }

    /// Gives the linear gain represented by this value.
    ///
    /// See [`decode`].
    pub fn gain(self) -> f32 {
        decode(self)
    }
}

/// Result of encoding a gain.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct EncodedGain {
    /// Fixed-point value to write to the hardware.
    pub value: ShiftScale,
    /// The requested gain was outside the range that the hardware can
    /// represent, and it has been clamped to the closest representable gain.
    pub clamped: bool,
}

/// Encodes a linear gain into its shift/scale representation.
///
/// Gains that are zero, negative, or not finite are rejected. Gains above the
/// maximum representable gain, or so small that the scale rounds to zero, are
/// clamped, and this is indicated in [`EncodedGain::clamped`].
pub fn encode(gain: f32) -> Result<EncodedGain> {
    let comb_gain = f64::from(gain) / intrinsic_gain();
    if !(comb_gain.is_finite() && comb_gain > 0.0) {
        return Err(VccError::InvalidGain(gain));
    }
    let exponent = comb_gain.log2().ceil();
    let shift = exponent.clamp(0.0, f64::from(MAX_SHIFT));
    let int_gain = shift.exp2();
    let scale = (comb_gain / int_gain * f64::from(SCALE_FULL)).round();
    let clamped = scale > f64::from(SCALE_FULL) || scale < 1.0;
    let scale = scale.clamp(0.0, f64::from(SCALE_FULL));
    Ok(EncodedGain {
        value: ShiftScale {
            shift: shift as u8,
            scale: scale as u16,
        },
        clamped,
    })
}

/// Decodes a shift/scale value into a linear gain.
///
/// Every value decodes to a finite gain. This is the inverse of [`encode`] up
/// to the quantization of the scale field.
pub fn decode(value: ShiftScale) -> f32 {
    let int_gain = f64::from(value.shift).exp2();
    let comb_gain = f64::from(value.scale) / f64::from(SCALE_FULL) * int_gain;
    (comb_gain * intrinsic_gain()) as f32
}

/// Maximum gain that can be represented.
pub fn max_gain() -> f32 {
    decode(ShiftScale {
        shift: MAX_SHIFT,
        scale: SCALE_FULL,
    })
}

/// Computes the value of the frame count register.
///
/// The frame count is the integer division of the sample rate by the input
/// frame size, which must not be zero.
pub fn frame_count(sample_rate: u32, input_frame_size: u32) -> Result<u32> {
    sample_rate
        .checked_div(input_frame_size)
        .ok_or(VccError::ZeroInputFrameSize)
}

/// Computes the sample rate corresponding to a frame count register value.
///
/// This always uses a frame size of [`constants::STATUS_FRAME_SIZE`],
/// regardless of the frame size used when the register was written.
pub fn sample_rate(frame_count: u32) -> u64 {
    u64::from(frame_count) * constants::STATUS_FRAME_SIZE
}

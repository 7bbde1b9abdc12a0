//! VCC implementation constants.
//!
//! This module contains constants that define the register map and the
//! characteristics of this variant of the Very Coarse Channelizer firmware
//! block.

/// Number of output channels (frequency slices) per polarisation.
pub const CHANNELS_OUT: u16 = 10;

/// Number of input polarisations.
pub const NUM_POLARISATIONS: u8 = 2;

/// Number of (channel, polarisation) gain registers.
pub const NUM_GAIN_REGISTERS: usize = CHANNELS_OUT as usize * NUM_POLARISATIONS as usize;

/// Width of a register in bytes.
pub const REGISTER_BYTES: usize = 4;

/// Offset of the PPS frame count register.
pub const CONFIG_PPS_FRAME_COUNT_OFFSET: usize = 0x0;

/// Offset of the first frequency slice shift/scale register.
pub const CONFIG_FS_SFT_SCL_OFFSET: usize = 0x4;

/// Size of the register map in bytes.
pub const REGISTER_MAP_SIZE: usize = CONFIG_FS_SFT_SCL_OFFSET + NUM_GAIN_REGISTERS * REGISTER_BYTES;

/// Bit offset of the shift field in the shift/scale register.
pub const FS_SFT_BIT_OFFSET: u32 = 0;

/// Width of the shift field in bits.
pub const FS_SFT_BITS: u32 = 4;

/// Bit offset of the scale field in the shift/scale register.
pub const FS_SCL_BIT_OFFSET: u32 = 4;

/// Width of the scale field in bits.
pub const FS_SCL_BITS: u32 = 16;

/// Frame size used to convert the frame count register back to a sample
/// rate.
///
/// Configuration takes the frame size from the caller, but the readback
/// always multiplies by this value.
pub const STATUS_FRAME_SIZE: u64 = 18;

/// Output normalization factor of the channelizer.
///
/// The intrinsic gain of the block is `1 / (OUTPUT_NORMALIZATION * sqrt(2 *
/// CHANNELS_OUT))`.
pub const OUTPUT_NORMALIZATION: f64 = 0.9475;

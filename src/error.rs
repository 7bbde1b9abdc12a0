//! VCC error types.
//!
//! This module contains the error returned by the operations of the
//! [`Vcc`](crate::vcc::Vcc) device and its register backends.

use thiserror::Error;

/// Result type alias for VCC operations.
pub type Result<T, E = VccError> = std::result::Result<T, E>;

/// Errors that can occur during VCC operations.
///
/// Invalid arguments are detected before any register is written, so an
/// operation failing with one of them leaves the hardware untouched. See
/// [`VccError::is_invalid_argument`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VccError {
    /// Channel index out of range.
    #[error("channel {channel} out of range (the channelizer has {channels_out} channels)")]
    InvalidChannel {
        /// Requested channel.
        channel: u16,
        /// Number of output channels.
        channels_out: u16,
    },

    /// Polarisation index is neither 0 nor 1.
    #[error("invalid polarisation {0} (must be 0 or 1)")]
    InvalidPolarisation(u8),

    /// Input frame size is zero.
    #[error("input frame size must not be zero")]
    ZeroInputFrameSize,

    /// Gain cannot be encoded.
    ///
    /// The gain is zero, negative, or not finite.
    #[error("gain {0} cannot be encoded (must be positive and finite)")]
    InvalidGain(f32),

    /// Address outside the register window of the device.
    #[error("address {address:#x} outside register window {base:#x}..{end:#x}")]
    AddressOutOfRange {
        /// Requested address.
        address: usize,
        /// Start of the register window.
        base: usize,
        /// End (exclusive) of the register window.
        end: usize,
    },

    /// Address not aligned to a 32-bit register.
    #[error("address {0:#x} is not 32-bit aligned")]
    UnalignedAddress(usize),

    /// Register window too small to hold the register map.
    #[error("register window of {size:#x} bytes is smaller than the register map ({required:#x} bytes)")]
    WindowTooSmall {
        /// Size of the register window.
        size: usize,
        /// Size required by the register map.
        required: usize,
    },

    /// Register window extends past the end of the address space.
    #[error("register window at {base:#x} of {size:#x} bytes overflows the address space")]
    WindowOverflow {
        /// Start of the register window.
        base: usize,
        /// Size of the register window.
        size: usize,
    },

    /// Bus-level failure reported by the register backend.
    #[error("device fault: {0}")]
    DeviceFault(String),
}

impl VccError {
    /// Returns `true` if the error was caused by an invalid argument supplied
    /// by the caller, as opposed to a fault of the device.
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(
            self,
            VccError::DeviceFault(_)
                | VccError::WindowTooSmall { .. }
                | VccError::WindowOverflow { .. }
        )
    }
}

//! vcc-httpd is a userspace driver and control server for the Very Coarse
//! Channelizer (VCC) firmware block. The VCC splits each input polarisation
//! into a fixed number of frequency slices and applies a programmable gain to
//! each of them. vcc-httpd configures the expected sample rate and the gains
//! by writing the memory-mapped registers of the block, reads them back to
//! report the active configuration, and exposes these operations through a
//! RESTful API.

#![warn(missing_docs)]

pub mod app;
pub mod args;
pub mod error;
pub mod gain;
pub mod httpd;
pub mod registers;
pub mod uio;
pub mod vcc;

//! vcc-httpd CLI arguments.
//!
//! This module contains the definition of the CLI arguments for the vcc-httpd
//! application.

use clap::Parser;
use std::net::SocketAddr;
use std::num::ParseIntError;

/// vcc-httpd CLI arguments.
#[derive(Parser, Debug, Clone, Eq, PartialEq, Hash)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Listen address for the HTTP server
    #[clap(long, default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,
    /// Name of the UIO device that maps the VCC registers
    #[clap(long, default_value = "vcc-ch20")]
    pub uio: String,
    /// Name of the VCC device
    #[clap(long, default_value = "vcc")]
    pub name: String,
    /// Use simulated registers instead of the hardware
    #[clap(long)]
    pub simulate: bool,
    /// Base address of the simulated register window
    #[clap(long, default_value = "0x0", value_parser = parse_address)]
    pub simulated_base_address: usize,
    /// Restore the default VCC configuration at start-up
    #[clap(long)]
    pub recover: bool,
}

/// Parses an address given either in hexadecimal with a `0x` prefix or in
/// decimal.
///
/// Underscores can be used as digit separators in both bases.
pub fn parse_address(s: &str) -> Result<usize, ParseIntError> {
    let s = s.replace('_', "");
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

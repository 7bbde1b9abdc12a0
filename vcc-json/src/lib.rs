//! vcc-json contains the JSON schemas used by vcc-httpd and its clients.

#![warn(missing_docs)]

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// API JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/vcc`. It contains the
/// identity of the channelizer together with its current status.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Api {
    /// Human readable name of the device.
    pub name: String,
    /// Address of the start of the register window.
    pub base_address: u64,
    /// Current channelizer status.
    pub status: Status,
}

/// Channelizer configuration JSON schema.
///
/// This JSON schema corresponds to PUT requests on `/api/vcc/config` and
/// `/api/vcc/deconfigure`. It selects one (channel, polarisation) pair and the
/// gain to apply to it, together with the expected input sample rate. Missing
/// fields take their default value.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Expected input sample rate in samples per second.
    pub sample_rate: u32,
    /// Polarisation index (0 for X, 1 for Y).
    ///
    /// When deserializing, a polarisation designator such as `"X"` or `"V"`
    /// is also accepted (see [`Polarisation`]).
    #[serde(deserialize_with = "polarisation_index")]
    pub pol: u8,
    /// Output channel (frequency slice) index.
    pub channel: u16,
    /// Number of samples per input frame.
    ///
    /// The frame count register is computed as `sample_rate /
    /// input_frame_size`, so this must not be zero.
    pub input_frame_size: u32,
    /// Linear gain applied to this (channel, polarisation).
    pub gain: f32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            sample_rate: 3_963_619_800,
            pol: 0,
            channel: 0,
            input_frame_size: 18,
            gain: 1.0,
        }
    }
}

// Accepts either a numeric polarisation index or a designator string. Numeric
// indices are passed through unchecked, so that the device reports invalid
// ones.
fn polarisation_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Pol {
        Index(u8),
        Designator(String),
    }

    match Pol::deserialize(deserializer)? {
        Pol::Index(index) => Ok(index),
        Pol::Designator(s) => s.parse::<Polarisation>().map(u8::from).map_err(|()| {
            serde::de::Error::custom(format!("invalid polarisation designator {s:?}"))
        }),
    }
}

/// Channelizer status JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/vcc/status`. It is
/// reconstructed entirely from the hardware registers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Status {
    /// Sample rate in samples per second, derived from the frame count
    /// register.
    pub sample_rate: u64,
    /// Number of output channels.
    pub num_channels: usize,
    /// Number of polarisations.
    pub num_polarisations: usize,
    /// Linear gains, indexed by `channel + pol * num_channels`.
    pub gains: Vec<f32>,
}

impl Status {
    /// Returns the gain of a (channel, polarisation) pair.
    ///
    /// Gives `None` if the pair is outside the dimensions of the status.
    pub fn gain(&self, channel: usize, pol: usize) -> Option<f32> {
        if channel >= self.num_channels || pol >= self.num_polarisations {
            return None;
        }
        self.gains.get(channel + pol * self.num_channels).copied()
    }
}

/// Polarisation of the channelizer input.
///
/// Polarisations can be parsed from the designators `X`, `x`, `H` or `h` for
/// [`Polarisation::X`], and `Y`, `y`, `V` or `v` for [`Polarisation::Y`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Polarisation {
    /// X (horizontal) polarisation.
    X,
    /// Y (vertical) polarisation.
    Y,
}

impl Polarisation {
    /// Both polarisations, in register index order.
    pub const ALL: [Polarisation; 2] = [Polarisation::X, Polarisation::Y];

    /// Gives the register index of the polarisation.
    pub fn index(self) -> u8 {
        match self {
            Polarisation::X => 0,
            Polarisation::Y => 1,
        }
    }
}

impl From<Polarisation> for u8 {
    fn from(pol: Polarisation) -> u8 {
        pol.index()
    }
}

macro_rules! impl_str_conv {
    ($ty:ty, $($s:literal $(| $alias:literal)* => $v:ident),*) => {
        impl std::str::FromStr for $ty {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, ()> {
                Ok(match s {
                    $(
                        $s $(| $alias)* => <$ty>::$v,
                    )*
                        _ => return Err(()),
                })
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
                write!(f, "{}", match self {
                    $(
                        <$ty>::$v => $s,
                    )*
                })
            }
        }
    }
}

impl_str_conv!(Polarisation,
               "X" | "x" | "H" | "h" | "0" => X,
               "Y" | "y" | "V" | "v" | "1" => Y);

/// Gains for both polarisations.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct PolarisationGains {
    /// Gain for the X polarisation.
    #[serde(rename = "X")]
    pub x: f32,
    /// Gain for the Y polarisation.
    #[serde(rename = "Y")]
    pub y: f32,
}

impl Default for PolarisationGains {
    fn default() -> PolarisationGains {
        PolarisationGains { x: 1.0, y: 1.0 }
    }
}

impl PolarisationGains {
    /// Returns the gain for a polarisation.
    pub fn get(&self, pol: Polarisation) -> f32 {
        match pol {
            Polarisation::X => self.x,
            Polarisation::Y => self.y,
        }
    }
}

/// Gain overrides for both polarisations.
///
/// A missing polarisation uses the default gain of [`GainsConfig`].
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Default)]
pub struct PatchPolarisationGains {
    /// Gain for the X polarisation.
    #[serde(rename = "X", skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    /// Gain for the Y polarisation.
    #[serde(rename = "Y", skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
}

impl PatchPolarisationGains {
    /// Returns the gain override for a polarisation, if any.
    pub fn get(&self, pol: Polarisation) -> Option<f32> {
        match pol {
            Polarisation::X => self.x,
            Polarisation::Y => self.y,
        }
    }
}

/// Bulk gain configuration JSON schema.
///
/// This JSON schema corresponds to PUT requests on `/api/vcc/gains`. It
/// configures every (channel, polarisation) pair of the channelizer at once.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GainsConfig {
    /// Expected input sample rate in samples per second.
    pub sample_rate: u32,
    /// Number of samples per input frame.
    pub input_frame_size: u32,
    /// Gain used for channels without an override.
    pub default_gain: PolarisationGains,
    /// Per-channel gain overrides, keyed by channel index.
    pub channels: BTreeMap<u16, PatchPolarisationGains>,
}

impl Default for GainsConfig {
    fn default() -> GainsConfig {
        let config = Config::default();
        GainsConfig {
            sample_rate: config.sample_rate,
            input_frame_size: config.input_frame_size,
            default_gain: PolarisationGains::default(),
            channels: BTreeMap::new(),
        }
    }
}

impl GainsConfig {
    /// Returns the gain requested for a (channel, polarisation) pair.
    pub fn gain(&self, channel: u16, pol: Polarisation) -> f32 {
        self.channels
            .get(&channel)
            .and_then(|gains| gains.get(pol))
            .unwrap_or_else(|| self.default_gain.get(pol))
    }
}

/// Stop command JSON schema.
///
/// This JSON schema corresponds to POST requests on `/api/vcc/stop`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Default, Hash)]
#[serde(default)]
pub struct Stop {
    /// Force the stop.
    pub force: bool,
}

/// Register JSON schema.
///
/// This JSON schema corresponds to GET requests on
/// `/api/vcc/register/:address`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Register {
    /// Absolute address of the register.
    pub address: u64,
    /// Register value.
    pub value: u32,
}

/// Register PUT JSON schema.
///
/// This JSON schema corresponds to PUT requests on
/// `/api/vcc/register/:address`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PutRegister {
    /// Value to write to the register.
    pub value: u32,
}

/// Versions JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/versions`.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Hash)]
pub struct Versions {
    /// Git version of vcc-httpd.
    pub vcc_httpd_git: String,
    /// Version of vcc-httpd.
    pub vcc_httpd_version: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_defaults() {
        let config: Config = serde_json::from_str(r#"{"channel": 3, "gain": 2.0}"#).unwrap();
        assert_eq!(
            config,
            Config {
                channel: 3,
                gain: 2.0,
                ..Default::default()
            }
        );
        assert_eq!(config.sample_rate, 3_963_619_800);
        assert_eq!(config.input_frame_size, 18);
    }

    #[test]
    fn polarisation_designators() {
        for s in ["X", "x", "H", "h", "0"] {
            assert_eq!(s.parse::<Polarisation>(), Ok(Polarisation::X));
        }
        for s in ["Y", "y", "V", "v", "1"] {
            assert_eq!(s.parse::<Polarisation>(), Ok(Polarisation::Y));
        }
        assert!("Z".parse::<Polarisation>().is_err());
        assert_eq!(Polarisation::Y.to_string(), "Y");
    }

    #[test]
    fn config_polarisation_designator() {
        let config: Config = serde_json::from_str(r#"{"pol": "Y", "channel": 1}"#).unwrap();
        assert_eq!(config.pol, 1);
        assert_eq!(config.channel, 1);
        let config: Config = serde_json::from_str(r#"{"pol": "h"}"#).unwrap();
        assert_eq!(config.pol, 0);
        let config: Config = serde_json::from_str(r#"{"pol": 1}"#).unwrap();
        assert_eq!(config.pol, 1);
        // out of range indices are left for the device to reject
        let config: Config = serde_json::from_str(r#"{"pol": 7}"#).unwrap();
        assert_eq!(config.pol, 7);
        assert!(serde_json::from_str::<Config>(r#"{"pol": "Z"}"#).is_err());
        assert!(serde_json::from_str::<Config>(r#"{"pol": 256}"#).is_err());
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains(r#""pol":0"#));
    }

    #[test]
    fn status_gain_index() {
        let status = Status {
            sample_rate: 0,
            num_channels: 10,
            num_polarisations: 2,
            gains: (0..20).map(|n| n as f32).collect(),
        };
        assert_eq!(status.gain(5, 1), Some(15.0));
        assert_eq!(status.gain(9, 0), Some(9.0));
        assert_eq!(status.gain(10, 0), None);
        assert_eq!(status.gain(0, 2), None);
    }

    #[test]
    fn gains_config_overrides() {
        let config: GainsConfig = serde_json::from_str(
            r#"{
  "default_gain": {"X": 0.5, "Y": 0.75},
  "channels": {"2": {"Y": 3.0}}
}"#,
        )
        .unwrap();
        assert_eq!(config.sample_rate, 3_963_619_800);
        assert_eq!(config.gain(2, Polarisation::X), 0.5);
        assert_eq!(config.gain(2, Polarisation::Y), 3.0);
        assert_eq!(config.gain(7, Polarisation::Y), 0.75);
    }
}

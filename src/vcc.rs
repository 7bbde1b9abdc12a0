//! Very Coarse Channelizer.
//!
//! This module contains the driver of the Very Coarse Channelizer (VCC)
//! firmware block. The VCC splits each of the two input polarisations into
//! [`CHANNELS_OUT`](constants::CHANNELS_OUT) frequency slices, and applies a
//! programmable gain to each (channel, polarisation) pair.
//!
//! The driver keeps no state besides the identity of the device. Everything
//! else lives in the hardware registers, and [`Vcc::status`] reconstructs the
//! active configuration from them.

use crate::error::{Result, VccError};
use crate::gain::{self, EncodedGain};
use crate::registers::RegisterAccess;
use vcc_json::{Config, GainsConfig, Polarisation, Status};

pub mod constants;

/// Very Coarse Channelizer.
///
/// This struct owns the register window of one VCC block. It is not
/// synchronized internally; concurrent users must serialize their calls, for
/// instance by holding the `Vcc` in a [`Mutex`](std::sync::Mutex).
#[derive(Debug)]
pub struct Vcc<R> {
    name: String,
    registers: R,
}

// Register writes that implement a validated configuration.
#[derive(Debug, Copy, Clone)]
struct Writes {
    frame_count: u32,
    gain_offset: usize,
    gain: EncodedGain,
}

/// Gives the offset of the shift/scale register of a (channel, polarisation)
/// pair.
///
/// The registers are laid out with the channel index varying fastest.
pub fn gain_register_offset(channel: u16, pol: u8) -> Result<usize> {
    if channel >= constants::CHANNELS_OUT {
        return Err(VccError::InvalidChannel {
            channel,
            channels_out: constants::CHANNELS_OUT,
        });
    }
    if pol >= constants::NUM_POLARISATIONS {
        return Err(VccError::InvalidPolarisation(pol));
    }
    let index = usize::from(channel) + usize::from(pol) * usize::from(constants::CHANNELS_OUT);
    Ok(constants::CONFIG_FS_SFT_SCL_OFFSET + index * constants::REGISTER_BYTES)
}

impl<R: RegisterAccess> Vcc<R> {
    /// Creates a VCC driver.
    ///
    /// The register window given by `registers` must be large enough to hold
    /// the register map of the VCC. The `name` is only used to identify the
    /// device in logs and in the API.
    pub fn new(name: impl Into<String>, registers: R) -> Result<Vcc<R>> {
        let name = name.into();
        let base = registers.base_address();
        let size = registers.size();
        if size < constants::REGISTER_MAP_SIZE {
            return Err(VccError::WindowTooSmall {
                size,
                required: constants::REGISTER_MAP_SIZE,
            });
        }
        if base.checked_add(size).is_none() {
            return Err(VccError::WindowOverflow { base, size });
        }
        tracing::info!("opened VCC {name} at address {base:#08x} (window size {size:#x})");
        Ok(Vcc { name, registers })
    }

    /// Gives the name of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gives the address of the start of the register window.
    pub fn base_address(&self) -> usize {
        self.registers.base_address()
    }

    /// Gives access to the register window.
    pub fn registers(&self) -> &R {
        &self.registers
    }

    fn address_offset(&self, address: usize) -> Result<usize> {
        let base = self.base_address();
        address
            .checked_sub(base)
            .ok_or(VccError::AddressOutOfRange {
                address,
                base,
                end: base + self.registers.size(),
            })
    }

    /// Writes a register.
    ///
    /// The `address` is absolute. It must be aligned to 4 bytes and lie
    /// inside the register window of the device.
    pub fn register_write(&self, address: usize, value: u32) -> Result<()> {
        let offset = self.address_offset(address)?;
        tracing::trace!("register write {address:#x} <- {value:#010x}");
        self.registers.write(offset, value)
    }

    /// Reads a register.
    ///
    /// The `address` is absolute. It must be aligned to 4 bytes and lie
    /// inside the register window of the device.
    pub fn register_read(&self, address: usize) -> Result<u32> {
        let offset = self.address_offset(address)?;
        let value = self.registers.read(offset)?;
        tracing::trace!("register read {address:#x} -> {value:#010x}");
        Ok(value)
    }

    fn prepare(&self, config: &Config) -> Result<Writes> {
        let gain_offset = gain_register_offset(config.channel, config.pol)?;
        let frame_count = gain::frame_count(config.sample_rate, config.input_frame_size)?;
        let gain = gain::encode(config.gain)?;
        Ok(Writes {
            frame_count,
            gain_offset,
            gain,
        })
    }

    fn apply(&self, config: &Config, writes: &Writes) -> Result<()> {
        if writes.gain.clamped {
            tracing::warn!(
                "VCC {}: gain {} for channel {}, pol {} is not representable \
                 (maximum gain {}); clamped to {}",
                self.name,
                config.gain,
                config.channel,
                config.pol,
                gain::max_gain(),
                writes.gain.value.gain()
            );
        }
        let base = self.base_address();
        self.register_write(
            base + constants::CONFIG_PPS_FRAME_COUNT_OFFSET,
            writes.frame_count,
        )?;
        self.register_write(base + writes.gain_offset, writes.gain.value.to_register())
    }

    /// Configures the sample rate and the gain of one (channel, polarisation).
    ///
    /// This writes `sample_rate / input_frame_size` to the frame count
    /// register, and the encoded gain to the shift/scale register selected by
    /// `channel` and `pol`. The whole configuration is validated before
    /// writing, so an invalid configuration writes no registers.
    pub fn configure(&self, config: &Config) -> Result<()> {
        tracing::info!(
            "configuring VCC {} with sample_rate: {}, pol: {}, channel: {}, gain: {}",
            self.name,
            config.sample_rate,
            config.pol,
            config.channel,
            config.gain
        );
        let writes = self.prepare(config)?;
        self.apply(config, &writes)
    }

    /// Sets unity gain for one (channel, polarisation).
    ///
    /// This behaves as [`Vcc::configure`] with the gain of `config` replaced
    /// by 1.0.
    pub fn deconfigure(&self, config: &Config) -> Result<()> {
        tracing::info!(
            "deconfiguring VCC {} for channel: {}, pol: {}",
            self.name,
            config.channel,
            config.pol
        );
        self.configure(&Config {
            gain: 1.0,
            ..*config
        })
    }

    /// Restores the default configuration.
    ///
    /// Every (channel, polarisation) pair is configured with the default
    /// [`Config`], which sets the default sample rate and unity gain.
    pub fn recover(&self) -> Result<()> {
        tracing::info!("recovering VCC {}", self.name);
        for pol in 0..constants::NUM_POLARISATIONS {
            for channel in 0..constants::CHANNELS_OUT {
                self.configure(&Config {
                    channel,
                    pol,
                    ..Default::default()
                })?;
            }
        }
        Ok(())
    }

    /// Configures the gains of all the (channel, polarisation) pairs.
    ///
    /// All the gains are validated before writing any register, so an invalid
    /// `gains` (including an override for a channel that does not exist)
    /// leaves the hardware untouched.
    pub fn configure_gains(&self, gains: &GainsConfig) -> Result<()> {
        if let Some(&channel) = gains
            .channels
            .keys()
            .find(|&&channel| channel >= constants::CHANNELS_OUT)
        {
            return Err(VccError::InvalidChannel {
                channel,
                channels_out: constants::CHANNELS_OUT,
            });
        }
        tracing::info!(
            "configuring gains of VCC {} with sample_rate: {}",
            self.name,
            gains.sample_rate
        );
        let configs = Polarisation::ALL
            .into_iter()
            .flat_map(|pol| {
                (0..constants::CHANNELS_OUT).map(move |channel| Config {
                    sample_rate: gains.sample_rate,
                    pol: pol.index(),
                    channel,
                    input_frame_size: gains.input_frame_size,
                    gain: gains.gain(channel, pol),
                })
            })
            .map(|config| self.prepare(&config).map(|writes| (config, writes)))
            .collect::<Result<Vec<_>>>()?;
        for (config, writes) in &configs {
            self.apply(config, writes)?;
        }
        Ok(())
    }

    /// Starts the channelizer.
    ///
    /// The current firmware has no enable control, so this does nothing.
    pub fn start(&self) -> Result<()> {
        tracing::debug!("starting VCC {} (no-op)", self.name);
        Ok(())
    }

    /// Stops the channelizer.
    ///
    /// The current firmware has no enable control, so this does nothing
    /// regardless of `force`.
    pub fn stop(&self, force: bool) -> Result<()> {
        tracing::debug!("stopping VCC {} (force: {force}, no-op)", self.name);
        Ok(())
    }

    /// Reads the current configuration from the registers.
    ///
    /// The gains are decoded from every shift/scale register, and the sample
    /// rate is computed from the frame count register (see
    /// [`gain::sample_rate`]). The `clear` flag is accepted for compatibility
    /// but currently has no effect: no register is cleared.
    pub fn status(&self, clear: bool) -> Result<Status> {
        let base = self.base_address();
        let mut gains = vec![0.0; constants::NUM_GAIN_REGISTERS];
        for pol in 0..constants::NUM_POLARISATIONS {
            for channel in 0..constants::CHANNELS_OUT {
                let offset = gain_register_offset(channel, pol)?;
                let value = gain::ShiftScale::from_register(self.register_read(base + offset)?);
                let gain = value.gain();
                tracing::debug!(
                    "VCC {}: read shift: {}, scale: {}, calculated gain: {} for channel: {}, pol: {}",
                    self.name,
                    value.shift,
                    value.scale,
                    gain,
                    channel,
                    pol
                );
                gains[usize::from(channel)
                    + usize::from(pol) * usize::from(constants::CHANNELS_OUT)] = gain;
            }
        }
        let frame_count =
            self.register_read(base + constants::CONFIG_PPS_FRAME_COUNT_OFFSET)?;
        let sample_rate = gain::sample_rate(frame_count);
        tracing::debug!(
            "VCC {}: read frame_count: {frame_count}, calculated sample_rate: {sample_rate} \
             (clear: {clear})",
            self.name
        );
        Ok(Status {
            sample_rate,
            num_channels: usize::from(constants::CHANNELS_OUT),
            num_polarisations: usize::from(constants::NUM_POLARISATIONS),
            gains,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registers::{Access, SimulatedRegisters};
    use std::collections::BTreeMap;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use vcc_json::PatchPolarisationGains;

    const BASE: usize = 0x8000_0000;

    fn vcc() -> Vcc<SimulatedRegisters> {
        Vcc::new(
            "test",
            SimulatedRegisters::new(BASE, constants::REGISTER_MAP_SIZE),
        )
        .unwrap()
    }

    fn assert_gain(status: &Status, channel: usize, pol: usize, expected: f32) {
        let gain = status.gain(channel, pol).unwrap();
        assert!(
            ((gain - expected) / expected).abs() < 5e-3,
            "channel {channel}, pol {pol}: gain {gain}, expected {expected}"
        );
    }

    #[test]
    fn register_offsets() {
        assert_eq!(gain_register_offset(0, 0), Ok(0x4));
        assert_eq!(gain_register_offset(3, 0), Ok(0x10));
        assert_eq!(gain_register_offset(5, 1), Ok(0x40));
        assert_eq!(gain_register_offset(9, 1), Ok(0x50));
        assert_eq!(constants::REGISTER_MAP_SIZE, 0x54);
        assert_eq!(
            gain_register_offset(10, 0),
            Err(VccError::InvalidChannel {
                channel: 10,
                channels_out: 10
            })
        );
        assert_eq!(
            gain_register_offset(0, 2),
            Err(VccError::InvalidPolarisation(2))
        );
    }

    #[test]
    fn configure_example() {
        let vcc = vcc();
        vcc.configure(&Config {
            sample_rate: 18_000_000,
            pol: 0,
            channel: 3,
            input_frame_size: 18,
            gain: 2.0,
        })
        .unwrap();
        assert_eq!(
            vcc.registers().take_accesses(),
            vec![
                Access::Write {
                    offset: 0x0,
                    value: 1_000_000
                },
                Access::Write {
                    offset: 0x10,
                    value: 0x87984
                },
            ]
        );
        let status = vcc.status(false).unwrap();
        assert_eq!(status.sample_rate, 18_000_000);
        assert_eq!(status.num_channels, 10);
        assert_eq!(status.num_polarisations, 2);
        assert_eq!(status.gains.len(), 20);
        assert_gain(&status, 3, 0, 2.0);
    }

    #[test]
    fn sample_rate_readback_uses_fixed_frame_size() {
        let vcc = vcc();
        vcc.configure(&Config {
            sample_rate: 1_000_000,
            input_frame_size: 10,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(vcc.registers().peek(0x0), Some(100_000));
        assert_eq!(vcc.status(false).unwrap().sample_rate, 1_800_000);
    }

    #[test]
    fn configure_all_pairs_independently() {
        let vcc = vcc();
        let expected = |channel: u16, pol: u8| 0.05 + 0.37 * f32::from(channel + 10 * u16::from(pol));
        for pol in 0..2 {
            for channel in 0..10 {
                vcc.configure(&Config {
                    channel,
                    pol,
                    gain: expected(channel, pol),
                    ..Default::default()
                })
                .unwrap();
            }
        }
        let status = vcc.status(false).unwrap();
        for pol in 0..2 {
            for channel in 0..10 {
                assert_gain(
                    &status,
                    usize::from(channel),
                    usize::from(pol),
                    expected(channel, pol),
                );
            }
        }
    }

    #[test]
    fn recover() {
        let vcc = vcc();
        vcc.configure(&Config {
            channel: 7,
            pol: 1,
            gain: 42.0,
            ..Default::default()
        })
        .unwrap();
        vcc.registers().take_accesses();
        vcc.recover().unwrap();
        let accesses = vcc.registers().take_accesses();
        assert_eq!(accesses.len(), 40);
        assert!(accesses.iter().all(|a| matches!(a, Access::Write { .. })));
        let status = vcc.status(false).unwrap();
        assert_eq!(status.sample_rate, 3_963_619_800);
        for pol in 0..2 {
            for channel in 0..10 {
                assert_gain(&status, channel, pol, 1.0);
            }
        }
    }

    #[test]
    fn deconfigure_resets_one_pair() {
        let vcc = vcc();
        for (channel, pol, gain) in [(2, 0, 5.0), (2, 1, 0.25), (8, 0, 12.5)] {
            vcc.configure(&Config {
                channel,
                pol,
                gain,
                ..Default::default()
            })
            .unwrap();
        }
        vcc.deconfigure(&Config {
            channel: 2,
            pol: 0,
            gain: 5.0,
            ..Default::default()
        })
        .unwrap();
        let status = vcc.status(false).unwrap();
        assert_gain(&status, 2, 0, 1.0);
        assert_gain(&status, 2, 1, 0.25);
        assert_gain(&status, 8, 0, 12.5);
    }

    #[test]
    fn invalid_config_writes_nothing() {
        let vcc = vcc();
        let invalid = [
            Config {
                channel: 10,
                ..Default::default()
            },
            Config {
                pol: 2,
                ..Default::default()
            },
            Config {
                input_frame_size: 0,
                ..Default::default()
            },
            Config {
                gain: 0.0,
                ..Default::default()
            },
            Config {
                gain: -3.0,
                ..Default::default()
            },
            Config {
                gain: f32::NAN,
                ..Default::default()
            },
        ];
        for config in &invalid {
            let err = vcc.configure(config).unwrap_err();
            assert!(err.is_invalid_argument(), "{err}");
        }
        assert!(vcc
            .deconfigure(&Config {
                input_frame_size: 0,
                ..Default::default()
            })
            .is_err());
        assert!(vcc.registers().accesses().is_empty());
    }

    // Counts the warning events emitted while it is the default subscriber.
    #[derive(Debug, Clone, Default)]
    struct WarningCounter(Arc<AtomicUsize>);

    impl WarningCounter {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for WarningCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn clamped_gain_is_applied() {
        let vcc = vcc();
        let warnings = WarningCounter::default();
        let subscriber = tracing_subscriber::registry().with(warnings.clone());
        tracing::subscriber::with_default(subscriber, || {
            vcc.configure(&Config {
                channel: 2,
                gain: 3.0,
                ..Default::default()
            })
            .unwrap();
            assert_eq!(warnings.count(), 0);
            vcc.configure(&Config {
                channel: 1,
                gain: 1e5,
                ..Default::default()
            })
            .unwrap();
            assert_eq!(warnings.count(), 1);
        });
        let status = vcc.status(false).unwrap();
        assert_eq!(status.gain(1, 0), Some(gain::max_gain()));
    }

    #[test]
    fn status_only_reads() {
        let vcc = vcc();
        vcc.status(true).unwrap();
        let accesses = vcc.registers().take_accesses();
        assert_eq!(accesses.len(), 21);
        assert!(accesses.iter().all(|a| matches!(a, Access::Read { .. })));
        assert_eq!(accesses.last(), Some(&Access::Read { offset: 0, value: 0 }));
    }

    #[test]
    fn register_access_by_address() {
        let vcc = vcc();
        assert_eq!(vcc.base_address(), BASE);
        vcc.register_write(BASE + 0x40, 0x1234).unwrap();
        assert_eq!(vcc.registers().peek(0x40), Some(0x1234));
        assert_eq!(vcc.register_read(BASE + 0x40), Ok(0x1234));
        assert_eq!(
            vcc.register_read(BASE - 4),
            Err(VccError::AddressOutOfRange {
                address: BASE - 4,
                base: BASE,
                end: BASE + 0x54
            })
        );
        assert!(vcc.register_read(BASE + 0x54).is_err());
        assert_eq!(
            vcc.register_write(BASE + 1, 0),
            Err(VccError::UnalignedAddress(BASE + 1))
        );
    }

    #[test]
    fn start_stop_are_inert() {
        let vcc = vcc();
        vcc.start().unwrap();
        vcc.stop(false).unwrap();
        vcc.stop(true).unwrap();
        assert!(vcc.registers().accesses().is_empty());
    }

    #[test]
    fn device_fault_propagates() {
        let vcc = vcc();
        vcc.registers().set_fault(true);
        let err = vcc.configure(&Config::default()).unwrap_err();
        assert!(matches!(err, VccError::DeviceFault(_)));
        assert!(matches!(
            vcc.status(false),
            Err(VccError::DeviceFault(_))
        ));
    }

    #[test]
    fn window_too_small() {
        let err = Vcc::new("small", SimulatedRegisters::new(0, 0x50)).unwrap_err();
        assert_eq!(
            err,
            VccError::WindowTooSmall {
                size: 0x50,
                required: 0x54
            }
        );
        assert!(!err.is_invalid_argument());
    }

    #[test]
    fn window_overflow() {
        let base = usize::MAX - 0x10;
        let err = Vcc::new("overflow", SimulatedRegisters::new(base, 0x54)).unwrap_err();
        assert_eq!(err, VccError::WindowOverflow { base, size: 0x54 });
        assert!(!err.is_invalid_argument());
    }

    #[test]
    fn configure_gains() {
        let vcc = vcc();
        let mut gains = GainsConfig {
            sample_rate: 18_000_000,
            input_frame_size: 18,
            default_gain: vcc_json::PolarisationGains { x: 0.5, y: 2.0 },
            channels: BTreeMap::from([(
                4,
                PatchPolarisationGains {
                    x: Some(8.0),
                    y: None,
                },
            )]),
        };
        vcc.configure_gains(&gains).unwrap();
        let status = vcc.status(false).unwrap();
        assert_eq!(status.sample_rate, 18_000_000);
        assert_gain(&status, 0, 0, 0.5);
        assert_gain(&status, 4, 0, 8.0);
        assert_gain(&status, 4, 1, 2.0);
        assert_gain(&status, 9, 1, 2.0);

        vcc.registers().take_accesses();
        gains.channels.insert(10, PatchPolarisationGains::default());
        assert!(vcc.configure_gains(&gains).is_err());
        gains.channels.remove(&10);
        gains.channels.insert(
            6,
            PatchPolarisationGains {
                x: None,
                y: Some(-1.0),
            },
        );
        assert!(matches!(
            vcc.configure_gains(&gains),
            Err(VccError::InvalidGain(_))
        ));
        assert!(vcc.registers().accesses().is_empty());
    }
}

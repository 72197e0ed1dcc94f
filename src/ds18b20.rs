//! DS18B20 digital thermometer protocol.
//!
//! Every transaction re-addresses the device: bus reset, then skip-ROM
//! (solo mode) or match-ROM plus the 8 ROM bytes, then a function command.

use byteorder::{ByteOrder, LittleEndian};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

use crate::{Bus, BusPin, Error, FunctionCommand, RomCode, RomCommand};

/// Family code shared by all DS18B20 devices.
pub const FAMILY_CODE: u8 = 0x28;

/// Scratchpad length including the trailing CRC byte.
const SCRATCHPAD_BYTES: usize = 9;
/// Scratchpad prefix through the configuration register.
const SCRATCHPAD_HEAD: usize = 5;

/// Worst-case conversion time at 12-bit resolution, in milliseconds.
pub const MAX_CONVERSION_MS: u16 = 750;

/// Conversion resolution, as encoded in the configuration register.
///
/// The discriminant is the full register byte: resolution in bits 5-6,
/// the reserved low bits forced to the fixed read-back pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Resolution {
    Bits9 = 0x1F,
    Bits10 = 0x3F,
    Bits11 = 0x5F,
    #[default]
    Bits12 = 0x7F,
}

impl Resolution {
    /// Decode a configuration register byte. Anything other than the four
    /// exact encodings (e.g. the 0xFF of an open line) is unreadable.
    pub fn from_config(byte: u8) -> Option<Resolution> {
        match byte {
            0x1F => Some(Resolution::Bits9),
            0x3F => Some(Resolution::Bits10),
            0x5F => Some(Resolution::Bits11),
            0x7F => Some(Resolution::Bits12),
            _ => None,
        }
    }

    pub fn to_config(self) -> u8 {
        self as u8
    }

    pub fn bits(self) -> u8 {
        match self {
            Resolution::Bits9 => 9,
            Resolution::Bits10 => 10,
            Resolution::Bits11 => 11,
            Resolution::Bits12 => 12,
        }
    }

    /// Maximum conversion duration; halves with every bit of resolution
    /// dropped from the 12-bit baseline.
    pub fn max_conversion_ms(self) -> u16 {
        match self {
            Resolution::Bits9 => 94,
            Resolution::Bits10 => 188,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => MAX_CONVERSION_MS,
        }
    }

    /// Undefined low bits of the temperature LSB at this resolution; they
    /// must read as zero.
    fn raw_mask(self) -> u16 {
        !((1u16 << (12 - self.bits())) - 1)
    }
}

/// Power supply mode reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    Parasite,
    External,
}

/// One sensor's session state: addressing mode, CRC policy and the cached
/// resolution used to size conversion waits and mask raw readings.
///
/// The device itself lives on the bus; this value is caller-owned and may
/// coexist with others referencing the same [`Bus`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ds18b20 {
    rom: Option<RomCode>,
    resolution: Resolution,
    use_crc: bool,
}

impl Ds18b20 {
    /// A sensor known to be alone on its bus: addressing uses skip-ROM,
    /// saving the 8 ROM bytes per transaction.
    pub fn solo(use_crc: bool) -> Ds18b20 {
        Ds18b20 {
            rom: None,
            resolution: Resolution::default(),
            use_crc,
        }
    }

    /// A sensor addressed by ROM code (match-ROM), for shared buses.
    pub fn with_rom<E: Sized + Debug>(rom: RomCode, use_crc: bool) -> Result<Ds18b20, Error<E>> {
        if rom.family_code() != FAMILY_CODE {
            return Err(Error::FamilyCodeMismatch(FAMILY_CODE, rom.family_code()));
        }
        Ok(Ds18b20 {
            rom: Some(rom),
            resolution: Resolution::default(),
            use_crc,
        })
    }

    pub fn rom(&self) -> Option<&RomCode> {
        self.rom.as_ref()
    }

    /// The cached resolution. May lag hardware truth until
    /// [`init`](Self::init) or [`read_resolution`](Self::read_resolution)
    /// has been run.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Read the actual resolution back from the device. The power-on
    /// value depends on what was last stored in EEPROM, so it is not
    /// assumed.
    pub fn init<E: Debug, W: BusPin<Error = E>>(
        &mut self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<E>> {
        self.resolution = self.read_resolution(bus, delay)?;
        Ok(())
    }

    fn address<E: Debug, W: BusPin<Error = E>>(
        &self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<E>> {
        bus.reset(delay)?;
        match &self.rom {
            None => bus.write_command(delay, RomCommand::Skip)?,
            Some(rom) => {
                bus.write_command(delay, RomCommand::Match)?;
                bus.write_bytes(delay, rom.as_ref())?;
            }
        }
        Ok(())
    }

    /// Trigger a temperature conversion and return the number of
    /// milliseconds to wait before the scratchpad is worth reading.
    pub fn start_conversion<E: Debug, W: BusPin<Error = E>>(
        &self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<E>> {
        self.address(bus, delay)?;
        bus.write_command(delay, FunctionCommand::Convert)?;
        Ok(self.resolution.max_conversion_ms())
    }

    /// Block for the worst-case conversion time of the cached resolution.
    pub fn wait_for_conversion(&self, delay: &mut impl DelayNs) {
        delay.delay_ms(self.resolution.max_conversion_ms() as u32);
    }

    /// Trigger a conversion on every device on the bus at once (skip-ROM
    /// broadcast). Returns the full 12-bit wait, since per-device
    /// resolutions are not known at the bus level.
    pub fn convert_all<E: Debug, W: BusPin<Error = E>>(
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<E>> {
        bus.reset(delay)?;
        bus.write_command(delay, RomCommand::Skip)?;
        bus.write_command(delay, FunctionCommand::Convert)?;
        Ok(MAX_CONVERSION_MS)
    }

    /// Read `dst.len()` scratchpad bytes. A full 9-byte read is CRC
    /// checked when enabled; a partial read is terminated early with a
    /// bus reset.
    fn read_scratchpad<E: Debug, W: BusPin<Error = E>>(
        &self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
        dst: &mut [u8],
    ) -> Result<(), Error<E>> {
        self.address(bus, delay)?;
        bus.write_command(delay, FunctionCommand::ReadScratchpad)?;
        bus.read_bytes(delay, dst)?;

        if dst.len() == SCRATCHPAD_BYTES {
            if self.use_crc {
                let residue = crate::crc8_block(0, dst);
                if residue != 0 {
                    return Err(Error::CrcMismatch(residue));
                }
            }
        } else {
            // device is still shifting out; a reset abandons the rest
            let _ = bus.reset_presence(delay)?;
        }
        Ok(())
    }

    /// Scratchpad prefix through the configuration byte, CRC checked over
    /// the full register image when enabled.
    fn scratchpad_head<E: Debug, W: BusPin<Error = E>>(
        &self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<[u8; SCRATCHPAD_HEAD], Error<E>> {
        let mut head = [0u8; SCRATCHPAD_HEAD];
        if self.use_crc {
            let mut scratchpad = [0u8; SCRATCHPAD_BYTES];
            self.read_scratchpad(bus, delay, &mut scratchpad)?;
            head.copy_from_slice(&scratchpad[..SCRATCHPAD_HEAD]);
        } else {
            self.read_scratchpad(bus, delay, &mut head)?;
        }
        Ok(head)
    }

    /// Raw temperature register, undefined low bits masked to zero for
    /// the cached resolution. 1/16 °C per count, two's complement.
    pub fn read_temperature_raw<E: Debug, W: BusPin<Error = E>>(
        &self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error<E>> {
        let raw = if self.use_crc {
            let mut scratchpad = [0u8; SCRATCHPAD_BYTES];
            self.read_scratchpad(bus, delay, &mut scratchpad)?;
            LittleEndian::read_u16(&scratchpad[0..2])
        } else {
            let mut lsb_msb = [0u8; 2];
            self.read_scratchpad(bus, delay, &mut lsb_msb)?;
            LittleEndian::read_u16(&lsb_msb)
        };
        Ok(raw & self.resolution.raw_mask())
    }

    /// Temperature in degrees Celsius.
    pub fn read_temperature<E: Debug, W: BusPin<Error = E>>(
        &self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<f32, Error<E>> {
        self.read_temperature_raw(bus, delay)
            .map(|raw| raw as i16 as f32 / 16_f32)
    }

    /// Resolution as the hardware reports it right now.
    pub fn read_resolution<E: Debug, W: BusPin<Error = E>>(
        &self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<Resolution, Error<E>> {
        let head = self.scratchpad_head(bus, delay)?;
        Resolution::from_config(head[4]).ok_or(Error::InvalidResolution(head[4]))
    }

    /// Change the conversion resolution.
    ///
    /// The trigger registers and configuration must be written in one
    /// uninterrupted transaction, so the current Th/Tl are read first and
    /// written back unchanged. With `verify`, the scratchpad is read back
    /// and compared; on a mismatch the cached resolution is resynchronized
    /// from hardware truth instead of trusting the attempted write.
    pub fn set_resolution<E: Debug, W: BusPin<Error = E>>(
        &mut self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
        resolution: Resolution,
        verify: bool,
    ) -> Result<(), Error<E>> {
        let head = self.scratchpad_head(bus, delay)?;
        let th = head[2];
        let tl = head[3];
        let config = resolution.to_config();

        self.address(bus, delay)?;
        bus.write_command(delay, FunctionCommand::WriteScratchpad)?;
        bus.write_bytes(delay, &[th, tl, config])?;

        if verify {
            let readback = self.scratchpad_head(bus, delay)?;
            if readback[2] != th || readback[3] != tl || readback[4] != config {
                self.resolution = Resolution::from_config(readback[4])
                    .ok_or(Error::InvalidResolution(readback[4]))?;
                return Err(Error::VerifyFailed);
            }
        }
        self.resolution = resolution;
        Ok(())
    }

    /// Ask the device how it is powered.
    pub fn read_power_supply<E: Debug, W: BusPin<Error = E>>(
        &self,
        bus: &mut Bus<W>,
        delay: &mut impl DelayNs,
    ) -> Result<PowerMode, Error<E>> {
        self.address(bus, delay)?;
        bus.write_command(delay, FunctionCommand::ReadPowerSupply)?;
        let bit = bus.read_bit(delay)?;
        Ok(if bit {
            PowerMode::External
        } else {
            PowerMode::Parasite
        })
    }
}

/// Split a raw temperature register into integer degrees and a fraction
/// in 1/10000 °C, avoiding floats.
///
/// Total over all of `u16`: a garbled register (possible on a CRC-disabled
/// read) still yields a finite result. Widened to `i32` so 0x8000, whose
/// `i16` value has no negation, cannot overflow.
pub fn split_temperature(raw: u16) -> (i16, i16) {
    let raw = raw as i16 as i32;
    if raw >= 0 {
        ((raw >> 4) as i16, ((raw & 0xF) * 625) as i16)
    } else {
        let abs = -raw;
        (-((abs >> 4) as i16), (-625 * (abs & 0xF)) as i16)
    }
}

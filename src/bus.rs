use crate::{
    crc::crc8_block,
    timing::{self, Timing},
    BusPin, Error, OpCode, RomCode, RomCommand,
};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// One physical 1-Wire line.
///
/// Owns the pin and the CRC-enable flag; every operation blocks the caller
/// for its full slot duration. Exactly one `Bus` should exist per line, and
/// serializing access from multiple tasks is the caller's responsibility.
/// Bit-level timing is hard real-time: preemption inside a slot can corrupt
/// the sampled value, which CRC checks catch downstream at best.
pub struct Bus<W: BusPin> {
    pin: W,
    timing: &'static Timing,
    use_crc: bool,
}

fn tick_delay(delay: &mut impl DelayNs, ticks: u32) {
    if ticks > 0 {
        delay.delay_ns(ticks * timing::TICK_NS);
    }
}

impl<E: Debug, W: BusPin<Error = E>> Bus<W> {
    pub fn new(pin: W) -> Self {
        Bus {
            pin,
            timing: &timing::STANDARD,
            use_crc: false,
        }
    }

    pub fn with_crc(pin: W) -> Self {
        let mut bus = Self::new(pin);
        bus.use_crc = true;
        bus
    }

    /// Enable or disable CRC checks on ROM reads.
    pub fn use_crc(&mut self, use_crc: bool) {
        self.use_crc = use_crc;
    }

    pub fn crc_enabled(&self) -> bool {
        self.use_crc
    }

    /// Give the pin back.
    pub fn release(self) -> W {
        self.pin
    }

    /// Performs a reset and listens for a presence pulse.
    ///
    /// Returns `Err(WireFault)` if the line will not idle high (shorted)
    /// or has not recovered by the end of the sequence, `Err(NoPresence)`
    /// if no device answered, and `Ok(())` on a presence pulse.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.pin.set_high()?;
        self.ensure_wire_high(delay)?;

        tick_delay(delay, self.timing.g);
        self.pin.set_low()?;
        tick_delay(delay, self.timing.h);
        self.pin.set_high()?;
        tick_delay(delay, self.timing.i);

        let presence = self.pin.is_low()?;
        tick_delay(delay, self.timing.j);
        if self.pin.is_low()? {
            return Err(Error::WireFault);
        }

        if presence {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    /// Like [`reset`](Self::reset), but reports absence as `Ok(false)`
    /// instead of an error.
    pub fn reset_presence(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.reset(delay).map(|_| true).or_else(|error| {
            if matches!(error, Error::NoPresence) {
                Ok(false)
            } else {
                Err(error)
            }
        })
    }

    fn ensure_wire_high(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        for _ in 0..125 {
            if self.pin.is_high()? {
                return Ok(());
            }
            delay.delay_us(2);
        }
        Err(Error::WireFault)
    }

    pub(crate) fn write_bit(&mut self, delay: &mut impl DelayNs, bit: bool) -> Result<(), E> {
        let (drive, recover) = if bit {
            (self.timing.a, self.timing.b)
        } else {
            (self.timing.c, self.timing.d)
        };
        self.pin.set_low()?;
        tick_delay(delay, drive);
        self.pin.set_high()?;
        tick_delay(delay, recover);
        Ok(())
    }

    pub(crate) fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, E> {
        self.pin.set_low()?;
        tick_delay(delay, self.timing.a);
        self.pin.set_high()?;
        tick_delay(delay, self.timing.e);
        let bit = self.pin.is_high()?;
        tick_delay(delay, self.timing.f);
        Ok(bit)
    }

    pub(crate) fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), E> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(delay, (byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub(crate) fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, E> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), E> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), E> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    pub fn write_command(&mut self, delay: &mut impl DelayNs, cmd: impl OpCode) -> Result<(), E> {
        self.write_byte(delay, cmd.op_code())
    }

    /// Read the ROM code of the only device on the bus via Read-ROM.
    ///
    /// Skips the search; with more than one device present the responses
    /// collide and the CRC check (when enabled) rejects the wired-AND
    /// garble.
    pub fn read_rom(&mut self, delay: &mut impl DelayNs) -> Result<RomCode, Error<E>> {
        self.reset(delay)?;
        self.write_command(delay, RomCommand::Read)?;

        let mut rom = RomCode::default();
        self.read_bytes(delay, rom.as_mut())?;

        if self.use_crc {
            let residue = crc8_block(0, rom.as_ref());
            if residue != 0 {
                return Err(Error::CrcMismatch(residue));
            }
        }
        Ok(rom)
    }
}

use crate::{crc::crc8, Bus, BusPin, Error, RomCode, RomCommand};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Cursor state for the binary-discrepancy ROM search.
///
/// One cursor per enumeration in progress; never share a cursor between
/// concurrent searches on the same bus. Bit positions are 1-based, 0
/// meaning "none".
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SearchState {
    rom_code: [u8; RomCode::BYTES as usize],
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    last_device_flag: bool,
}

impl SearchState {
    pub fn new() -> SearchState {
        SearchState::default()
    }

    /// True once the device population has been fully enumerated.
    pub fn is_exhausted(&self) -> bool {
        self.last_device_flag
    }

    fn reset(&mut self) {
        self.rom_code = [0; RomCode::BYTES as usize];
        self.last_discrepancy = 0;
        self.last_family_discrepancy = 0;
        self.last_device_flag = false;
    }
}

impl<E: Debug, W: BusPin<Error = E>> Bus<W> {
    /// Start a fresh enumeration: clear the cursor and run one round.
    ///
    /// Repeated [`search_next`](Self::search_next) calls then yield the
    /// remaining devices, one accepted round each, until `None`.
    pub fn search_first(
        &mut self,
        state: &mut SearchState,
        delay: &mut impl DelayNs,
    ) -> Result<Option<RomCode>, Error<E>> {
        state.reset();
        self.search_round(state, delay)
    }

    /// Continue an enumeration from the existing cursor.
    pub fn search_next(
        &mut self,
        state: &mut SearchState,
        delay: &mut impl DelayNs,
    ) -> Result<Option<RomCode>, Error<E>> {
        self.search_round(state, delay)
    }

    /// Check whether a device with this exact ROM code is on the bus.
    ///
    /// Runs a single search round steered down the target code (cursor
    /// seeded with `last_discrepancy` past the last bit), so only the
    /// matching device can survive the round.
    pub fn verify_rom(
        &mut self,
        delay: &mut impl DelayNs,
        rom: &RomCode,
    ) -> Result<bool, Error<E>> {
        let mut state = SearchState {
            rom_code: **rom,
            last_discrepancy: RomCode::BITS,
            last_family_discrepancy: 0,
            last_device_flag: false,
        };
        Ok(self.search_round(&mut state, delay)? == Some(*rom))
    }

    /// One full reset + 64-bit negotiation. See Maxim application note 187
    /// for the discrepancy bookkeeping.
    fn search_round(
        &mut self,
        state: &mut SearchState,
        delay: &mut impl DelayNs,
    ) -> Result<Option<RomCode>, Error<E>> {
        if state.last_device_flag {
            state.reset();
            return Ok(None);
        }

        if !self.reset_presence(delay)? {
            state.reset();
            return Ok(None);
        }
        self.write_command(delay, RomCommand::Search)?;

        let mut id_bit_number: u8 = 1;
        let mut last_zero: u8 = 0;
        let mut idx: usize = 0;
        let mut mask: u8 = 1;
        let mut crc: u8 = 0;
        let mut complete = false;

        loop {
            let id_bit = self.read_bit(delay)?;
            let cmp_bit = self.read_bit(delay)?;

            if id_bit && cmp_bit {
                // nobody answered this position
                break;
            }

            let direction = if id_bit != cmp_bit {
                // all remaining devices agree
                id_bit
            } else {
                // true discrepancy: replay the previous round below the
                // last branch point, flip to 1 at it, take 0 on new ground
                let direction = if id_bit_number < state.last_discrepancy {
                    state.rom_code[idx] & mask != 0
                } else {
                    id_bit_number == state.last_discrepancy
                };
                if !direction {
                    last_zero = id_bit_number;
                    if last_zero < 9 {
                        state.last_family_discrepancy = last_zero;
                    }
                }
                direction
            };

            if direction {
                state.rom_code[idx] |= mask;
            } else {
                state.rom_code[idx] &= !mask;
            }
            // deselects every device whose bit disagrees
            self.write_bit(delay, direction)?;

            id_bit_number += 1;
            mask <<= 1;
            if mask == 0 {
                crc = crc8(crc, state.rom_code[idx]);
                idx += 1;
                mask = 1;
            }
            if id_bit_number > RomCode::BITS {
                complete = true;
                break;
            }
        }

        let rom = RomCode::from(state.rom_code);
        if complete && crc == 0 && !rom.is_zero() {
            state.last_discrepancy = last_zero;
            if last_zero == 0 {
                state.last_device_flag = true;
            }
            Ok(Some(rom))
        } else {
            state.reset();
            Ok(None)
        }
    }
}

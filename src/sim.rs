//! Test-only 1-Wire line simulator.
//!
//! Models the line as a wired-AND net under a virtual clock: the master's
//! pin edges and delay calls advance time, and simulated DS18B20 devices
//! decode reset pulses and time slots from the measured low durations.
//! No real time passes in tests.

use core::convert::Infallible;
use std::{cell::RefCell, rc::Rc, vec::Vec};

use embedded_hal::delay::DelayNs;

use crate::{crc::crc8_block, pin::BusPin};

/// A low pulse at least this long is a reset.
const RESET_LOW_NS: u64 = 400_000;
/// A shorter low pulse is a 1 (or the start of a read slot); longer, a 0.
const ONE_LOW_NS: u64 = 20_000;
/// How long a device holds the line low to answer a read slot with 0.
const READ_HOLD_NS: u64 = 27_000;
/// Presence pulse window relative to the reset rising edge.
const PRESENCE_FROM_NS: u64 = 15_000;
const PRESENCE_UNTIL_NS: u64 = 240_000;

#[derive(Clone, Copy)]
enum SearchPhase {
    Bit,
    Complement,
    Direction,
}

#[derive(Clone, Copy)]
enum DevState {
    /// Deselected; ignores everything until the next reset.
    Idle,
    RomCommand {
        byte: u8,
        nbits: u8,
    },
    Search {
        bit: u8,
        phase: SearchPhase,
    },
    MatchRom {
        bit: u8,
    },
    Function {
        byte: u8,
        nbits: u8,
    },
    Tx {
        buf: [u8; 9],
        nbits: u16,
        bit: u16,
    },
    RxScratchpad {
        buf: [u8; 3],
        nbits: u8,
    },
}

/// One simulated DS18B20 on the net.
pub struct SimDevice {
    rom: [u8; 8],
    /// Full-resolution raw temperature; conversions latch it masked per
    /// the configuration register.
    temperature: u16,
    temp_latch: [u8; 2],
    th: u8,
    tl: u8,
    config: u8,
    externally_powered: bool,
    /// Simulate a failed scratchpad write: payload received, not applied.
    pub drop_scratchpad_writes: bool,
    /// Flip a scratchpad bit after its CRC byte was computed.
    pub corrupt_scratchpad_crc: bool,
    state: DevState,
    presence_from: u64,
    presence_until: u64,
    pull_until: u64,
}

impl SimDevice {
    pub fn new(rom: [u8; 8]) -> SimDevice {
        let mut dev = SimDevice {
            rom,
            temperature: 0x0550, // 85 °C power-on value
            temp_latch: [0; 2],
            th: 0x4B,
            tl: 0x46,
            config: 0x7F,
            externally_powered: true,
            drop_scratchpad_writes: false,
            corrupt_scratchpad_crc: false,
            state: DevState::Idle,
            presence_from: 0,
            presence_until: 0,
            pull_until: 0,
        };
        dev.convert();
        dev
    }

    /// Build a ROM code with a correct trailing CRC byte.
    pub fn rom_for(family: u8, serial: [u8; 6]) -> [u8; 8] {
        let mut rom = [0u8; 8];
        rom[0] = family;
        rom[1..7].copy_from_slice(&serial);
        rom[7] = crc8_block(0, &rom[..7]);
        rom
    }

    pub fn with_temperature(mut self, raw: u16) -> SimDevice {
        self.temperature = raw;
        self.convert();
        self
    }

    pub fn with_config(mut self, config: u8) -> SimDevice {
        self.config = config;
        self.convert();
        self
    }

    pub fn parasite_powered(mut self) -> SimDevice {
        self.externally_powered = false;
        self
    }

    pub fn config(&self) -> u8 {
        self.config
    }

    fn rom_bit(&self, bit: u8) -> bool {
        self.rom[(bit / 8) as usize] >> (bit % 8) & 1 != 0
    }

    fn convert(&mut self) {
        let undefined = 3 - ((self.config >> 5) & 0x03);
        let raw = self.temperature & !((1u16 << undefined) - 1);
        self.temp_latch = raw.to_le_bytes();
    }

    fn scratchpad_image(&self) -> [u8; 9] {
        let mut sp = [0u8; 9];
        sp[0] = self.temp_latch[0];
        sp[1] = self.temp_latch[1];
        sp[2] = self.th;
        sp[3] = self.tl;
        sp[4] = self.config;
        sp[5] = 0xFF;
        sp[6] = 0x0C;
        sp[7] = 0x10;
        sp[8] = crc8_block(0, &sp[..8]);
        if self.corrupt_scratchpad_crc {
            sp[1] ^= 0x40;
        }
        sp
    }

    fn on_reset(&mut self, rise_at: u64) {
        self.presence_from = rise_at + PRESENCE_FROM_NS;
        self.presence_until = rise_at + PRESENCE_UNTIL_NS;
        self.pull_until = 0;
        self.state = DevState::RomCommand { byte: 0, nbits: 0 };
    }

    fn transmit_bit(&mut self, fall_at: u64, bit: bool) {
        if !bit {
            self.pull_until = fall_at + READ_HOLD_NS;
        }
    }

    fn pulls_low(&self, now: u64) -> bool {
        (now >= self.presence_from && now < self.presence_until) || now < self.pull_until
    }

    /// A master low pulse shorter than a reset ended: either a bit was
    /// written (slot value in `wrote_one`) or, if this device is
    /// transmitting, it was a read slot.
    fn on_slot(&mut self, fall_at: u64, wrote_one: bool) {
        use DevState::*;

        let state = core::mem::replace(&mut self.state, Idle);
        self.state = match state {
            Idle => Idle,

            RomCommand { mut byte, mut nbits } => {
                if wrote_one {
                    byte |= 1 << nbits;
                }
                nbits += 1;
                if nbits < 8 {
                    RomCommand { byte, nbits }
                } else {
                    match byte {
                        0xF0 => Search {
                            bit: 0,
                            phase: SearchPhase::Bit,
                        },
                        0x55 => MatchRom { bit: 0 },
                        0xCC => Function { byte: 0, nbits: 0 },
                        0x33 => {
                            let mut buf = [0u8; 9];
                            buf[..8].copy_from_slice(&self.rom);
                            Tx {
                                buf,
                                nbits: 64,
                                bit: 0,
                            }
                        }
                        // alarm search: no alarms modelled
                        _ => Idle,
                    }
                }
            }

            Search { bit, phase } => match phase {
                SearchPhase::Bit => {
                    self.transmit_bit(fall_at, self.rom_bit(bit));
                    Search {
                        bit,
                        phase: SearchPhase::Complement,
                    }
                }
                SearchPhase::Complement => {
                    self.transmit_bit(fall_at, !self.rom_bit(bit));
                    Search {
                        bit,
                        phase: SearchPhase::Direction,
                    }
                }
                SearchPhase::Direction => {
                    if wrote_one != self.rom_bit(bit) {
                        Idle
                    } else if bit == 63 {
                        Function { byte: 0, nbits: 0 }
                    } else {
                        Search {
                            bit: bit + 1,
                            phase: SearchPhase::Bit,
                        }
                    }
                }
            },

            MatchRom { bit } => {
                if wrote_one != self.rom_bit(bit) {
                    Idle
                } else if bit == 63 {
                    Function { byte: 0, nbits: 0 }
                } else {
                    MatchRom { bit: bit + 1 }
                }
            }

            Function { mut byte, mut nbits } => {
                if wrote_one {
                    byte |= 1 << nbits;
                }
                nbits += 1;
                if nbits < 8 {
                    Function { byte, nbits }
                } else {
                    match byte {
                        0x44 => {
                            self.convert();
                            Idle
                        }
                        0xBE => Tx {
                            buf: self.scratchpad_image(),
                            nbits: 72,
                            bit: 0,
                        },
                        0x4E => RxScratchpad {
                            buf: [0; 3],
                            nbits: 0,
                        },
                        0xB4 => {
                            let mut buf = [0u8; 9];
                            if self.externally_powered {
                                buf[0] = 1;
                            }
                            Tx {
                                buf,
                                nbits: 1,
                                bit: 0,
                            }
                        }
                        // copy scratchpad / recall: no bus traffic to model
                        _ => Idle,
                    }
                }
            }

            Tx { buf, nbits, bit } => {
                let out = buf[(bit / 8) as usize] >> (bit % 8) & 1 != 0;
                self.transmit_bit(fall_at, out);
                if bit + 1 == nbits {
                    Idle
                } else {
                    Tx {
                        buf,
                        nbits,
                        bit: bit + 1,
                    }
                }
            }

            RxScratchpad { mut buf, mut nbits } => {
                if wrote_one {
                    buf[(nbits / 8) as usize] |= 1 << (nbits % 8);
                }
                nbits += 1;
                if nbits < 24 {
                    RxScratchpad { buf, nbits }
                } else {
                    if !self.drop_scratchpad_writes {
                        self.th = buf[0];
                        self.tl = buf[1];
                        self.config = buf[2];
                    }
                    Idle
                }
            }
        };
    }
}

/// The shared net: virtual clock, master drive state, devices, and a log
/// of every master low pulse as `(fall, rise)` timestamps for waveform
/// assertions.
pub struct SimNet {
    now: u64,
    master_low: bool,
    fall_at: u64,
    pub devices: Vec<SimDevice>,
    pub slots: Vec<(u64, u64)>,
}

impl SimNet {
    /// Build a net and hand out the master-side pin, delay and an
    /// inspection handle.
    pub fn new(devices: Vec<SimDevice>) -> (SimPin, SimDelay, SimHandle) {
        let net = Rc::new(RefCell::new(SimNet {
            now: 0,
            master_low: false,
            fall_at: 0,
            devices,
            slots: Vec::new(),
        }));
        (
            SimPin(net.clone()),
            SimDelay(net.clone()),
            SimHandle(net),
        )
    }

    fn line_is_high(&self) -> bool {
        if self.master_low {
            return false;
        }
        let now = self.now;
        !self.devices.iter().any(|dev| dev.pulls_low(now))
    }

    fn on_fall(&mut self) {
        self.master_low = true;
        self.fall_at = self.now;
    }

    fn on_rise(&mut self) {
        self.master_low = false;
        let fall_at = self.fall_at;
        let duration = self.now - fall_at;
        self.slots.push((fall_at, self.now));

        if duration >= RESET_LOW_NS {
            let rise_at = self.now;
            for dev in &mut self.devices {
                dev.on_reset(rise_at);
            }
        } else {
            let wrote_one = duration < ONE_LOW_NS;
            for dev in &mut self.devices {
                dev.on_slot(fall_at, wrote_one);
            }
        }
    }
}

/// Inspection handle kept by tests.
pub struct SimHandle(Rc<RefCell<SimNet>>);

impl SimHandle {
    pub fn with<R>(&self, f: impl FnOnce(&mut SimNet) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

/// The master's side of the line.
pub struct SimPin(Rc<RefCell<SimNet>>);

impl BusPin for SimPin {
    type Error = Infallible;

    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.borrow().line_is_high())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow().line_is_high())
    }

    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut net = self.0.borrow_mut();
        if !net.master_low {
            net.on_fall();
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut net = self.0.borrow_mut();
        if net.master_low {
            net.on_rise();
        }
        Ok(())
    }
}

/// Advances the virtual clock instead of sleeping.
pub struct SimDelay(Rc<RefCell<SimNet>>);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now += ns as u64;
    }
}

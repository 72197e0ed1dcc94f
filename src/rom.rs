use crate::crc::crc8_block;
use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};

/// 64-bit ROM code: family byte, 6-byte serial, CRC-8 over the first 7.
///
/// Byte 0 is the family code; the device transmits it first (LSB-first
/// wire order). For a genuine device, CRC-8 over all 8 bytes is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct RomCode {
    raw: [u8; Self::BYTES as usize],
}

impl Default for RomCode {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for RomCode {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        RomCode { raw }
    }
}

impl From<RomCode> for [u8; RomCode::BYTES as usize] {
    fn from(rom: RomCode) -> [u8; RomCode::BYTES as usize] {
        rom.raw
    }
}

impl From<u64> for RomCode {
    fn from(raw: u64) -> Self {
        RomCode {
            raw: raw.to_le_bytes(),
        }
    }
}

impl From<RomCode> for u64 {
    fn from(rom: RomCode) -> u64 {
        u64::from_le_bytes(rom.raw)
    }
}

impl Deref for RomCode {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for RomCode {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for RomCode {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for RomCode {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl RomCode {
    /// The length of a ROM code in bytes
    pub const BYTES: u8 = 8;

    /// The length of a ROM code in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    /// CRC-8 over all 8 bytes accumulates to zero for a genuine code.
    pub fn crc_is_valid(&self) -> bool {
        crc8_block(0, self.as_ref()) == 0
    }

    pub fn is_zero(&self) -> bool {
        self.raw.iter().all(|byte| *byte == 0)
    }
}

/// Error type
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RomCodeError {
    NotEnough,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    if c.is_ascii_digit() {
        Some((c as u32 - '0' as u32) as _)
    } else if ('a'..='f').contains(&c) {
        Some((c as u32 - 'a' as u32 + 10) as _)
    } else if ('A'..='F').contains(&c) {
        Some((c as u32 - 'A' as u32 + 10) as _)
    } else {
        None
    }
}

impl FromStr for RomCode {
    type Err = RomCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rom = RomCode::default();
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for i in 0..Self::BYTES as usize {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        rom[i] = (h << 4) | l;
                    }
                    _ => return Err(RomCodeError::Invalid),
                },
                _ => return Err(RomCodeError::NotEnough),
            }
        }

        Ok(rom)
    }
}

/// 16 uppercase hex characters, no separators, family byte first.
impl Display for RomCode {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

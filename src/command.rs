pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM-level commands, shared by every 1-Wire device family.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RomCommand {
    Search = 0xF0,
    Read = 0x33,
    Match = 0x55,
    Skip = 0xCC,
    /// Alarm-search rounds are not implemented; the encoding is fixed by
    /// the device family and kept for completeness.
    AlarmSearch = 0xEC,
}

impl OpCode for RomCommand {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// DS18B20 function commands, issued after addressing.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FunctionCommand {
    Convert = 0x44,
    WriteScratchpad = 0x4E,
    ReadScratchpad = 0xBE,
    CopyScratchpad = 0x48,
    RecallEeprom = 0xB8,
    ReadPowerSupply = 0xB4,
}

impl OpCode for FunctionCommand {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

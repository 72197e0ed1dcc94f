use core::fmt::Debug;

/// Error type
///
/// No failure here is fatal: the bus stays usable and retry policy is
/// left entirely to the caller.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: Sized + Debug> {
    /// Wire not high when it should idle high (shorted or missing pullup)
    WireFault,
    /// No presence pulse after a reset
    NoPresence,
    /// Nonzero CRC-8 residue over a block that includes its CRC byte
    CrcMismatch(u8),
    /// Expected family code vs. the one found
    FamilyCodeMismatch(u8, u8),
    /// Configuration byte does not encode a 9..12-bit resolution
    InvalidResolution(u8),
    /// A scratchpad write did not read back as written
    VerifyFailed,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

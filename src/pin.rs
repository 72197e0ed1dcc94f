use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Open-drain contract for the data line.
///
/// `set_low` drives the line, `set_high` releases it so the pullup (or a
/// device) determines the level.
pub trait BusPin {
    type Error: Error;

    /// Is the input pin high?
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    /// Is the input pin low?
    fn is_low(&mut self) -> Result<bool, Self::Error>;

    /// Drives the pin low
    fn set_low(&mut self) -> Result<(), Self::Error>;

    /// Releases the pin
    ///
    /// *NOTE* the actual electrical state of the line may still be low,
    /// e.g. while a device holds it down
    fn set_high(&mut self) -> Result<(), Self::Error>;
}

/// Single line config wrapper
impl<IO> BusPin for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }
}

/// Dual line config wrapper
impl<E, I, O> BusPin for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }
}

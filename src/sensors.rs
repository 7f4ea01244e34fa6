use core::fmt;

/// Temperature (°C) and relative humidity (%) from the always-on sensor
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Climate {
    pub temperature: f32,
    pub humidity: f32,
}

/// PM2.5 and PM10 concentrations in µg/m³ from the duty-cycled sensor
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Particulates {
    pub pm25: f32,
    pub pm10: f32,
}

/// Driver-level failure of a single sensor transaction.
///
/// Recoverable: the station skips that sensor's fields for the tick and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorReadError {
    /// The sensor did not answer in time
    Timeout,
    /// The frame arrived but its checksum did not match
    Checksum,
    /// Bytes arrived that do not form a valid frame
    Framing,
    /// The bus or pin reported an error
    Bus,
    /// A duty-cycled sensor was read while asleep
    NotAwake,
}

impl fmt::Display for SensorReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SensorReadError::Timeout => "sensor timed out",
            SensorReadError::Checksum => "checksum mismatch",
            SensorReadError::Framing => "malformed frame",
            SensorReadError::Bus => "bus error",
            SensorReadError::NotAwake => "sensor is asleep",
        };
        f.write_str(msg)
    }
}

/// A sensor that can be read at any time.
pub trait ContinuousSensor {
    fn read(&mut self) -> Result<Climate, SensorReadError>;
}

/// A sensor with explicit power states; `read` is only valid between `wake` and `sleep`.
pub trait DutyCycledSensor {
    fn wake(&mut self) -> Result<(), SensorReadError>;
    fn sleep(&mut self) -> Result<(), SensorReadError>;
    fn read(&mut self) -> Result<Particulates, SensorReadError>;
}

impl<T: ContinuousSensor + ?Sized> ContinuousSensor for &mut T {
    fn read(&mut self) -> Result<Climate, SensorReadError> {
        T::read(self)
    }
}

impl<T: DutyCycledSensor + ?Sized> DutyCycledSensor for &mut T {
    fn wake(&mut self) -> Result<(), SensorReadError> {
        T::wake(self)
    }

    fn sleep(&mut self) -> Result<(), SensorReadError> {
        T::sleep(self)
    }

    fn read(&mut self) -> Result<Particulates, SensorReadError> {
        T::read(self)
    }
}

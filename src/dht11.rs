//! DHT11 single-wire temperature/humidity sensor.
//!
//! Timing-sensitive: build with optimizations, the bit decoding polls the line in
//! one microsecond steps.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::sensors::{Climate, ContinuousSensor, SensorReadError};

/// Host start signal, the datasheet asks for at least 18ms
const START_LOW_MS: u32 = 18;
/// Upper bound for any single line transition
const EDGE_TIMEOUT_US: u32 = 100;
/// High pulses longer than this are ones (26-28us zero, 70us one)
const ONE_THRESHOLD_US: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dht11Error<E> {
    Pin(E),
    Timeout,
    Checksum,
}

impl<E: fmt::Debug> fmt::Display for Dht11Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dht11Error::Pin(e) => write!(f, "pin error: {:?}", e),
            Dht11Error::Timeout => f.write_str("no response from DHT11"),
            Dht11Error::Checksum => f.write_str("DHT11 checksum mismatch"),
        }
    }
}

impl<E> From<Dht11Error<E>> for SensorReadError {
    fn from(e: Dht11Error<E>) -> Self {
        match e {
            Dht11Error::Pin(_) => SensorReadError::Bus,
            Dht11Error::Timeout => SensorReadError::Timeout,
            Dht11Error::Checksum => SensorReadError::Checksum,
        }
    }
}

/// DHT11 on an open-drain capable pin
pub struct Dht11<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> Dht11<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(pin: P, delay: D) -> Self {
        Self { pin, delay }
    }

    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }

    /// Runs one full transaction and decodes it
    pub fn measure(&mut self) -> Result<Climate, Dht11Error<P::Error>> {
        let frame = self.read_frame()?;
        decode(frame)
    }

    fn read_frame(&mut self) -> Result<[u8; 5], Dht11Error<P::Error>> {
        self.pin.set_low().map_err(Dht11Error::Pin)?;
        self.delay.delay_ms(START_LOW_MS);
        self.pin.set_high().map_err(Dht11Error::Pin)?;

        // Response: the sensor pulls low ~80us then high ~80us
        self.wait_for(false)?;
        self.wait_for(true)?;
        self.wait_for(false)?;

        let mut frame = [0u8; 5];
        for byte in frame.iter_mut() {
            for _ in 0..8 {
                // 50us low preamble, then the data-carrying high pulse
                self.wait_for(true)?;
                let high_us = self.wait_for(false)?;
                *byte = (*byte << 1) | u8::from(high_us > ONE_THRESHOLD_US);
            }
        }
        Ok(frame)
    }

    /// Polls until the line reaches `high`
    /// returns how many microseconds that took
    fn wait_for(&mut self, high: bool) -> Result<u32, Dht11Error<P::Error>> {
        for elapsed in 0..EDGE_TIMEOUT_US {
            if self.pin.is_high().map_err(Dht11Error::Pin)? == high {
                return Ok(elapsed);
            }
            self.delay.delay_us(1);
        }
        Err(Dht11Error::Timeout)
    }
}

impl<P, D> ContinuousSensor for Dht11<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    fn read(&mut self) -> Result<Climate, SensorReadError> {
        self.measure().map_err(SensorReadError::from)
    }
}

/// Validates and converts a raw 5-byte frame
/// frame: humidity int, humidity dec, temperature int, temperature dec (bit 7 = sign), checksum
pub fn decode<E>(frame: [u8; 5]) -> Result<Climate, Dht11Error<E>> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return Err(Dht11Error::Checksum);
    }
    let humidity = frame[0] as f32 + frame[1] as f32 / 10.0;
    let magnitude = frame[2] as f32 + (frame[3] & 0x7f) as f32 / 10.0;
    let temperature = if frame[3] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };
    Ok(Climate {
        temperature,
        humidity,
    })
}

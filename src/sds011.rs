//! Nova SDS011 particulate sensor over UART (9600 8N1).

use core::fmt;

use embedded_io::{Read, ReadExactError, Write};

use crate::sensors::{DutyCycledSensor, Particulates, SensorReadError};

const HEAD: u8 = 0xAA;
const TAIL: u8 = 0xAB;
const COMMAND: u8 = 0xB4;
const DATA_REPLY: u8 = 0xC0;
const COMMAND_REPLY: u8 = 0xC5;

const CMD_QUERY: u8 = 0x04;
const CMD_SLEEP_WORK: u8 = 0x06;
const SET: u8 = 0x01;
const MODE_SLEEP: u8 = 0x00;
const MODE_WORK: u8 = 0x01;

pub const COMMAND_LEN: usize = 19;
pub const REPLY_LEN: usize = 10;

/// Bytes to skip while hunting for a frame header before giving up
const MAX_SCAN_BYTES: usize = 3 * REPLY_LEN;
/// Frames to inspect before giving up on a data reply
const MAX_FRAMES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sds011Error<E> {
    Serial(E),
    /// The line went quiet mid-frame or before any frame
    NoData,
    Framing,
    Checksum,
    NotAwake,
}

impl<E: fmt::Debug> fmt::Display for Sds011Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sds011Error::Serial(e) => write!(f, "serial error: {:?}", e),
            Sds011Error::NoData => f.write_str("no data from SDS011"),
            Sds011Error::Framing => f.write_str("malformed SDS011 frame"),
            Sds011Error::Checksum => f.write_str("SDS011 checksum mismatch"),
            Sds011Error::NotAwake => f.write_str("SDS011 is asleep"),
        }
    }
}

impl<E> From<ReadExactError<E>> for Sds011Error<E> {
    fn from(e: ReadExactError<E>) -> Self {
        match e {
            ReadExactError::UnexpectedEof => Sds011Error::NoData,
            ReadExactError::Other(e) => Sds011Error::Serial(e),
        }
    }
}

impl<E> From<Sds011Error<E>> for SensorReadError {
    fn from(e: Sds011Error<E>) -> Self {
        match e {
            Sds011Error::Serial(_) => SensorReadError::Bus,
            Sds011Error::NoData => SensorReadError::Timeout,
            Sds011Error::Framing => SensorReadError::Framing,
            Sds011Error::Checksum => SensorReadError::Checksum,
            Sds011Error::NotAwake => SensorReadError::NotAwake,
        }
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Builds a host-to-sensor command addressed to every sensor on the line
pub fn command(data: [u8; 3]) -> [u8; COMMAND_LEN] {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0] = HEAD;
    frame[1] = COMMAND;
    frame[2..5].copy_from_slice(&data);
    frame[15] = 0xFF;
    frame[16] = 0xFF;
    frame[17] = checksum(&frame[2..17]);
    frame[18] = TAIL;
    frame
}

/// Parses a data reply into concentrations in µg/m³
pub fn parse_data_reply<E>(frame: &[u8; REPLY_LEN]) -> Result<Particulates, Sds011Error<E>> {
    if frame[0] != HEAD || frame[1] != DATA_REPLY || frame[9] != TAIL {
        return Err(Sds011Error::Framing);
    }
    if checksum(&frame[2..8]) != frame[8] {
        return Err(Sds011Error::Checksum);
    }
    let pm25 = u16::from_le_bytes([frame[2], frame[3]]);
    let pm10 = u16::from_le_bytes([frame[4], frame[5]]);
    Ok(Particulates {
        pm25: pm25 as f32 / 10.0,
        pm10: pm10 as f32 / 10.0,
    })
}

pub struct Sds011<S> {
    serial: S,
    awake: bool,
}

impl<S, E> Sds011<S>
where
    S: Read<Error = E> + Write<Error = E>,
{
    /// The sensor powers up working
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            awake: true,
        }
    }

    pub fn release(self) -> S {
        self.serial
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Switches the fan and laser on or off
    pub fn set_working(&mut self, working: bool) -> Result<(), Sds011Error<E>> {
        let mode = if working { MODE_WORK } else { MODE_SLEEP };
        self.send(command([CMD_SLEEP_WORK, SET, mode]))?;
        self.awake = working;
        Ok(())
    }

    /// Requests a measurement and waits for the data reply
    pub fn query(&mut self) -> Result<Particulates, Sds011Error<E>> {
        if !self.awake {
            return Err(Sds011Error::NotAwake);
        }
        self.send(command([CMD_QUERY, 0, 0]))?;

        let mut last = Sds011Error::NoData;
        for _ in 0..MAX_FRAMES {
            let frame = self.next_frame()?;
            match frame[1] {
                DATA_REPLY => match parse_data_reply(&frame) {
                    Ok(p) => return Ok(p),
                    Err(e) => last = e,
                },
                // acknowledgement of an earlier command
                COMMAND_REPLY => continue,
                _ => last = Sds011Error::Framing,
            }
        }
        Err(last)
    }

    fn send(&mut self, frame: [u8; COMMAND_LEN]) -> Result<(), Sds011Error<E>> {
        self.serial.write_all(&frame).map_err(Sds011Error::Serial)?;
        self.serial.flush().map_err(Sds011Error::Serial)
    }

    /// Skips to the next header and reads one reply-sized frame
    fn next_frame(&mut self) -> Result<[u8; REPLY_LEN], Sds011Error<E>> {
        let mut frame = [0u8; REPLY_LEN];
        let mut byte = [0u8; 1];
        for _ in 0..MAX_SCAN_BYTES {
            self.serial.read_exact(&mut byte)?;
            if byte[0] == HEAD {
                frame[0] = HEAD;
                self.serial.read_exact(&mut frame[1..])?;
                return Ok(frame);
            }
        }
        Err(Sds011Error::Framing)
    }
}

impl<S, E> DutyCycledSensor for Sds011<S>
where
    S: Read<Error = E> + Write<Error = E>,
{
    fn wake(&mut self) -> Result<(), SensorReadError> {
        self.set_working(true).map_err(SensorReadError::from)
    }

    fn sleep(&mut self) -> Result<(), SensorReadError> {
        self.set_working(false).map_err(SensorReadError::from)
    }

    fn read(&mut self) -> Result<Particulates, SensorReadError> {
        self.query().map_err(SensorReadError::from)
    }
}

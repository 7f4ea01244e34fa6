//! Merging of independently timed sensor fields into one telemetry record.

use core::fmt;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::clock::DateTimeComponents;
use crate::sensors::{Climate, Particulates};

/// Encoded message buffer; the longest message is well under this
pub const MESSAGE_CAPACITY: usize = 192;

/// A subset of the record's measurements, as produced by one sensor read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fields {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub pm25: Option<f32>,
    pub pm10: Option<f32>,
}

impl Fields {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.humidity.is_none()
            && self.pm25.is_none()
            && self.pm10.is_none()
    }
}

impl From<Climate> for Fields {
    fn from(c: Climate) -> Self {
        Self {
            temperature: Some(c.temperature),
            humidity: Some(c.humidity),
            ..Default::default()
        }
    }
}

impl From<Particulates> for Fields {
    fn from(p: Particulates) -> Self {
        Self {
            pm25: Some(p.pm25),
            pm10: Some(p.pm10),
            ..Default::default()
        }
    }
}

/// The in-progress record. Never leaves the aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryRecord {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub pm25: Option<f32>,
    pub pm10: Option<f32>,
    pub timestamp: Option<DateTimeComponents>,
}

impl TelemetryRecord {
    pub fn is_complete(&self) -> bool {
        self.temperature.is_some()
            && self.humidity.is_some()
            && self.pm25.is_some()
            && self.pm10.is_some()
    }

    /// Snapshot with every measurement present, or `None` while any is missing
    fn completed(&self, timestamp: DateTimeComponents) -> Option<CompleteRecord> {
        Some(CompleteRecord {
            temperature: self.temperature?,
            humidity: self.humidity?,
            pm25: self.pm25?,
            pm10: self.pm10?,
            timestamp,
        })
    }
}

/// An immutable, fully assembled record as handed to batch sinks
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompleteRecord {
    pub temperature: f32,
    pub humidity: f32,
    pub pm25: f32,
    pub pm10: f32,
    pub timestamp: DateTimeComponents,
}

/// Accumulates partial fields until all four measurements are present.
#[derive(Default)]
pub struct TelemetryAggregator {
    pending: TelemetryRecord,
}

impl TelemetryAggregator {
    pub const fn new() -> Self {
        Self {
            pending: TelemetryRecord {
                temperature: None,
                humidity: None,
                pm25: None,
                pm10: None,
                timestamp: None,
            },
        }
    }

    /// Merges the present fields, later values overwriting earlier ones within a cycle.
    /// param fields: the fields reported by one sensor read
    /// param now: timestamp to stamp on the record if this call completes it
    /// returns the completed record once, after which the aggregator starts over
    pub fn apply(&mut self, fields: &Fields, now: DateTimeComponents) -> Option<CompleteRecord> {
        let pending = &mut self.pending;
        if let Some(v) = fields.temperature {
            pending.temperature = Some(v);
        }
        if let Some(v) = fields.humidity {
            pending.humidity = Some(v);
        }
        if let Some(v) = fields.pm25 {
            pending.pm25 = Some(v);
        }
        if let Some(v) = fields.pm10 {
            pending.pm10 = Some(v);
        }

        if !pending.is_complete() {
            return None;
        }
        pending.timestamp = Some(now);
        let record = pending.completed(now);
        self.reset();
        record
    }

    pub fn pending(&self) -> &TelemetryRecord {
        &self.pending
    }

    pub fn reset(&mut self) {
        self.pending = TelemetryRecord::default();
    }
}

/// Wire representation of a complete record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub year: u16,
    pub month: u8,
    pub mday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub temp: f32,
    pub hum: f32,
    pub pm25: f32,
    pub pm10: f32,
}

impl From<&CompleteRecord> for TelemetryMessage {
    fn from(r: &CompleteRecord) -> Self {
        Self {
            year: r.timestamp.year,
            month: r.timestamp.month,
            mday: r.timestamp.day,
            hour: r.timestamp.hour,
            minute: r.timestamp.minute,
            second: r.timestamp.second,
            temp: r.temperature,
            hum: r.humidity,
            pm25: r.pm25,
            pm10: r.pm10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The message did not fit `MESSAGE_CAPACITY`
    BufferFull,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("telemetry message does not fit its buffer")
    }
}

/// Encodes a complete record as a JSON object
pub fn encode(record: &CompleteRecord) -> Result<String<MESSAGE_CAPACITY>, EncodeError> {
    serde_json_core::to_string(&TelemetryMessage::from(record)).map_err(|_| EncodeError::BufferFull)
}

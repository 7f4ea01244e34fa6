//! Batch sink that ships complete records to the network.

use embedded_io::Write;

use crate::sinks::{CompleteSink, SinkDeliveryError};
use crate::telemetry::{encode, CompleteRecord};

/// Anything that can carry an encoded message to the broker
pub trait Uplink {
    type Error;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;
}

/// Uplink to a network co-processor over a serial line.
///
/// Each message is one line: `<topic> <payload>\r\n`. The co-processor owns the Wi-Fi and
/// MQTT sessions.
pub struct SerialUplink<W: Write> {
    port: W,
}

impl<W: Write> SerialUplink<W> {
    pub fn new(port: W) -> Self {
        Self { port }
    }

    pub fn release(self) -> W {
        self.port
    }
}

impl<W: Write> Uplink for SerialUplink<W> {
    type Error = W::Error;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        self.port.write_all(topic.as_bytes())?;
        self.port.write_all(b" ")?;
        self.port.write_all(payload)?;
        self.port.write_all(b"\r\n")?;
        self.port.flush()
    }
}

pub struct TelemetryPublisher<'t, U: Uplink> {
    uplink: U,
    topic: &'t str,
    published: u32,
}

impl<'t, U: Uplink> TelemetryPublisher<'t, U> {
    pub fn new(uplink: U, topic: &'t str) -> Self {
        Self {
            uplink,
            topic,
            published: 0,
        }
    }

    /// Number of records handed to the uplink so far
    pub fn published(&self) -> u32 {
        self.published
    }

    pub fn uplink(&self) -> &U {
        &self.uplink
    }
}

impl<U: Uplink> CompleteSink for TelemetryPublisher<'_, U> {
    fn on_complete(&mut self, record: &CompleteRecord) -> Result<(), SinkDeliveryError> {
        let message = encode(record).map_err(|_| SinkDeliveryError::Encoding)?;
        self.uplink
            .publish(self.topic, message.as_bytes())
            .map_err(|_| SinkDeliveryError::Transport)?;
        self.published += 1;
        debug!("Published record {} to {}", self.published, self.topic);
        Ok(())
    }
}

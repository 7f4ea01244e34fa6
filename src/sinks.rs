//! Fan-out of telemetry to subscribers.
//!
//! Live sinks (the display) see every partial field group as it arrives. Batch sinks
//! (the publisher) see each completed record exactly once. A failing sink is logged and
//! skipped; the others are still served.

use core::fmt;

use heapless::Vec;

use crate::clock::DateTimeComponents;
use crate::telemetry::{CompleteRecord, Fields};

/// A subscriber failed to accept a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SinkDeliveryError {
    /// The display did not accept the write
    Display,
    /// The record could not be encoded
    Encoding,
    /// The uplink did not accept the message
    Transport,
}

impl fmt::Display for SinkDeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SinkDeliveryError::Display => "display write failed",
            SinkDeliveryError::Encoding => "record encoding failed",
            SinkDeliveryError::Transport => "uplink rejected message",
        };
        f.write_str(msg)
    }
}

/// Receives every partial update as it arrives.
pub trait PartialSink {
    fn on_partial(&mut self, fields: &Fields) -> Result<(), SinkDeliveryError>;

    /// Called once per tick with the current time
    fn on_time(&mut self, _now: &DateTimeComponents) -> Result<(), SinkDeliveryError> {
        Ok(())
    }
}

/// Receives only fully assembled records.
pub trait CompleteSink {
    fn on_complete(&mut self, record: &CompleteRecord) -> Result<(), SinkDeliveryError>;
}

/// A sink that wants both kinds of delivery
pub trait DualSink: PartialSink + CompleteSink {}

impl<T: PartialSink + CompleteSink> DualSink for T {}

/// A borrowed subscriber, tagged with the deliveries it wants
pub enum SinkRef<'a> {
    Live(&'a mut dyn PartialSink),
    Batch(&'a mut dyn CompleteSink),
    Dual(&'a mut dyn DualSink),
}

impl SinkRef<'_> {
    fn wants_partial(&self) -> bool {
        matches!(self, SinkRef::Live(_) | SinkRef::Dual(_))
    }

    fn wants_complete(&self) -> bool {
        matches!(self, SinkRef::Batch(_) | SinkRef::Dual(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SinkId(u32);

impl SinkId {
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Identity and capability flags of a registered sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SinkRegistration {
    pub id: SinkId,
    pub receives_partial: bool,
    pub receives_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistryFull;

impl fmt::Display for RegistryFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sink registry is full")
    }
}

/// How one broadcast went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Entry<'a> {
    id: SinkId,
    sink: SinkRef<'a>,
}

/// Ordered list of at most `N` subscribers
pub struct SinkRegistry<'a, const N: usize> {
    entries: Vec<Entry<'a>, N>,
    next_id: u32,
}

/// Iterator over the registrations of a [`SinkRegistry`], in delivery order
pub struct Registrations<'r, 'a> {
    entries: core::slice::Iter<'r, Entry<'a>>,
}

impl Iterator for Registrations<'_, '_> {
    type Item = SinkRegistration;

    fn next(&mut self) -> Option<SinkRegistration> {
        self.entries.next().map(|e| SinkRegistration {
            id: e.id,
            receives_partial: e.sink.wants_partial(),
            receives_complete: e.sink.wants_complete(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<'a, const N: usize> SinkRegistry<'a, N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Appends a subscriber. Delivery follows registration order.
    /// Ids are never reused; once they run out, registration is refused.
    pub fn register(&mut self, sink: SinkRef<'a>) -> Result<SinkId, RegistryFull> {
        let next_id = self.next_id.checked_add(1).ok_or(RegistryFull)?;
        let id = SinkId(self.next_id);
        self.entries
            .push(Entry { id, sink })
            .map_err(|_| RegistryFull)?;
        self.next_id = next_id;
        Ok(id)
    }

    pub fn register_live(&mut self, sink: &'a mut dyn PartialSink) -> Result<SinkId, RegistryFull> {
        self.register(SinkRef::Live(sink))
    }

    pub fn register_batch(
        &mut self,
        sink: &'a mut dyn CompleteSink,
    ) -> Result<SinkId, RegistryFull> {
        self.register(SinkRef::Batch(sink))
    }

    /// Removes a subscriber, keeping the order of the rest
    /// returns false if `id` was not registered
    pub fn unregister(&mut self, id: SinkId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn registrations(&self) -> Registrations<'_, 'a> {
        Registrations {
            entries: self.entries.iter(),
        }
    }

    /// Delivers a partial field group to every live sink
    pub fn broadcast_partial(&mut self, fields: &Fields) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for entry in self.entries.iter_mut() {
            let result = match &mut entry.sink {
                SinkRef::Live(s) => s.on_partial(fields),
                SinkRef::Dual(s) => s.on_partial(fields),
                SinkRef::Batch(_) => continue,
            };
            Self::record(&mut report, entry.id, result);
        }
        report
    }

    /// Pushes the current time to every live sink
    pub fn broadcast_time(&mut self, now: &DateTimeComponents) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for entry in self.entries.iter_mut() {
            let result = match &mut entry.sink {
                SinkRef::Live(s) => s.on_time(now),
                SinkRef::Dual(s) => s.on_time(now),
                SinkRef::Batch(_) => continue,
            };
            Self::record(&mut report, entry.id, result);
        }
        report
    }

    /// Delivers a completed record to every batch sink
    pub fn broadcast_complete(&mut self, record: &CompleteRecord) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for entry in self.entries.iter_mut() {
            let result = match &mut entry.sink {
                SinkRef::Batch(s) => s.on_complete(record),
                SinkRef::Dual(s) => s.on_complete(record),
                SinkRef::Live(_) => continue,
            };
            Self::record(&mut report, entry.id, result);
        }
        report
    }

    fn record(report: &mut DeliveryReport, id: SinkId, result: Result<(), SinkDeliveryError>) {
        match result {
            Ok(()) => report.delivered = report.delivered.saturating_add(1),
            Err(e) => {
                warn!("Sink {} rejected delivery: {}", id.index(), e);
                report.failed = report.failed.saturating_add(1);
            }
        }
    }
}

impl<const N: usize> Default for SinkRegistry<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

//! The control loop: one read/aggregate/dispatch step per consumed tick.

use embedded_hal::delay::DelayNs;

use crate::clock::{Clock, DateTimeComponents};
use crate::config::StationConfig;
use crate::duty::{DutyCycleController, DutyState, DutyStep};
use crate::sensors::{Climate, ContinuousSensor, DutyCycledSensor, SensorReadError};
use crate::sinks::SinkRegistry;
use crate::telemetry::{CompleteRecord, Fields, TelemetryAggregator, TelemetryRecord};
use crate::timer::Scheduler;

/// What happened during one consumed tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// 1-based tick counter
    pub tick: u32,
    pub time: DateTimeComponents,
    pub climate: Result<Climate, SensorReadError>,
    pub duty: DutyStep,
    pub completed: Option<CompleteRecord>,
    /// Deliveries rejected by sinks during this tick
    pub sink_failures: usize,
}

/// Owns the sensors, the aggregation state and the subscriber list.
///
/// Sensors are only touched from [`Station::poll`], and only when the scheduler hands out a
/// tick, so the duty-cycled sensor sees exactly one transition per period.
pub struct Station<'a, C, P, K, const N: usize> {
    scheduler: Scheduler<'a>,
    climate: C,
    particulate: P,
    clock: K,
    duty: DutyCycleController,
    aggregator: TelemetryAggregator,
    sinks: SinkRegistry<'a, N>,
    idle_delay_ms: u32,
    ticks: u32,
    records: u32,
}

impl<'a, C, P, K, const N: usize> Station<'a, C, P, K, N>
where
    C: ContinuousSensor,
    P: DutyCycledSensor,
    K: Clock,
{
    pub fn new(
        config: &StationConfig,
        scheduler: Scheduler<'a>,
        climate: C,
        particulate: P,
        clock: K,
        sinks: SinkRegistry<'a, N>,
    ) -> Self {
        Self {
            scheduler,
            climate,
            particulate,
            clock,
            duty: DutyCycleController::new(config.initial_duty_state),
            aggregator: TelemetryAggregator::new(),
            sinks,
            idle_delay_ms: config.idle_delay_ms,
            ticks: 0,
            records: 0,
        }
    }

    /// Runs one step if a tick is pending
    /// returns None without touching any sensor otherwise
    pub fn poll(&mut self) -> Option<TickReport> {
        if self.scheduler.poll_and_consume() {
            Some(self.step())
        } else {
            None
        }
    }

    /// Polls forever, sleeping `idle_delay_ms` between empty polls
    pub fn run<D: DelayNs>(&mut self, delay: &mut D) -> ! {
        loop {
            if self.poll().is_none() {
                delay.delay_ms(self.idle_delay_ms);
            }
        }
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Number of complete records dispatched so far
    pub fn records(&self) -> u32 {
        self.records
    }

    pub fn duty_state(&self) -> DutyState {
        self.duty.state()
    }

    pub fn pending(&self) -> &TelemetryRecord {
        self.aggregator.pending()
    }

    pub fn sinks_mut(&mut self) -> &mut SinkRegistry<'a, N> {
        &mut self.sinks
    }

    fn step(&mut self) -> TickReport {
        self.ticks = self.ticks.wrapping_add(1);
        let now = self.clock.now();
        let mut sink_failures = self.sinks.broadcast_time(&now).failed;
        let mut completed = None;

        let climate = self.climate.read();
        match climate {
            Ok(climate) => {
                let failed = self.dispatch(&Fields::from(climate), now, &mut completed);
                sink_failures = sink_failures.saturating_add(failed);
            }
            Err(e) => warn!("Climate read failed on tick {}: {}", self.ticks, e),
        }

        let duty = self.duty.step(&mut self.particulate);
        if let Some(particulates) = duty.particulates() {
            let failed = self.dispatch(&Fields::from(particulates), now, &mut completed);
            sink_failures = sink_failures.saturating_add(failed);
        }

        TickReport {
            tick: self.ticks,
            time: now,
            climate,
            duty,
            completed,
            sink_failures,
        }
    }

    /// Merges one field group and fans it out, then the record if it completed.
    /// Partials always reach the sinks before the record they complete.
    /// returns the number of rejected deliveries
    fn dispatch(
        &mut self,
        fields: &Fields,
        now: DateTimeComponents,
        completed: &mut Option<CompleteRecord>,
    ) -> usize {
        let record = self.aggregator.apply(fields, now);
        let mut failed = self.sinks.broadcast_partial(fields).failed;

        if let Some(record) = record {
            self.records = self.records.wrapping_add(1);
            info!("Record {} complete at {}", self.records, record.timestamp);
            failed = failed.saturating_add(self.sinks.broadcast_complete(&record).failed);
            *completed = Some(record);
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Particulates;
    use crate::sinks::{PartialSink, SinkDeliveryError};
    use crate::timer::{PeriodicTimer, TickFlag};

    struct Manual;

    impl PeriodicTimer for Manual {
        fn start(&mut self, _period_ms: u32) {}
    }

    struct Thermo;

    impl ContinuousSensor for Thermo {
        fn read(&mut self) -> Result<Climate, SensorReadError> {
            Ok(Climate {
                temperature: 20.0,
                humidity: 40.0,
            })
        }
    }

    struct Dust;

    impl DutyCycledSensor for Dust {
        fn wake(&mut self) -> Result<(), SensorReadError> {
            Ok(())
        }

        fn sleep(&mut self) -> Result<(), SensorReadError> {
            Ok(())
        }

        fn read(&mut self) -> Result<Particulates, SensorReadError> {
            Ok(Particulates {
                pm25: 5.0,
                pm10: 9.0,
            })
        }
    }

    struct Frozen;

    impl Clock for Frozen {
        fn now(&mut self) -> DateTimeComponents {
            DateTimeComponents::new(2024, 6, 1, 12, 0, 0)
        }
    }

    struct Broken;

    impl PartialSink for Broken {
        fn on_partial(&mut self, _fields: &Fields) -> Result<(), SinkDeliveryError> {
            Err(SinkDeliveryError::Display)
        }
    }

    #[test]
    fn starting_awake_completes_on_the_first_tick() {
        let flag = TickFlag::new();
        let scheduler = Scheduler::configure(&mut Manual, &flag, 1_000).unwrap();
        let config = StationConfig::default().with_initial_duty_state(DutyState::Awake);
        let mut station: Station<'_, _, _, _, 1> =
            Station::new(&config, scheduler, Thermo, Dust, Frozen, SinkRegistry::new());

        flag.raise();
        let report = station.poll().unwrap();
        assert_eq!(report.tick, 1);
        let record = report.completed.unwrap();
        assert_eq!(record.pm10, 9.0);
        assert_eq!(record.timestamp, DateTimeComponents::new(2024, 6, 1, 12, 0, 0));
        assert_eq!(station.records(), 1);
        assert_eq!(station.duty_state(), DutyState::Asleep);
        assert!(!station.pending().is_complete());
    }

    #[test]
    fn sink_failures_are_counted_not_fatal() {
        let flag = TickFlag::new();
        let mut broken = Broken;
        let mut sinks: SinkRegistry<'_, 1> = SinkRegistry::new();
        sinks.register_live(&mut broken).unwrap();
        let scheduler = Scheduler::configure(&mut Manual, &flag, 1_000).unwrap();
        let config = StationConfig::default();
        let mut station = Station::new(&config, scheduler, Thermo, Dust, Frozen, sinks);

        flag.raise();
        let first = station.poll().unwrap();
        // climate only; the default on_time succeeds
        assert_eq!(first.sink_failures, 1);
        flag.raise();
        let second = station.poll().unwrap();
        assert_eq!(second.sink_failures, 2);
        assert!(second.completed.is_some());
        assert_eq!(station.ticks(), 2);
    }

    #[test]
    fn report_carries_what_the_tick_read() {
        let flag = TickFlag::new();
        let scheduler = Scheduler::configure(&mut Manual, &flag, 1_000).unwrap();
        let config = StationConfig::default();
        let mut station: Station<'_, _, _, _, 1> =
            Station::new(&config, scheduler, Thermo, Dust, Frozen, SinkRegistry::new());

        flag.raise();
        let first = station.poll().unwrap();
        assert_eq!(
            first.climate,
            Ok(Climate {
                temperature: 20.0,
                humidity: 40.0
            })
        );
        assert_eq!(first.duty, DutyStep::Woke);
        assert_eq!(first.completed, None);
        assert_eq!(first.sink_failures, 0);

        flag.raise();
        let second = station.poll().unwrap();
        assert_eq!(
            second.duty,
            DutyStep::Sampled(Particulates {
                pm25: 5.0,
                pm10: 9.0
            })
        );
        assert!(second.completed.is_some());
    }
}

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;

pub const SAMPLE_PERIOD_MS: u32 = 10_000; // 10s in the reference deployment
pub const IDLE_DELAY_MS: u32 = 10;
/// Longest period a 32-bit microsecond alarm can represent
pub const MAX_PERIOD_MS: u32 = u32::MAX / 1_000;

/// One-bit "tick pending" flag shared between the timer interrupt and the control loop.
///
/// The interrupt only ever raises it; the loop only ever takes it. A second raise before
/// the loop takes the flag is absorbed, ticks never queue up.
pub struct TickFlag {
    pending: Mutex<Cell<bool>>,
}

impl TickFlag {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(false)),
        }
    }

    /// Marks a tick as pending. Safe to call from interrupt context.
    pub fn raise(&self) {
        critical_section::with(|cs| self.pending.borrow(cs).set(true));
    }

    /// Reads and clears the flag in one step.
    pub fn take(&self) -> bool {
        critical_section::with(|cs| self.pending.borrow(cs).replace(false))
    }
}

impl Default for TickFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    /// The period must be at least one millisecond
    ZeroPeriod,
    /// The period does not fit the hardware alarm
    PeriodTooLong(u32),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::ZeroPeriod => f.write_str("scheduler period must be non-zero"),
            SchedulerError::PeriodTooLong(ms) => {
                write!(f, "scheduler period of {}ms exceeds {}ms", ms, MAX_PERIOD_MS)
            }
        }
    }
}

/// A timer that, once started, raises its tick flag every `period_ms`.
pub trait PeriodicTimer {
    fn start(&mut self, period_ms: u32);
}

/// Loop-side view of the periodic tick.
pub struct Scheduler<'a> {
    flag: &'a TickFlag,
    period_ms: u32,
}

impl<'a> Scheduler<'a> {
    /// Validates the period and arms the timer.
    /// param timer: the timer that will raise `flag`
    /// param flag: flag shared with the timer
    /// param period_ms: tick period in milliseconds
    pub fn configure<T: PeriodicTimer>(
        timer: &mut T,
        flag: &'a TickFlag,
        period_ms: u32,
    ) -> Result<Self, SchedulerError> {
        if period_ms == 0 {
            return Err(SchedulerError::ZeroPeriod);
        }
        if period_ms > MAX_PERIOD_MS {
            return Err(SchedulerError::PeriodTooLong(period_ms));
        }
        // Drop anything raised before the timer was armed
        flag.take();
        timer.start(period_ms);
        info!("Scheduler armed with a {}ms period", period_ms);
        Ok(Self { flag, period_ms })
    }

    /// Returns true at most once per elapsed period. Never call from the timer context.
    pub fn poll_and_consume(&self) -> bool {
        self.flag.take()
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }
}

/// Software periodic timer for targets without a spare hardware alarm.
///
/// Driven by whoever knows how much time has passed (a delay loop, a host test).
pub struct SoftTicker<'a> {
    flag: &'a TickFlag,
    period_ms: u32,
    remaining_ms: u32,
}

impl<'a> SoftTicker<'a> {
    pub fn new(flag: &'a TickFlag) -> Self {
        Self {
            flag,
            period_ms: 0,
            remaining_ms: 0,
        }
    }

    /// Counts down `elapsed_ms` and raises the flag when the period runs out.
    /// Overshooting several periods still raises a single tick.
    pub fn advance(&mut self, elapsed_ms: u32) {
        if self.period_ms == 0 {
            return;
        }
        if elapsed_ms >= self.remaining_ms {
            let overshoot = (elapsed_ms - self.remaining_ms) % self.period_ms;
            self.remaining_ms = self.period_ms - overshoot;
            self.flag.raise();
        } else {
            self.remaining_ms -= elapsed_ms;
        }
    }

    pub fn is_running(&self) -> bool {
        self.period_ms > 0
    }
}

impl PeriodicTimer for SoftTicker<'_> {
    fn start(&mut self, period_ms: u32) {
        self.period_ms = period_ms;
        self.remaining_ms = period_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Option<u32>);

    impl PeriodicTimer for Recorder {
        fn start(&mut self, period_ms: u32) {
            self.0 = Some(period_ms);
        }
    }

    #[test]
    fn rejects_bad_periods_before_arming() {
        let flag = TickFlag::new();
        let mut timer = Recorder(None);
        assert_eq!(
            Scheduler::configure(&mut timer, &flag, 0).err(),
            Some(SchedulerError::ZeroPeriod)
        );
        assert_eq!(
            Scheduler::configure(&mut timer, &flag, MAX_PERIOD_MS + 1).err(),
            Some(SchedulerError::PeriodTooLong(MAX_PERIOD_MS + 1))
        );
        assert_eq!(timer.0, None);

        let scheduler = Scheduler::configure(&mut timer, &flag, SAMPLE_PERIOD_MS).unwrap();
        assert_eq!(timer.0, Some(SAMPLE_PERIOD_MS));
        assert_eq!(scheduler.period_ms(), SAMPLE_PERIOD_MS);
    }

    #[test]
    fn raised_flag_is_consumed_once() {
        let flag = TickFlag::new();
        let mut timer = Recorder(None);
        let scheduler = Scheduler::configure(&mut timer, &flag, 100).unwrap();

        assert!(!scheduler.poll_and_consume());
        flag.raise();
        flag.raise();
        assert!(scheduler.poll_and_consume());
        assert!(!scheduler.poll_and_consume());
    }

    #[test]
    fn stale_tick_is_dropped_on_configure() {
        let flag = TickFlag::new();
        flag.raise();
        let mut timer = Recorder(None);
        let scheduler = Scheduler::configure(&mut timer, &flag, 100).unwrap();
        assert!(!scheduler.poll_and_consume());
    }

    #[test]
    fn fast_polling_sees_one_tick_per_period() {
        let flag = TickFlag::new();
        let mut ticker = SoftTicker::new(&flag);
        assert!(!ticker.is_running());
        let scheduler = Scheduler::configure(&mut ticker, &flag, 250).unwrap();
        assert!(ticker.is_running());

        let mut ticks = 0;
        for _ in 0..1_000 {
            ticker.advance(1);
            // poll far faster than the period
            for _ in 0..3 {
                if scheduler.poll_and_consume() {
                    ticks += 1;
                }
            }
        }
        assert_eq!(ticks, 4);
    }

    #[test]
    fn overshoot_raises_a_single_tick() {
        let flag = TickFlag::new();
        let mut ticker = SoftTicker::new(&flag);
        let scheduler = Scheduler::configure(&mut ticker, &flag, 100).unwrap();

        ticker.advance(350);
        assert!(scheduler.poll_and_consume());
        assert!(!scheduler.poll_and_consume());
        // 50ms of the overshoot carried over
        ticker.advance(49);
        assert!(!scheduler.poll_and_consume());
        ticker.advance(1);
        assert!(scheduler.poll_and_consume());
    }
}

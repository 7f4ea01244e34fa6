use core::fmt;

/// A wall-clock instant broken down into calendar fields.
/// month: 1-12
/// day: 1-31, bounded by the month
/// hour/minute/second: 0-23 / 0-59 / 0-59
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DateTimeComponents {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Default for DateTimeComponents {
    fn default() -> Self {
        // 00:00:00 Jan 1 2000
        Self::new(2000, 1, 1, 0, 0, 0)
    }
}

impl DateTimeComponents {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Whether every field is inside its calendar range
    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.month, self.year)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
    }

    /// Moves the instant forward, rolling over minutes, hours, days, months and years.
    /// param seconds: amount of seconds to advance
    /// returns the advanced instant
    pub fn add_seconds(mut self, seconds: u32) -> Self {
        let total = self.second as u64 + seconds as u64;
        self.second = (total % 60) as u8;

        let total = self.minute as u64 + total / 60;
        self.minute = (total % 60) as u8;

        let total = self.hour as u64 + total / 60;
        self.hour = (total % 24) as u8;

        let mut days = total / 24;
        while days > 0 {
            let remaining_in_month = days_in_month(self.month, self.year).saturating_sub(self.day) as u64;
            if days <= remaining_in_month {
                self.day += days as u8;
                break;
            }
            days -= remaining_in_month + 1;
            self.day = 1;
            if self.month == 12 {
                self.month = 1;
                self.year += 1;
            } else {
                self.month += 1;
            }
        }
        self
    }
}

impl fmt::Display for DateTimeComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Calculates if it is leap year
/// param year: The current year
pub fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Gets the amount of days in a month
/// param month: 1-12
/// param year: needed for February
pub fn days_in_month(month: u8, year: u16) -> u8 {
    match month {
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Source of timestamps for completed records.
pub trait Clock {
    fn now(&mut self) -> DateTimeComponents;
}

/// Wall time derived from a known start instant plus a monotonic millisecond counter.
///
/// The counter is typically the hardware timer's uptime; the start instant comes from
/// configuration since network time sync is not part of this crate.
pub struct UptimeClock<F>
where
    F: FnMut() -> u64,
{
    start: DateTimeComponents,
    uptime_ms: F,
}

impl<F> UptimeClock<F>
where
    F: FnMut() -> u64,
{
    pub fn new(start: DateTimeComponents, uptime_ms: F) -> Self {
        Self { start, uptime_ms }
    }
}

impl<F> Clock for UptimeClock<F>
where
    F: FnMut() -> u64,
{
    fn now(&mut self) -> DateTimeComponents {
        let elapsed = (self.uptime_ms)() / 1000;
        self.start
            .add_seconds(u32::try_from(elapsed).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn rolls_over_into_next_year() {
        let t = DateTimeComponents::new(2023, 12, 31, 23, 59, 58);
        assert_eq!(t.add_seconds(3), DateTimeComponents::new(2024, 1, 1, 0, 0, 1));
    }

    #[test]
    fn honours_leap_february() {
        let t = DateTimeComponents::new(2024, 2, 28, 12, 0, 0);
        assert_eq!(t.add_seconds(86_400), DateTimeComponents::new(2024, 2, 29, 12, 0, 0));
        let t = DateTimeComponents::new(2023, 2, 28, 12, 0, 0);
        assert_eq!(t.add_seconds(86_400), DateTimeComponents::new(2023, 3, 1, 12, 0, 0));
        assert!(!is_leap_year(1900));
        assert!(is_leap_year(2000));
    }

    #[test]
    fn spans_several_months() {
        let t = DateTimeComponents::new(2001, 1, 15, 0, 0, 0);
        // 31 + 28 + 31 days later, plus 90 minutes
        let later = t.add_seconds((31 + 28 + 31) * 86_400 + 90 * 60);
        assert_eq!(later, DateTimeComponents::new(2001, 4, 15, 1, 30, 0));
        assert!(later.is_valid());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(!DateTimeComponents::new(2023, 2, 29, 0, 0, 0).is_valid());
        assert!(!DateTimeComponents::new(2023, 13, 1, 0, 0, 0).is_valid());
        assert!(!DateTimeComponents::new(2023, 1, 1, 24, 0, 0).is_valid());
        assert!(DateTimeComponents::default().is_valid());
    }

    #[test]
    fn uptime_clock_tracks_counter() {
        let uptime = Cell::new(0u64);
        let mut clock = UptimeClock::new(DateTimeComponents::default(), || uptime.get());
        assert_eq!(clock.now(), DateTimeComponents::default());
        uptime.set(61_999);
        assert_eq!(clock.now(), DateTimeComponents::new(2000, 1, 1, 0, 1, 1));
    }
}

use core::fmt;

use crate::clock::DateTimeComponents;
use crate::duty::DutyState;
use crate::timer::{IDLE_DELAY_MS, MAX_PERIOD_MS, SAMPLE_PERIOD_MS};

pub const DEFAULT_TOPIC: &str = "airstation/telemetry";
pub const DEFAULT_CLIENT_ID: &str = "airstation";

/// StationConfig holds the deployment-selected settings.
/// sample_period_ms: time between ticks
/// idle_delay_ms: how long the loop sleeps when no tick is pending
/// initial_duty_state: particulate sensor power state before the first tick
/// start_time: wall time at boot, until something better is known
/// topic: where complete records are published
/// client_id: identity announced to the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationConfig {
    pub sample_period_ms: u32,
    pub idle_delay_ms: u32,
    pub initial_duty_state: DutyState,
    pub start_time: DateTimeComponents,
    pub topic: &'static str,
    pub client_id: &'static str,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            sample_period_ms: SAMPLE_PERIOD_MS,
            idle_delay_ms: IDLE_DELAY_MS,
            initial_duty_state: DutyState::Asleep, // PM sensor rests until the first tick
            start_time: DateTimeComponents::default(), // Date: 00:00:00 Jan 1 2000
            topic: DEFAULT_TOPIC,
            client_id: DEFAULT_CLIENT_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    InvalidPeriod(u32),
    ZeroIdleDelay,
    EmptyTopic,
    InvalidStartTime,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPeriod(ms) => write!(f, "invalid sample period {}ms", ms),
            ConfigError::ZeroIdleDelay => f.write_str("idle delay must be non-zero"),
            ConfigError::EmptyTopic => f.write_str("publish topic is empty"),
            ConfigError::InvalidStartTime => f.write_str("start time is not a calendar date"),
        }
    }
}

impl StationConfig {
    /// Defaults overridden by build-time environment variables:
    /// AIRSTATION_PERIOD_MS, AIRSTATION_TOPIC, AIRSTATION_CLIENT_ID
    pub fn from_build_env() -> Self {
        let mut config = Self::default();
        if let Some(period) = option_env!("AIRSTATION_PERIOD_MS").and_then(|p| p.parse::<u32>().ok()) {
            config.sample_period_ms = period;
        }
        if let Some(topic) = option_env!("AIRSTATION_TOPIC") {
            config.topic = topic;
        }
        if let Some(client_id) = option_env!("AIRSTATION_CLIENT_ID") {
            config.client_id = client_id;
        }
        config
    }

    pub fn with_period_ms(mut self, period_ms: u32) -> Self {
        self.sample_period_ms = period_ms;
        self
    }

    pub fn with_initial_duty_state(mut self, state: DutyState) -> Self {
        self.initial_duty_state = state;
        self
    }

    pub fn with_start_time(mut self, start: DateTimeComponents) -> Self {
        self.start_time = start;
        self
    }

    pub fn with_topic(mut self, topic: &'static str) -> Self {
        self.topic = topic;
        self
    }

    /// Checks the settings before anything is armed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_period_ms == 0 || self.sample_period_ms > MAX_PERIOD_MS {
            return Err(ConfigError::InvalidPeriod(self.sample_period_ms));
        }
        if self.idle_delay_ms == 0 {
            return Err(ConfigError::ZeroIdleDelay);
        }
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if !self.start_time.is_valid() {
            return Err(ConfigError::InvalidStartTime);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = StationConfig::default();
        assert_eq!(config.sample_period_ms, 10_000);
        assert_eq!(config.initial_duty_state, DutyState::Asleep);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn validation_catches_each_bad_setting() {
        let base = StationConfig::default();
        assert_eq!(
            base.with_period_ms(0).validate(),
            Err(ConfigError::InvalidPeriod(0))
        );
        assert_eq!(
            base.with_topic("  ").validate(),
            Err(ConfigError::EmptyTopic)
        );
        assert_eq!(
            base.with_start_time(DateTimeComponents::new(2023, 4, 31, 0, 0, 0))
                .validate(),
            Err(ConfigError::InvalidStartTime)
        );
        let idle = StationConfig {
            idle_delay_ms: 0,
            ..base
        };
        assert_eq!(idle.validate(), Err(ConfigError::ZeroIdleDelay));
    }

    #[test]
    fn build_env_falls_back_to_defaults() {
        let config = StationConfig::from_build_env();
        assert_eq!(config.validate(), Ok(()));
    }
}

//! Power-state alternation for the particulate sensor.
//!
//! The SDS011 fan and laser wear out; keeping it asleep every other tick halves its
//! active time while still yielding one reading per two ticks.

use crate::sensors::{DutyCycledSensor, Particulates, SensorReadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyState {
    Awake,
    Asleep,
}

/// What a tick did with the duty-cycled sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyAction {
    Wake,
    ReadAndSleep,
}

/// Outcome of one controller step
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyStep {
    /// The sensor was woken; nothing to read this tick
    Woke,
    /// The sensor was read and put back to sleep
    Sampled(Particulates),
    /// The action was attempted but the sensor reported an error
    Failed(DutyAction, SensorReadError),
}

impl DutyStep {
    pub fn action(&self) -> DutyAction {
        match self {
            DutyStep::Woke => DutyAction::Wake,
            DutyStep::Sampled(_) => DutyAction::ReadAndSleep,
            DutyStep::Failed(action, _) => *action,
        }
    }

    pub fn particulates(&self) -> Option<Particulates> {
        match self {
            DutyStep::Sampled(p) => Some(*p),
            _ => None,
        }
    }
}

pub struct DutyCycleController {
    state: DutyState,
}

impl DutyCycleController {
    pub const fn new(initial: DutyState) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> DutyState {
        self.state
    }

    /// Runs exactly one transition. Called once per consumed tick.
    ///
    /// The state flips on every call, even when the sensor errors, so the
    /// wake / read+sleep cadence never drifts.
    pub fn step<S: DutyCycledSensor>(&mut self, sensor: &mut S) -> DutyStep {
        match self.state {
            DutyState::Asleep => {
                self.state = DutyState::Awake;
                debug!("Waking particulate sensor");
                match sensor.wake() {
                    Ok(()) => DutyStep::Woke,
                    Err(e) => {
                        warn!("Particulate sensor failed to wake: {}", e);
                        DutyStep::Failed(DutyAction::Wake, e)
                    }
                }
            }
            DutyState::Awake => {
                self.state = DutyState::Asleep;
                let reading = sensor.read();
                // Sleep regardless of the read outcome
                if let Err(e) = sensor.sleep() {
                    warn!("Particulate sensor failed to sleep: {}", e);
                }
                debug!("Particulate sensor back to sleep");
                match reading {
                    Ok(p) => DutyStep::Sampled(p),
                    Err(e) => {
                        warn!("Particulate read failed: {}", e);
                        DutyStep::Failed(DutyAction::ReadAndSleep, e)
                    }
                }
            }
        }
    }
}

impl Default for DutyCycleController {
    fn default() -> Self {
        Self::new(DutyState::Asleep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Call {
        Wake,
        Sleep,
        Read,
    }

    #[derive(Default)]
    struct FakeDust {
        calls: Vec<Call>,
        fail_read: bool,
        fail_wake: bool,
    }

    impl DutyCycledSensor for FakeDust {
        fn wake(&mut self) -> Result<(), SensorReadError> {
            self.calls.push(Call::Wake);
            if self.fail_wake {
                Err(SensorReadError::Bus)
            } else {
                Ok(())
            }
        }

        fn sleep(&mut self) -> Result<(), SensorReadError> {
            self.calls.push(Call::Sleep);
            Ok(())
        }

        fn read(&mut self) -> Result<Particulates, SensorReadError> {
            self.calls.push(Call::Read);
            if self.fail_read {
                Err(SensorReadError::Checksum)
            } else {
                Ok(Particulates {
                    pm25: 12.0,
                    pm10: 18.0,
                })
            }
        }
    }

    #[test]
    fn alternates_wake_and_read_from_asleep() {
        let mut dust = FakeDust::default();
        let mut duty = DutyCycleController::default();
        assert_eq!(duty.state(), DutyState::Asleep);

        let actions: Vec<DutyAction> = (0..6).map(|_| duty.step(&mut dust).action()).collect();
        assert_eq!(
            actions,
            [
                DutyAction::Wake,
                DutyAction::ReadAndSleep,
                DutyAction::Wake,
                DutyAction::ReadAndSleep,
                DutyAction::Wake,
                DutyAction::ReadAndSleep,
            ]
        );
        assert_eq!(dust.calls.iter().filter(|c| **c == Call::Read).count(), 3);
        assert_eq!(
            &dust.calls[..4],
            &[Call::Wake, Call::Read, Call::Sleep, Call::Wake]
        );
    }

    #[test]
    fn starting_awake_reads_first() {
        let mut dust = FakeDust::default();
        let mut duty = DutyCycleController::new(DutyState::Awake);
        let step = duty.step(&mut dust);
        assert_eq!(
            step.particulates(),
            Some(Particulates {
                pm25: 12.0,
                pm10: 18.0
            })
        );
        assert_eq!(duty.state(), DutyState::Asleep);
    }

    #[test]
    fn failures_do_not_break_alternation() {
        let mut dust = FakeDust {
            fail_wake: true,
            fail_read: true,
            ..Default::default()
        };
        let mut duty = DutyCycleController::default();

        assert_eq!(
            duty.step(&mut dust),
            DutyStep::Failed(DutyAction::Wake, SensorReadError::Bus)
        );
        assert_eq!(duty.state(), DutyState::Awake);
        assert_eq!(
            duty.step(&mut dust),
            DutyStep::Failed(DutyAction::ReadAndSleep, SensorReadError::Checksum)
        );
        assert_eq!(duty.state(), DutyState::Asleep);
        // still put back to sleep after the failed read
        assert_eq!(dust.calls, [Call::Wake, Call::Read, Call::Sleep]);
    }
}

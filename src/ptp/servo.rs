// SPDX-License-Identifier: MIT OR Apache-2.0

//! The PI servo that turns a drift sample into a clock correction.

/// Servo operating mode: `Stepping` applies the full offset in one shot,
/// `Locked` applies a PI-filtered correction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServoState {
    Stepping,
    Locked,
}

/// 100 ns units throughout: samples, thresholds, and returned corrections.
#[derive(Clone, Copy, Debug)]
pub struct ServoGains {
    pub kp: f64,
    pub ki: f64,
    /// Step-vs-lock threshold; also scales the integral clamp (`10 *
    /// threshold`). Default corresponds to 100 ms.
    pub threshold: i64,
}

impl Default for ServoGains {
    fn default() -> Self {
        ServoGains {
            kp: 0.7,
            ki: 0.3,
            threshold: 1_000_000, // 100 ms in 100ns units
        }
    }
}

/// The literal "locked" cutoff from the spec: 1 ms, independent of the
/// configurable step threshold.
const LOCK_CUTOFF_100NS: i64 = 10_000;

pub struct Servo {
    gains: ServoGains,
    integral: i64,
    stepped: bool,
    state: ServoState,
}

impl Servo {
    pub fn new(gains: ServoGains) -> Self {
        Servo {
            gains,
            integral: 0,
            stepped: false,
            state: ServoState::Stepping,
        }
    }

    pub fn state(&self) -> ServoState {
        self.state
    }

    /// Feeds one drift sample `d` (100 ns units), returning the correction
    /// to accumulate into `clock_correction`.
    pub fn process_sample(&mut self, d: i64) -> i64 {
        if !self.stepped || d.abs() > self.gains.threshold {
            self.integral = 0;
            self.stepped = true;
            self.state = ServoState::Stepping;
            return d;
        }
        let correction = self.gains.kp * d as f64 + self.gains.ki * self.integral as f64;
        self.integral += d;
        let clamp = 10 * self.gains.threshold;
        self.integral = self.integral.clamp(-clamp, clamp);
        self.state = if d.abs() < LOCK_CUTOFF_100NS {
            ServoState::Locked
        } else {
            ServoState::Stepping
        };
        correction as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locking_sequence_matches_worked_example() {
        let mut servo = Servo::new(ServoGains::default());
        let samples = [500_000i64, 200_000, 50_000, 5_000]; // 50ms,20ms,5ms,500us
        let expected_states = [
            ServoState::Stepping,
            ServoState::Stepping,
            ServoState::Stepping,
            ServoState::Locked,
        ];
        for (d, expected) in samples.into_iter().zip(expected_states) {
            servo.process_sample(d);
            assert_eq!(servo.state(), expected, "sample {d}");
        }
    }

    #[test]
    fn first_sample_always_steps() {
        let mut servo = Servo::new(ServoGains::default());
        let correction = servo.process_sample(42);
        assert_eq!(correction, 42);
        assert_eq!(servo.state(), ServoState::Stepping);
    }

    #[test]
    fn large_sample_forces_step_even_when_locked() {
        let mut servo = Servo::new(ServoGains::default());
        for d in [500_000i64, 200_000, 50_000, 5_000] {
            servo.process_sample(d);
        }
        assert_eq!(servo.state(), ServoState::Locked);
        let jump = 5_000_000; // exceeds the 1,000,000 threshold
        let correction = servo.process_sample(jump);
        assert_eq!(correction, jump);
        assert_eq!(servo.state(), ServoState::Stepping);
    }
}

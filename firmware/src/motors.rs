//! Motor driver sleep line.
//!
//! Every output shares one driver. Pulsing its sleep line coasts all motors
//! and clears the driver's fault latch, after which it accepts commands again.
//! Only [`MotorDriver::sleep`] leaves it asleep.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

/// Drives the driver's active-low sleep input.
pub trait SleepLine {
    fn set_awake(&mut self, awake: bool);
}

pub struct MotorDriver<L> {
    line: L,
}

impl<L: SleepLine> MotorDriver<L> {
    /// Takes the line and wakes the driver.
    pub fn new(mut line: L) -> Self {
        line.set_awake(true);
        Self { line }
    }

    /// Coasts every output and wakes the driver for the next program.
    ///
    /// The driver keeps no settings between runs, so `reset` has nothing
    /// extra to restore.
    pub fn stop_all(&mut self, _reset: bool) {
        self.line.set_awake(false);
        self.line.set_awake(true);
    }

    /// Leaves the driver asleep until the hub resets.
    pub fn sleep(&mut self) {
        self.line.set_awake(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorded(Vec<bool>);

    impl SleepLine for &mut Recorded {
        fn set_awake(&mut self, awake: bool) {
            self.0.push(awake);
        }
    }

    #[test]
    fn driver_is_awake_after_every_stop() {
        let mut line = Recorded::default();
        let mut driver = MotorDriver::new(&mut line);
        driver.stop_all(true);
        driver.stop_all(false);
        driver.stop_all(true);

        assert_eq!(line.0, [true, false, true, false, true, false, true]);
        assert_eq!(line.0.last(), Some(&true));
    }

    #[test]
    fn sleep_is_final() {
        let mut line = Recorded::default();
        let mut driver = MotorDriver::new(&mut line);
        driver.stop_all(true);
        driver.sleep();

        assert_eq!(line.0.last(), Some(&false));
    }
}

//! Battery voltage classification.
//!
//! Samples arrive once per second from the ADC task. Crossing a threshold
//! produces a single [`HubEvent`]; hysteresis keeps a sagging pack from
//! flapping between levels.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use supervisor_core::hub::HubEvent;

/// Below this the low-voltage warning is raised.
pub const WARNING_MV: u16 = 6_000;
/// Below this the hub shuts down.
pub const SHUTDOWN_MV: u16 = 5_400;
/// Recovery margin above a threshold before it is considered cleared.
pub const HYSTERESIS_MV: u16 = 200;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum BatteryLevel {
    Normal,
    Low,
    Critical,
}

/// Tracks the battery level across samples.
#[derive(Clone, Copy, Debug)]
pub struct BatteryMonitor {
    level: BatteryLevel,
}

impl BatteryMonitor {
    pub const fn new() -> Self {
        Self {
            level: BatteryLevel::Normal,
        }
    }

    pub const fn level(&self) -> BatteryLevel {
        self.level
    }

    /// Folds in a sample and returns the event to post, if the level moved.
    ///
    /// Critical is terminal: the supervisor is already shutting down.
    pub fn sample(&mut self, millivolts: u16) -> Option<HubEvent> {
        let next = match self.level {
            BatteryLevel::Critical => BatteryLevel::Critical,
            _ if millivolts < SHUTDOWN_MV => BatteryLevel::Critical,
            BatteryLevel::Low if millivolts >= WARNING_MV + HYSTERESIS_MV => BatteryLevel::Normal,
            BatteryLevel::Low => BatteryLevel::Low,
            BatteryLevel::Normal if millivolts < WARNING_MV => BatteryLevel::Low,
            BatteryLevel::Normal => BatteryLevel::Normal,
        };

        if next == self.level {
            return None;
        }
        self.level = next;

        match next {
            BatteryLevel::Normal => Some(HubEvent::BatteryLow(false)),
            BatteryLevel::Low => Some(HubEvent::BatteryLow(true)),
            BatteryLevel::Critical => Some(HubEvent::BatteryCritical),
        }
    }
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_clears_only_past_hysteresis() {
        let mut monitor = BatteryMonitor::new();
        assert_eq!(monitor.sample(7_200), None);
        assert_eq!(monitor.sample(5_900), Some(HubEvent::BatteryLow(true)));
        assert_eq!(monitor.sample(6_100), None);
        assert_eq!(monitor.level(), BatteryLevel::Low);
        assert_eq!(monitor.sample(6_200), Some(HubEvent::BatteryLow(false)));
    }

    #[test]
    fn critical_fires_once_and_sticks() {
        let mut monitor = BatteryMonitor::new();
        assert_eq!(monitor.sample(5_000), Some(HubEvent::BatteryCritical));
        assert_eq!(monitor.sample(4_900), None);
        assert_eq!(monitor.sample(8_000), None);
        assert_eq!(monitor.level(), BatteryLevel::Critical);
    }
}

//! Build-time hub selection.
//!
//! Exactly one `hub-*` Cargo feature picks the preset compiled into the
//! image. When several are enabled the first match below wins.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use supervisor_core::config::{HubConfig, HubProfile};

pub const PROFILE: HubProfile = if cfg!(feature = "hub-prime") {
    HubProfile::PrimeHub
} else if cfg!(feature = "hub-essential") {
    HubProfile::EssentialHub
} else if cfg!(feature = "hub-technic") {
    HubProfile::TechnicHub
} else if cfg!(feature = "hub-move") {
    HubProfile::MoveHub
} else {
    HubProfile::CityHub
};

pub const CONFIG: HubConfig = PROFILE.config();

/// Period of the button poll tick.
pub const POLL_PERIOD_MS: u64 = 10;

/// Period of battery voltage sampling.
pub const BATTERY_PERIOD_MS: u64 = 1_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiled_config_matches_profile() {
        assert_eq!(CONFIG, PROFILE.config());
        assert_eq!(CONFIG.long_press_duration.as_millis(), 2000);
    }
}

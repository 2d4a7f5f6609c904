//! Per-hub build configuration and the named hub presets.

use core::{fmt, str::FromStr, time::Duration};

use crate::program::{MAX_SLOTS, ProgramDescriptor, ProgramError, ProgramId, ProgramValidator};

/// Continuous hold time that turns a press into a long press.
pub const LONG_PRESS_DURATION: Duration = Duration::from_millis(2000);

/// Delay after the radio reports ready on hubs whose button doubles as the
/// bluetooth toggle, before the boot program is requested.
pub const BLUETOOTH_TOGGLE_SETTLE: Duration = Duration::from_millis(400);

/// What a completed short press does.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShortPressPolicy {
    /// Start the selected slot.
    AlwaysStart,
    /// Request shutdown while a program runs, otherwise start the selected slot.
    ShutdownOrStart,
}

/// What a long press does.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LongPressPolicy {
    /// Stop the running program, otherwise start the selected slot.
    StopOrStart,
    /// Stop the running program, otherwise request shutdown.
    StopOrShutdown,
    /// Always request shutdown.
    Shutdown,
}

/// Compile-time behavior of one hub model.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HubConfig {
    pub short_press: ShortPressPolicy,
    pub long_press: LongPressPolicy,
    /// Keep classifying short presses while a program runs.
    pub short_press_while_running: bool,
    pub long_press_duration: Duration,
    /// The power button can stop a running program. Without it a long press
    /// always requests shutdown.
    pub program_stop: bool,
    /// The hub has a battery charger: USB keeps power on after shutdown and a
    /// button press while shut down resets the hub.
    pub battery_charger: bool,
    /// Number of user slots offered; slot 0 is always available.
    pub num_slots: u8,
    pub has_repl: bool,
    /// Request the REPL whenever nothing else is pending.
    pub repl_autostart: bool,
    /// Request slot 0 once the radio is ready at boot.
    pub boot_autostart: bool,
    pub boot_settle: Duration,
}

impl HubConfig {
    /// Hub with a dedicated power button and no charger.
    #[must_use]
    pub const fn power_button() -> Self {
        Self {
            short_press: ShortPressPolicy::ShutdownOrStart,
            long_press: LongPressPolicy::StopOrShutdown,
            short_press_while_running: true,
            long_press_duration: LONG_PRESS_DURATION,
            program_stop: true,
            battery_charger: false,
            num_slots: 1,
            has_repl: true,
            repl_autostart: false,
            boot_autostart: true,
            boot_settle: Duration::ZERO,
        }
    }

    /// Hub whose button toggles bluetooth while idle.
    #[must_use]
    pub const fn bluetooth_toggle() -> Self {
        Self {
            short_press: ShortPressPolicy::AlwaysStart,
            long_press: LongPressPolicy::Shutdown,
            short_press_while_running: false,
            long_press_duration: LONG_PRESS_DURATION,
            program_stop: true,
            battery_charger: true,
            num_slots: MAX_SLOTS,
            has_repl: true,
            repl_autostart: false,
            boot_autostart: true,
            boot_settle: BLUETOOTH_TOGGLE_SETTLE,
        }
    }

    /// Long-press behavior after accounting for a missing stop mechanism.
    #[must_use]
    pub const fn effective_long_press(&self) -> LongPressPolicy {
        if self.program_stop {
            self.long_press
        } else {
            LongPressPolicy::Shutdown
        }
    }

    /// Number of slots the selection may cycle through, never zero.
    #[must_use]
    pub const fn selectable_slots(&self) -> u8 {
        match self.num_slots {
            0 => 1,
            n if n > MAX_SLOTS => MAX_SLOTS,
            n => n,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        HubProfile::CityHub.config()
    }
}

/// Rejects empty slots, slots the hub does not offer, and builtins it lacks.
impl ProgramValidator for HubConfig {
    fn validate(&self, program: &ProgramDescriptor) -> Result<(), ProgramError> {
        match program.id {
            ProgramId::REPL if self.has_repl => Ok(()),
            ProgramId::PORT_VIEW => Ok(()),
            id => match id.slot_index() {
                Some(slot) if slot < self.selectable_slots() && !program.image.is_empty() => {
                    Ok(())
                }
                _ => Err(ProgramError::NotSupported),
            },
        }
    }
}

/// Named hub models with their presets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HubProfile {
    MoveHub,
    CityHub,
    TechnicHub,
    PrimeHub,
    EssentialHub,
}

impl HubProfile {
    pub const ALL: [HubProfile; 5] = [
        HubProfile::MoveHub,
        HubProfile::CityHub,
        HubProfile::TechnicHub,
        HubProfile::PrimeHub,
        HubProfile::EssentialHub,
    ];

    #[must_use]
    pub const fn config(self) -> HubConfig {
        match self {
            HubProfile::MoveHub => HubConfig {
                has_repl: false,
                ..HubConfig::power_button()
            },
            HubProfile::CityHub => HubConfig::power_button(),
            HubProfile::TechnicHub => HubConfig {
                long_press: LongPressPolicy::StopOrStart,
                ..HubConfig::power_button()
            },
            HubProfile::PrimeHub => HubConfig::bluetooth_toggle(),
            HubProfile::EssentialHub => HubConfig {
                num_slots: 1,
                ..HubConfig::bluetooth_toggle()
            },
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            HubProfile::MoveHub => "move",
            HubProfile::CityHub => "city",
            HubProfile::TechnicHub => "technic",
            HubProfile::PrimeHub => "prime",
            HubProfile::EssentialHub => "essential",
        }
    }
}

impl fmt::Display for HubProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a profile name is not recognised.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UnknownProfile;

impl fmt::Display for UnknownProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown hub profile")
    }
}

impl FromStr for HubProfile {
    type Err = UnknownProfile;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        HubProfile::ALL
            .into_iter()
            .find(|profile| value.eq_ignore_ascii_case(profile.label()))
            .ok_or(UnknownProfile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramImage;

    fn descriptor(id: ProgramId, len: u32) -> ProgramDescriptor {
        ProgramDescriptor {
            id,
            image: ProgramImage::new(0, len),
            ..ProgramDescriptor::new()
        }
    }

    #[test]
    fn validator_rejects_empty_and_unoffered_slots() {
        let config = HubProfile::CityHub.config();

        assert_eq!(config.validate(&descriptor(ProgramId::FIRST_SLOT, 32)), Ok(()));
        assert_eq!(
            config.validate(&descriptor(ProgramId::FIRST_SLOT, 0)),
            Err(ProgramError::NotSupported)
        );
        assert_eq!(
            config.validate(&descriptor(ProgramId::from_raw(1), 32)),
            Err(ProgramError::NotSupported)
        );
    }

    #[test]
    fn validator_rejects_repl_on_hubs_without_one() {
        let move_hub = HubProfile::MoveHub.config();
        let city_hub = HubProfile::CityHub.config();

        assert_eq!(
            move_hub.validate(&descriptor(ProgramId::REPL, 0)),
            Err(ProgramError::NotSupported)
        );
        assert_eq!(city_hub.validate(&descriptor(ProgramId::REPL, 0)), Ok(()));
    }

    #[test]
    fn missing_stop_mechanism_forces_shutdown_on_long_press() {
        let config = HubConfig {
            program_stop: false,
            ..HubProfile::TechnicHub.config()
        };

        assert_eq!(config.effective_long_press(), LongPressPolicy::Shutdown);
        assert_eq!(
            HubProfile::TechnicHub.config().effective_long_press(),
            LongPressPolicy::StopOrStart
        );
    }

    #[test]
    fn profiles_parse_by_label() {
        assert_eq!("Prime".parse::<HubProfile>(), Ok(HubProfile::PrimeHub));
        assert_eq!("zeppelin".parse::<HubProfile>(), Err(UnknownProfile));
        assert_eq!(HubProfile::EssentialHub.config().selectable_slots(), 1);
        assert_eq!(HubProfile::PrimeHub.config().selectable_slots(), MAX_SLOTS);
    }
}

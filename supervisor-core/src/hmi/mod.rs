//! Power-button gestures.
//!
//! The HMI samples the power button once per poll tick, publishes it as
//! [`StatusFlag::PowerButtonPressed`], and classifies the samples into short
//! and long presses. It never acts on the lifecycle itself; a poll returns an
//! [`HmiAction`] for the supervisor to apply.
//!
//! Short presses come from [`ButtonPressMachine`], a value advanced by a pure
//! step function. Long presses come from the registry's debounce on the
//! pressed flag. A long press claims the rest of the hold, so the release that
//! ends it never completes a short press.

use core::fmt;

use crate::config::{HubConfig, LongPressPolicy, ShortPressPolicy};
use crate::hub::{ButtonMask, ResetAction, ResetControl, SampleError};
use crate::program::{ProgramError, ProgramId};
use crate::status::{FlagChange, FlagSet, StatusFlag, StatusObserver, StatusRegistry};
use crate::time::Timestamp;

/// Where the short-press machine is within a press.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonPressState {
    WaitForRelease,
    WaitForPress,
    WaitForReleaseAgain,
}

/// Classified button input.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gesture {
    ShortPress,
    LongPress,
}

/// Conditions read from the status flags at poll time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct GestureGuards {
    pub program_running: bool,
}

impl GestureGuards {
    #[must_use]
    pub const fn from_flags(flags: FlagSet) -> Self {
        Self {
            program_running: flags.contains(StatusFlag::UserProgramRunning),
        }
    }
}

/// Short-press classifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonPressMachine {
    state: ButtonPressState,
    long_press_claimed: bool,
    active_while_running: bool,
}

impl ButtonPressMachine {
    /// Starts waiting for the button to be released, so a press already in
    /// progress is never counted.
    #[must_use]
    pub const fn new(active_while_running: bool) -> Self {
        Self {
            state: ButtonPressState::WaitForRelease,
            long_press_claimed: false,
            active_while_running,
        }
    }

    #[must_use]
    pub const fn state(self) -> ButtonPressState {
        self.state
    }

    #[must_use]
    pub const fn long_press_claimed(self) -> bool {
        self.long_press_claimed
    }

    /// Marks the current hold as a long press. The machine ignores input until
    /// the button is released and then waits for a fresh press.
    #[must_use]
    pub const fn claim_long_press(self) -> Self {
        Self {
            state: ButtonPressState::WaitForRelease,
            long_press_claimed: true,
            ..self
        }
    }

    /// Advances by one sample and reports a completed short press.
    #[must_use]
    pub const fn step(self, pressed: bool, guards: GestureGuards) -> (Self, Option<Gesture>) {
        if self.long_press_claimed {
            if pressed {
                return (self, None);
            }
            let released = Self {
                state: ButtonPressState::WaitForPress,
                long_press_claimed: false,
                ..self
            };
            return (released, None);
        }

        // A running program restarts the machine, so a hold that outlives the
        // program still has to be released before it can count.
        if guards.program_running && !self.active_while_running {
            let reset = Self {
                state: ButtonPressState::WaitForRelease,
                ..self
            };
            return (reset, None);
        }

        let (state, gesture) = match (self.state, pressed) {
            (ButtonPressState::WaitForRelease, false) => (ButtonPressState::WaitForPress, None),
            (ButtonPressState::WaitForPress, true) => (ButtonPressState::WaitForReleaseAgain, None),
            (ButtonPressState::WaitForReleaseAgain, false) => {
                (ButtonPressState::WaitForPress, Some(Gesture::ShortPress))
            }
            (state, _) => (state, None),
        };

        (Self { state, ..self }, gesture)
    }
}

/// Lifecycle request produced by a gesture.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HmiAction {
    StartProgram(ProgramId),
    StopProgram,
    RequestShutdown,
}

impl fmt::Display for HmiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HmiAction::StartProgram(id) => write!(f, "start {id}"),
            HmiAction::StopProgram => f.write_str("stop"),
            HmiAction::RequestShutdown => f.write_str("shutdown"),
        }
    }
}

/// Button handling for one hub.
#[derive(Clone, Debug)]
pub struct Hmi {
    config: HubConfig,
    machine: ButtonPressMachine,
    selected_slot: u8,
}

impl Hmi {
    #[must_use]
    pub const fn new(config: HubConfig) -> Self {
        Self {
            machine: ButtonPressMachine::new(config.short_press_while_running),
            config,
            selected_slot: 0,
        }
    }

    #[must_use]
    pub const fn machine(&self) -> ButtonPressMachine {
        self.machine
    }

    /// Slot started by the button.
    #[must_use]
    pub const fn selected_program_slot(&self) -> u8 {
        self.selected_slot
    }

    /// Changes the slot the button starts.
    ///
    /// # Errors
    ///
    /// [`ProgramError::NotSupported`] when the hub does not offer `slot`.
    pub fn select_slot(&mut self, slot: u8) -> Result<(), ProgramError> {
        if slot < self.config.selectable_slots() {
            self.selected_slot = slot;
            Ok(())
        } else {
            Err(ProgramError::NotSupported)
        }
    }

    fn selected_program(&self) -> ProgramId {
        ProgramId::from_raw(self.selected_slot)
    }

    /// Samples the button once. Sampling errors count as no input.
    pub fn poll<O: StatusObserver>(
        &mut self,
        sample: Result<ButtonMask, SampleError>,
        status: &mut StatusRegistry<O>,
        now: Timestamp,
    ) -> Option<HmiAction> {
        let buttons = sample.ok()?;
        let pressed = buttons.contains(ButtonMask::CENTER);

        if pressed {
            status.set(StatusFlag::PowerButtonPressed, now);
        } else {
            status.clear(StatusFlag::PowerButtonPressed, now);
        }

        let guards = GestureGuards::from_flags(status.flags());
        let (machine, gesture) = self.machine.step(pressed, guards);
        self.machine = machine;

        if pressed
            && status.debounce_edge(
                StatusFlag::PowerButtonPressed,
                true,
                self.config.long_press_duration,
                now,
            )
        {
            self.machine = self.machine.claim_long_press();
            return Some(self.resolve(Gesture::LongPress, guards.program_running));
        }

        gesture.map(|gesture| self.resolve(gesture, guards.program_running))
    }

    /// Maps a gesture to its action under this hub's policies.
    #[must_use]
    pub fn resolve(&self, gesture: Gesture, program_running: bool) -> HmiAction {
        let start = HmiAction::StartProgram(self.selected_program());
        match gesture {
            Gesture::ShortPress => match self.config.short_press {
                ShortPressPolicy::AlwaysStart => start,
                ShortPressPolicy::ShutdownOrStart if program_running => {
                    HmiAction::RequestShutdown
                }
                ShortPressPolicy::ShutdownOrStart => start,
            },
            Gesture::LongPress => match self.config.effective_long_press() {
                LongPressPolicy::Shutdown => HmiAction::RequestShutdown,
                LongPressPolicy::StopOrStart | LongPressPolicy::StopOrShutdown
                    if program_running =>
                {
                    HmiAction::StopProgram
                }
                LongPressPolicy::StopOrStart => start,
                LongPressPolicy::StopOrShutdown => HmiAction::RequestShutdown,
            },
        }
    }
}

/// Resets the hub when the power button is pressed after shutdown.
///
/// Hubs with a charger stay powered while USB is attached; this observer
/// turns the next press into a reset so the hub comes back up.
pub struct ShutdownWake<R> {
    reset: R,
    armed: bool,
}

impl<R: ResetControl> ShutdownWake<R> {
    #[must_use]
    pub const fn new(reset: R, enabled: bool) -> Self {
        Self {
            reset,
            armed: enabled,
        }
    }

    pub fn reset_control(&self) -> &R {
        &self.reset
    }
}

impl<R: ResetControl> StatusObserver for ShutdownWake<R> {
    fn on_flag_changed(&mut self, change: FlagChange, flags: FlagSet) {
        if self.armed
            && change.value
            && change.flag == StatusFlag::PowerButtonPressed
            && flags.contains(StatusFlag::Shutdown)
        {
            self.reset.reset(ResetAction::Reset);
        }
    }
}

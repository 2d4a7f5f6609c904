//! Collaborator contracts the supervisor consumes, and the events hubs feed it.
//!
//! Firmware implements these traits over real peripherals; the emulator and
//! the integration tests implement them over a simulated hub. Every trait is
//! synchronous: nothing here may block for longer than the operation itself.

use core::ops::BitOr;

use crate::program::{ProgramDescriptor, ProgramId, ProgramStorage, ProgramValidator};
use crate::status::FlagSet;
use crate::time::Timestamp;

/// Buttons reported by a [`ButtonSampler`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonMask(u8);

impl ButtonMask {
    pub const NONE: Self = Self(0);
    /// The power button.
    pub const CENTER: Self = Self(1 << 0);
    pub const LEFT: Self = Self(1 << 1);
    pub const RIGHT: Self = Self(1 << 2);
    pub const BLUETOOTH: Self = Self(1 << 3);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ButtonMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A button read that produced no usable sample.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleError {
    /// The driver has not finished initialising.
    NotReady,
    /// The read failed.
    Io,
}

/// Commands received from a connected host.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RemoteCommand {
    StartProgram(ProgramId),
    StopProgram,
}

/// Everything that can wake the supervisor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HubEvent {
    /// Periodic tick; the HMI samples the button on each one.
    PollTimer,
    /// One byte received from the host while stdin is routed to the program.
    Stdin(u8),
    Remote(RemoteCommand),
    /// A host connected (`true`) or disconnected (`false`).
    HostConnection(bool),
    /// Battery voltage is approaching the cutoff.
    BatteryLow(bool),
    /// Battery voltage reached the cutoff; the hub must shut down.
    BatteryCritical,
}

/// What a [`ResetControl::reset`] call should do.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetAction {
    /// Restart the firmware.
    Reset,
    /// Restart into the firmware updater.
    Update,
}

/// Result of USB battery charger detection.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbStatus {
    #[default]
    None,
    StandardDownstream,
    ChargingDownstream,
    DedicatedCharger,
    NonStandard,
}

impl UsbStatus {
    #[must_use]
    pub const fn is_attached(self) -> bool {
        !matches!(self, UsbStatus::None)
    }
}

pub trait Clock {
    fn now(&self) -> Timestamp;
}

pub trait EventSource {
    /// Returns the next pending event without waiting.
    fn poll_event(&mut self) -> Option<HubEvent>;
}

pub trait ButtonSampler {
    /// # Errors
    ///
    /// A [`SampleError`] means no input was observed this tick.
    fn is_pressed(&mut self) -> Result<ButtonMask, SampleError>;
}

pub trait Radio {
    fn is_ready(&self) -> bool;

    /// Routes received bytes to the program's stdin while enabled.
    fn set_rx_forwarding(&mut self, enabled: bool);
}

pub trait ResetControl {
    fn reset(&mut self, action: ResetAction);
}

pub trait PowerControl: ResetControl {
    /// Cuts power. Returns only when the hardware is still powered.
    fn power_off(&mut self);
}

pub trait UsbCharger {
    fn usb_status(&self) -> UsbStatus;
}

pub trait Outputs {
    /// Stops every motor and output; `reset` also restores default settings.
    fn stop_all(&mut self, reset: bool);
}

pub trait Subsystems {
    /// Releases drivers before power-down.
    fn deinit(&mut self);
}

/// Services the supervisor offers a running program.
pub trait ProgramEnvironment {
    fn now(&self) -> Timestamp;

    /// Handles every pending hub event the same way the idle loop does and
    /// returns how many were handled. Programs call this regularly.
    fn pump_events(&mut self) -> usize;

    /// True once the program has been asked to stop.
    fn stop_requested(&self) -> bool;

    /// Asks for the same program to be started again after it returns.
    fn request_restart(&mut self);

    /// Next byte of host input routed to this program.
    fn read_stdin(&mut self) -> Option<u8>;

    /// Buttons that count as a stop request while the program runs.
    fn set_stop_buttons(&mut self, buttons: ButtonMask);

    fn status(&self) -> FlagSet;
}

/// Runs programs to completion.
pub trait ProgramExecutor {
    /// Runs `program` and returns when it ends or honors a stop request.
    fn run_program(&mut self, program: &ProgramDescriptor, env: &mut dyn ProgramEnvironment);
}

/// Every collaborator a hub supplies to the supervisor.
pub trait Hub:
    Clock
    + EventSource
    + ButtonSampler
    + Radio
    + PowerControl
    + UsbCharger
    + Outputs
    + Subsystems
    + ProgramStorage
    + ProgramValidator
{
}

impl<T> Hub for T where
    T: Clock
        + EventSource
        + ButtonSampler
        + Radio
        + PowerControl
        + UsbCharger
        + Outputs
        + Subsystems
        + ProgramStorage
        + ProgramValidator
{
}

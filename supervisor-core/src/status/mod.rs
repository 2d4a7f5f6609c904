//! Shared status flags with change notification and debounce.
//!
//! The registry is the hub's one piece of shared state that every component
//! may read. The HMI publishes the power button here, the lifecycle loop
//! publishes whether a program runs, and the registry's observer (status
//! light, telemetry, the shutdown wake handler) sees every transition before
//! `set`/`clear` return.

use core::{fmt, time::Duration};

use crate::program::ProgramId;
use crate::time::Timestamp;

/// Number of distinct status flags.
pub const FLAG_COUNT: usize = 8;

/// Named boolean conditions of the hub.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusFlag {
    BatteryLowVoltageWarning,
    BatteryLowVoltageShutdown,
    BleHostConnected,
    PowerButtonPressed,
    UserProgramRunning,
    ShutdownRequested,
    Shutdown,
    UserProgramRestart,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; FLAG_COUNT] = [
        StatusFlag::BatteryLowVoltageWarning,
        StatusFlag::BatteryLowVoltageShutdown,
        StatusFlag::BleHostConnected,
        StatusFlag::PowerButtonPressed,
        StatusFlag::UserProgramRunning,
        StatusFlag::ShutdownRequested,
        StatusFlag::Shutdown,
        StatusFlag::UserProgramRestart,
    ];

    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            StatusFlag::BatteryLowVoltageWarning => 0,
            StatusFlag::BatteryLowVoltageShutdown => 1,
            StatusFlag::BleHostConnected => 2,
            StatusFlag::PowerButtonPressed => 3,
            StatusFlag::UserProgramRunning => 4,
            StatusFlag::ShutdownRequested => 5,
            StatusFlag::Shutdown => 6,
            StatusFlag::UserProgramRestart => 7,
        }
    }

    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < FLAG_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Short label used in logs and console output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            StatusFlag::BatteryLowVoltageWarning => "battery-low-warning",
            StatusFlag::BatteryLowVoltageShutdown => "battery-low-shutdown",
            StatusFlag::BleHostConnected => "ble-host-connected",
            StatusFlag::PowerButtonPressed => "power-button-pressed",
            StatusFlag::UserProgramRunning => "program-running",
            StatusFlag::ShutdownRequested => "shutdown-requested",
            StatusFlag::Shutdown => "shutdown",
            StatusFlag::UserProgramRestart => "program-restart",
        }
    }

    const fn bit(self) -> u16 {
        1 << self.as_index()
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot of every flag as a bit set.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlagSet(u16);

impl FlagSet {
    pub const EMPTY: Self = Self(0);

    const MASK: u16 = (1 << FLAG_COUNT) - 1;

    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & Self::MASK)
    }

    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, flag: StatusFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    #[must_use]
    pub const fn with(self, flag: StatusFlag) -> Self {
        Self(self.0 | flag.bit())
    }

    #[must_use]
    pub const fn without(self, flag: StatusFlag) -> Self {
        Self(self.0 & !flag.bit())
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the flags that are set, in index order.
    pub fn iter(self) -> impl Iterator<Item = StatusFlag> {
        StatusFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(*flag))
    }
}

/// A single flag transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlagChange {
    pub flag: StatusFlag,
    pub value: bool,
    pub at: Timestamp,
}

/// Receives registry notifications synchronously, on the caller's thread.
pub trait StatusObserver {
    /// Called after `change` is applied; `flags` already reflects it.
    fn on_flag_changed(&mut self, change: FlagChange, flags: FlagSet);

    /// Called when the id of the program about to run is published.
    fn on_program_id_changed(&mut self, _id: ProgramId) {}
}

/// Observer that ignores every notification.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn on_flag_changed(&mut self, _change: FlagChange, _flags: FlagSet) {}
}

impl<A, B> StatusObserver for (A, B)
where
    A: StatusObserver,
    B: StatusObserver,
{
    fn on_flag_changed(&mut self, change: FlagChange, flags: FlagSet) {
        self.0.on_flag_changed(change, flags);
        self.1.on_flag_changed(change, flags);
    }

    fn on_program_id_changed(&mut self, id: ProgramId) {
        self.0.on_program_id_changed(id);
        self.1.on_program_id_changed(id);
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct DebounceRecord {
    changed_at: Timestamp,
    fired: bool,
}

impl DebounceRecord {
    const INITIAL: Self = Self {
        changed_at: Timestamp::ZERO,
        fired: false,
    };
}

/// Owner of the status flags, their debounce records, and the observer.
pub struct StatusRegistry<O = NoopObserver> {
    flags: FlagSet,
    debounce: [DebounceRecord; FLAG_COUNT],
    program_id: ProgramId,
    observer: O,
}

impl StatusRegistry<NoopObserver> {
    /// Creates a registry with every flag cleared and no observer.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_observer(NoopObserver)
    }
}

impl Default for StatusRegistry<NoopObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> StatusRegistry<O> {
    /// Creates a registry with every flag cleared, treated as having changed
    /// at [`Timestamp::ZERO`].
    #[must_use]
    pub const fn with_observer(observer: O) -> Self {
        Self {
            flags: FlagSet::EMPTY,
            debounce: [DebounceRecord::INITIAL; FLAG_COUNT],
            program_id: ProgramId::FIRST_SLOT,
            observer,
        }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    #[must_use]
    pub const fn flags(&self) -> FlagSet {
        self.flags
    }

    #[must_use]
    pub const fn test(&self, flag: StatusFlag) -> bool {
        self.flags.contains(flag)
    }

    /// Id of the program most recently published with [`Self::set_program_id`].
    #[must_use]
    pub const fn program_id(&self) -> ProgramId {
        self.program_id
    }

    /// True when `flag` equals `expected` and has held that value for at
    /// least `duration` as of `now`.
    #[must_use]
    pub fn test_debounce(
        &self,
        flag: StatusFlag,
        expected: bool,
        duration: Duration,
        now: Timestamp,
    ) -> bool {
        self.test(flag) == expected
            && now.duration_since(self.debounce[flag.as_index()].changed_at) >= duration
    }
}

impl<O: StatusObserver> StatusRegistry<O> {
    pub fn set(&mut self, flag: StatusFlag, now: Timestamp) {
        self.update(flag, true, now);
    }

    pub fn clear(&mut self, flag: StatusFlag, now: Timestamp) {
        self.update(flag, false, now);
    }

    /// Like [`Self::test_debounce`], but reports true only once per continuous
    /// hold of the value.
    pub fn debounce_edge(
        &mut self,
        flag: StatusFlag,
        expected: bool,
        duration: Duration,
        now: Timestamp,
    ) -> bool {
        if !self.test_debounce(flag, expected, duration, now) {
            return false;
        }

        let record = &mut self.debounce[flag.as_index()];
        if record.fired {
            false
        } else {
            record.fired = true;
            true
        }
    }

    /// Publishes the id of the program about to run.
    pub fn set_program_id(&mut self, id: ProgramId) {
        self.program_id = id;
        self.observer.on_program_id_changed(id);
    }

    fn update(&mut self, flag: StatusFlag, value: bool, now: Timestamp) {
        if self.flags.contains(flag) == value {
            return;
        }

        self.flags = if value {
            self.flags.with(flag)
        } else {
            self.flags.without(flag)
        };
        self.debounce[flag.as_index()] = DebounceRecord {
            changed_at: now,
            fired: false,
        };

        self.observer
            .on_flag_changed(FlagChange { flag, value, at: now }, self.flags);
    }
}

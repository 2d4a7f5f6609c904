#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The supervisor owns the authoritative [`StatusRegistry`] in thread mode.
//! [`StatusMirror`] copies every change into atomics so interrupt-priority
//! tasks (the status light, the battery monitor) can read flags without
//! touching the registry.
//!
//! [`StatusRegistry`]: supervisor_core::status::StatusRegistry

use portable_atomic::{AtomicU8, AtomicU16, Ordering};
use supervisor_core::program::ProgramId;
use supervisor_core::status::{FlagChange, FlagSet, StatusFlag, StatusObserver};

/// Raw bits of the mirrored [`FlagSet`].
static FLAGS: AtomicU16 = AtomicU16::new(0);
/// Raw identifier of the selected program.
static PROGRAM_ID: AtomicU8 = AtomicU8::new(0);

/// Observer that publishes status changes to the atomics above.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusMirror;

impl StatusObserver for StatusMirror {
    fn on_flag_changed(&mut self, _change: FlagChange, flags: FlagSet) {
        FLAGS.store(flags.bits(), Ordering::Release);
    }

    fn on_program_id_changed(&mut self, id: ProgramId) {
        PROGRAM_ID.store(id.as_raw(), Ordering::Release);
    }
}

/// Returns the most recently published flags.
pub fn snapshot() -> FlagSet {
    FlagSet::from_bits(FLAGS.load(Ordering::Acquire))
}

pub fn program_id() -> ProgramId {
    ProgramId::from_raw(PROGRAM_ID.load(Ordering::Acquire))
}

/// What the status light shows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LightPattern {
    Off,
    On,
    /// Toggles every `period_ticks` poll ticks.
    Blink { period_ticks: u32 },
}

impl LightPattern {
    /// Light level for the given poll tick.
    pub const fn level_at(self, tick: u32) -> bool {
        match self {
            LightPattern::Off => false,
            LightPattern::On => true,
            LightPattern::Blink { period_ticks } => (tick / period_ticks) % 2 == 0,
        }
    }
}

/// Picks the light pattern for the current flags, most urgent first.
pub fn light_pattern(flags: FlagSet) -> LightPattern {
    if flags.contains(StatusFlag::Shutdown) {
        LightPattern::Off
    } else if flags.contains(StatusFlag::BatteryLowVoltageWarning)
        || flags.contains(StatusFlag::ShutdownRequested)
    {
        LightPattern::Blink { period_ticks: 10 }
    } else if flags.contains(StatusFlag::UserProgramRunning) {
        LightPattern::On
    } else {
        LightPattern::Blink { period_ticks: 50 }
    }
}

//! Supervisor telemetry catalog and the in-memory ring that stores it.
//!
//! Events carry compact numeric codes so firmware can mirror them over a
//! diagnostics channel, and a fixed-capacity ring keeps the most recent
//! history without allocation.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::program::{ProgramError, ProgramId, StartRequestType};
use crate::status::{FlagChange, FlagSet, StatusFlag, StatusObserver};
use crate::time::Timestamp;

/// Monotonic identifier assigned to each record; wraps on overflow.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated supervisor events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorEvent {
    FlagSet(StatusFlag),
    FlagCleared(StatusFlag),
    StartRequested(ProgramId, StartRequestType),
    StartRejected(ProgramId, ProgramError),
    ProgramStarted(ProgramId),
    ProgramFinished(ProgramId),
    StopRequested,
    RestartRequested(ProgramId),
    ShutdownRequested,
    ShutdownEntered,
    PowerHeld,
    PowerOffIssued(u32),
    DrainSaturated,
}

impl SupervisorEvent {
    const FLAG_SET_BASE: u16 = 0x0000;
    const FLAG_CLEARED_BASE: u16 = 0x0010;
    const START_REQUESTED_CODE: u16 = 0x0020;
    const START_REJECTED_CODE: u16 = 0x0021;
    const PROGRAM_STARTED_CODE: u16 = 0x0022;
    const PROGRAM_FINISHED_CODE: u16 = 0x0023;
    const STOP_REQUESTED_CODE: u16 = 0x0024;
    const RESTART_REQUESTED_CODE: u16 = 0x0025;
    const SHUTDOWN_REQUESTED_CODE: u16 = 0x0030;
    const SHUTDOWN_ENTERED_CODE: u16 = 0x0031;
    const POWER_HELD_CODE: u16 = 0x0032;
    const POWER_OFF_ISSUED_CODE: u16 = 0x0033;
    const DRAIN_SATURATED_CODE: u16 = 0x0040;

    /// Encodes the event kind into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            SupervisorEvent::FlagSet(flag) => Self::FLAG_SET_BASE + flag_code(flag),
            SupervisorEvent::FlagCleared(flag) => Self::FLAG_CLEARED_BASE + flag_code(flag),
            SupervisorEvent::StartRequested(..) => Self::START_REQUESTED_CODE,
            SupervisorEvent::StartRejected(..) => Self::START_REJECTED_CODE,
            SupervisorEvent::ProgramStarted(_) => Self::PROGRAM_STARTED_CODE,
            SupervisorEvent::ProgramFinished(_) => Self::PROGRAM_FINISHED_CODE,
            SupervisorEvent::StopRequested => Self::STOP_REQUESTED_CODE,
            SupervisorEvent::RestartRequested(_) => Self::RESTART_REQUESTED_CODE,
            SupervisorEvent::ShutdownRequested => Self::SHUTDOWN_REQUESTED_CODE,
            SupervisorEvent::ShutdownEntered => Self::SHUTDOWN_ENTERED_CODE,
            SupervisorEvent::PowerHeld => Self::POWER_HELD_CODE,
            SupervisorEvent::PowerOffIssued(_) => Self::POWER_OFF_ISSUED_CODE,
            SupervisorEvent::DrainSaturated => Self::DRAIN_SATURATED_CODE,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn flag_code(flag: StatusFlag) -> u16 {
    flag.as_index() as u16
}

impl fmt::Display for SupervisorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorEvent::FlagSet(flag) => write!(f, "flag-set {flag}"),
            SupervisorEvent::FlagCleared(flag) => write!(f, "flag-cleared {flag}"),
            SupervisorEvent::StartRequested(id, kind) => {
                write!(f, "start-requested {id} ({kind})")
            }
            SupervisorEvent::StartRejected(id, error) => {
                write!(f, "start-rejected {id}: {error}")
            }
            SupervisorEvent::ProgramStarted(id) => write!(f, "program-started {id}"),
            SupervisorEvent::ProgramFinished(id) => write!(f, "program-finished {id}"),
            SupervisorEvent::StopRequested => f.write_str("stop-requested"),
            SupervisorEvent::RestartRequested(id) => write!(f, "restart-requested {id}"),
            SupervisorEvent::ShutdownRequested => f.write_str("shutdown-requested"),
            SupervisorEvent::ShutdownEntered => f.write_str("shutdown-entered"),
            SupervisorEvent::PowerHeld => f.write_str("power-held"),
            SupervisorEvent::PowerOffIssued(attempt) => write!(f, "power-off-issued #{attempt}"),
            SupervisorEvent::DrainSaturated => f.write_str("drain-saturated"),
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub event: SupervisorEvent,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Id the next record will receive.
    #[must_use]
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records still in the ring with an id at or after `cursor`, oldest
    /// first. Used by log pumps that remember where they stopped.
    pub fn since(&self, cursor: EventId) -> impl Iterator<Item = &TelemetryRecord> {
        let pending = self.next_event_id.wrapping_sub(cursor);
        self.oldest_first()
            .filter(move |record| self.next_event_id.wrapping_sub(record.id) <= pending)
    }

    pub fn record(&mut self, event: SupervisorEvent, timestamp: Timestamp) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
        });

        id
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a history of flag transitions when installed as a registry observer.
impl<const CAPACITY: usize> StatusObserver for TelemetryRecorder<CAPACITY> {
    fn on_flag_changed(&mut self, change: FlagChange, _flags: FlagSet) {
        let event = if change.value {
            SupervisorEvent::FlagSet(change.flag)
        } else {
            SupervisorEvent::FlagCleared(change.flag)
        };
        self.record(event, change.at);
    }
}

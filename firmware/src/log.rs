//! Mirrors supervisor telemetry to the debug log.
//!
//! The recorder keeps a bounded ring; [`LogPump`] remembers the last id it
//! emitted so each record is logged exactly once, as long as the pump runs
//! before the ring wraps.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use supervisor_core::telemetry::{EventId, SupervisorEvent, TelemetryRecord, TelemetryRecorder};

#[derive(Clone, Copy, Debug, Default)]
pub struct LogPump {
    cursor: EventId,
}

impl LogPump {
    pub const fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Logs every record added since the previous call and returns how many.
    pub fn flush<const CAPACITY: usize>(&mut self, telemetry: &TelemetryRecorder<CAPACITY>) -> usize {
        let mut emitted = 0;
        for record in telemetry.since(self.cursor) {
            emit_record(record);
            emitted += 1;
        }
        self.cursor = telemetry.next_id();
        emitted
    }
}

const fn is_warning(event: SupervisorEvent) -> bool {
    matches!(
        event,
        SupervisorEvent::StartRejected(..)
            | SupervisorEvent::ShutdownRequested
            | SupervisorEvent::DrainSaturated
    )
}

#[cfg(target_os = "none")]
fn emit_record(record: &TelemetryRecord) {
    if is_warning(record.event) {
        defmt::warn!(
            "supervisor: #{} {} code={=u16:#x} t={}ms",
            record.id,
            record.event,
            record.event.to_raw(),
            record.timestamp.as_millis()
        );
    } else {
        defmt::info!(
            "supervisor: #{} {} code={=u16:#x} t={}ms",
            record.id,
            record.event,
            record.event.to_raw(),
            record.timestamp.as_millis()
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_record(record: &TelemetryRecord) {
    let level = if is_warning(record.event) { "warn" } else { "info" };
    println!(
        "supervisor[{level}]: #{} {} code={:#06x} t={}",
        record.id,
        record.event,
        record.event.to_raw(),
        record.timestamp
    );
}

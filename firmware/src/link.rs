//! Byte protocol spoken by the host link.
//!
//! The radio bridge hands the MCU a plain byte stream. A handful of control
//! bytes carry remote commands and connection state. Everything else is
//! program stdin, delivered only while forwarding is enabled.
//!
//! | Byte          | Meaning                                  |
//! |---------------|------------------------------------------|
//! | `0x01 <id>`   | start program `<id>` (raw [`ProgramId`]) |
//! | `0x02`        | stop the running program                 |
//! | `0x03`        | host connected                           |
//! | `0x04`        | host disconnected                        |

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use portable_atomic::{AtomicBool, Ordering};
use supervisor_core::hub::{HubEvent, RemoteCommand};
use supervisor_core::program::ProgramId;

pub const START_PROGRAM: u8 = 0x01;
pub const STOP_PROGRAM: u8 = 0x02;
pub const HOST_CONNECTED: u8 = 0x03;
pub const HOST_DISCONNECTED: u8 = 0x04;

/// Set once the UART bridge finished initialising.
static LINK_READY: AtomicBool = AtomicBool::new(false);
/// Set while bytes should be forwarded to program stdin.
static RX_FORWARDING: AtomicBool = AtomicBool::new(false);

pub fn set_ready(ready: bool) {
    LINK_READY.store(ready, Ordering::Release);
}

pub fn is_ready() -> bool {
    LINK_READY.load(Ordering::Acquire)
}

pub fn set_forwarding(enabled: bool) {
    RX_FORWARDING.store(enabled, Ordering::Release);
}

pub fn forwarding() -> bool {
    RX_FORWARDING.load(Ordering::Acquire)
}

/// Incremental decoder for the host link.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LinkDecoder {
    awaiting_program: bool,
}

impl LinkDecoder {
    pub const fn new() -> Self {
        Self {
            awaiting_program: false,
        }
    }

    /// Consumes one byte. Stdin bytes are dropped unless `forwarding`.
    pub fn feed(&mut self, byte: u8, forwarding: bool) -> Option<HubEvent> {
        if self.awaiting_program {
            self.awaiting_program = false;
            let id = ProgramId::from_raw(byte);
            return Some(HubEvent::Remote(RemoteCommand::StartProgram(id)));
        }

        match byte {
            START_PROGRAM => {
                self.awaiting_program = true;
                None
            }
            STOP_PROGRAM => Some(HubEvent::Remote(RemoteCommand::StopProgram)),
            HOST_CONNECTED => Some(HubEvent::HostConnection(true)),
            HOST_DISCONNECTED => Some(HubEvent::HostConnection(false)),
            _ if forwarding => Some(HubEvent::Stdin(byte)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], forwarding: bool) -> Vec<HubEvent> {
        let mut decoder = LinkDecoder::new();
        bytes
            .iter()
            .filter_map(|byte| decoder.feed(*byte, forwarding))
            .collect()
    }

    #[test]
    fn start_takes_the_following_byte_as_program() {
        assert_eq!(
            decode(&[START_PROGRAM, 0x80, START_PROGRAM, 0x02], false),
            vec![
                HubEvent::Remote(RemoteCommand::StartProgram(ProgramId::REPL)),
                HubEvent::Remote(RemoteCommand::StartProgram(ProgramId::from_raw(2))),
            ]
        );
    }

    #[test]
    fn stdin_requires_forwarding() {
        assert!(decode(b"hi", false).is_empty());
        assert_eq!(
            decode(&[b'h', STOP_PROGRAM, b'i'], true),
            vec![
                HubEvent::Stdin(b'h'),
                HubEvent::Remote(RemoteCommand::StopProgram),
                HubEvent::Stdin(b'i'),
            ]
        );
    }

    #[test]
    fn connection_bytes_toggle_host_state() {
        assert_eq!(
            decode(&[HOST_CONNECTED, HOST_DISCONNECTED], true),
            vec![
                HubEvent::HostConnection(true),
                HubEvent::HostConnection(false)
            ]
        );
    }
}

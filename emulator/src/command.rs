//! Console grammar for the hub emulator.
//!
//! Commands are case-insensitive words followed by at most a couple of
//! arguments. Durations accept an optional `ms` suffix.

use supervisor_core::program::ProgramId;
use winnow::ascii::{Caseless, dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, separated_pair, terminated};
use winnow::ModalResult;
use winnow::prelude::*;
use winnow::token::rest;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Press the center button and keep it down.
    Press,
    Release,
    /// Press, keep it down for the given milliseconds, release.
    Hold(u32),
    /// Let virtual time pass.
    Tick(u32),
    Usb(bool),
    Host(bool),
    Battery(BatteryCommand),
    Load { slot: u8, len: u32 },
    Erase(u8),
    Start(ProgramId),
    Stop,
    /// A line of program input; a newline is appended.
    Stdin(String),
    Status,
    Help,
    Exit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatteryCommand {
    Ok,
    Low,
    Critical,
}

pub const HELP_LINES: &[&str] = &[
    "press | release               - drive the center button",
    "hold <ms>                     - press for <ms>, then release",
    "tick <ms>                     - let time pass",
    "usb on|off                    - attach or detach USB power",
    "host on|off                   - connect or disconnect the host",
    "battery ok|low|critical       - report a battery level",
    "load <slot> <len> | erase <slot> - manage program slots",
    "start <slot|repl|port-view>   - remote start request",
    "stop                          - remote stop request",
    "stdin <text>                  - send a line to the running program",
    "status                        - show flags and hub state",
    "exit                          - leave the emulator",
];

/// Parses one console line.
pub fn parse(line: &str) -> Result<Command, String> {
    command
        .parse(line.trim())
        .map_err(|err| format!("unexpected input at column {}", err.offset() + 1))
}

fn command(input: &mut &str) -> ModalResult<Command> {
    terminated(
        alt((
            preceded((Caseless("hold"), space1), millis).map(Command::Hold),
            preceded((Caseless("tick"), space1), millis).map(Command::Tick),
            preceded((Caseless("usb"), space1), switch).map(Command::Usb),
            preceded((Caseless("host"), space1), switch).map(Command::Host),
            preceded((Caseless("battery"), space1), battery).map(Command::Battery),
            preceded(
                (Caseless("load"), space1),
                separated_pair(dec_uint, space1, dec_uint),
            )
            .map(|(slot, len)| Command::Load { slot, len }),
            preceded((Caseless("erase"), space1), dec_uint).map(Command::Erase),
            preceded((Caseless("start"), space1), program).map(Command::Start),
            preceded((Caseless("stdin"), space1), rest)
                .map(|text: &str| Command::Stdin(text.to_string())),
            Caseless("press").value(Command::Press),
            Caseless("release").value(Command::Release),
            Caseless("stop").value(Command::Stop),
            Caseless("status").value(Command::Status),
            Caseless("help").value(Command::Help),
            alt((Caseless("exit"), Caseless("quit"))).value(Command::Exit),
        )),
        (space0, eof),
    )
    .parse_next(input)
}

fn millis(input: &mut &str) -> ModalResult<u32> {
    terminated(dec_uint, opt(Caseless("ms"))).parse_next(input)
}

fn switch(input: &mut &str) -> ModalResult<bool> {
    alt((Caseless("on").value(true), Caseless("off").value(false))).parse_next(input)
}

fn battery(input: &mut &str) -> ModalResult<BatteryCommand> {
    alt((
        Caseless("ok").value(BatteryCommand::Ok),
        Caseless("low").value(BatteryCommand::Low),
        Caseless("critical").value(BatteryCommand::Critical),
    ))
    .parse_next(input)
}

fn program(input: &mut &str) -> ModalResult<ProgramId> {
    alt((
        Caseless("repl").value(ProgramId::REPL),
        Caseless("port-view").value(ProgramId::PORT_VIEW),
        dec_uint.map(ProgramId::from_raw),
    ))
    .parse_next(input)
}

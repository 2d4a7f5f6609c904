//! Resident program runner.
//!
//! The image does not carry a bytecode interpreter. Every program, slot or
//! builtin, runs as a line console on stdin that keeps pumping supervisor
//! events until it is stopped or asked to exit. This is enough to exercise
//! the full start, stop and restart lifecycle from the host link.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use heapless::Vec;
use supervisor_core::hub::{ProgramEnvironment, ProgramExecutor};
use supervisor_core::program::ProgramDescriptor;

/// Longest stdin line kept; longer lines are discarded.
pub const LINE_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ConsoleCommand {
    Restart,
    Exit,
}

fn parse_command(line: &[u8]) -> Option<ConsoleCommand> {
    match line.trim_ascii() {
        b"restart" => Some(ConsoleCommand::Restart),
        b"exit" => Some(ConsoleCommand::Exit),
        _ => None,
    }
}

/// Runs programs in place, calling `idle` whenever no input is pending.
pub struct ResidentExecutor<F> {
    idle: F,
}

impl<F: FnMut()> ResidentExecutor<F> {
    pub const fn new(idle: F) -> Self {
        Self { idle }
    }
}

impl<F: FnMut()> ProgramExecutor for ResidentExecutor<F> {
    fn run_program(&mut self, _program: &ProgramDescriptor, env: &mut dyn ProgramEnvironment) {
        let mut line: Vec<u8, LINE_CAPACITY> = Vec::new();
        let mut overflowed = false;

        loop {
            env.pump_events();
            if env.stop_requested() {
                return;
            }

            while let Some(byte) = env.read_stdin() {
                if byte == b'\n' || byte == b'\r' {
                    let command = if overflowed { None } else { parse_command(&line) };
                    line.clear();
                    overflowed = false;
                    match command {
                        Some(ConsoleCommand::Restart) => {
                            env.request_restart();
                            return;
                        }
                        Some(ConsoleCommand::Exit) => return,
                        None => {}
                    }
                } else if line.push(byte).is_err() {
                    overflowed = true;
                }
            }

            (self.idle)();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use supervisor_core::hub::ButtonMask;
    use supervisor_core::status::FlagSet;
    use supervisor_core::time::Timestamp;

    #[derive(Default)]
    struct FakeEnv {
        stdin: VecDeque<u8>,
        stop_after_pumps: Option<usize>,
        pumps: usize,
        restarts: usize,
    }

    impl ProgramEnvironment for FakeEnv {
        fn now(&self) -> Timestamp {
            Timestamp::ZERO
        }

        fn pump_events(&mut self) -> usize {
            self.pumps += 1;
            0
        }

        fn stop_requested(&self) -> bool {
            self.stop_after_pumps
                .is_some_and(|limit| self.pumps >= limit)
        }

        fn request_restart(&mut self) {
            self.restarts += 1;
        }

        fn read_stdin(&mut self) -> Option<u8> {
            self.stdin.pop_front()
        }

        fn set_stop_buttons(&mut self, _buttons: ButtonMask) {}

        fn status(&self) -> FlagSet {
            FlagSet::EMPTY
        }
    }

    fn run(env: &mut FakeEnv) -> usize {
        let mut idles = 0;
        let mut executor = ResidentExecutor::new(|| idles += 1);
        executor.run_program(&ProgramDescriptor::new(), env);
        idles
    }

    #[test]
    fn restart_line_requests_restart() {
        let mut env = FakeEnv {
            stdin: b"print(1)\nrestart\n".iter().copied().collect(),
            ..FakeEnv::default()
        };
        run(&mut env);
        assert_eq!(env.restarts, 1);
    }

    #[test]
    fn stops_when_asked_and_idles_meanwhile() {
        let mut env = FakeEnv {
            stop_after_pumps: Some(3),
            ..FakeEnv::default()
        };
        assert_eq!(run(&mut env), 2);
        assert_eq!(env.restarts, 0);
    }

    #[test]
    fn overlong_lines_are_discarded() {
        let mut stdin: VecDeque<u8> = core::iter::repeat_n(b'x', LINE_CAPACITY).collect();
        stdin.extend(b"restart\nexit\n");
        let mut env = FakeEnv {
            stdin,
            ..FakeEnv::default()
        };
        run(&mut env);
        assert_eq!(env.restarts, 0);
    }
}

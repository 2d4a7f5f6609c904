//! Host-side hub that runs the real supervisor loop against a console.
//!
//! The supervisor asks the hub for events; whenever the queue runs dry the
//! hub yields once, then reads the next console line and turns it into
//! events. Time is virtual and only advances through `tick` and `hold`, so a
//! transcript always replays the same way.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use supervisor_core::config::{HubConfig, HubProfile};
use supervisor_core::hmi::ShutdownWake;
use supervisor_core::hub::{
    ButtonMask, ButtonSampler, Clock, EventSource, HubEvent, Outputs, PowerControl,
    ProgramEnvironment, ProgramExecutor, Radio, RemoteCommand, ResetAction, ResetControl,
    SampleError, Subsystems, UsbCharger, UsbStatus,
};
use supervisor_core::power::PowerDownState;
use supervisor_core::program::{
    MAX_SLOTS, ProgramDescriptor, ProgramError, ProgramId, ProgramImage, ProgramStorage,
    ProgramValidator,
};
use supervisor_core::status::{FlagChange, FlagSet, StatusObserver};
use supervisor_core::supervisor::{LoopControl, Supervisor};
use supervisor_core::time::Timestamp;

use crate::command::{self, BatteryCommand, Command, HELP_LINES};

/// Poll period of the emulated button timer.
pub const TICK_MS: u32 = 10;

/// Lines produced by the emulator, drained by whoever drives the console.
pub type Output = Rc<RefCell<Vec<String>>>;

#[derive(Clone, Copy, Debug)]
enum Step {
    Advance(u32),
    Button(bool),
    Usb(UsbStatus),
    Event(HubEvent),
}

/// State shared by the hub, the observer, and the executor.
#[derive(Debug, Default)]
struct Shared {
    flags: FlagSet,
    program: Option<ProgramId>,
    resets: usize,
}

pub struct EmulatedHub<I> {
    input: I,
    output: Output,
    shared: Rc<RefCell<Shared>>,
    config: HubConfig,
    pending: VecDeque<Step>,
    yielded: bool,
    closed: bool,
    now: u32,
    pressed: bool,
    usb: UsbStatus,
    forwarding: bool,
    powered: bool,
    images: [ProgramImage; MAX_SLOTS as usize],
}

impl<I: Iterator<Item = String>> EmulatedHub<I> {
    fn new(config: HubConfig, input: I, output: Output, shared: Rc<RefCell<Shared>>) -> Self {
        Self {
            input,
            output,
            shared,
            config,
            pending: VecDeque::new(),
            yielded: false,
            closed: false,
            now: 0,
            pressed: false,
            usb: UsbStatus::None,
            forwarding: false,
            powered: true,
            images: [ProgramImage::EMPTY; MAX_SLOTS as usize],
        }
    }

    /// Whether the console reached its end or asked to exit.
    pub fn closed(&self) -> bool {
        self.closed
    }

    pub fn powered(&self) -> bool {
        self.powered
    }

    fn say(&self, line: impl Into<String>) {
        self.output.borrow_mut().push(line.into());
    }

    fn ticks(&mut self, duration_ms: u32) {
        for _ in 0..duration_ms.div_ceil(TICK_MS) {
            self.pending.push_back(Step::Advance(TICK_MS));
            self.pending.push_back(Step::Event(HubEvent::PollTimer));
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.pending
                .push_back(Step::Event(HubEvent::Remote(RemoteCommand::StopProgram)));
        }
    }

    fn read_line(&mut self) {
        let Some(line) = self.input.next() else {
            self.close();
            return;
        };
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match command::parse(line) {
            Ok(command) => self.handle(command),
            Err(err) => self.say(format!("ERR syntax {err}")),
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Press => {
                self.pending.push_back(Step::Button(true));
                self.ticks(TICK_MS);
            }
            Command::Release => {
                self.pending.push_back(Step::Button(false));
                self.ticks(TICK_MS);
            }
            Command::Hold(duration_ms) => {
                self.pending.push_back(Step::Button(true));
                self.ticks(duration_ms);
                self.pending.push_back(Step::Button(false));
                self.ticks(TICK_MS);
            }
            Command::Tick(duration_ms) => self.ticks(duration_ms),
            Command::Usb(attached) => {
                let status = if attached {
                    UsbStatus::StandardDownstream
                } else {
                    UsbStatus::None
                };
                self.pending.push_back(Step::Usb(status));
            }
            Command::Host(connected) => self.event(HubEvent::HostConnection(connected)),
            Command::Battery(level) => self.event(match level {
                BatteryCommand::Ok => HubEvent::BatteryLow(false),
                BatteryCommand::Low => HubEvent::BatteryLow(true),
                BatteryCommand::Critical => HubEvent::BatteryCritical,
            }),
            Command::Load { slot, len } if slot < MAX_SLOTS => {
                self.images[usize::from(slot)] = ProgramImage::new(u32::from(slot) * 0x1000, len);
                self.say(format!("OK slot {slot} len={len}"));
            }
            Command::Erase(slot) if slot < MAX_SLOTS => {
                self.images[usize::from(slot)] = ProgramImage::EMPTY;
                self.say(format!("OK slot {slot} erased"));
            }
            Command::Load { slot, .. } | Command::Erase(slot) => {
                self.say(format!("ERR slot {slot} out of range (max {})", MAX_SLOTS - 1));
            }
            Command::Start(id) => self.event(HubEvent::Remote(RemoteCommand::StartProgram(id))),
            Command::Stop => self.event(HubEvent::Remote(RemoteCommand::StopProgram)),
            Command::Stdin(text) => {
                for byte in text.bytes().chain(Some(b'\n')) {
                    self.event(HubEvent::Stdin(byte));
                }
            }
            Command::Status => self.report_status(),
            Command::Help => {
                for line in HELP_LINES {
                    self.say(*line);
                }
            }
            Command::Exit => self.close(),
        }
    }

    fn event(&mut self, event: HubEvent) {
        self.pending.push_back(Step::Event(event));
    }

    fn report_status(&self) {
        let shared = self.shared.borrow();
        let flags: Vec<&str> = shared.flags.iter().map(|flag| flag.label()).collect();
        let program = shared
            .program
            .map_or_else(|| "none".to_string(), |id| id.to_string());
        self.say(format!(
            "t={}ms flags=[{}] program={} usb={:?} forwarding={}",
            self.now,
            flags.join(","),
            program,
            self.usb,
            self.forwarding
        ));
    }
}

impl<I> Clock for EmulatedHub<I> {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now)
    }
}

impl<I: Iterator<Item = String>> EventSource for EmulatedHub<I> {
    fn poll_event(&mut self) -> Option<HubEvent> {
        loop {
            if let Some(step) = self.pending.pop_front() {
                match step {
                    Step::Advance(ms) => self.now = self.now.wrapping_add(ms),
                    Step::Button(pressed) => self.pressed = pressed,
                    Step::Usb(status) => self.usb = status,
                    Step::Event(event) => return Some(event),
                }
                continue;
            }

            // let the supervisor act on what it has seen before blocking
            if !self.yielded || self.closed {
                self.yielded = true;
                return None;
            }

            self.yielded = false;
            self.read_line();
        }
    }
}

impl<I> ButtonSampler for EmulatedHub<I> {
    fn is_pressed(&mut self) -> Result<ButtonMask, SampleError> {
        Ok(if self.pressed {
            ButtonMask::CENTER
        } else {
            ButtonMask::NONE
        })
    }
}

impl<I> Radio for EmulatedHub<I> {
    fn is_ready(&self) -> bool {
        true
    }

    fn set_rx_forwarding(&mut self, enabled: bool) {
        self.forwarding = enabled;
    }
}

impl<I> ResetControl for EmulatedHub<I> {
    fn reset(&mut self, action: ResetAction) {
        self.output
            .borrow_mut()
            .push(format!("hub: reset ({action:?})"));
    }
}

impl<I> PowerControl for EmulatedHub<I> {
    fn power_off(&mut self) {
        if self.powered {
            self.powered = false;
            self.output.borrow_mut().push("hub: power off".to_string());
        }
    }
}

impl<I> UsbCharger for EmulatedHub<I> {
    fn usb_status(&self) -> UsbStatus {
        self.usb
    }
}

impl<I> Outputs for EmulatedHub<I> {
    fn stop_all(&mut self, _reset: bool) {}
}

impl<I> Subsystems for EmulatedHub<I> {
    fn deinit(&mut self) {
        self.forwarding = false;
        self.output.borrow_mut().push("hub: subsystems released".to_string());
    }
}

impl<I> ProgramStorage for EmulatedHub<I> {
    fn load_program(&mut self, program: &mut ProgramDescriptor) {
        if let Some(slot) = program.id.slot_index().filter(|slot| *slot < MAX_SLOTS) {
            program.image = self.images[usize::from(slot)];
        }
    }
}

impl<I> ProgramValidator for EmulatedHub<I> {
    fn validate(&self, program: &ProgramDescriptor) -> Result<(), ProgramError> {
        self.config.validate(program)
    }
}

/// Narrates status changes onto the console.
pub struct ConsoleObserver {
    output: Output,
    shared: Rc<RefCell<Shared>>,
}

impl StatusObserver for ConsoleObserver {
    fn on_flag_changed(&mut self, change: FlagChange, flags: FlagSet) {
        self.shared.borrow_mut().flags = flags;
        let sign = if change.value { '+' } else { '-' };
        self.output
            .borrow_mut()
            .push(format!("status: {sign}{} t={}", change.flag, change.at));
    }

    fn on_program_id_changed(&mut self, id: ProgramId) {
        self.shared.borrow_mut().program = Some(id);
    }
}

/// Counts the resets requested while shut down.
pub struct WakeReset {
    output: Output,
    shared: Rc<RefCell<Shared>>,
}

impl ResetControl for WakeReset {
    fn reset(&mut self, action: ResetAction) {
        self.shared.borrow_mut().resets += 1;
        self.output
            .borrow_mut()
            .push(format!("hub: reset ({action:?}) from button"));
    }
}

/// Stand-in user program: echoes input lines until stopped.
///
/// `restart` asks the supervisor to run it again, `exit` ends it.
pub struct EchoExecutor {
    output: Output,
}

impl ProgramExecutor for EchoExecutor {
    fn run_program(&mut self, program: &ProgramDescriptor, env: &mut dyn ProgramEnvironment) {
        let mut line = Vec::new();
        loop {
            env.pump_events();
            if env.stop_requested() {
                self.say(format!("{}: stopped", program.id));
                return;
            }

            while let Some(byte) = env.read_stdin() {
                if byte != b'\n' {
                    line.push(byte);
                    continue;
                }
                let text = String::from_utf8_lossy(&line).into_owned();
                line.clear();
                match text.trim() {
                    "restart" => {
                        self.say(format!("{}: restarting", program.id));
                        env.request_restart();
                        return;
                    }
                    "exit" => {
                        self.say(format!("{}: exited", program.id));
                        return;
                    }
                    other => self.say(format!("{}> {other}", program.id)),
                }
            }
        }
    }
}

impl EchoExecutor {
    fn say(&self, line: String) {
        self.output.borrow_mut().push(line);
    }
}

type Observer = (ConsoleObserver, ShutdownWake<WakeReset>);

/// An emulated hub running the supervisor until the console closes.
pub struct Session<I: Iterator<Item = String>> {
    supervisor: Supervisor<EmulatedHub<I>, EchoExecutor, Observer>,
    shared: Rc<RefCell<Shared>>,
}

impl<I: Iterator<Item = String>> Session<I> {
    /// Creates a session reading commands from `input` and narrating into
    /// `output`.
    pub fn new(profile: HubProfile, input: I, output: Output) -> Self {
        let config = profile.config();
        let shared: Rc<RefCell<Shared>> = Rc::default();

        let mut hub = EmulatedHub::new(config, input, Rc::clone(&output), Rc::clone(&shared));
        let settle = u32::try_from(config.boot_settle.as_millis()).unwrap_or(u32::MAX);
        hub.ticks(settle);

        let observer = (
            ConsoleObserver {
                output: Rc::clone(&output),
                shared: Rc::clone(&shared),
            },
            ShutdownWake::new(
                WakeReset {
                    output: Rc::clone(&output),
                    shared: Rc::clone(&shared),
                },
                config.battery_charger,
            ),
        );
        let executor = EchoExecutor {
            output: Rc::clone(&output),
        };

        Self {
            supervisor: Supervisor::with_observer(config, hub, executor, observer),
            shared,
        }
    }

    /// Runs until the console closes or the hub powers off and returns the
    /// final power-down state, if shutdown was reached.
    pub fn run(mut self) -> Option<PowerDownState> {
        self.supervisor.boot();
        loop {
            if self.supervisor.hub().closed() {
                return None;
            }
            if self.supervisor.run_once() == LoopControl::Shutdown {
                break;
            }
        }

        let mut power_down = self.supervisor.shutdown();
        loop {
            let state = power_down.step();
            let hub = power_down.hub();
            if !hub.powered() || hub.closed() || self.shared.borrow().resets > 0 {
                return Some(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(profile: HubProfile, lines: &[&str]) -> (Option<PowerDownState>, Vec<String>) {
        let input: Vec<String> = lines.iter().map(ToString::to_string).collect();
        let output = Output::default();
        let session = Session::new(profile, input.into_iter(), Rc::clone(&output));
        let state = session.run();
        let lines = output.borrow().clone();
        (state, lines)
    }

    fn contains(lines: &[String], needle: &str) -> bool {
        lines.iter().any(|line| line.contains(needle))
    }

    #[test]
    fn short_press_runs_the_loaded_slot_and_echoes_stdin() {
        let (state, lines) = run(
            HubProfile::PrimeHub,
            &["load 0 256", "hold 100", "stdin hello", "stdin exit", "status"],
        );

        assert_eq!(state, None);
        assert!(contains(&lines, "status: +program-running"), "{lines:#?}");
        assert!(contains(&lines, "slot 0> hello"), "{lines:#?}");
        assert!(contains(&lines, "slot 0: exited"), "{lines:#?}");
        assert!(contains(&lines, "status: -program-running"), "{lines:#?}");
    }

    #[test]
    fn long_press_while_idle_powers_off_a_city_hub() {
        let (state, lines) = run(HubProfile::CityHub, &["hold 2500", "tick 20"]);

        assert_eq!(state, Some(PowerDownState::PowerOffIssued { attempts: 1 }));
        assert!(contains(&lines, "status: +shutdown-requested"), "{lines:#?}");
        assert!(contains(&lines, "hub: power off"), "{lines:#?}");
    }

    #[test]
    fn usb_holds_power_until_the_button_resets_the_hub() {
        let (state, lines) = run(
            HubProfile::PrimeHub,
            &["usb on", "battery critical", "tick 20", "press"],
        );

        assert!(matches!(state, Some(PowerDownState::HeldOn(_))), "{state:?}");
        assert!(contains(&lines, "from button"), "{lines:#?}");
        assert!(!contains(&lines, "hub: power off"), "{lines:#?}");
    }

    #[test]
    fn syntax_errors_are_reported_and_ignored() {
        let (_, lines) = run(HubProfile::TechnicHub, &["reboot now", "help"]);
        assert!(contains(&lines, "ERR syntax"), "{lines:#?}");
        assert!(contains(&lines, "hold <ms>"), "{lines:#?}");
    }

    #[test]
    fn starting_an_empty_slot_is_rejected() {
        let (_, lines) = run(HubProfile::CityHub, &["start 0", "status"]);
        assert!(!contains(&lines, "+program-running"), "{lines:#?}");
        assert!(contains(&lines, "program=none"), "{lines:#?}");
    }
}

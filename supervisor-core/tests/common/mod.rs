#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use supervisor_core::config::HubConfig;
use supervisor_core::hub::{
    ButtonMask, ButtonSampler, Clock, EventSource, HubEvent, Outputs, PowerControl,
    ProgramEnvironment, ProgramExecutor, Radio, ResetAction, ResetControl, SampleError,
    Subsystems, UsbCharger, UsbStatus,
};
use supervisor_core::program::{
    MAX_SLOTS, ProgramDescriptor, ProgramError, ProgramId, ProgramImage, ProgramStorage,
    ProgramValidator, StartRequestType,
};
use supervisor_core::status::{FlagChange, FlagSet, StatusFlag, StatusObserver};
use supervisor_core::time::Timestamp;

/// Poll period used by the scripted hub.
pub const TICK_MS: u32 = 10;

/// One scripted occurrence, consumed in order by `poll_event`.
#[derive(Clone, Copy, Debug)]
pub enum Step {
    Advance(u32),
    Button(bool),
    SampleFails(bool),
    RadioReady(bool),
    Usb(UsbStatus),
    Event(HubEvent),
    /// Ends the current drain: `poll_event` reports an empty queue once.
    Pause,
}

/// Hardware side effects observed by the simulated hub.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Call {
    Forwarding(bool),
    StopAll,
    Deinit,
    PowerOff,
    Reset(ResetAction),
}

pub struct SimHub {
    pub now: u32,
    pub script: VecDeque<Step>,
    pub pressed: bool,
    pub sample_fails: bool,
    pub radio_ready: bool,
    pub usb: UsbStatus,
    pub images: [ProgramImage; MAX_SLOTS as usize],
    pub config: HubConfig,
    pub calls: Vec<Call>,
}

impl SimHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            now: 0,
            script: VecDeque::new(),
            pressed: false,
            sample_fails: false,
            radio_ready: true,
            usb: UsbStatus::None,
            images: [ProgramImage::EMPTY; MAX_SLOTS as usize],
            config,
            calls: Vec::new(),
        }
    }

    pub fn with_program(mut self, slot: u8, len: u32) -> Self {
        self.images[usize::from(slot)] = ProgramImage::new(u32::from(slot) * 0x1000, len);
        self
    }

    pub fn push(&mut self, step: Step) -> &mut Self {
        self.script.push_back(step);
        self
    }

    /// Advances one poll period and delivers a poll tick.
    pub fn tick(&mut self) -> &mut Self {
        self.push(Step::Advance(TICK_MS))
            .push(Step::Event(HubEvent::PollTimer))
    }

    /// Keeps the button at `pressed` for `duration_ms`, ticking every period.
    pub fn hold(&mut self, pressed: bool, duration_ms: u32) -> &mut Self {
        self.push(Step::Button(pressed));
        for _ in 0..duration_ms.div_ceil(TICK_MS) {
            self.tick();
        }
        self
    }

    /// A complete short press preceded and followed by released samples.
    pub fn short_press(&mut self) -> &mut Self {
        self.hold(false, 30).hold(true, 100).hold(false, 30)
    }

    pub fn event(&mut self, event: HubEvent) -> &mut Self {
        self.push(Step::Event(event))
    }

    pub fn pause(&mut self) -> &mut Self {
        self.push(Step::Pause)
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|seen| **seen == call).count()
    }
}

impl Clock for SimHub {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now)
    }
}

impl EventSource for SimHub {
    fn poll_event(&mut self) -> Option<HubEvent> {
        while let Some(step) = self.script.pop_front() {
            match step {
                Step::Advance(ms) => self.now = self.now.wrapping_add(ms),
                Step::Button(pressed) => self.pressed = pressed,
                Step::SampleFails(fails) => self.sample_fails = fails,
                Step::RadioReady(ready) => self.radio_ready = ready,
                Step::Usb(status) => self.usb = status,
                Step::Event(event) => return Some(event),
                Step::Pause => return None,
            }
        }
        None
    }
}

impl ButtonSampler for SimHub {
    fn is_pressed(&mut self) -> Result<ButtonMask, SampleError> {
        if self.sample_fails {
            Err(SampleError::Io)
        } else if self.pressed {
            Ok(ButtonMask::CENTER)
        } else {
            Ok(ButtonMask::NONE)
        }
    }
}

impl Radio for SimHub {
    fn is_ready(&self) -> bool {
        self.radio_ready
    }

    fn set_rx_forwarding(&mut self, enabled: bool) {
        self.calls.push(Call::Forwarding(enabled));
    }
}

impl ResetControl for SimHub {
    fn reset(&mut self, action: ResetAction) {
        self.calls.push(Call::Reset(action));
    }
}

impl PowerControl for SimHub {
    fn power_off(&mut self) {
        self.calls.push(Call::PowerOff);
    }
}

impl UsbCharger for SimHub {
    fn usb_status(&self) -> UsbStatus {
        self.usb
    }
}

impl Outputs for SimHub {
    fn stop_all(&mut self, _reset: bool) {
        self.calls.push(Call::StopAll);
    }
}

impl Subsystems for SimHub {
    fn deinit(&mut self) {
        self.calls.push(Call::Deinit);
    }
}

impl ProgramStorage for SimHub {
    fn load_program(&mut self, program: &mut ProgramDescriptor) {
        if let Some(slot) = program.id.slot_index() {
            program.image = self.images[usize::from(slot)];
        }
    }
}

impl ProgramValidator for SimHub {
    fn validate(&self, program: &ProgramDescriptor) -> Result<(), ProgramError> {
        self.config.validate(program)
    }
}

/// What the scripted executor does on a given run.
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Return immediately.
    Finish,
    /// Pump events until asked to stop; panics after `max_pumps`.
    RunUntilStop { max_pumps: usize },
    /// Ask for a restart, then return.
    Restart,
    /// Pump once, then collect stdin until it is empty.
    EchoStdin,
    /// Clear the stop buttons, then pump a fixed number of times.
    IgnoreStopButton { pumps: usize },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Run {
    pub id: ProgramId,
    pub request_type: StartRequestType,
    pub flags: FlagSet,
    pub stdin: Vec<u8>,
}

pub struct ScriptedExecutor {
    pub behaviors: VecDeque<Behavior>,
    pub runs: Vec<Run>,
}

impl ScriptedExecutor {
    pub fn new(behaviors: impl IntoIterator<Item = Behavior>) -> Self {
        Self {
            behaviors: behaviors.into_iter().collect(),
            runs: Vec::new(),
        }
    }
}

impl ProgramExecutor for ScriptedExecutor {
    fn run_program(&mut self, program: &ProgramDescriptor, env: &mut dyn ProgramEnvironment) {
        let mut run = Run {
            id: program.id,
            request_type: program.start_request_type,
            flags: env.status(),
            stdin: Vec::new(),
        };

        match self.behaviors.pop_front().unwrap_or(Behavior::Finish) {
            Behavior::Finish => {}
            Behavior::RunUntilStop { max_pumps } => {
                let mut pumps = 0;
                while !env.stop_requested() {
                    assert!(pumps < max_pumps, "program was never asked to stop");
                    env.pump_events();
                    pumps += 1;
                }
            }
            Behavior::Restart => env.request_restart(),
            Behavior::EchoStdin => {
                env.pump_events();
                while let Some(byte) = env.read_stdin() {
                    run.stdin.push(byte);
                }
            }
            Behavior::IgnoreStopButton { pumps } => {
                env.set_stop_buttons(ButtonMask::NONE);
                for _ in 0..pumps {
                    env.pump_events();
                }
            }
        }

        self.runs.push(run);
    }
}

/// Counts resets issued through a shared cell.
#[derive(Clone, Default)]
pub struct SharedReset(pub Rc<Cell<usize>>);

impl ResetControl for SharedReset {
    fn reset(&mut self, _action: ResetAction) {
        self.0.set(self.0.get() + 1);
    }
}

/// Records every flag change and any snapshot where a program runs after
/// shutdown was entered.
#[derive(Default)]
pub struct FlagLog {
    pub changes: Vec<FlagChange>,
    pub violations: usize,
}

impl StatusObserver for FlagLog {
    fn on_flag_changed(&mut self, change: FlagChange, flags: FlagSet) {
        if flags.contains(StatusFlag::UserProgramRunning) && flags.contains(StatusFlag::Shutdown) {
            self.violations += 1;
        }
        self.changes.push(change);
    }
}

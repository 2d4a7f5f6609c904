//! The program lifecycle loop.
//!
//! [`System`] is the single context object holding every piece of supervisor
//! state. [`Supervisor`] pairs it with a hub and a program executor and runs
//! the loop: boot, then repeatedly drain events and run whatever program was
//! requested, until shutdown is requested. The loop then hands the hub to the
//! [`PowerDown`] sequencer.
//!
//! There is one control thread. Interrupt-like work reaches the supervisor
//! only as [`HubEvent`]s pulled from the hub's [`EventSource`], both while idle
//! and, through [`ProgramEnvironment::pump_events`], while a program runs.
//!
//! [`EventSource`]: crate::hub::EventSource

use heapless::Deque;

use crate::config::HubConfig;
use crate::hmi::{Hmi, HmiAction};
use crate::hub::{
    ButtonMask, Hub, HubEvent, ProgramEnvironment, ProgramExecutor, Radio, RemoteCommand,
};
use crate::power::PowerDown;
use crate::program::{
    ProgramDescriptor, ProgramError, ProgramId, ProgramManager, ProgramStorage, ProgramValidator,
    StartRequestType,
};
use crate::status::{FlagSet, NoopObserver, StatusFlag, StatusObserver, StatusRegistry};
use crate::telemetry::{SupervisorEvent, TelemetryRecorder};
use crate::time::Timestamp;

/// Upper bound on events handled by one drain.
pub const MAX_EVENTS_PER_DRAIN: usize = 64;

/// Host input bytes buffered for the running program.
pub const STDIN_BUFFER_CAPACITY: usize = 128;

/// Outcome of one pass of the lifecycle loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoopControl {
    Continue,
    Shutdown,
}

/// All mutable supervisor state.
pub struct System<O = NoopObserver> {
    config: HubConfig,
    status: StatusRegistry<O>,
    program: ProgramManager,
    hmi: Hmi,
    telemetry: TelemetryRecorder,
    stop_requested: bool,
    stop_buttons: ButtonMask,
    stdin: Deque<u8, STDIN_BUFFER_CAPACITY>,
    stdin_routed: bool,
}

impl<O: StatusObserver> System<O> {
    #[must_use]
    pub fn new(config: HubConfig, observer: O) -> Self {
        Self {
            config,
            status: StatusRegistry::with_observer(observer),
            program: ProgramManager::new(),
            hmi: Hmi::new(config),
            telemetry: TelemetryRecorder::new(),
            stop_requested: false,
            stop_buttons: ButtonMask::CENTER,
            stdin: Deque::new(),
            stdin_routed: false,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn status(&self) -> &StatusRegistry<O> {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusRegistry<O> {
        &mut self.status
    }

    #[must_use]
    pub const fn program(&self) -> &ProgramManager {
        &self.program
    }

    #[must_use]
    pub const fn hmi(&self) -> &Hmi {
        &self.hmi
    }

    pub fn hmi_mut(&mut self) -> &mut Hmi {
        &mut self.hmi
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub(crate) fn telemetry_mut(&mut self) -> &mut TelemetryRecorder {
        &mut self.telemetry
    }

    /// True while the running program has been asked to stop.
    #[must_use]
    pub const fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Buttons that stop the running program.
    #[must_use]
    pub const fn stop_buttons(&self) -> ButtonMask {
        self.stop_buttons
    }

    /// True while host input is routed to the program's stdin.
    #[must_use]
    pub const fn stdin_routed(&self) -> bool {
        self.stdin_routed
    }

    /// The one entry point for starting programs. Outcomes are recorded in
    /// telemetry.
    ///
    /// # Errors
    ///
    /// See [`ProgramManager::request_start`].
    pub fn request_start<S>(
        &mut self,
        store: &mut S,
        id: ProgramId,
        request_type: StartRequestType,
        now: Timestamp,
    ) -> Result<(), ProgramError>
    where
        S: ProgramStorage + ProgramValidator + ?Sized,
    {
        let result = self
            .program
            .request_start(id, request_type, &self.status, store);
        let event = match result {
            Ok(()) => SupervisorEvent::StartRequested(id, request_type),
            Err(error) => SupervisorEvent::StartRejected(id, error),
        };
        self.telemetry.record(event, now);
        result
    }

    /// Sets [`StatusFlag::ShutdownRequested`] and asks a running program to stop.
    pub fn request_shutdown(&mut self, now: Timestamp) {
        if !self.status.test(StatusFlag::ShutdownRequested) {
            self.telemetry
                .record(SupervisorEvent::ShutdownRequested, now);
            self.status.set(StatusFlag::ShutdownRequested, now);
        }
        self.request_stop(now);
    }

    /// Asks the running program to stop. Does nothing while idle.
    pub fn request_stop(&mut self, now: Timestamp) {
        if self.status.test(StatusFlag::UserProgramRunning) && !self.stop_requested {
            self.stop_requested = true;
            self.telemetry.record(SupervisorEvent::StopRequested, now);
        }
    }

    /// Handles one hub event.
    pub fn dispatch<H: Hub + ?Sized>(&mut self, hub: &mut H, event: HubEvent) {
        let now = hub.now();
        match event {
            HubEvent::PollTimer => {
                let sample = hub.is_pressed();
                if let Some(action) = self.hmi.poll(sample, &mut self.status, now) {
                    self.apply(hub, action, now);
                }
            }
            HubEvent::Stdin(byte) => {
                // full buffer drops the newest byte
                if self.stdin_routed {
                    let _ = self.stdin.push_back(byte);
                }
            }
            HubEvent::Remote(RemoteCommand::StartProgram(id)) => {
                // a program never runs once shutdown is under way
                if !self.status.test(StatusFlag::ShutdownRequested)
                    && !self.status.test(StatusFlag::Shutdown)
                {
                    let _ = self.request_start(hub, id, StartRequestType::Remote, now);
                }
            }
            HubEvent::Remote(RemoteCommand::StopProgram) => self.request_stop(now),
            HubEvent::HostConnection(connected) => {
                self.assign(StatusFlag::BleHostConnected, connected, now);
            }
            HubEvent::BatteryLow(low) => {
                self.assign(StatusFlag::BatteryLowVoltageWarning, low, now);
            }
            HubEvent::BatteryCritical => {
                self.status.set(StatusFlag::BatteryLowVoltageShutdown, now);
                self.request_shutdown(now);
            }
        }
    }

    /// Handles pending events until the source is empty or
    /// [`MAX_EVENTS_PER_DRAIN`] were handled. Returns the number handled.
    pub fn drain<H: Hub + ?Sized>(&mut self, hub: &mut H) -> usize {
        for handled in 0..MAX_EVENTS_PER_DRAIN {
            let Some(event) = hub.poll_event() else {
                return handled;
            };
            self.dispatch(hub, event);
        }

        self.telemetry
            .record(SupervisorEvent::DrainSaturated, hub.now());
        MAX_EVENTS_PER_DRAIN
    }

    fn apply<H: Hub + ?Sized>(&mut self, hub: &mut H, action: HmiAction, now: Timestamp) {
        if self.status.test(StatusFlag::Shutdown) {
            return;
        }

        match action {
            HmiAction::StartProgram(id) => {
                let _ = self.request_start(hub, id, StartRequestType::HubUi, now);
            }
            HmiAction::StopProgram => {
                if self.stop_buttons.contains(ButtonMask::CENTER) {
                    self.request_stop(now);
                }
            }
            HmiAction::RequestShutdown => self.request_shutdown(now),
        }
    }

    fn assign(&mut self, flag: StatusFlag, value: bool, now: Timestamp) {
        if value {
            self.status.set(flag, now);
        } else {
            self.status.clear(flag, now);
        }
    }

    fn route_stdin<R: Radio + ?Sized>(&mut self, radio: &mut R, enabled: bool) {
        self.stdin_routed = enabled;
        self.stdin.clear();
        radio.set_rx_forwarding(enabled);
    }

    fn begin_program(&mut self, now: Timestamp) -> ProgramDescriptor {
        let program = *self.program.descriptor();
        self.status.set_program_id(program.id);
        self.stop_requested = false;
        self.status.set(StatusFlag::UserProgramRunning, now);
        self.telemetry
            .record(SupervisorEvent::ProgramStarted(program.id), now);
        program
    }

    fn end_program(&mut self, id: ProgramId, now: Timestamp) {
        self.status.clear(StatusFlag::UserProgramRunning, now);
        self.stop_requested = false;
        self.stop_buttons = ButtonMask::CENTER;
        self.telemetry
            .record(SupervisorEvent::ProgramFinished(id), now);
    }
}

/// The lifecycle loop over a concrete hub and executor.
pub struct Supervisor<H, E, O = NoopObserver> {
    system: System<O>,
    hub: H,
    executor: E,
}

impl<H, E> Supervisor<H, E, NoopObserver>
where
    H: Hub,
    E: ProgramExecutor,
{
    #[must_use]
    pub fn new(config: HubConfig, hub: H, executor: E) -> Self {
        Self::with_observer(config, hub, executor, NoopObserver)
    }
}

impl<H, E, O> Supervisor<H, E, O>
where
    H: Hub,
    E: ProgramExecutor,
    O: StatusObserver,
{
    #[must_use]
    pub fn with_observer(config: HubConfig, hub: H, executor: E, observer: O) -> Self {
        Self {
            system: System::new(config, observer),
            hub,
            executor,
        }
    }

    pub fn system(&self) -> &System<O> {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut System<O> {
        &mut self.system
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut H {
        &mut self.hub
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Requests a program start at the current hub time.
    ///
    /// # Errors
    ///
    /// See [`ProgramManager::request_start`].
    pub fn request_start(
        &mut self,
        id: ProgramId,
        request_type: StartRequestType,
    ) -> Result<(), ProgramError> {
        let now = self.hub.now();
        self.system
            .request_start(&mut self.hub, id, request_type, now)
    }

    #[must_use]
    pub fn selected_program_slot(&self) -> u8 {
        self.system.hmi.selected_program_slot()
    }

    pub fn drain_events(&mut self) -> usize {
        self.system.drain(&mut self.hub)
    }

    /// Waits for the radio, lets it settle, and requests the boot program.
    pub fn boot(&mut self) {
        self.wait_for_radio();

        let settle = self.system.config.boot_settle;
        if !settle.is_zero() {
            let ready_at = self.hub.now();
            while self.hub.now().duration_since(ready_at) < settle {
                self.drain_events();
            }
        }

        if self.system.config.boot_autostart {
            let _ = self.request_start(ProgramId::FIRST_SLOT, StartRequestType::Boot);
        }
    }

    /// One pass of the lifecycle loop: drain events, then run the pending
    /// program, if any, to completion.
    pub fn run_once(&mut self) -> LoopControl {
        if self.shutdown_requested() {
            return LoopControl::Shutdown;
        }

        if self.system.config.repl_autostart && !self.system.program.start_requested() {
            let _ = self.request_start(ProgramId::REPL, StartRequestType::Boot);
        }

        self.drain_events();

        if self.system.program.start_requested() && !self.shutdown_requested() {
            self.run_program();
        }

        LoopControl::Continue
    }

    /// Boots, loops until shutdown is requested, and enters power-down.
    pub fn run(mut self) -> PowerDown<H, O> {
        self.boot();
        while self.run_once() == LoopControl::Continue {}
        self.shutdown()
    }

    /// Releases the subsystems, sets [`StatusFlag::Shutdown`], and hands the
    /// hub to the power-down sequencer.
    pub fn shutdown(mut self) -> PowerDown<H, O> {
        self.hub.deinit();
        let now = self.hub.now();
        self.system.status.set(StatusFlag::Shutdown, now);
        self.system
            .telemetry
            .record(SupervisorEvent::ShutdownEntered, now);
        PowerDown::new(self.system, self.hub)
    }

    fn shutdown_requested(&self) -> bool {
        self.system.status.test(StatusFlag::ShutdownRequested)
    }

    fn wait_for_radio(&mut self) {
        while !self.hub.is_ready() {
            self.drain_events();
        }
    }

    fn run_program(&mut self) {
        let program = self.system.begin_program(self.hub.now());
        self.system.route_stdin(&mut self.hub, true);
        self.drain_events();

        let mut env = Environment {
            system: &mut self.system,
            hub: &mut self.hub,
        };
        self.executor.run_program(&program, &mut env);

        self.system.route_stdin(&mut self.hub, false);
        self.system.end_program(program.id, self.hub.now());
        self.hub.stop_all(true);

        self.finish_request(program.id);
    }

    /// Withdraws the request that just ran, or re-issues it when the program
    /// asked to be restarted.
    fn finish_request(&mut self, id: ProgramId) {
        if !self.system.status.test(StatusFlag::UserProgramRestart) {
            self.system.program.clear_request();
            return;
        }

        self.system
            .status
            .clear(StatusFlag::UserProgramRestart, self.hub.now());
        let request_type = self.system.program.clear_request();
        self.wait_for_radio();
        let _ = self.request_start(id, request_type);
    }
}

/// What a running program sees of the supervisor.
struct Environment<'a, H, O> {
    system: &'a mut System<O>,
    hub: &'a mut H,
}

impl<H, O> ProgramEnvironment for Environment<'_, H, O>
where
    H: Hub,
    O: StatusObserver,
{
    fn now(&self) -> Timestamp {
        self.hub.now()
    }

    fn pump_events(&mut self) -> usize {
        self.system.drain(&mut *self.hub)
    }

    fn stop_requested(&self) -> bool {
        self.system.stop_requested
    }

    fn request_restart(&mut self) {
        let now = self.hub.now();
        if !self.system.status.test(StatusFlag::UserProgramRestart) {
            let id = self.system.status.program_id();
            self.system
                .telemetry
                .record(SupervisorEvent::RestartRequested(id), now);
            self.system.status.set(StatusFlag::UserProgramRestart, now);
        }
    }

    fn read_stdin(&mut self) -> Option<u8> {
        self.system.stdin.pop_front()
    }

    fn set_stop_buttons(&mut self, buttons: ButtonMask) {
        self.system.stop_buttons = buttons;
    }

    fn status(&self) -> FlagSet {
        self.system.status.flags()
    }
}

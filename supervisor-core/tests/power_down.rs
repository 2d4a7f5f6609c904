mod common;

use common::{Call, ScriptedExecutor, SharedReset, SimHub, Step};
use supervisor_core::config::{HubConfig, HubProfile};
use supervisor_core::hmi::ShutdownWake;
use supervisor_core::hub::{HubEvent, RemoteCommand, ResetAction, UsbStatus};
use supervisor_core::power::PowerDownState;
use supervisor_core::program::ProgramId;
use supervisor_core::status::StatusFlag;
use supervisor_core::supervisor::{LoopControl, MAX_EVENTS_PER_DRAIN, Supervisor};
use supervisor_core::telemetry::SupervisorEvent;

fn idle_config(profile: HubProfile) -> HubConfig {
    HubConfig {
        boot_autostart: false,
        ..profile.config()
    }
}

#[test]
fn hub_without_charger_powers_off_after_draining() {
    let config = idle_config(HubProfile::CityHub);
    let mut hub = SimHub::new(config);
    hub.event(HubEvent::BatteryCritical).pause().tick().tick();

    let mut supervisor = Supervisor::new(config, hub, ScriptedExecutor::new([]));
    supervisor.run_once();
    assert_eq!(supervisor.run_once(), LoopControl::Shutdown);

    let mut power_down = supervisor.shutdown();
    assert!(power_down.system().status().test(StatusFlag::Shutdown));
    assert_eq!(power_down.state(), PowerDownState::Draining);

    assert_eq!(
        power_down.step(),
        PowerDownState::PowerOffIssued { attempts: 1 }
    );
    assert!(power_down.hub().script.is_empty());
    assert_eq!(
        power_down.step(),
        PowerDownState::PowerOffIssued { attempts: 2 }
    );
    assert_eq!(power_down.hub().count(Call::PowerOff), 2);
    assert_eq!(power_down.hub().calls.first(), Some(&Call::Deinit));
}

#[test]
fn usb_keeps_charger_hubs_powered_until_unplugged() {
    let config = idle_config(HubProfile::PrimeHub);
    let mut hub = SimHub::new(config);
    hub.usb = UsbStatus::DedicatedCharger;

    let supervisor = Supervisor::new(config, hub, ScriptedExecutor::new([]));
    let mut power_down = supervisor.shutdown();

    assert_eq!(
        power_down.step(),
        PowerDownState::HeldOn(UsbStatus::DedicatedCharger)
    );
    assert_eq!(
        power_down.step(),
        PowerDownState::HeldOn(UsbStatus::DedicatedCharger)
    );
    assert_eq!(power_down.hub().count(Call::PowerOff), 0);

    power_down.hub_mut().push(Step::Usb(UsbStatus::None));
    assert_eq!(
        power_down.step(),
        PowerDownState::PowerOffIssued { attempts: 1 }
    );

    let held = power_down
        .system()
        .telemetry()
        .oldest_first()
        .filter(|record| record.event == SupervisorEvent::PowerHeld)
        .count();
    assert_eq!(held, 1);
}

#[test]
fn usb_is_ignored_on_hubs_without_charger() {
    let config = idle_config(HubProfile::TechnicHub);
    let mut hub = SimHub::new(config);
    hub.usb = UsbStatus::StandardDownstream;

    let supervisor = Supervisor::new(config, hub, ScriptedExecutor::new([]));
    let mut power_down = supervisor.shutdown();

    assert_eq!(
        power_down.step(),
        PowerDownState::PowerOffIssued { attempts: 1 }
    );
}

#[test]
fn remote_start_is_ignored_once_shutdown_begins() {
    let config = idle_config(HubProfile::CityHub);
    let start = HubEvent::Remote(RemoteCommand::StartProgram(ProgramId::FIRST_SLOT));
    let mut hub = SimHub::new(config).with_program(0, 64);
    hub.event(HubEvent::BatteryCritical).event(start).pause();

    let mut supervisor = Supervisor::new(config, hub, ScriptedExecutor::new([]));
    assert_eq!(supervisor.run_once(), LoopControl::Continue);
    assert_eq!(supervisor.run_once(), LoopControl::Shutdown);
    assert!(supervisor.executor().runs.is_empty());

    let mut power_down = supervisor.shutdown();
    power_down.hub_mut().event(start);
    assert_eq!(
        power_down.step(),
        PowerDownState::PowerOffIssued { attempts: 1 }
    );

    let system = power_down.system();
    assert!(!system.program().start_requested());
    let requested = system
        .telemetry()
        .oldest_first()
        .filter(|record| matches!(record.event, SupervisorEvent::StartRequested(..)))
        .count();
    assert_eq!(requested, 0);
}

#[test]
fn pending_events_delay_power_off() {
    let config = idle_config(HubProfile::CityHub);
    let mut hub = SimHub::new(config);
    for _ in 0..MAX_EVENTS_PER_DRAIN + 1 {
        hub.event(HubEvent::HostConnection(false));
    }

    let supervisor = Supervisor::new(config, hub, ScriptedExecutor::new([]));
    let mut power_down = supervisor.shutdown();

    assert_eq!(power_down.step(), PowerDownState::Draining);
    assert_eq!(power_down.hub().count(Call::PowerOff), 0);
    assert_eq!(
        power_down.step(),
        PowerDownState::PowerOffIssued { attempts: 1 }
    );
}

#[test]
fn button_press_while_held_on_resets_the_hub() {
    let config = idle_config(HubProfile::PrimeHub);
    let resets = SharedReset::default();
    let mut hub = SimHub::new(config);
    hub.usb = UsbStatus::StandardDownstream;

    let observer = ShutdownWake::new(resets.clone(), config.battery_charger);
    let supervisor = Supervisor::with_observer(config, hub, ScriptedExecutor::new([]), observer);
    let mut power_down = supervisor.shutdown();
    assert_eq!(
        power_down.step(),
        PowerDownState::HeldOn(UsbStatus::StandardDownstream)
    );
    assert_eq!(resets.0.get(), 0);

    power_down.hub_mut().hold(false, 20).hold(true, 20);
    power_down.step();

    assert_eq!(resets.0.get(), 1);
    assert!(
        power_down
            .system()
            .status()
            .test(StatusFlag::PowerButtonPressed)
    );
}

#[test]
fn presses_after_shutdown_start_nothing() {
    let config = idle_config(HubProfile::CityHub);
    let mut hub = SimHub::new(config).with_program(0, 64);
    hub.short_press();

    let supervisor = Supervisor::new(config, hub, ScriptedExecutor::new([]));
    let mut power_down = supervisor.shutdown();
    power_down.step();

    assert!(!power_down.system().program().start_requested());
    assert_eq!(power_down.hub().count(Call::Reset(ResetAction::Reset)), 0);
}

use cortex_m::interrupt;
use cortex_m::register::primask;
use cortex_m_rt::entry;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::InterruptExecutor;
use embassy_stm32 as hal;
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt::{InterruptExt, Priority};
use supervisor_core::hmi::ShutdownWake;
use supervisor_core::supervisor::{LoopControl, Supervisor};

use crate::config::{CONFIG, PROFILE};
use crate::events::{EventQueue, QueuedEvents};
use crate::hw::battery_adc::BatteryAdc;
use crate::hw::{HardwareHub, SystemReset};
use crate::log::LogPump;
use crate::programs::ResidentExecutor;
use crate::status::StatusMirror;

mod link_task;
mod sensor_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static EVENTS: EventQueue = EventQueue::new();

/// Runs the sensor and link tasks above thread mode, where the supervisor
/// blocks inside user programs.
static SENSOR_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

#[hal::interrupt]
unsafe fn I2C2_3() {
    unsafe { SENSOR_EXECUTOR.on_interrupt() }
}

#[entry]
fn main() -> ! {
    let hal::Peripherals {
        PA0,
        PA1,
        PA4,
        PA5,
        PA9,
        PB0,
        PB1,
        PB5,
        ADC1,
        USART5,
        ..
    } = hal::init(hal::Config::default());

    // Latch the regulator before anything else so releasing the button
    // does not cut power.
    let power_hold = Output::new(PA1, Level::High, Speed::Low);
    defmt::info!("hub: {} profile", PROFILE.label());

    hal::interrupt::I2C2_3.set_priority(Priority::P2);
    let spawner = SENSOR_EXECUTOR.start(hal::interrupt::I2C2_3);

    let battery = BatteryAdc::new(Adc::new(ADC1), PA4.degrade_adc());
    spawner
        .spawn(sensor_task::run(
            EVENTS.sender(),
            Output::new(PA5, Level::Low, Speed::Low),
            battery,
        ))
        .expect("failed to spawn sensor task");
    spawner
        .spawn(link_task::run(EVENTS.sender(), USART5, PB0, PB1))
        .expect("failed to spawn link task");

    let hub = HardwareHub::new(
        QueuedEvents::new(EVENTS.receiver()),
        Input::new(PA0, Pull::Up),
        power_hold,
        Input::new(PA9, Pull::Down),
        Output::new(PB5, Level::High, Speed::Low),
    );
    let observer = (
        StatusMirror,
        ShutdownWake::new(SystemReset, CONFIG.battery_charger),
    );
    let executor = ResidentExecutor::new(cortex_m::asm::wfi);
    let mut supervisor = Supervisor::with_observer(CONFIG, hub, executor, observer);
    let mut log = LogPump::new();

    supervisor.boot();
    log.flush(supervisor.system().telemetry());

    while supervisor.run_once() == LoopControl::Continue {
        log.flush(supervisor.system().telemetry());
        cortex_m::asm::wfi();
    }

    let mut power_down = supervisor.shutdown();
    loop {
        power_down.step();
        log.flush(power_down.system().telemetry());
        cortex_m::asm::wfi();
    }
}

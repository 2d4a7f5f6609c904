//! Board bindings for the hub's supervisory collaborators.
//!
//! [`HardwareHub`] is the thread-mode side of the firmware: it owns the GPIO
//! the supervisor drives directly and reads everything else (queued events,
//! link readiness) from state shared with the interrupt-priority tasks.

pub mod battery_adc;

use core::ptr;

use cortex_m::peripheral::SCB;
use embassy_stm32::gpio::{Input, Level, Output};
use embassy_time::Instant;
use supervisor_core::hub::{
    ButtonMask, ButtonSampler, Clock, EventSource, HubEvent, Outputs, PowerControl, Radio,
    ResetAction, ResetControl, SampleError, Subsystems, UsbCharger, UsbStatus,
};
use supervisor_core::program::{
    MAX_SLOTS, ProgramDescriptor, ProgramError, ProgramImage, ProgramStorage, ProgramValidator,
};
use supervisor_core::time::Timestamp;

use crate::config::CONFIG;
use crate::events::QueuedEvents;
use crate::link;
use crate::motors::{MotorDriver, SleepLine};

/// Flash address of the program slot table: `MAX_SLOTS` pairs of
/// little-endian `(offset, len)` words. Erased entries read as all ones.
const SLOT_TABLE_ADDR: usize = 0x0807_F000;
const ERASED: u32 = u32::MAX;

/// Reads one slot table entry.
fn read_slot(slot: u8) -> ProgramImage {
    let entry = (SLOT_TABLE_ADDR + usize::from(slot) * 8) as *const u32;
    let (offset, len) = unsafe { (ptr::read_volatile(entry), ptr::read_volatile(entry.add(1))) };
    if offset == ERASED || len == ERASED {
        ProgramImage::EMPTY
    } else {
        ProgramImage::new(offset, len)
    }
}

/// Resets the MCU through the system control block.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemReset;

impl ResetControl for SystemReset {
    fn reset(&mut self, action: ResetAction) {
        defmt::warn!("hub: system reset ({})", action);
        SCB::sys_reset();
    }
}

pub struct HardwareHub {
    events: QueuedEvents<'static>,
    button: Input<'static>,
    power_hold: Output<'static>,
    vbus: Input<'static>,
    motors: MotorDriver<Output<'static>>,
}

impl HardwareHub {
    pub fn new(
        events: QueuedEvents<'static>,
        button: Input<'static>,
        power_hold: Output<'static>,
        vbus: Input<'static>,
        motor_sleep: Output<'static>,
    ) -> Self {
        Self {
            events,
            button,
            power_hold,
            vbus,
            motors: MotorDriver::new(motor_sleep),
        }
    }
}

impl Clock for HardwareHub {
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(Instant::now().as_millis() as u32)
    }
}

impl EventSource for HardwareHub {
    fn poll_event(&mut self) -> Option<HubEvent> {
        self.events.poll_event()
    }
}

impl ButtonSampler for HardwareHub {
    fn is_pressed(&mut self) -> Result<ButtonMask, SampleError> {
        // active low
        if self.button.is_low() {
            Ok(ButtonMask::CENTER)
        } else {
            Ok(ButtonMask::NONE)
        }
    }
}

impl Radio for HardwareHub {
    fn is_ready(&self) -> bool {
        link::is_ready()
    }

    fn set_rx_forwarding(&mut self, enabled: bool) {
        link::set_forwarding(enabled);
    }
}

impl ResetControl for HardwareHub {
    fn reset(&mut self, action: ResetAction) {
        SystemReset.reset(action);
    }
}

impl PowerControl for HardwareHub {
    fn power_off(&mut self) {
        self.power_hold.set_level(Level::Low);
    }
}

impl UsbCharger for HardwareHub {
    fn usb_status(&self) -> UsbStatus {
        // only VBUS is wired; the charger type is not detected
        if self.vbus.is_high() {
            UsbStatus::StandardDownstream
        } else {
            UsbStatus::None
        }
    }
}

impl SleepLine for Output<'static> {
    fn set_awake(&mut self, awake: bool) {
        self.set_level(Level::from(awake));
    }
}

impl Outputs for HardwareHub {
    fn stop_all(&mut self, reset: bool) {
        self.motors.stop_all(reset);
    }
}

impl Subsystems for HardwareHub {
    fn deinit(&mut self) {
        self.motors.sleep();
        link::set_forwarding(false);
        link::set_ready(false);
    }
}

impl ProgramStorage for HardwareHub {
    fn load_program(&mut self, program: &mut ProgramDescriptor) {
        if let Some(slot) = program.id.slot_index().filter(|slot| *slot < MAX_SLOTS) {
            program.image = read_slot(slot);
        }
    }
}

impl ProgramValidator for HardwareHub {
    fn validate(&self, program: &ProgramDescriptor) -> Result<(), ProgramError> {
        CONFIG.validate(program)
    }
}

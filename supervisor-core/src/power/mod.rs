//! Power-down sequencing after the lifecycle loop exits.
//!
//! Each [`PowerDown::step`] drains pending events, then either keeps the hub
//! powered (charger hubs with USB attached) or asks the hardware to cut power.
//! Firmware calls [`PowerDown::run`], which steps forever; the hub ends the
//! loop by losing power or by the reset issued from
//! [`ShutdownWake`](crate::hmi::ShutdownWake).

use core::mem;

use crate::hub::{Hub, UsbStatus};
use crate::status::{NoopObserver, StatusObserver};
use crate::supervisor::{MAX_EVENTS_PER_DRAIN, System};
use crate::telemetry::SupervisorEvent;

/// Observable result of one power-down step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerDownState {
    /// Events were still pending at the end of the drain.
    Draining,
    /// Power stays on because USB is attached.
    HeldOn(UsbStatus),
    /// `power_off` has been called this many times and returned every time.
    PowerOffIssued { attempts: u32 },
}

pub struct PowerDown<H, O = NoopObserver> {
    system: System<O>,
    hub: H,
    state: PowerDownState,
    attempts: u32,
}

impl<H, O> PowerDown<H, O>
where
    H: Hub,
    O: StatusObserver,
{
    pub(crate) fn new(system: System<O>, hub: H) -> Self {
        Self {
            system,
            hub,
            state: PowerDownState::Draining,
            attempts: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> PowerDownState {
        self.state
    }

    pub fn system(&self) -> &System<O> {
        &self.system
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut H {
        &mut self.hub
    }

    pub fn step(&mut self) -> PowerDownState {
        let handled = self.system.drain(&mut self.hub);

        let next = if handled >= MAX_EVENTS_PER_DRAIN {
            PowerDownState::Draining
        } else if let Some(usb) = self.power_hold() {
            PowerDownState::HeldOn(usb)
        } else {
            self.hub.power_off();
            self.attempts = self.attempts.saturating_add(1);
            PowerDownState::PowerOffIssued {
                attempts: self.attempts,
            }
        };

        if mem::discriminant(&next) != mem::discriminant(&self.state) {
            let now = self.hub.now();
            match next {
                PowerDownState::HeldOn(_) => {
                    self.system
                        .telemetry_mut()
                        .record(SupervisorEvent::PowerHeld, now);
                }
                PowerDownState::PowerOffIssued { attempts } => {
                    self.system
                        .telemetry_mut()
                        .record(SupervisorEvent::PowerOffIssued(attempts), now);
                }
                PowerDownState::Draining => {}
            }
        }

        self.state = next;
        next
    }

    pub fn run(mut self) -> ! {
        loop {
            self.step();
        }
    }

    fn power_hold(&self) -> Option<UsbStatus> {
        if !self.system.config().battery_charger {
            return None;
        }
        let usb = self.hub.usb_status();
        usb.is_attached().then_some(usb)
    }
}

use embassy_futures::select::{Either, select};
use embassy_stm32::gpio::{Level, Output};
use embassy_time::{Duration, Ticker};

use crate::battery::BatteryMonitor;
use crate::config::{BATTERY_PERIOD_MS, POLL_PERIOD_MS};
use crate::events::{self, EventSender};
use crate::hw::battery_adc::BatteryAdc;
use crate::status::{self, light_pattern};

/// Drives the poll tick, the status light, and battery sampling.
#[embassy_executor::task]
pub async fn run(
    sender: EventSender<'static>,
    mut light: Output<'static>,
    mut battery: BatteryAdc<'static>,
) -> ! {
    let mut poll = Ticker::every(Duration::from_millis(POLL_PERIOD_MS));
    let mut sample = Ticker::every(Duration::from_millis(BATTERY_PERIOD_MS));
    let mut monitor = BatteryMonitor::new();
    let mut tick: u32 = 0;

    loop {
        match select(poll.next(), sample.next()).await {
            Either::First(()) => {
                tick = tick.wrapping_add(1);
                events::post_tick(&sender);
                let level = light_pattern(status::snapshot()).level_at(tick);
                light.set_level(Level::from(level));
            }
            Either::Second(()) => {
                let millivolts = battery.read_millivolts();
                if let Some(event) = monitor.sample(millivolts) {
                    defmt::warn!("battery: {}mV -> {}", millivolts, event);
                    if !events::post(&sender, event) {
                        defmt::warn!("battery: event queue full");
                    }
                }
            }
        }
    }
}

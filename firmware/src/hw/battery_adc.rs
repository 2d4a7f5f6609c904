//! Battery voltage sampling for the STM32G0 ADC.
//!
//! The pack is measured through a resistor divider on PA4. VREFINT is read
//! alongside it so the conversion does not depend on the exact VDDA level.

use core::ptr;

use embassy_stm32::adc::{Adc, AnyAdcChannel, SampleTime, VrefInt};
use embassy_stm32::peripherals::ADC1;

/// Factory-programmed calibration constant sampled at 3.0 V.
const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;
const VREFINT_CAL_MV: u32 = 3_000;
const ADC_FULL_SCALE: u32 = 4_095;
/// Battery divider ratio (pack voltage / pin voltage).
const DIVIDER_RATIO: u32 = 3;

/// Reads the factory-trimmed VREFINT calibration constant.
pub fn read_vrefint_calibration() -> u16 {
    unsafe { ptr::read_volatile(VREFINT_CAL_ADDR) }
}

pub struct BatteryAdc<'d> {
    adc: Adc<'d, ADC1>,
    vrefint: VrefInt,
    battery: AnyAdcChannel<ADC1>,
    calibration: u16,
    discard_next: bool,
}

impl<'d> BatteryAdc<'d> {
    /// Constructs the sampler and enables the internal voltage reference.
    pub fn new(mut adc: Adc<'d, ADC1>, battery: AnyAdcChannel<ADC1>) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        let vrefint = adc.enable_vrefint();
        Self {
            adc,
            vrefint,
            battery,
            calibration: read_vrefint_calibration(),
            discard_next: true,
        }
    }

    /// Pack voltage in millivolts.
    pub fn read_millivolts(&mut self) -> u16 {
        if self.discard_next {
            let _ = self.adc.blocking_read(&mut self.vrefint);
            self.discard_next = false;
        }

        let vref_raw = u32::from(self.adc.blocking_read(&mut self.vrefint)).max(1);
        let pin_raw = u32::from(self.adc.blocking_read(&mut self.battery));

        let vdda_mv = VREFINT_CAL_MV * u32::from(self.calibration) / vref_raw;
        let pack_mv = pin_raw * vdda_mv / ADC_FULL_SCALE * DIVIDER_RATIO;
        u16::try_from(pack_mv).unwrap_or(u16::MAX)
    }
}

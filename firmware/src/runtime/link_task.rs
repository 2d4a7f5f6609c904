use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::Read;
use static_cell::StaticCell;

use crate::events::{self, EventSender};
use crate::link::{self, LinkDecoder};

const LINK_UART_BUFFER_SIZE: usize = 256;
const LINK_UART_BAUD: u32 = 115_200;

static UART_TX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

/// Decodes the radio bridge byte stream into hub events.
#[embassy_executor::task]
pub async fn run(
    sender: EventSender<'static>,
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = LINK_UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let mut uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize link UART");

    link::set_ready(true);
    defmt::info!("link: ready");

    let mut decoder = LinkDecoder::new();
    let mut ingress = [0u8; 32];
    loop {
        match uart.read(&mut ingress).await {
            Ok(count) => {
                for byte in &ingress[..count] {
                    if let Some(event) = decoder.feed(*byte, link::forwarding())
                        && !events::post(&sender, event)
                    {
                        defmt::warn!("link: dropping {} (queue full)", event);
                    }
                }
            }
            Err(_) => {
                defmt::warn!("link: UART read error");
                Timer::after(Duration::from_millis(5)).await;
            }
        }
    }
}

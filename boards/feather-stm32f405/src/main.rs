#![deny(unsafe_code)]
#![deny(warnings)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;

mod battery;
mod bus;
mod display;
mod platform;
mod power;
mod retained;
mod sensor;
mod storage;
mod time;

stm32_tim2_monotonic!(Mono, 1_000_000);

#[app(device = embassy_stm32, peripherals = true, dispatchers = [SPI1, SPI2])]
mod app {
    use super::*;
    use cortex_m::peripheral::SCB;
    use defmt::{error, info};
    use delivery_core::radio::Rylr998;
    use delivery_core::{Devices, Firmware, Step};
    use embassy_stm32::flash::Flash;
    use embassy_stm32::gpio::{Level, Output, Speed};
    use embassy_stm32::i2c::{self, I2c};
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode, LsConfig, LseConfig, LseMode};
    use embassy_stm32::rtc::{Rtc, RtcConfig};
    use embassy_stm32::time::Hertz;
    use embassy_stm32::usart::{self, BufferedUart};
    use hal_abstractions::LinkParams;
    use static_cell::StaticCell;

    use crate::battery::VbatMonitor;
    use crate::display::OledDisplay;
    use crate::platform::Feather;
    use crate::retained::BackupRegisters;
    use crate::sensor::Vl53l0xSensor;
    use crate::storage::FlashConfigStore;
    use crate::time::{MonoDelay, MonoUptime};

    /// UART ring buffer size; one RYLR998 `+RCV` line is at most ~265 bytes
    const UART_BUFFER_SIZE: usize = 320;

    /// Serial console baud rate
    const CONSOLE_BAUD: u32 = 115_200;

    embassy_stm32::bind_interrupts!(struct UartIrqs {
        USART2 => usart::BufferedInterruptHandler<peripherals::USART2>;
        USART3 => usart::BufferedInterruptHandler<peripherals::USART3>;
    });

    #[shared]
    struct Shared {}

    #[local]
    struct Local {}

    /// Park the MCU in a reset loop when a peripheral cannot be configured
    fn fatal(what: &str) -> ! {
        error!("{} setup failed, resetting", what);
        SCB::sys_reset()
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        info!("Delivery reporter starting...");

        // Adafruit Feather STM32F405: 12 MHz HSE, 32.768 kHz LSE (PC14/PC15)
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // HSE (12 MHz) / 6 = 2 MHz, * 168 = 336 MHz VCO, / 4 = 84 MHz SYSCLK
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: None,
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1; // 84 MHz
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2; // 42 MHz
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1; // 84 MHz

        // LSE drives the RTC, which owns the wakeup timer and backup registers
        config.rcc.ls = LsConfig {
            rtc: embassy_stm32::rcc::RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig {
                frequency: Hertz(32_768),
                mode: LseMode::Oscillator(embassy_stm32::rcc::LseDrive::MediumHigh),
            }),
        };

        let p = embassy_stm32::init(config);

        // TIM2 on APB1: timer clock = 2*APB1 when prescaler != 1
        Mono::start(84_000_000);

        if power::woke_from_standby() {
            info!("Woke from standby");
        } else {
            info!("Cold boot");
        }

        let rtc = Rtc::new(p.RTC, RtcConfig::default());
        let retained = BackupRegisters::new(rtc);

        // I2C1 on Feather SCL/SDA, shared by ranger and OLED
        let mut i2c_config = i2c::Config::default();
        i2c_config.frequency = Hertz(400_000);
        let i2c = I2c::new_blocking(p.I2C1, p.PB6, p.PB7, i2c_config);
        let i2c_bus = bus::share(i2c);

        // Ranger XSHUT on D5 (PC7), held low until `init`
        let xshut = Output::new(p.PC7, Level::Low, Speed::Low);
        let sensor = Vl53l0xSensor::new(i2c_bus, xshut);
        let display = OledDisplay::new(i2c_bus);
        let battery = VbatMonitor::new(p.ADC1, p.PA4);
        let store = FlashConfigStore::new(Flash::new_blocking(p.FLASH));

        // RYLR998 on Feather TX/RX (USART3, PB10/PB11)
        static RADIO_TX: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
        static RADIO_RX: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
        let mut radio_config = usart::Config::default();
        radio_config.baudrate = LinkParams::default().baud_rate;
        let radio_uart = match BufferedUart::new(
            p.USART3,
            p.PB11,
            p.PB10,
            RADIO_TX.init([0; UART_BUFFER_SIZE]),
            RADIO_RX.init([0; UART_BUFFER_SIZE]),
            UartIrqs,
            radio_config,
        ) {
            Ok(uart) => uart,
            Err(_) => fatal("Radio UART"),
        };

        // Configuration console on USART2 (PA2/PA3) through a USB-serial adapter
        static CONSOLE_TX: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
        static CONSOLE_RX: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
        let mut console_config = usart::Config::default();
        console_config.baudrate = CONSOLE_BAUD;
        let console = match BufferedUart::new(
            p.USART2,
            p.PA3,
            p.PA2,
            CONSOLE_TX.init([0; UART_BUFFER_SIZE]),
            CONSOLE_RX.init([0; UART_BUFFER_SIZE]),
            UartIrqs,
            console_config,
        ) {
            Ok(uart) => uart,
            Err(_) => fatal("Console UART"),
        };

        let devices = Devices::<Feather> {
            sensor,
            radio: Rylr998::new(radio_uart, MonoDelay),
            display,
            battery,
            store,
            console,
            delay: MonoDelay,
            clock: MonoUptime,
        };

        firmware_task::spawn(devices, retained, cx.core.SCB).ok();

        (Shared {}, Local {})
    }

    /// Boot the firmware and step it until it asks to sleep or restart
    #[task(priority = 1)]
    async fn firmware_task(
        _cx: firmware_task::Context,
        devices: Devices<Feather>,
        retained: BackupRegisters,
        mut scb: SCB,
    ) -> ! {
        let mut firmware = match Firmware::boot(devices, retained).await {
            Ok(firmware) => firmware,
            Err(e) => power::restart(e),
        };
        info!("Running in {:?} mode", firmware.mode());

        loop {
            match firmware.step().await {
                Ok(Step::Continue) => {}
                Ok(Step::Sleep(secs)) => power::standby(&mut scb, secs),
                Err(e) => power::restart(e),
            }
        }
    }

    /// RTIC idle task - WFI sleep mode when no tasks active
    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}

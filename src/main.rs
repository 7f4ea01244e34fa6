#![no_std]
#![no_main]

use core::cell::RefCell;

use bsp::entry;
use critical_section::Mutex;
use defmt::*;
use defmt_rtt as _;
use panic_probe as _;

// Provide an alias for our BSP so we can switch targets quickly.
// Uncomment the BSP you included in Cargo.toml, the rest of the code does not need to change.
use rp_pico as bsp;

use bsp::hal::{
    clocks::{init_clocks_and_plls, Clock as _},
    fugit::{MicrosDurationU32, RateExtU32},
    gpio::{FunctionUart, InOutPin},
    pac::{self, interrupt},
    timer::{Alarm, Alarm0},
    uart::{DataBits, StopBits, UartConfig, UartDevice, UartPeripheral, ValidUartPinout},
    watchdog::Watchdog,
    Timer,
};
use rp_pico::hal;

use hd44780_driver::bus::DataBus;
use hd44780_driver::{Cursor, CursorBlink, Display, DisplayMode, HD44780};

use airstation::clock::UptimeClock;
use airstation::config::StationConfig;
use airstation::dht11::Dht11;
use airstation::duty::DutyState;
use airstation::publisher::{SerialUplink, TelemetryPublisher};
use airstation::rendering::{CharacterDisplay, DisplayError, LcdSink, COLUMNS};
use airstation::sds011::Sds011;
use airstation::sinks::SinkRegistry;
use airstation::station::Station;
use airstation::timer::{PeriodicTimer, Scheduler, TickFlag};

/// Raised by the alarm interrupt, consumed by the station loop
static TICK: TickFlag = TickFlag::new();
static TICK_ALARM: Mutex<RefCell<Option<TickAlarm>>> = Mutex::new(RefCell::new(None));

/// How long the SDS011 gets to answer a query
const SERIAL_TIMEOUT_US: u64 = 200_000;

/// Hardware alarm 0, re-armed from its own interrupt every period
struct TickAlarm {
    alarm: Alarm0,
    period: MicrosDurationU32,
}

impl TickAlarm {
    fn rearm(&mut self) {
        self.alarm.clear_interrupt();
        if self.alarm.schedule(self.period).is_err() {
            error!("Tick alarm could not be rescheduled");
        }
    }
}

impl PeriodicTimer for TickAlarm {
    fn start(&mut self, period_ms: u32) {
        self.period = MicrosDurationU32::millis(period_ms);
        self.rearm();
        self.alarm.enable_interrupt();
    }
}

#[interrupt]
fn TIMER_IRQ_0() {
    critical_section::with(|cs| {
        if let Some(alarm) = TICK_ALARM.borrow_ref_mut(cs).as_mut() {
            alarm.rearm();
        }
    });
    TICK.raise();
}

/// HD44780 in 4-bit mode, addressed by column and row
struct Lcd<B: DataBus> {
    lcd: HD44780<B>,
    delay: Timer,
}

impl<B: DataBus> CharacterDisplay for Lcd<B> {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.lcd.clear(&mut self.delay).map_err(|_| DisplayError)
    }

    fn write_at(&mut self, col: u8, row: u8, text: &str) -> Result<(), DisplayError> {
        if col >= COLUMNS {
            return Err(DisplayError);
        }
        // DDRAM: row 0 starts at 0x00, row 1 at 0x40
        self.lcd
            .set_cursor_pos(row * 0x40 + col, &mut self.delay)
            .map_err(|_| DisplayError)?;
        self.lcd
            .write_str(text, &mut self.delay)
            .map_err(|_| DisplayError)
    }
}

/// UART whose reads give up after a deadline instead of blocking forever.
/// An expired read returns 0 bytes, which the driver treats as a silent line.
struct TimedUart<D: UartDevice, P: ValidUartPinout<D>> {
    uart: UartPeripheral<hal::uart::Enabled, D, P>,
    timer: Timer,
}

impl<D: UartDevice, P: ValidUartPinout<D>> embedded_io::ErrorType for TimedUart<D, P> {
    type Error = <UartPeripheral<hal::uart::Enabled, D, P> as embedded_io::ErrorType>::Error;
}

impl<D: UartDevice, P: ValidUartPinout<D>> embedded_io::Read for TimedUart<D, P> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let deadline = self.timer.get_counter().ticks() + SERIAL_TIMEOUT_US;
        while !self.uart.uart_is_readable() {
            if self.timer.get_counter().ticks() >= deadline {
                return Ok(0);
            }
        }
        embedded_io::Read::read(&mut self.uart, buf)
    }
}

impl<D: UartDevice, P: ValidUartPinout<D>> embedded_io::Write for TimedUart<D, P> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        embedded_io::Write::write(&mut self.uart, buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        embedded_io::Write::flush(&mut self.uart)
    }
}

#[entry]
fn main() -> ! {
    info!("Air station starting");
    let config = StationConfig::from_build_env();
    unwrap!(config.validate());

    // Grab our singleton objects
    let mut pac = pac::Peripherals::take().unwrap();

    // Set up the watchdog driver - needed by the clock setup code
    let mut watchdog = Watchdog::new(pac.WATCHDOG);

    // The default is to generate a 125 MHz system clock
    let clocks = init_clocks_and_plls(
        rp_pico::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    // The single-cycle I/O block controls our GPIO pins
    let sio = hal::Sio::new(pac.SIO);

    // Set the pins up according to their function on this particular board
    let pins = rp_pico::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let mut timer = Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);

    // Set up LCD (RS, EN, D4-D7)
    let mut lcd = HD44780::new_4bit(
        pins.gpio0.into_push_pull_output(),
        pins.gpio1.into_push_pull_output(),
        pins.gpio2.into_push_pull_output(),
        pins.gpio3.into_push_pull_output(),
        pins.gpio4.into_push_pull_output(),
        pins.gpio5.into_push_pull_output(),
        &mut timer,
    )
    .unwrap();
    lcd.set_display_mode(
        DisplayMode {
            display: Display::On,
            cursor_visibility: Cursor::Invisible,
            cursor_blink: CursorBlink::Off,
        },
        &mut timer,
    )
    .unwrap();
    let mut screen = LcdSink::new(Lcd { lcd, delay: timer });
    if screen.draw_template().is_err() {
        warn!("LCD did not take the template");
    }

    // Set up DHT11, the data line has an external pull-up
    let climate = Dht11::new(InOutPin::new(pins.gpio15.into_pull_up_input()), timer);

    // Set up SDS011 (9600 8N1)
    let sds_uart = UartPeripheral::new(
        pac.UART0,
        (
            pins.gpio16.into_function::<FunctionUart>(),
            pins.gpio17.into_function::<FunctionUart>(),
        ),
        &mut pac.RESETS,
    )
    .enable(
        UartConfig::new(9600.Hz(), DataBits::Eight, None, StopBits::One),
        clocks.peripheral_clock.freq(),
    )
    .unwrap();
    let mut dust = Sds011::new(TimedUart {
        uart: sds_uart,
        timer,
    });
    // The sensor powers up working; match the controller's view of it
    if config.initial_duty_state == DutyState::Asleep && dust.set_working(false).is_err() {
        warn!("SDS011 did not take the sleep command");
    }

    // Set up the uplink to the network co-processor
    let uplink_uart = UartPeripheral::new(
        pac.UART1,
        (
            pins.gpio8.into_function::<FunctionUart>(),
            pins.gpio9.into_function::<FunctionUart>(),
        ),
        &mut pac.RESETS,
    )
    .enable(
        UartConfig::new(115_200.Hz(), DataBits::Eight, None, StopBits::One),
        clocks.peripheral_clock.freq(),
    )
    .unwrap();
    let mut publisher = TelemetryPublisher::new(SerialUplink::new(uplink_uart), config.topic);
    info!("Publishing to {} as {}", config.topic, config.client_id);

    let mut sinks: SinkRegistry<'_, 2> = SinkRegistry::new();
    unwrap!(sinks.register_live(&mut screen));
    unwrap!(sinks.register_batch(&mut publisher));

    // Arm alarm 0, then hand it to the interrupt
    let mut alarm = TickAlarm {
        alarm: unwrap!(timer.alarm_0()),
        period: MicrosDurationU32::millis(config.sample_period_ms),
    };
    let scheduler = unwrap!(Scheduler::configure(
        &mut alarm,
        &TICK,
        config.sample_period_ms
    ));
    critical_section::with(|cs| {
        TICK_ALARM.borrow_ref_mut(cs).replace(alarm);
    });
    // Safety: the handler only touches TICK and TICK_ALARM, both behind critical sections
    unsafe {
        pac::NVIC::unmask(pac::Interrupt::TIMER_IRQ_0);
    }

    let clock = UptimeClock::new(config.start_time, move || {
        timer.get_counter().ticks() / 1_000
    });

    let mut station = Station::new(&config, scheduler, climate, dust, clock, sinks);

    info!("Air station ready");
    station.run(&mut timer)
}

//! PressureMat firmware — RP2040 entry point.
//!
//! Core 0 runs the console and the event-driven acquisition loop; core 1 is
//! launched through the mailbox handshake and drains the row queue into the
//! host UART, overlapping transmission with the next frame's acquisition.

#![no_std]
#![no_main]

use core::cell::RefCell;

use critical_section::Mutex;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::UART1;
use embassy_rp::spi::{self, Spi};
use embassy_rp::uart::{self, Blocking, Uart, UartTx};
use embassy_time::{Delay, Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use panic_probe as _;
use static_cell::StaticCell;

use firmware::board;
use firmware::session::{ConsoleOutcome, Session};
use hostlink::{transmit_delimiter, transmit_row, LinkConfig};
use matscan::{
    scan_frame_events, AdcChannel, AdcId, ScanConfig, ScanError, ScanGate, ShiftRegister,
    COL_HEIGHT,
};
use transport::{SharedRowQueue, QUEUE_DEPTH};

/// Rows flowing from the acquisition core to the transmission core.
static ROW_QUEUE: SharedRowQueue<QUEUE_DEPTH> = SharedRowQueue::new();
/// Scan-active flag, observable from both cores.
static SCAN_GATE: ScanGate = ScanGate::new();
/// Host framing, shared by both cores by construction.
static LINK_CONFIG: LinkConfig = LinkConfig::default_sentinel();

static CORE1_STACK: StaticCell<[u32; board::CORE1_STACK_WORDS]> = StaticCell::new();
/// Handoff slot for the UART TX half; filled by core 0 before launch.
static CORE1_TX: Mutex<RefCell<Option<UartTx<'static, UART1, Blocking>>>> =
    Mutex::new(RefCell::new(None));

/// Producer-side spin budget: two full frames of slack before a stalled
/// transmitter faults the scan.
const PUSH_SPIN_LIMIT: u32 = 1_000_000;
/// Consumer-side spin budget: effectively wait forever for the next row.
const POP_SPIN_LIMIT: u32 = u32::MAX;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    defmt::info!("PressureMat firmware v{=str}", env!("CARGO_PKG_VERSION"));

    // Startup blink before touching the mat hardware.
    let mut led = Output::new(p.PIN_25, Level::Low);
    for _ in 0..5 {
        Timer::after_millis(100).await;
        led.set_high();
        Timer::after_millis(100).await;
        led.set_low();
    }

    let scan_config = ScanConfig::rev2();

    // Rev 2 split wiring: ADC A on SPI0, ADC B on SPI1, so both chips
    // convert and read back without sharing a bus. (Rev 1 put both on
    // SPI0 at 1 MHz; that wiring runs through
    // embedded_hal_bus::spi::CriticalSectionDevice instead.)
    let mut spi_config = spi::Config::default();
    spi_config.frequency = board::SPI_CLOCK_SPLIT_HZ;
    let spi0 = Spi::new_blocking(p.SPI0, p.PIN_2, p.PIN_3, p.PIN_4, spi_config.clone());
    let spi1 = Spi::new_blocking(p.SPI1, p.PIN_10, p.PIN_11, p.PIN_12, spi_config);

    let cs_a = Output::new(p.PIN_6, Level::High);
    let cs_b = Output::new(p.PIN_7, Level::High);
    let dev_a = match ExclusiveDevice::new(spi0, cs_a, Delay) {
        Ok(dev) => dev,
        Err(e) => match e {},
    };
    let dev_b = match ExclusiveDevice::new(spi1, cs_b, Delay) {
        Ok(dev) => dev,
        Err(e) => match e {},
    };

    let eoc_a = Input::new(p.PIN_0, Pull::Up);
    let eoc_b = Input::new(p.PIN_1, Pull::Up);
    let mut adc_a = AdcChannel::new(AdcId::A, dev_a, eoc_a);
    let mut adc_b = AdcChannel::new(AdcId::B, dev_b, eoc_b);
    // The ADC link is trusted hardware: log and carry on if setup fails.
    if adc_a.initialize(scan_config.reference).is_err() {
        defmt::warn!("ADC A setup write failed");
    }
    if adc_b.initialize(scan_config.reference).is_err() {
        defmt::warn!("ADC B setup write failed");
    }

    let shreg = match ShiftRegister::new(
        Output::new(p.PIN_19, Level::Low),
        Output::new(p.PIN_18, Level::High),
        Output::new(p.PIN_17, Level::Low),
        Delay,
        scan_config.clear_polarity,
        scan_config.pulse_us,
    ) {
        Ok(shreg) => shreg,
        Err(_) => defmt::panic!("shift register pins failed to initialise"),
    };

    let mut uart_config = uart::Config::default();
    uart_config.baudrate = board::HOST_BAUD;
    let link = Uart::new_blocking(p.UART1, p.PIN_8, p.PIN_9, uart_config);

    // Command phase: core 0 owns the whole link until the host starts a
    // session.
    let mut session = Session {
        adc_a,
        adc_b,
        shreg,
        link,
        delay: Delay,
        scan: scan_config,
        link_config: LINK_CONFIG,
    };
    defmt::info!("console ready");
    match session.run_console() {
        Ok(ConsoleOutcome::StartStreaming) => {}
        _ => {
            defmt::error!("host link lost before a session started");
            loop {
                cortex_m::asm::wfe();
            }
        }
    }

    // Streaming phase: hand the TX half to core 1, keep acquisition here.
    let Session {
        mut adc_a,
        mut adc_b,
        mut shreg,
        link,
        ..
    } = session;
    let (tx, _rx) = link.split();
    critical_section::with(|cs| {
        CORE1_TX.borrow_ref_mut(cs).replace(tx);
    });

    let stack = CORE1_STACK.init([0u32; board::CORE1_STACK_WORDS]);
    if let Err(err) = board::launch_core1(core1_transmit, stack) {
        defmt::panic!("core 1 launch failed: {}", err);
    }
    defmt::info!("core 1 launched; streaming");

    loop {
        led.set_high();
        let result = scan_frame_events(
            &mut adc_a,
            &mut adc_b,
            &mut shreg,
            &scan_config,
            &SCAN_GATE,
            |row| {
                ROW_QUEUE
                    .push_blocking(row, PUSH_SPIN_LIMIT)
                    .map_err(|_| ScanError::SinkFull)
            },
        )
        .await;
        led.set_low();

        if let Err(fault) = result {
            defmt::warn!("scan fault: {}", fault);
            // Give the hardware a beat, then re-arm; the host resyncs on
            // the frame sentinel.
            Timer::after_millis(10).await;
        }
    }
}

/// Core 1: drain the row queue into the host UART, one frame delimiter
/// every [`COL_HEIGHT`] rows.
fn core1_transmit() -> ! {
    let taken = critical_section::with(|cs| CORE1_TX.borrow_ref_mut(cs).take());
    let Some(mut tx) = taken else {
        // Launched without a transmitter: nothing useful to do.
        loop {
            cortex_m::asm::wfe();
        }
    };

    let mut rows_sent: usize = 0;
    loop {
        if let Ok(row) = ROW_QUEUE.pop_blocking(POP_SPIN_LIMIT) {
            let _ = transmit_row(&mut tx, &row);
            rows_sent = rows_sent.saturating_add(1);
            if rows_sent == COL_HEIGHT {
                let _ = transmit_delimiter(&mut tx, LINK_CONFIG.delimiter);
                let _ = embedded_io::Write::flush(&mut tx);
                rows_sent = 0;
                // Pre-frame throttle: the only pacing the host gets.
                embassy_time::block_for(Duration::from_micros(u64::from(
                    LINK_CONFIG.throttle_us,
                )));
            }
        }
    }
}

//! RP2040 board wiring: pin map, SIO mailbox and core-1 bring-up.
//!
//! Only compiled for the `hardware` feature. The pin assignments follow the
//! rev 2 interface board schematic.

use transport::{boot_sequence, CoreLaunch, HandshakeError, Mailbox};

/// SPI0 clock — ADC A (rev 2 split wiring).
pub const SPI0_SCK_PIN: u8 = 2;
/// SPI0 MOSI — ADC A.
pub const SPI0_TX_PIN: u8 = 3;
/// SPI0 MISO — ADC A.
pub const SPI0_RX_PIN: u8 = 4;
/// SPI1 clock — ADC B (rev 2 split wiring).
pub const SPI1_SCK_PIN: u8 = 10;
/// SPI1 MOSI — ADC B.
pub const SPI1_TX_PIN: u8 = 11;
/// SPI1 MISO — ADC B.
pub const SPI1_RX_PIN: u8 = 12;

/// ADC A chip select (idle high).
pub const ADC_A_CS_PIN: u8 = 6;
/// ADC B chip select (idle high).
pub const ADC_B_CS_PIN: u8 = 7;
/// ADC A end-of-conversion line (active low).
pub const ADC_A_EOC_PIN: u8 = 0;
/// ADC B end-of-conversion line (active low).
pub const ADC_B_EOC_PIN: u8 = 1;

/// Shift-register clock.
pub const SHREG_CLK_PIN: u8 = 19;
/// Shift-register clear (polarity per board revision, see `ScanConfig`).
pub const SHREG_CLR_PIN: u8 = 18;
/// Shift-register serial input.
pub const SHREG_SERIN_PIN: u8 = 17;

/// On-board status LED.
pub const LED_PIN: u8 = 25;

/// Host link UART (UART1: the default UART0 pins are taken by the EOC
/// lines). GPIO 8 = TX, GPIO 9 = RX.
pub const HOST_UART_TX_PIN: u8 = 8;
/// Host link UART RX.
pub const HOST_UART_RX_PIN: u8 = 9;
/// Host link baud rate.
pub const HOST_BAUD: u32 = 921_600;

/// SPI clock for the rev 2 split wiring (one bus per ADC).
pub const SPI_CLOCK_SPLIT_HZ: u32 = 2_000_000;
/// SPI clock for the rev 1 shared wiring (both ADCs on SPI0, serialised
/// through `embedded_hal_bus::spi::CriticalSectionDevice`).
pub const SPI_CLOCK_SHARED_HZ: u32 = 1_000_000;

/// Spin budget for mailbox writes/echoes during core launch.
pub const LAUNCH_SPIN_LIMIT: u32 = 100_000;

/// Core-1 stack, in words (2 KiB, same as the SDK default).
pub const CORE1_STACK_WORDS: usize = 512;

/// The inter-core SIO FIFO, launcher side.
///
/// `try_write` fires an event after pushing so a core sleeping in `wfe`
/// (the ROM wait loop does) wakes up to consume it.
pub struct SioMailbox;

impl Mailbox for SioMailbox {
    fn try_write(&mut self, word: u32) -> bool {
        let sio = embassy_rp::pac::SIO;
        if !sio.fifo_st().read().rdy() {
            return false;
        }
        sio.fifo_wr().write_value(word);
        cortex_m::asm::sev();
        true
    }

    fn try_read(&mut self) -> Option<u32> {
        let sio = embassy_rp::pac::SIO;
        if sio.fifo_st().read().vld() {
            Some(sio.fifo_rd().read())
        } else {
            None
        }
    }
}

/// Launch core 1 at `entry` with `stack`, via the retry-until-echoed boot
/// handshake over the SIO FIFO.
///
/// Assumes core 1 is still parked in its power-on ROM wait loop; the boot
/// ROM installs the stack pointer and jumps for us once the sequence is
/// acknowledged.
///
/// # Errors
///
/// [`HandshakeError`] when the FIFO stops responding or a boot word is
/// never echoed correctly.
pub fn launch_core1(entry: fn() -> !, stack: &'static mut [u32]) -> Result<(), HandshakeError> {
    // SAFETY: reading VTOR has no side effects; it is set once at boot.
    let vector_table = unsafe { (*cortex_m::peripheral::SCB::PTR).vtor.read() };

    let stack_top = (stack.as_ptr() as u32).wrapping_add((stack.len() as u32).wrapping_mul(4));

    #[allow(clippy::fn_to_numeric_cast_with_truncation)] // 32-bit target
    let entry_point = (entry as u32) | 1; // thumb bit

    let sequence = boot_sequence(vector_table, stack_top, entry_point);
    let mut launch = CoreLaunch::new(&sequence);
    launch.run(&mut SioMailbox, LAUNCH_SPIN_LIMIT)
}

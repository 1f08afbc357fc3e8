//! MAX11643 channel driver.
//!
//! Each ADC hangs off a half-duplex, chip-select-gated SPI link and owns one
//! end-of-conversion (EOC) line. A conversion round is: write one command
//! byte, wait for EOC to go low, clock back `2 × channels` bytes and
//! de-interleave them into byte samples.
//!
//! Chip-select framing is delegated to [`embedded_hal::spi::SpiDevice`]:
//! every `write`/`read` below is one CS-asserted transaction, which is what
//! the chip's protocol requires. On shared-bus boards the device wrapper
//! also serialises the two ADCs' transactions (see the firmware crate).

use embedded_hal::digital::InputPin;
use embedded_hal::spi::SpiDevice;
use embedded_hal_async::digital::Wait;

use crate::config::{AdcId, ReferenceMode};
use crate::error::{PortError, ScanError};
use crate::frame::{ADC_RESPONSE_LENGTH, CHANNELS_PER_ADC};

/// Setup command base: register select `01`, clock mode `10` (SPI-clocked
/// conversions, CNVST unused).
const SETUP_BASE: u8 = 0b0110_0000;

/// Conversion command base: scan mode `00` (convert channels 0..=N).
const CONVERSION_BASE: u8 = 0b1000_0000;

/// Build the setup register byte for the given reference wiring.
#[must_use]
pub const fn setup_command(reference: ReferenceMode) -> u8 {
    let ref_bits: u8 = match reference {
        ReferenceMode::Internal => 0b00,
        ReferenceMode::External => 0b01,
    };
    SETUP_BASE | (ref_bits << 2)
}

/// Build a conversion request for channels `0..channel_count` (scan mode 00).
///
/// `channel_count` must be in `1..=16`; the channel-select field encodes the
/// highest scanned channel, i.e. `channel_count - 1`.
#[must_use]
pub const fn conversion_request(channel_count: u8) -> u8 {
    CONVERSION_BASE | ((channel_count.saturating_sub(1) & 0x0F) << 3)
}

/// De-interleave a raw conversion response into byte samples.
///
/// The chip returns each 8-bit sample split across two bytes with four bits
/// of padding on each side: `0x, x0` per sample. The real sample is
/// `(hi << 4) | (lo >> 4)`. Getting this shift wrong silently corrupts
/// every sample, so it lives here as a pure, heavily-tested function.
pub fn deinterleave(resp: &[u8; ADC_RESPONSE_LENGTH], out: &mut [u8; CHANNELS_PER_ADC]) {
    for (pair, sample) in resp.chunks_exact(2).zip(out.iter_mut()) {
        if let &[hi, lo] = pair {
            *sample = (hi << 4) | (lo >> 4);
        }
    }
}

/// One ADC as the scan engine sees it.
///
/// The hardware implementation is [`AdcChannel`]; the mock rig provides a
/// scripted implementation for host tests.
pub trait AdcPort {
    /// Which converter this is (decides the row half its samples fill).
    fn id(&self) -> AdcId;

    /// Issue a conversion request for all mat channels. Non-blocking; the
    /// conversion proceeds on-chip.
    fn request_conversion(&mut self) -> Result<(), PortError>;

    /// `true` once the requested conversion has finished (EOC active low).
    fn poll_conversion_complete(&mut self) -> Result<bool, PortError>;

    /// Read back and de-interleave the finished conversion.
    fn read_conversion(&mut self, out: &mut [u8; CHANNELS_PER_ADC]) -> Result<(), PortError>;

    /// Fully synchronous conversion: request, bounded spin on EOC, read.
    ///
    /// # Errors
    ///
    /// [`ScanError::EocTimeout`] once `spin_limit` polls pass without the
    /// chip signalling completion.
    fn convert_blocking(
        &mut self,
        out: &mut [u8; CHANNELS_PER_ADC],
        spin_limit: u32,
    ) -> Result<(), ScanError> {
        self.request_conversion()?;
        wait_eoc_bounded(self, spin_limit)?;
        self.read_conversion(out)?;
        Ok(())
    }
}

/// Event-driven extension of [`AdcPort`]: resolve when the EOC line falls.
pub trait AdcEvents: AdcPort {
    /// Wait for the next falling edge on the EOC line.
    async fn eoc_falling_edge(&mut self) -> Result<(), PortError>;
}

/// Spin on EOC with a bounded iteration budget.
///
/// # Errors
///
/// [`ScanError::EocTimeout`] when the budget runs out — dead or miswired
/// hardware must fault the scan, not hang it.
pub fn wait_eoc_bounded<A: AdcPort + ?Sized>(adc: &mut A, spin_limit: u32) -> Result<(), ScanError> {
    let mut spins: u32 = 0;
    while !adc.poll_conversion_complete()? {
        spins = spins.saturating_add(1);
        if spins >= spin_limit {
            return Err(ScanError::EocTimeout { adc: adc.id() });
        }
        core::hint::spin_loop();
    }
    Ok(())
}

/// Hardware ADC handle: CS-gated SPI device plus the EOC input line.
/// Wiring is fixed after construction.
pub struct AdcChannel<D, E> {
    id: AdcId,
    spi: D,
    eoc: E,
}

impl<D, E> AdcChannel<D, E>
where
    D: SpiDevice<u8>,
    E: InputPin,
{
    /// Bind a converter to its SPI device and EOC line.
    pub fn new(id: AdcId, spi: D, eoc: E) -> Self {
        Self { id, spi, eoc }
    }

    /// Send the setup command selecting SPI clocking and the board's
    /// reference mode. Must run once before the first conversion.
    pub fn initialize(&mut self, reference: ReferenceMode) -> Result<(), PortError> {
        self.spi
            .write(&[setup_command(reference)])
            .map_err(|_| PortError::Spi)
    }
}

impl<D, E> AdcPort for AdcChannel<D, E>
where
    D: SpiDevice<u8>,
    E: InputPin,
{
    fn id(&self) -> AdcId {
        self.id
    }

    fn request_conversion(&mut self) -> Result<(), PortError> {
        let request = conversion_request(CHANNELS_PER_ADC as u8);
        self.spi.write(&[request]).map_err(|_| PortError::Spi)
    }

    fn poll_conversion_complete(&mut self) -> Result<bool, PortError> {
        self.eoc.is_low().map_err(|_| PortError::Gpio)
    }

    fn read_conversion(&mut self, out: &mut [u8; CHANNELS_PER_ADC]) -> Result<(), PortError> {
        let mut raw = [0u8; ADC_RESPONSE_LENGTH];
        self.spi.read(&mut raw).map_err(|_| PortError::Spi)?;
        deinterleave(&raw, out);
        Ok(())
    }
}

impl<D, E> AdcEvents for AdcChannel<D, E>
where
    D: SpiDevice<u8>,
    E: InputPin + Wait,
{
    async fn eoc_falling_edge(&mut self) -> Result<(), PortError> {
        self.eoc
            .wait_for_falling_edge()
            .await
            .map_err(|_| PortError::Gpio)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinLevel, Transaction as PinTransaction,
    };
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};
    use proptest::prelude::*;

    #[test]
    fn test_setup_command_encodes_reference_mode() {
        // 01 (setup) 10 (SPI clock) 00/01 (reference) 00
        assert_eq!(setup_command(ReferenceMode::Internal), 0b0110_0000);
        assert_eq!(setup_command(ReferenceMode::External), 0b0110_0100);
    }

    #[test]
    fn test_conversion_request_encodes_channel_count() {
        // 14 channels: scan channels 0..=13, so CHSEL = 13.
        assert_eq!(conversion_request(14), 0b1110_1000);
        assert_eq!(conversion_request(1), 0b1000_0000);
        assert_eq!(conversion_request(16), 0b1111_1000);
    }

    #[test]
    fn test_deinterleave_shifts_nibbles_together() {
        // Each sample arrives as [0x0H, 0xL0]; 0x35 is [0x03, 0x50].
        let mut resp = [0u8; ADC_RESPONSE_LENGTH];
        resp[0] = 0x03;
        resp[1] = 0x50;
        resp[2] = 0x0F;
        resp[3] = 0xA0;
        let mut out = [0u8; CHANNELS_PER_ADC];
        deinterleave(&resp, &mut out);
        assert_eq!(out[0], 0x35);
        assert_eq!(out[1], 0xFA);
        assert!(out[2..].iter().all(|&s| s == 0));
    }

    /// Encode a sample the way the chip does: high nibble in the first
    /// byte's low nibble, low nibble in the second byte's high nibble.
    fn interleave(samples: &[u8; CHANNELS_PER_ADC]) -> [u8; ADC_RESPONSE_LENGTH] {
        let mut resp = [0u8; ADC_RESPONSE_LENGTH];
        for (pair, &sample) in resp.chunks_exact_mut(2).zip(samples.iter()) {
            pair[0] = sample >> 4;
            pair[1] = (sample & 0x0F) << 4;
        }
        resp
    }

    proptest! {
        #[test]
        fn prop_deinterleave_inverts_chip_encoding(samples in proptest::array::uniform14(any::<u8>())) {
            let resp = interleave(&samples);
            let mut out = [0u8; CHANNELS_PER_ADC];
            deinterleave(&resp, &mut out);
            prop_assert_eq!(out, samples);
        }

        #[test]
        fn prop_deinterleave_ignores_padding_nibbles(
            samples in proptest::array::uniform14(any::<u8>()),
            noise in proptest::array::uniform14(0u8..16u8),
        ) {
            // Garbage in the padding nibbles must not leak into samples.
            let mut resp = interleave(&samples);
            for (pair, &n) in resp.chunks_exact_mut(2).zip(noise.iter()) {
                pair[0] |= n << 4;
                pair[1] |= n;
            }
            let mut out = [0u8; CHANNELS_PER_ADC];
            deinterleave(&resp, &mut out);
            prop_assert_eq!(out, samples);
        }
    }

    #[test]
    fn test_initialize_writes_setup_byte_in_one_transaction() {
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0b0110_0100]),
            SpiTransaction::transaction_end(),
        ]);
        let eoc = PinMock::new(&[]);
        let mut adc = AdcChannel::new(AdcId::A, spi.clone(), eoc.clone());

        adc.initialize(ReferenceMode::External).unwrap();

        let (mut spi, mut eoc) = (spi, eoc);
        spi.done();
        eoc.done();
    }

    #[test]
    fn test_request_then_read_round() {
        let response: Vec<u8> = (0..CHANNELS_PER_ADC as u8)
            .flat_map(|s| [s >> 4, (s & 0x0F) << 4])
            .collect();
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0b1110_1000]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::read_vec(response),
            SpiTransaction::transaction_end(),
        ]);
        let eoc = PinMock::new(&[PinTransaction::get(PinLevel::Low)]);
        let mut adc = AdcChannel::new(AdcId::B, spi.clone(), eoc.clone());

        adc.request_conversion().unwrap();
        assert!(adc.poll_conversion_complete().unwrap());
        let mut samples = [0u8; CHANNELS_PER_ADC];
        adc.read_conversion(&mut samples).unwrap();
        for (i, &s) in samples.iter().enumerate() {
            assert_eq!(s, i as u8);
        }

        let (mut spi, mut eoc) = (spi, eoc);
        spi.done();
        eoc.done();
    }

    #[test]
    fn test_convert_blocking_faults_when_eoc_never_falls() {
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0b1110_1000]),
            SpiTransaction::transaction_end(),
        ]);
        // EOC stuck high: every poll sees an unfinished conversion.
        let polls: Vec<PinTransaction> =
            (0..8).map(|_| PinTransaction::get(PinLevel::High)).collect();
        let eoc = PinMock::new(&polls);
        let mut adc = AdcChannel::new(AdcId::A, spi.clone(), eoc.clone());

        let mut samples = [0u8; CHANNELS_PER_ADC];
        let err = adc.convert_blocking(&mut samples, 8).unwrap_err();
        assert_eq!(err, ScanError::EocTimeout { adc: AdcId::A });

        let (mut spi, mut eoc) = (spi, eoc);
        spi.done();
        eoc.done();
    }
}

//! Frame and row transmission to the host.
//!
//! Rows go out as raw sample bytes, [`matscan::ROW_WIDTH`] per row,
//! [`matscan::COL_HEIGHT`] rows per frame, followed by a frame delimiter so
//! the host can resynchronise if it loses a byte. The host GUI scans for
//! the [`VERIFICATION_SEQUENCE`] sentinel by default.

use embedded_hal::delay::DelayNs;
use embedded_io::Write;

use matscan::{MatFrame, Row};

/// Frame boundary marker the host GUI resynchronises on. Chosen to be an
/// unlikely run of near-saturated samples.
pub const VERIFICATION_SEQUENCE: [u8; 4] = [0xFF, 0xFE, 0xFE, 0xFF];

/// How frames are delimited in the outgoing byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameDelimiter {
    /// Append [`VERIFICATION_SEQUENCE`] after each frame (default).
    Sentinel,
    /// Append a single newline after each frame.
    Newline,
    /// No delimiter; the host must count bytes.
    Unframed,
}

/// Link-side configuration, shared by producer and consumer so framing can
/// never disagree between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    /// Frame delimiter style.
    pub delimiter: FrameDelimiter,
    /// Fixed delay before each frame, in microseconds. A flow-control
    /// valve for slow hosts — the host has no way to signal "slow down".
    pub throttle_us: u32,
}

impl LinkConfig {
    /// Sentinel framing with a 1 ms pre-frame throttle.
    pub const fn default_sentinel() -> Self {
        Self {
            delimiter: FrameDelimiter::Sentinel,
            throttle_us: 1_000,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::default_sentinel()
    }
}

/// Write one row as raw bytes. No terminator; rows within a frame are
/// delimited by position alone.
///
/// # Errors
///
/// Propagates the link's write error.
pub fn transmit_row<W: Write>(link: &mut W, row: &Row) -> Result<(), W::Error> {
    link.write_all(row)
}

/// Write the configured frame delimiter, if any.
///
/// # Errors
///
/// Propagates the link's write error.
pub fn transmit_delimiter<W: Write>(
    link: &mut W,
    delimiter: FrameDelimiter,
) -> Result<(), W::Error> {
    match delimiter {
        FrameDelimiter::Sentinel => link.write_all(&VERIFICATION_SEQUENCE),
        FrameDelimiter::Newline => link.write_all(b"\n"),
        FrameDelimiter::Unframed => Ok(()),
    }
}

/// Write one complete frame: optional throttle, every row in column order,
/// then the delimiter, then flush.
///
/// # Errors
///
/// Propagates the link's write error.
pub fn transmit_frame<W, D>(
    link: &mut W,
    delay: &mut D,
    config: &LinkConfig,
    frame: &MatFrame,
) -> Result<(), W::Error>
where
    W: Write,
    D: DelayNs,
{
    if config.throttle_us > 0 {
        delay.delay_us(config.throttle_us);
    }
    for row in frame.rows() {
        transmit_row(link, row)?;
    }
    transmit_delimiter(link, config.delimiter)?;
    link.flush()
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
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use matscan::{COL_HEIGHT, MAT_SIZE, ROW_WIDTH};
    use std::vec::Vec;

    /// In-memory host link capturing everything written to it.
    #[derive(Default)]
    struct CaptureLink {
        bytes: Vec<u8>,
        flushes: usize,
    }

    impl embedded_io::ErrorType for CaptureLink {
        type Error = core::convert::Infallible;
    }

    impl Write for CaptureLink {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn patterned_frame() -> MatFrame {
        let mut frame = MatFrame::new();
        for i in 0..COL_HEIGHT {
            let mut row = [0u8; ROW_WIDTH];
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (i + j) as u8;
            }
            frame.set_row(i, &row);
        }
        frame
    }

    #[test]
    fn test_row_goes_out_as_raw_bytes() {
        let mut link = CaptureLink::default();
        let row: Row = core::array::from_fn(|i| i as u8);
        transmit_row(&mut link, &row).unwrap();
        assert_eq!(link.bytes, row);
    }

    #[test]
    fn test_sentinel_frame_layout() {
        let mut link = CaptureLink::default();
        let frame = patterned_frame();
        transmit_frame(
            &mut link,
            &mut NoopDelay::new(),
            &LinkConfig::default_sentinel(),
            &frame,
        )
        .unwrap();

        assert_eq!(link.bytes.len(), MAT_SIZE + VERIFICATION_SEQUENCE.len());
        assert_eq!(&link.bytes[..MAT_SIZE], &frame.as_bytes()[..]);
        assert_eq!(&link.bytes[MAT_SIZE..], &VERIFICATION_SEQUENCE);
        assert_eq!(link.flushes, 1);
    }

    #[test]
    fn test_newline_and_unframed_delimiters() {
        let mut link = CaptureLink::default();
        transmit_delimiter(&mut link, FrameDelimiter::Newline).unwrap();
        assert_eq!(link.bytes, b"\n");

        let mut link = CaptureLink::default();
        transmit_delimiter(&mut link, FrameDelimiter::Unframed).unwrap();
        assert!(link.bytes.is_empty());
    }

    #[test]
    fn test_frames_concatenate_without_gaps() {
        let mut link = CaptureLink::default();
        let frame = patterned_frame();
        let config = LinkConfig {
            delimiter: FrameDelimiter::Sentinel,
            throttle_us: 0,
        };
        transmit_frame(&mut link, &mut NoopDelay::new(), &config, &frame).unwrap();
        transmit_frame(&mut link, &mut NoopDelay::new(), &config, &frame).unwrap();

        let frame_len = MAT_SIZE + VERIFICATION_SEQUENCE.len();
        assert_eq!(link.bytes.len(), 2 * frame_len);
        assert_eq!(&link.bytes[..frame_len], &link.bytes[frame_len..]);
    }
}

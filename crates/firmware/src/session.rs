//! Host session: command loop and frame capture.
//!
//! Before a recording session the board sits in the console loop, reading
//! newline-terminated commands from the host and answering on the same
//! link. `start_reading` leaves the console and enters streaming;
//! `get_cal_vals` captures and transmits a single raw frame; `print_info`
//! identifies the build; anything else is reported and ignored.
//!
//! Scan faults are reported to the host and the console keeps running —
//! a dead ADC must never wedge the command loop.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, Write};
use heapless::String;

use hostlink::{parse_line, transmit_frame, Command, LinkConfig};
use matscan::{scan_frame_blocking, AdcPort, ColumnSelect, MatFrame, ScanConfig, ScanFault};

/// Longest accepted command line; longer input classifies as unrecognized.
pub const LINE_MAX: usize = 64;

/// Reply sent for input that matches no command.
pub const UNRECOGNIZED_REPLY: &str = "Unrecognized command\n";

/// Session-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// The scan path faulted (already reported to the host by the console).
    Scan(ScanFault),
    /// The host link failed to read or write.
    Link,
}

impl From<ScanFault> for SessionError {
    fn from(fault: ScanFault) -> Self {
        Self::Scan(fault)
    }
}

impl core::fmt::Display for SessionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Scan(fault) => write!(f, "{fault}"),
            Self::Link => write!(f, "host link failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SessionError {}

/// What one console poll produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleOutcome {
    /// A command was handled; keep polling.
    Idle,
    /// The host asked for continuous streaming.
    StartStreaming,
    /// The host side closed the link.
    Disconnected,
}

enum LineStatus {
    Line,
    Eof,
}

/// One board session: the mat rig plus the host link.
///
/// Generic over the hardware seams so the whole session runs against the
/// mock rig in host tests.
pub struct Session<A, B, S, L, D> {
    /// Converter filling the first half of each row.
    pub adc_a: A,
    /// Converter filling the second half of each row.
    pub adc_b: B,
    /// Column-select chain.
    pub shreg: S,
    /// Bidirectional host link (commands in, frames and replies out).
    pub link: L,
    /// Delay provider for transmit throttling.
    pub delay: D,
    /// Scan-path configuration.
    pub scan: ScanConfig,
    /// Framing configuration.
    pub link_config: LinkConfig,
}

impl<A, B, S, L, D> Session<A, B, S, L, D>
where
    A: AdcPort,
    B: AdcPort,
    S: ColumnSelect,
    L: Read + Write,
    D: DelayNs,
{
    /// Read and handle one command line.
    ///
    /// # Errors
    ///
    /// [`SessionError::Link`] if the host link dies. Scan faults are
    /// reported to the host and do **not** error the console.
    pub fn poll_console(&mut self) -> Result<ConsoleOutcome, SessionError> {
        let mut line: String<LINE_MAX> = String::new();
        match read_line(&mut self.link, &mut line)? {
            LineStatus::Eof => return Ok(ConsoleOutcome::Disconnected),
            LineStatus::Line => {}
        }

        match parse_line(&line) {
            Command::StartReading => Ok(ConsoleOutcome::StartStreaming),
            Command::GetCalVals => {
                match self.capture_frame() {
                    Ok(frame) => self.transmit(&frame)?,
                    Err(fault) => self.report_fault(&fault)?,
                }
                Ok(ConsoleOutcome::Idle)
            }
            Command::PrintInfo => {
                self.reply(crate::FIRMWARE_INFO)?;
                Ok(ConsoleOutcome::Idle)
            }
            Command::Unrecognized => {
                self.reply(UNRECOGNIZED_REPLY)?;
                Ok(ConsoleOutcome::Idle)
            }
        }
    }

    /// Poll the console until the host requests streaming or disconnects.
    ///
    /// # Errors
    ///
    /// [`SessionError::Link`] if the host link dies.
    pub fn run_console(&mut self) -> Result<ConsoleOutcome, SessionError> {
        loop {
            match self.poll_console()? {
                ConsoleOutcome::Idle => {}
                other => return Ok(other),
            }
        }
    }

    /// One blocking sweep of the whole mat.
    ///
    /// # Errors
    ///
    /// [`ScanFault`] as produced by the engine.
    pub fn capture_frame(&mut self) -> Result<MatFrame, ScanFault> {
        let mut frame = MatFrame::new();
        scan_frame_blocking(
            &mut self.adc_a,
            &mut self.adc_b,
            &mut self.shreg,
            &self.scan,
            &mut frame,
        )?;
        Ok(frame)
    }

    /// Scan one frame and stream it to the host — the single-context
    /// streaming step (the dual-core pipeline lives in the hardware layer).
    ///
    /// # Errors
    ///
    /// [`SessionError::Scan`] on a scan fault (after reporting it),
    /// [`SessionError::Link`] if the host link dies.
    pub fn stream_once(&mut self) -> Result<(), SessionError> {
        match self.capture_frame() {
            Ok(frame) => self.transmit(&frame),
            Err(fault) => {
                self.report_fault(&fault)?;
                Err(SessionError::Scan(fault))
            }
        }
    }

    fn transmit(&mut self, frame: &MatFrame) -> Result<(), SessionError> {
        transmit_frame(&mut self.link, &mut self.delay, &self.link_config, frame)
            .map_err(|_| SessionError::Link)
    }

    fn reply(&mut self, text: &str) -> Result<(), SessionError> {
        self.link
            .write_all(text.as_bytes())
            .and_then(|()| self.link.flush())
            .map_err(|_| SessionError::Link)
    }

    fn report_fault(&mut self, fault: &ScanFault) -> Result<(), SessionError> {
        let mut message: String<96> = String::new();
        // A full message never exceeds the buffer; a truncated one is
        // still a useful report.
        let _ = write!(message, "{fault}\n");
        self.reply(&message)
    }
}

/// Accumulate bytes until a newline or carriage return.
///
/// Leading terminators (the `\n` of a preceding `\r\n`) are skipped, bytes
/// beyond [`LINE_MAX`] are dropped, and end-of-stream reports
/// [`LineStatus::Eof`].
fn read_line<R: Read>(
    link: &mut R,
    line: &mut String<LINE_MAX>,
) -> Result<LineStatus, SessionError> {
    loop {
        let mut byte = [0u8; 1];
        let n = link.read(&mut byte).map_err(|_| SessionError::Link)?;
        if n == 0 {
            return Ok(LineStatus::Eof);
        }
        match byte[0] {
            b'\n' | b'\r' => {
                if line.is_empty() {
                    continue;
                }
                return Ok(LineStatus::Line);
            }
            other => {
                // Overlong input: drop the byte, classification will
                // reject the line anyway.
                let _ = line.push(other as char);
            }
        }
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
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use matscan::mocks::{counting_pattern, MockAdc, MockShift, Trace};
    use matscan::{AdcId, COL_HEIGHT, MAT_SIZE, ROW_WIDTH};
    use std::vec::Vec;

    /// Scripted host link: `input` is what the host sends, `output`
    /// captures everything the board replies.
    struct MockLink {
        input: Vec<u8>,
        cursor: usize,
        output: Vec<u8>,
    }

    impl MockLink {
        fn new(input: &str) -> Self {
            Self {
                input: input.as_bytes().to_vec(),
                cursor: 0,
                output: Vec::new(),
            }
        }
    }

    impl embedded_io::ErrorType for MockLink {
        type Error = core::convert::Infallible;
    }

    impl Read for MockLink {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let remaining = &self.input[self.cursor..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.cursor += n;
            Ok(n)
        }
    }

    impl Write for MockLink {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    type TestSession = Session<MockAdc, MockAdc, MockShift, MockLink, NoopDelay>;

    fn session(input: &str) -> TestSession {
        let trace = Trace::new();
        Session {
            adc_a: MockAdc::new(AdcId::A, &trace).with_fixed(counting_pattern(AdcId::A)),
            adc_b: MockAdc::new(AdcId::B, &trace).with_fixed(counting_pattern(AdcId::B)),
            shreg: MockShift::new(&trace),
            link: MockLink::new(input),
            delay: NoopDelay::new(),
            scan: ScanConfig::rev2(),
            link_config: LinkConfig {
                delimiter: hostlink::FrameDelimiter::Sentinel,
                throttle_us: 0,
            },
        }
    }

    #[test]
    fn test_print_info_identifies_build() {
        let mut session = session("print_info\n");
        assert_eq!(session.poll_console().unwrap(), ConsoleOutcome::Idle);
        assert_eq!(session.link.output, crate::FIRMWARE_INFO.as_bytes());
    }

    #[test]
    fn test_unknown_command_is_reported_and_survived() {
        let mut session = session("bogus\nprint_info\n");
        assert_eq!(session.poll_console().unwrap(), ConsoleOutcome::Idle);
        assert_eq!(session.link.output, UNRECOGNIZED_REPLY.as_bytes());
        // The loop keeps going afterwards.
        assert_eq!(session.poll_console().unwrap(), ConsoleOutcome::Idle);
    }

    #[test]
    fn test_get_cal_vals_transmits_one_framed_frame() {
        let mut session = session("get_cal_vals\n");
        assert_eq!(session.poll_console().unwrap(), ConsoleOutcome::Idle);

        let expected_len = MAT_SIZE + hostlink::VERIFICATION_SEQUENCE.len();
        assert_eq!(session.link.output.len(), expected_len);
        // Every row carries the counting pattern 0x00..=0x1B.
        for row in session.link.output[..MAT_SIZE].chunks_exact(ROW_WIDTH) {
            for (i, &sample) in row.iter().enumerate() {
                assert_eq!(sample, i as u8);
            }
        }
        assert_eq!(
            &session.link.output[MAT_SIZE..],
            &hostlink::VERIFICATION_SEQUENCE
        );
    }

    #[test]
    fn test_start_reading_enters_streaming() {
        let mut session = session("start_reading\n");
        assert_eq!(
            session.poll_console().unwrap(),
            ConsoleOutcome::StartStreaming
        );
    }

    #[test]
    fn test_run_console_handles_commands_then_streams() {
        let mut session = session("print_info\r\nget_cal_vals\r\nstart_reading\r\n");
        assert_eq!(session.run_console().unwrap(), ConsoleOutcome::StartStreaming);
        // info reply + one full frame went out first.
        assert!(session.link.output.len() > MAT_SIZE);
    }

    #[test]
    fn test_eof_reports_disconnect() {
        let mut session = session("");
        assert_eq!(session.poll_console().unwrap(), ConsoleOutcome::Disconnected);
    }

    #[test]
    fn test_scan_fault_is_reported_not_fatal() {
        let trace = Trace::new();
        let mut session = session("get_cal_vals\nprint_info\n");
        // Second converter dead: every capture faults.
        session.adc_b = MockAdc::new(AdcId::B, &trace).dead();
        session.scan.eoc_spin_limit = 32;

        assert_eq!(session.poll_console().unwrap(), ConsoleOutcome::Idle);
        let reply = std::str::from_utf8(&session.link.output).unwrap();
        assert!(
            reply.contains("never signalled end of conversion"),
            "fault must be reported to the host, got: {reply}"
        );
        // Console still alive.
        assert_eq!(session.poll_console().unwrap(), ConsoleOutcome::Idle);
    }

    #[test]
    fn test_stream_once_emits_frames_back_to_back() {
        let mut session = session("");
        session.stream_once().unwrap();
        session.stream_once().unwrap();
        let frame_len = MAT_SIZE + hostlink::VERIFICATION_SEQUENCE.len();
        assert_eq!(session.link.output.len(), 2 * frame_len);
    }

    #[test]
    fn test_overlong_line_is_unrecognized() {
        let long = "x".repeat(3 * LINE_MAX);
        let mut session = session(&(long + "\nprint_info\n"));
        assert_eq!(session.poll_console().unwrap(), ConsoleOutcome::Idle);
        assert_eq!(session.link.output, UNRECOGNIZED_REPLY.as_bytes());
    }

    #[test]
    fn test_frame_stream_is_rows_then_sentinel() {
        let mut session = session("get_cal_vals\n");
        session.poll_console().unwrap();
        // 56 rows of 28 bytes each, then the sentinel.
        assert_eq!(
            session.link.output.len(),
            COL_HEIGHT * ROW_WIDTH + hostlink::VERIFICATION_SEQUENCE.len()
        );
    }
}

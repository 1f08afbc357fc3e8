//! Scan engine: one full sweep of the mat.
//!
//! A scan walks the shift-register selector across all [`COL_HEIGHT`]
//! columns. For each column both ADCs convert their 14 channels in
//! parallel; the two halves are joined into one [`Row`] and the selector
//! only then moves on. Two designs share the same cursor logic:
//!
//! - [`scan_frame_blocking`] busy-waits on each EOC line with a bounded
//!   spin budget — the simple, single-context design.
//! - [`scan_frame_events`] + [`ScanCursor`] treat EOC falling edges as
//!   events. The cursor's [`ScanCursor::handle_eoc`] performs the per-ADC
//!   read and the dual-ADC join: the next conversion request pair is not
//!   issued until **both** of the current column's responses have been
//!   consumed. That join is what makes dual-ADC parallelism safe — without
//!   it a slow converter's response would land in the wrong column.
//!
//! Either way a stuck EOC line faults the scan ([`ScanFault`]) instead of
//! hanging: the blocking design runs out of spin budget, the event design
//! runs out of wall-clock timeout.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, Either};
use embassy_time::with_timeout;

use crate::adc::{wait_eoc_bounded, AdcEvents, AdcPort};
use crate::config::{AdcId, ScanConfig};
use crate::error::{ScanError, ScanFault};
use crate::frame::{MatFrame, Row, CHANNELS_PER_ADC, COL_HEIGHT, ROW_WIDTH};
use crate::shreg::ColumnSelect;

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanState {
    /// No scan in progress; the engine is ready to start one.
    Idle,
    /// Sweeping; `column` is the column currently converting.
    Scanning {
        /// Column currently converting.
        column: u8,
    },
    /// The last row has been captured; the frame is complete.
    Done,
    /// The scan died and will not progress until restarted.
    Fault(ScanFault),
}

/// "Is a scan active" flag, shared between the scanning context and the
/// control path. Single-word atomic so both sides can read it without
/// tearing; the scanning context is the only writer.
pub struct ScanGate(AtomicBool);

impl ScanGate {
    /// A gate with no scan active, usable as a `static` initialiser.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Mark a scan as running.
    pub fn begin(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Mark the scan as finished.
    pub fn end(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// `true` while a scan is running.
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for ScanGate {
    fn default() -> Self {
        Self::new()
    }
}

/// What one EOC event did to the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EocOutcome {
    /// One half of the row landed; the other converter is still pending.
    AwaitingPeer,
    /// Both halves landed: here is the completed row (copied out), and
    /// whether it was the frame's last.
    RowComplete {
        /// The completed row, handed off by value.
        row: Row,
        /// Column this row was captured from.
        column: u8,
        /// `true` when this row finished the frame.
        frame_done: bool,
    },
    /// Event arrived while no scan was running, or for a converter with no
    /// conversion outstanding. Dropped.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Scanning,
    Done,
    Fault(ScanFault),
}

/// Event-driven scan context: column cursor, per-ADC pending flags and the
/// row under assembly.
///
/// This is the state the original interrupt design kept in globals, made an
/// explicit object: the event handler (interrupt callback or async task)
/// borrows the devices only for the duration of one [`handle_eoc`] call.
///
/// [`handle_eoc`]: ScanCursor::handle_eoc
pub struct ScanCursor {
    column: u8,
    pending_a: bool,
    pending_b: bool,
    half_a: [u8; CHANNELS_PER_ADC],
    half_b: [u8; CHANNELS_PER_ADC],
    phase: Phase,
}

impl ScanCursor {
    /// A cursor in the `Idle` state.
    pub const fn new() -> Self {
        Self {
            column: 0,
            pending_a: false,
            pending_b: false,
            half_a: [0u8; CHANNELS_PER_ADC],
            half_b: [0u8; CHANNELS_PER_ADC],
            phase: Phase::Idle,
        }
    }

    /// Current engine state.
    pub fn state(&self) -> ScanState {
        match self.phase {
            Phase::Idle => ScanState::Idle,
            Phase::Scanning => ScanState::Scanning {
                column: self.column,
            },
            Phase::Done => ScanState::Done,
            Phase::Fault(fault) => ScanState::Fault(fault),
        }
    }

    /// Start a sweep: reset the cursor, seed the selector on column 0 and
    /// issue the first conversion request pair.
    ///
    /// Callable from `Idle`, `Done` or `Fault` — the engine is reusable.
    ///
    /// # Errors
    ///
    /// Any hardware failure faults the cursor and is returned.
    pub fn begin<A, B, S>(
        &mut self,
        adc_a: &mut A,
        adc_b: &mut B,
        shreg: &mut S,
    ) -> Result<(), ScanFault>
    where
        A: AdcPort,
        B: AdcPort,
        S: ColumnSelect,
    {
        self.column = 0;
        self.half_a = [0u8; CHANNELS_PER_ADC];
        self.half_b = [0u8; CHANNELS_PER_ADC];
        self.phase = Phase::Scanning;

        let outcome = (|| {
            shreg.clear()?;
            shreg.seed()?;
            self.pending_a = true;
            self.pending_b = true;
            adc_a.request_conversion()?;
            adc_b.request_conversion()
        })();
        outcome.map_err(|e| self.fault(ScanError::Port(e)))
    }

    /// Consume one end-of-conversion event.
    ///
    /// Reads the finishing converter's samples into its half of the row and
    /// clears its pending flag. When both flags are clear the completed row
    /// is returned, the selector advances, and — unless the frame is done —
    /// the next request pair goes out. Events with no matching outstanding
    /// conversion are reported as [`EocOutcome::Ignored`].
    ///
    /// # Errors
    ///
    /// Any hardware failure faults the cursor and is returned.
    pub fn handle_eoc<A, B, S>(
        &mut self,
        id: AdcId,
        adc_a: &mut A,
        adc_b: &mut B,
        shreg: &mut S,
    ) -> Result<EocOutcome, ScanFault>
    where
        A: AdcPort,
        B: AdcPort,
        S: ColumnSelect,
    {
        if self.phase != Phase::Scanning {
            return Ok(EocOutcome::Ignored);
        }

        match id {
            AdcId::A if self.pending_a => {
                let mut half = self.half_a;
                adc_a
                    .read_conversion(&mut half)
                    .map_err(|e| self.fault(ScanError::Port(e)))?;
                self.half_a = half;
                self.pending_a = false;
            }
            AdcId::B if self.pending_b => {
                let mut half = self.half_b;
                adc_b
                    .read_conversion(&mut half)
                    .map_err(|e| self.fault(ScanError::Port(e)))?;
                self.half_b = half;
                self.pending_b = false;
            }
            _ => return Ok(EocOutcome::Ignored),
        }

        if self.pending_a || self.pending_b {
            return Ok(EocOutcome::AwaitingPeer);
        }

        // Both responses for this column are consumed: the row is complete
        // and it is now safe to move the selector and re-arm the ADCs.
        let row = assemble_row(&self.half_a, &self.half_b);
        let column = self.column;
        self.column = self.column.saturating_add(1);

        if usize::from(self.column) == COL_HEIGHT {
            self.phase = Phase::Done;
            return Ok(EocOutcome::RowComplete {
                row,
                column,
                frame_done: true,
            });
        }

        let outcome = (|| {
            shreg.advance_column()?;
            adc_a.request_conversion()?;
            adc_b.request_conversion()
        })();
        outcome.map_err(|e| self.fault(ScanError::Port(e)))?;
        self.pending_a = true;
        self.pending_b = true;

        Ok(EocOutcome::RowComplete {
            row,
            column,
            frame_done: false,
        })
    }

    /// Which converter a stalled scan is waiting on (for fault reporting).
    pub fn stalled_adc(&self) -> AdcId {
        if self.pending_a {
            AdcId::A
        } else {
            AdcId::B
        }
    }

    /// Park the cursor in the fault state at its current column.
    pub fn fault(&mut self, error: ScanError) -> ScanFault {
        self.fault_at(self.column, error)
    }

    /// Park the cursor in the fault state, attributing the failure to a
    /// specific column (used when a completed row is rejected downstream).
    pub fn fault_at(&mut self, column: u8, error: ScanError) -> ScanFault {
        let fault = ScanFault { column, error };
        self.phase = Phase::Fault(fault);
        fault
    }
}

impl Default for ScanCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Join the two ADC halves into one row: A's channels first, then B's.
#[allow(clippy::indexing_slicing)] // fixed split of a fixed-size array
fn assemble_row(half_a: &[u8; CHANNELS_PER_ADC], half_b: &[u8; CHANNELS_PER_ADC]) -> Row {
    let mut row = [0u8; ROW_WIDTH];
    row[..CHANNELS_PER_ADC].copy_from_slice(half_a);
    row[CHANNELS_PER_ADC..].copy_from_slice(half_b);
    row
}

/// Fully synchronous sweep: shift → trigger both → spin on both EOC lines →
/// read both → next column. The calling context owns the whole scan.
///
/// # Errors
///
/// [`ScanFault`] on any hardware failure or exhausted EOC spin budget,
/// recording the column the sweep died on.
pub fn scan_frame_blocking<A, B, S>(
    adc_a: &mut A,
    adc_b: &mut B,
    shreg: &mut S,
    config: &ScanConfig,
    frame: &mut MatFrame,
) -> Result<(), ScanFault>
where
    A: AdcPort,
    B: AdcPort,
    S: ColumnSelect,
{
    let fault_at = |column: usize, error: ScanError| ScanFault {
        column: u8::try_from(column).unwrap_or(u8::MAX),
        error,
    };

    shreg.clear().map_err(|e| fault_at(0, ScanError::Port(e)))?;
    shreg.seed().map_err(|e| fault_at(0, ScanError::Port(e)))?;

    let mut half_a = [0u8; CHANNELS_PER_ADC];
    let mut half_b = [0u8; CHANNELS_PER_ADC];
    for column in 0..COL_HEIGHT {
        let at = |error: ScanError| fault_at(column, error);

        // Trigger both conversions, then wait — the chips convert in
        // parallel while we spin.
        adc_a.request_conversion().map_err(|e| at(e.into()))?;
        adc_b.request_conversion().map_err(|e| at(e.into()))?;
        wait_eoc_bounded(adc_a, config.eoc_spin_limit).map_err(at)?;
        wait_eoc_bounded(adc_b, config.eoc_spin_limit).map_err(at)?;

        adc_a.read_conversion(&mut half_a).map_err(|e| at(e.into()))?;
        adc_b.read_conversion(&mut half_b).map_err(|e| at(e.into()))?;
        frame.set_row(column, &assemble_row(&half_a, &half_b));

        shreg.advance_column().map_err(|e| at(e.into()))?;
    }
    Ok(())
}

/// Event-driven sweep: EOC falling edges drive the cursor's join logic and
/// every completed row is handed to `sink` (a frame buffer or the
/// inter-core queue) before the frame moves on.
///
/// `gate` is raised for the duration of the sweep so the control path can
/// observe scan activity without locks.
///
/// # Errors
///
/// [`ScanFault`] on hardware failure, an EOC wait exceeding
/// `config.eoc_timeout`, or the sink refusing a row.
pub async fn scan_frame_events<A, B, S, F>(
    adc_a: &mut A,
    adc_b: &mut B,
    shreg: &mut S,
    config: &ScanConfig,
    gate: &ScanGate,
    mut sink: F,
) -> Result<(), ScanFault>
where
    A: AdcEvents,
    B: AdcEvents,
    S: ColumnSelect,
    F: FnMut(&Row) -> Result<(), ScanError>,
{
    let mut cursor = ScanCursor::new();
    gate.begin();
    let result = scan_frame_events_inner(adc_a, adc_b, shreg, config, &mut cursor, &mut sink).await;
    gate.end();
    result
}

async fn scan_frame_events_inner<A, B, S, F>(
    adc_a: &mut A,
    adc_b: &mut B,
    shreg: &mut S,
    config: &ScanConfig,
    cursor: &mut ScanCursor,
    sink: &mut F,
) -> Result<(), ScanFault>
where
    A: AdcEvents,
    B: AdcEvents,
    S: ColumnSelect,
    F: FnMut(&Row) -> Result<(), ScanError>,
{
    cursor.begin(adc_a, adc_b, shreg)?;

    loop {
        let edge = with_timeout(
            config.eoc_timeout,
            select(adc_a.eoc_falling_edge(), adc_b.eoc_falling_edge()),
        )
        .await;

        let id = match edge {
            Err(_) => {
                let stalled = cursor.stalled_adc();
                return Err(cursor.fault(ScanError::EocTimeout { adc: stalled }));
            }
            Ok(Either::First(eoc)) => {
                eoc.map_err(|e| cursor.fault(ScanError::Port(e)))?;
                AdcId::A
            }
            Ok(Either::Second(eoc)) => {
                eoc.map_err(|e| cursor.fault(ScanError::Port(e)))?;
                AdcId::B
            }
        };

        match cursor.handle_eoc(id, adc_a, adc_b, shreg)? {
            EocOutcome::AwaitingPeer | EocOutcome::Ignored => {}
            EocOutcome::RowComplete {
                row,
                column,
                frame_done,
            } => {
                sink(&row).map_err(|e| cursor.fault_at(column, e))?;
                if frame_done {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::PortError;
    use crate::mocks::{counting_pattern, MockAdc, MockShift, Trace, TraceEvent};
    use embassy_time::Duration;

    fn test_config() -> ScanConfig {
        let mut config = ScanConfig::rev2();
        // Keep host tests fast: mock conversions finish instantly or never.
        config.eoc_spin_limit = 64;
        config.eoc_timeout = Duration::from_millis(20);
        config
    }

    fn counting_rig(trace: &Trace) -> (MockAdc, MockAdc, MockShift) {
        let adc_a = MockAdc::new(AdcId::A, trace).with_fixed(counting_pattern(AdcId::A));
        let adc_b = MockAdc::new(AdcId::B, trace).with_fixed(counting_pattern(AdcId::B));
        (adc_a, adc_b, MockShift::new(trace))
    }

    fn expected_counting_row() -> Row {
        let mut row = [0u8; ROW_WIDTH];
        for (i, cell) in row.iter_mut().enumerate() {
            *cell = i as u8;
        }
        row
    }

    /// A request for a new round may only go out once the requester has no
    /// unconsumed response *and* its peer has consumed every response from
    /// the rounds preceding the new one.
    fn assert_join_invariant(events: &[TraceEvent]) {
        let (mut req_a, mut read_a, mut req_b, mut read_b) = (0usize, 0usize, 0usize, 0usize);
        for event in events {
            match event {
                TraceEvent::Request(AdcId::A) => {
                    assert_eq!(read_a, req_a, "ADC A re-armed before its response was consumed");
                    assert!(read_b >= req_a, "ADC A re-armed before ADC B's response was consumed");
                    req_a += 1;
                }
                TraceEvent::Request(AdcId::B) => {
                    assert_eq!(read_b, req_b, "ADC B re-armed before its response was consumed");
                    assert!(read_a >= req_b, "ADC B re-armed before ADC A's response was consumed");
                    req_b += 1;
                }
                TraceEvent::ReadDone(AdcId::A) => read_a += 1,
                TraceEvent::ReadDone(AdcId::B) => read_b += 1,
                TraceEvent::Advance(_) | TraceEvent::Clear => {}
            }
        }
        assert_eq!(req_a, COL_HEIGHT);
        assert_eq!(req_b, COL_HEIGHT);
        assert_eq!(read_a, COL_HEIGHT);
        assert_eq!(read_b, COL_HEIGHT);
    }

    #[test]
    fn test_blocking_scan_fills_every_row() {
        let trace = Trace::new();
        let (mut adc_a, mut adc_b, mut shreg) = counting_rig(&trace);
        let mut frame = MatFrame::new();

        scan_frame_blocking(&mut adc_a, &mut adc_b, &mut shreg, &test_config(), &mut frame)
            .unwrap();

        let expected = expected_counting_row();
        assert_eq!(frame.rows().count(), COL_HEIGHT);
        for row in frame.rows() {
            assert_eq!(row, &expected);
        }
        assert!(shreg.one_hot_ok());
        // Seed plus one advance per captured row.
        assert_eq!(shreg.advances(), COL_HEIGHT + 1);
        assert_join_invariant(&trace.events());
    }

    #[test]
    fn test_blocking_scan_keeps_rows_in_column_order() {
        let trace = Trace::new();
        let mut adc_a =
            MockAdc::new(AdcId::A, &trace).with_samples(|round| [round as u8; CHANNELS_PER_ADC]);
        let mut adc_b =
            MockAdc::new(AdcId::B, &trace).with_samples(|round| [0x80 | round as u8; CHANNELS_PER_ADC]);
        let mut shreg = MockShift::new(&trace);
        let mut frame = MatFrame::new();

        scan_frame_blocking(&mut adc_a, &mut adc_b, &mut shreg, &test_config(), &mut frame)
            .unwrap();

        for (i, row) in frame.rows().enumerate() {
            assert!(row[..CHANNELS_PER_ADC].iter().all(|&s| s == i as u8));
            assert!(row[CHANNELS_PER_ADC..].iter().all(|&s| s == 0x80 | i as u8));
        }
    }

    #[test]
    fn test_blocking_scan_faults_on_dead_adc() {
        let trace = Trace::new();
        let mut adc_a = MockAdc::new(AdcId::A, &trace);
        let mut adc_b = MockAdc::new(AdcId::B, &trace).dead();
        let mut shreg = MockShift::new(&trace);
        let mut frame = MatFrame::new();

        let fault =
            scan_frame_blocking(&mut adc_a, &mut adc_b, &mut shreg, &test_config(), &mut frame)
                .unwrap_err();
        assert_eq!(fault.column, 0);
        assert_eq!(fault.error, ScanError::EocTimeout { adc: AdcId::B });
    }

    #[test]
    fn test_blocking_scan_fault_records_mid_scan_column() {
        let trace = Trace::new();
        let mut adc_a = MockAdc::new(AdcId::A, &trace);
        // Three good rounds (columns 0..=2), then the chip goes quiet.
        let mut adc_b = MockAdc::new(AdcId::B, &trace).dead_after(3);
        let mut shreg = MockShift::new(&trace);
        let mut frame = MatFrame::new();

        let fault =
            scan_frame_blocking(&mut adc_a, &mut adc_b, &mut shreg, &test_config(), &mut frame)
                .unwrap_err();
        assert_eq!(fault.column, 3);
        assert_eq!(fault.error, ScanError::EocTimeout { adc: AdcId::B });
    }

    #[test]
    fn test_cursor_walks_idle_scanning_done() {
        let trace = Trace::new();
        let (mut adc_a, mut adc_b, mut shreg) = counting_rig(&trace);
        let mut cursor = ScanCursor::new();
        assert_eq!(cursor.state(), ScanState::Idle);

        cursor.begin(&mut adc_a, &mut adc_b, &mut shreg).unwrap();
        assert_eq!(cursor.state(), ScanState::Scanning { column: 0 });

        let mut rows = 0usize;
        for _ in 0..COL_HEIGHT {
            let first = cursor
                .handle_eoc(AdcId::A, &mut adc_a, &mut adc_b, &mut shreg)
                .unwrap();
            assert_eq!(first, EocOutcome::AwaitingPeer);
            match cursor
                .handle_eoc(AdcId::B, &mut adc_a, &mut adc_b, &mut shreg)
                .unwrap()
            {
                EocOutcome::RowComplete {
                    row,
                    column,
                    frame_done,
                } => {
                    assert_eq!(row, expected_counting_row());
                    assert_eq!(usize::from(column), rows);
                    rows += 1;
                    assert_eq!(frame_done, rows == COL_HEIGHT);
                }
                other => panic!("expected a completed row, got {other:?}"),
            }
        }
        assert_eq!(cursor.state(), ScanState::Done);
        assert_join_invariant(&trace.events());

        // The engine is reusable: a new sweep starts from Done.
        cursor.begin(&mut adc_a, &mut adc_b, &mut shreg).unwrap();
        assert_eq!(cursor.state(), ScanState::Scanning { column: 0 });
    }

    #[test]
    fn test_cursor_ignores_spurious_events() {
        let trace = Trace::new();
        let (mut adc_a, mut adc_b, mut shreg) = counting_rig(&trace);
        let mut cursor = ScanCursor::new();

        // Not scanning yet: any edge is dropped.
        assert_eq!(
            cursor
                .handle_eoc(AdcId::A, &mut adc_a, &mut adc_b, &mut shreg)
                .unwrap(),
            EocOutcome::Ignored
        );

        cursor.begin(&mut adc_a, &mut adc_b, &mut shreg).unwrap();
        cursor
            .handle_eoc(AdcId::A, &mut adc_a, &mut adc_b, &mut shreg)
            .unwrap();
        // A second edge from the same converter in the same round.
        assert_eq!(
            cursor
                .handle_eoc(AdcId::A, &mut adc_a, &mut adc_b, &mut shreg)
                .unwrap(),
            EocOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_event_scan_produces_identical_frame() {
        let trace = Trace::new();
        let (mut adc_a, mut adc_b, mut shreg) = counting_rig(&trace);
        let gate = ScanGate::new();
        let mut frame = MatFrame::new();
        let mut next_row = 0usize;

        scan_frame_events(
            &mut adc_a,
            &mut adc_b,
            &mut shreg,
            &test_config(),
            &gate,
            |row| {
                frame.set_row(next_row, row);
                next_row += 1;
                Ok(())
            },
        )
        .await
        .unwrap();

        assert!(!gate.is_active());
        assert_eq!(next_row, COL_HEIGHT);
        let expected = expected_counting_row();
        for row in frame.rows() {
            assert_eq!(row, &expected);
        }
        // Same chip responses, bit-identical frame to the blocking design.
        let mut blocking_frame = MatFrame::new();
        let trace2 = Trace::new();
        let (mut a2, mut b2, mut s2) = counting_rig(&trace2);
        scan_frame_blocking(&mut a2, &mut b2, &mut s2, &test_config(), &mut blocking_frame)
            .unwrap();
        assert_eq!(frame, blocking_frame);
        assert_join_invariant(&trace.events());
    }

    #[tokio::test]
    async fn test_event_scan_times_out_on_dead_adc() {
        let trace = Trace::new();
        let mut adc_a = MockAdc::new(AdcId::A, &trace);
        let mut adc_b = MockAdc::new(AdcId::B, &trace).dead();
        let mut shreg = MockShift::new(&trace);
        let gate = ScanGate::new();

        let fault = scan_frame_events(
            &mut adc_a,
            &mut adc_b,
            &mut shreg,
            &test_config(),
            &gate,
            |_| Ok(()),
        )
        .await
        .unwrap_err();

        assert_eq!(fault.error, ScanError::EocTimeout { adc: AdcId::B });
        assert_eq!(fault.column, 0);
        assert!(!gate.is_active(), "gate must drop on fault");
    }

    #[tokio::test]
    async fn test_event_scan_surfaces_sink_backpressure() {
        let trace = Trace::new();
        let (mut adc_a, mut adc_b, mut shreg) = counting_rig(&trace);
        let gate = ScanGate::new();
        let mut accepted = 0usize;

        let fault = scan_frame_events(
            &mut adc_a,
            &mut adc_b,
            &mut shreg,
            &test_config(),
            &gate,
            |_| {
                if accepted == 3 {
                    return Err(ScanError::SinkFull);
                }
                accepted += 1;
                Ok(())
            },
        )
        .await
        .unwrap_err();

        assert_eq!(fault.error, ScanError::SinkFull);
    }

    #[test]
    fn test_port_error_faults_blocking_scan() {
        // An ADC whose SPI link dies on the third read round.
        struct FlakyAdc {
            inner: MockAdc,
        }
        impl AdcPort for FlakyAdc {
            fn id(&self) -> AdcId {
                self.inner.id()
            }
            fn request_conversion(&mut self) -> Result<(), PortError> {
                self.inner.request_conversion()
            }
            fn poll_conversion_complete(&mut self) -> Result<bool, PortError> {
                self.inner.poll_conversion_complete()
            }
            fn read_conversion(
                &mut self,
                out: &mut [u8; CHANNELS_PER_ADC],
            ) -> Result<(), PortError> {
                if self.inner.reads() == 2 {
                    return Err(PortError::Spi);
                }
                self.inner.read_conversion(out)
            }
        }

        let trace = Trace::new();
        let mut adc_a = FlakyAdc {
            inner: MockAdc::new(AdcId::A, &trace),
        };
        let mut adc_b = MockAdc::new(AdcId::B, &trace);
        let mut shreg = MockShift::new(&trace);
        let mut frame = MatFrame::new();

        let fault =
            scan_frame_blocking(&mut adc_a, &mut adc_b, &mut shreg, &test_config(), &mut frame)
                .unwrap_err();
        assert_eq!(fault.column, 2);
        assert_eq!(fault.error, ScanError::Port(PortError::Spi));
    }
}

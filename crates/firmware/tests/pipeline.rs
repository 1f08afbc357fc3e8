//! End-to-end pipeline test: event-driven acquisition feeding the shared
//! row queue on one side, a transmitter draining it on the other — the
//! same data path the two cores run on hardware, driven here by a tokio
//! task and a host thread.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::thread;

use hostlink::{transmit_delimiter, transmit_row, FrameDelimiter, VERIFICATION_SEQUENCE};
use matscan::mocks::{counting_pattern, MockAdc, MockShift, Trace, TraceEvent};
use matscan::{
    scan_frame_events, AdcId, ScanConfig, ScanError, ScanGate, COL_HEIGHT, MAT_SIZE, ROW_WIDTH,
};
use transport::{SharedRowQueue, QUEUE_DEPTH};

/// In-memory stand-in for the host UART TX half.
#[derive(Default)]
struct CaptureLink {
    bytes: Vec<u8>,
}

impl embedded_io::ErrorType for CaptureLink {
    type Error = core::convert::Infallible;
}

impl embedded_io::Write for CaptureLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[tokio::test]
async fn full_frame_flows_from_scan_to_host_stream() {
    let queue = Arc::new(SharedRowQueue::<QUEUE_DEPTH>::new());
    let trace = Trace::new();
    let mut adc_a = MockAdc::new(AdcId::A, &trace).with_fixed(counting_pattern(AdcId::A));
    let mut adc_b = MockAdc::new(AdcId::B, &trace).with_fixed(counting_pattern(AdcId::B));
    let mut shreg = MockShift::new(&trace);
    let gate = ScanGate::new();

    // Transmission side: pop one frame's worth of rows, then the sentinel.
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut link = CaptureLink::default();
            for _ in 0..COL_HEIGHT {
                let row = queue.pop_blocking(u32::MAX).unwrap();
                transmit_row(&mut link, &row).unwrap();
            }
            transmit_delimiter(&mut link, FrameDelimiter::Sentinel).unwrap();
            link.bytes
        })
    };

    // Acquisition side: event-driven scan pushing into the queue.
    let config = ScanConfig::rev2();
    scan_frame_events(&mut adc_a, &mut adc_b, &mut shreg, &config, &gate, |row| {
        queue
            .push_blocking(row, u32::MAX)
            .map_err(|_| ScanError::SinkFull)
    })
    .await
    .unwrap();

    let stream = consumer.join().unwrap();

    // Exactly one frame plus the delimiter, nothing lost, nothing reordered.
    assert_eq!(stream.len(), MAT_SIZE + VERIFICATION_SEQUENCE.len());
    for row in stream[..MAT_SIZE].chunks_exact(ROW_WIDTH) {
        for (i, &sample) in row.iter().enumerate() {
            assert_eq!(sample, i as u8);
        }
    }
    assert_eq!(&stream[MAT_SIZE..], &VERIFICATION_SEQUENCE);
    assert!(queue.is_empty());
    assert!(!gate.is_active());
    assert!(shreg.one_hot_ok());

    // The join invariant held across the cross-context handoff: no column
    // was re-armed before both of its responses were consumed.
    let events = trace.events();
    let reads = events
        .iter()
        .filter(|e| matches!(e, TraceEvent::ReadDone(_)))
        .count();
    assert_eq!(reads, 2 * COL_HEIGHT);
}

#[tokio::test]
async fn backpressure_from_a_stalled_transmitter_faults_the_scan() {
    // Tiny queue, no consumer: the producer must hit its spin budget and
    // surface backpressure instead of silently stalling.
    let queue = SharedRowQueue::<2>::new();
    let trace = Trace::new();
    let mut adc_a = MockAdc::new(AdcId::A, &trace);
    let mut adc_b = MockAdc::new(AdcId::B, &trace);
    let mut shreg = MockShift::new(&trace);
    let gate = ScanGate::new();

    let config = ScanConfig::rev2();
    let fault = scan_frame_events(&mut adc_a, &mut adc_b, &mut shreg, &config, &gate, |row| {
        queue
            .push_blocking(row, 1_000)
            .map_err(|_| ScanError::SinkFull)
    })
    .await
    .unwrap_err();

    assert_eq!(fault.error, ScanError::SinkFull);
    // The first two rows fit; the third hit backpressure.
    assert_eq!(fault.column, 2);
    assert!(!gate.is_active());
}

//! Scripted mock rig for host-side tests.
//!
//! Implements the [`AdcPort`]/[`AdcEvents`]/[`ColumnSelect`] seams without
//! hardware and records every request, read and shift into a shared
//! [`Trace`] so tests can assert event ordering — in particular the
//! dual-ADC join invariant.

// Test rig: counters and patterns, overflow not a concern.
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::cast_possible_truncation)]

use std::boxed::Box;
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use crate::adc::{AdcEvents, AdcPort};
use crate::config::AdcId;
use crate::error::PortError;
use crate::frame::{CHANNELS_PER_ADC, COL_HEIGHT};
use crate::shreg::ColumnSelect;

/// One recorded hardware interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A conversion request went out to this converter.
    Request(AdcId),
    /// This converter's response was read back and consumed.
    ReadDone(AdcId),
    /// The shift chain was clocked with this serial-in bit.
    Advance(bool),
    /// The shift chain was cleared.
    Clear,
}

/// Shared event log. Clones record into the same underlying buffer.
#[derive(Clone, Default)]
pub struct Trace(Rc<RefCell<Vec<TraceEvent>>>);

impl Trace {
    /// An empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: TraceEvent) {
        self.0.borrow_mut().push(event);
    }

    /// Snapshot of all events recorded so far, in order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.0.borrow().clone()
    }
}

type SampleFn = Box<dyn Fn(usize) -> [u8; CHANNELS_PER_ADC]>;

/// Scripted ADC: conversions complete instantly (or never, when configured
/// dead) and read back whatever the sample script says for that round.
pub struct MockAdc {
    id: AdcId,
    samples: SampleFn,
    trace: Trace,
    rounds: usize,
    reads: usize,
    in_flight: bool,
    dead_after: Option<usize>,
}

impl MockAdc {
    /// A converter that returns all-zero samples.
    pub fn new(id: AdcId, trace: &Trace) -> Self {
        Self {
            id,
            samples: Box::new(|_| [0u8; CHANNELS_PER_ADC]),
            trace: trace.clone(),
            rounds: 0,
            reads: 0,
            in_flight: false,
            dead_after: None,
        }
    }

    /// Script samples per conversion round (round 0 is the first column).
    #[must_use]
    pub fn with_samples(
        mut self,
        samples: impl Fn(usize) -> [u8; CHANNELS_PER_ADC] + 'static,
    ) -> Self {
        self.samples = Box::new(samples);
        self
    }

    /// Return the same samples on every round.
    #[must_use]
    pub fn with_fixed(self, samples: [u8; CHANNELS_PER_ADC]) -> Self {
        self.with_samples(move |_| samples)
    }

    /// EOC never falls — models dead or miswired hardware.
    #[must_use]
    pub fn dead(self) -> Self {
        self.dead_after(0)
    }

    /// EOC behaves for `rounds` conversion requests, then never falls again.
    #[must_use]
    pub fn dead_after(mut self, rounds: usize) -> Self {
        self.dead_after = Some(rounds);
        self
    }

    /// Conversion rounds completed (responses read back).
    pub fn reads(&self) -> usize {
        self.reads
    }

    fn conversion_ready(&self) -> bool {
        self.in_flight && self.dead_after.map_or(true, |alive| self.rounds <= alive)
    }
}

impl AdcPort for MockAdc {
    fn id(&self) -> AdcId {
        self.id
    }

    fn request_conversion(&mut self) -> Result<(), PortError> {
        self.trace.record(TraceEvent::Request(self.id));
        self.rounds += 1;
        self.in_flight = true;
        Ok(())
    }

    fn poll_conversion_complete(&mut self) -> Result<bool, PortError> {
        Ok(self.conversion_ready())
    }

    fn read_conversion(&mut self, out: &mut [u8; CHANNELS_PER_ADC]) -> Result<(), PortError> {
        if !self.conversion_ready() {
            // Reading with no finished conversion is a protocol violation;
            // surface it as a bus fault so the test fails loudly.
            return Err(PortError::Spi);
        }
        *out = (self.samples)(self.reads);
        self.trace.record(TraceEvent::ReadDone(self.id));
        self.reads += 1;
        self.in_flight = false;
        Ok(())
    }
}

impl AdcEvents for MockAdc {
    async fn eoc_falling_edge(&mut self) -> Result<(), PortError> {
        if self.conversion_ready() {
            return Ok(());
        }
        // No conversion will ever finish: park forever and let the
        // engine's timeout decide.
        core::future::pending::<Result<(), PortError>>().await
    }
}

/// Logical model of the column-select chain: tracks where the single 1 sits
/// and flags any state with two columns selected at once.
pub struct MockShift {
    bits: Vec<bool>,
    multi_hot_seen: bool,
    advances: usize,
    trace: Trace,
}

impl MockShift {
    /// A cleared chain.
    pub fn new(trace: &Trace) -> Self {
        Self {
            bits: Vec::from([false; COL_HEIGHT]),
            multi_hot_seen: false,
            advances: 0,
            trace: trace.clone(),
        }
    }

    /// Index of the selected column, or `None` when no column is selected.
    pub fn selected(&self) -> Option<usize> {
        self.bits.iter().position(|&b| b)
    }

    /// `true` if the at-most-one-hot invariant held for the whole run.
    pub fn one_hot_ok(&self) -> bool {
        !self.multi_hot_seen
    }

    /// Total clock pulses issued.
    pub fn advances(&self) -> usize {
        self.advances
    }
}

impl ColumnSelect for MockShift {
    fn clear(&mut self) -> Result<(), PortError> {
        self.trace.record(TraceEvent::Clear);
        self.bits.iter_mut().for_each(|b| *b = false);
        Ok(())
    }

    fn advance(&mut self, bit: bool) -> Result<(), PortError> {
        self.trace.record(TraceEvent::Advance(bit));
        self.bits.insert(0, bit);
        self.bits.truncate(COL_HEIGHT);
        if self.bits.iter().filter(|&&b| b).count() > 1 {
            self.multi_hot_seen = true;
        }
        self.advances += 1;
        Ok(())
    }
}

/// Sample pattern used across the engine tests: ADC A counts `0x00..=0x0D`,
/// ADC B counts `0x0E..=0x1B`, so a joined row is `0x00..=0x1B`.
pub fn counting_pattern(id: AdcId) -> [u8; CHANNELS_PER_ADC] {
    let base: u8 = match id {
        AdcId::A => 0x00,
        AdcId::B => CHANNELS_PER_ADC as u8,
    };
    let mut samples = [0u8; CHANNELS_PER_ADC];
    for (i, s) in samples.iter_mut().enumerate() {
        *s = base + i as u8;
    }
    samples
}

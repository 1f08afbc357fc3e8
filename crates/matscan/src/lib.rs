//! Mat-scan core for the pressure mat interface board.
//!
//! This crate owns the hard real-time part of the firmware: sweeping the
//! resistive sensor grid one column at a time through a shift-register chain
//! while two MAX11643-class ADCs convert the 28 row lines in parallel, and
//! assembling the results into full pressure frames.
//!
//! # Architecture Layers
//!
//! ```text
//! Application (firmware crate: session loop, core handoff)
//!         ↓
//! Scan engine (this crate: engine module — blocking + event-driven)
//!         ↓
//! Channel drivers (this crate: adc + shreg modules, trait seams)
//!         ↓
//! Hardware (embedded-hal impls: Embassy HAL on target, mocks on the host)
//! ```
//!
//! # Concurrency designs
//!
//! Two scan designs coexist, selected by the caller:
//!
//! - [`engine::scan_frame_blocking`] — one execution context does
//!   shift → trigger → spin-on-EOC → read for every column. "Blocking"
//!   means a bounded busy-wait on the EOC line, never an unbounded hang.
//! - [`engine::scan_frame_events`] + [`engine::ScanCursor`] — conversion
//!   completions arrive as falling-edge events; the cursor joins the two
//!   ADCs per column and only then releases the next request pair. Rows are
//!   handed to a caller-supplied sink (frame buffer or inter-core queue).
//!
//! Both designs produce bit-identical frames for identical chip responses.
//!
//! # Features
//!
//! - `std`: expose the scripted mock rig for downstream test suites
//! - `defmt`: enable defmt::Format derives on public types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![allow(async_fn_in_trait)] // single-executor no_std: Send bounds not needed

#[cfg(feature = "std")]
extern crate std;

pub mod adc;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod shreg;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

pub use adc::{AdcChannel, AdcEvents, AdcPort};
pub use config::{AdcId, ClearPolarity, ReferenceMode, ScanConfig};
pub use engine::{scan_frame_blocking, scan_frame_events, EocOutcome, ScanCursor, ScanGate, ScanState};
pub use error::{PortError, ScanError, ScanFault};
pub use frame::{MatFrame, Row, ADC_RESPONSE_LENGTH, CHANNELS_PER_ADC, COL_HEIGHT, MAT_SIZE, ROW_WIDTH};
pub use shreg::{ColumnSelect, ShiftRegister};

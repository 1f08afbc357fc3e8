//! Pressure mat interface firmware.
//!
//! The host-testable part of the application: the session/command loop that
//! glues the scan engine, inter-core transport and host link together. The
//! RP2040 entry point, pin map and core-1 bring-up live behind the
//! `hardware` feature (see `src/main.rs` and [`board`]).

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

#[cfg(feature = "std")]
extern crate std;

pub mod session;

#[cfg(feature = "hardware")]
pub mod board;

/// Firmware identification reported on `print_info`.
pub const FIRMWARE_INFO: &str = concat!(
    "PressureMat interface board, firmware v",
    env!("CARGO_PKG_VERSION"),
    "\n"
);

//! Host serial protocol for the pressure mat.
//!
//! One side of the link carries newline-terminated ASCII commands from the
//! host ([`command`]); the other carries raw frame bytes back
//! ([`transmitter`]). Framing is a configuration choice shared by producer
//! and consumer through [`LinkConfig`].

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod command;
pub mod transmitter;

pub use command::{parse_line, Command};
pub use transmitter::{
    transmit_delimiter, transmit_frame, transmit_row, FrameDelimiter, LinkConfig,
    VERIFICATION_SEQUENCE,
};

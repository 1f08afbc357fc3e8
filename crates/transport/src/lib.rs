//! Inter-core transport for the pressure mat firmware.
//!
//! Two pieces, both pure enough to test on the host:
//!
//! - [`queue`] — a bounded FIFO carrying one mat row at a time from the
//!   acquisition core to the transmission core, by value (copy-on-handoff,
//!   never a shared mutable reference).
//! - [`mailbox`] — the one-time core-launch handshake: boot words pushed
//!   through a two-word hardware mailbox, each re-sent until correctly
//!   echoed back.

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

pub mod mailbox;
pub mod queue;

pub use mailbox::{boot_sequence, CoreLaunch, HandshakeError, Mailbox};
pub use queue::{QueueError, RowQueue, SharedRowQueue, QUEUE_DEPTH};

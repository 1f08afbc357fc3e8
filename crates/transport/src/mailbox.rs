//! Core-launch handshake over the two-word hardware mailbox.
//!
//! The second core boots parked in ROM, listening on its side of the SIO
//! FIFO. To launch it, the first core pushes a fixed word sequence — sync
//! zeros, the vector table address, the new stack pointer, the entry point —
//! and the parked core echoes every word it accepts. A word that comes back
//! wrong is simply sent again: retry-until-acknowledged, not
//! fire-and-forget.
//!
//! The protocol lives here as an explicit state machine over a [`Mailbox`]
//! trait so it can be unit-tested with a scripted mailbox; the firmware
//! crate provides the SIO-backed implementation.

use core::fmt;

/// Two-word hardware FIFO between the cores, as seen from the launcher.
pub trait Mailbox {
    /// Push `word` towards the other core. `false` if the FIFO is full.
    fn try_write(&mut self, word: u32) -> bool;

    /// Pop the next word the other core sent back, if any.
    fn try_read(&mut self) -> Option<u32>;

    /// Discard everything the other core has sent so far.
    fn drain(&mut self) {
        while self.try_read().is_some() {}
    }
}

/// Per-word resend budget before the launch is declared failed.
pub const LAUNCH_RETRY_LIMIT: u32 = 16;

/// Launch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeError {
    /// The same word came back wrong [`LAUNCH_RETRY_LIMIT`] times.
    RetriesExhausted {
        /// Position in the boot sequence that kept failing.
        index: usize,
    },
    /// The FIFO never accepted a write, or never produced an echo, within
    /// the spin budget — the other core is not responding at all.
    MailboxDead {
        /// Position in the boot sequence where the FIFO went silent.
        index: usize,
    },
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted { index } => {
                write!(f, "boot word {index} was never echoed correctly")
            }
            Self::MailboxDead { index } => {
                write!(f, "mailbox stopped responding at boot word {index}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HandshakeError {}

/// Build the boot word sequence for the parked core.
///
/// Layout fixed by the boot ROM: two sync zeros, a wake marker, then the
/// vector table, stack pointer and entry point the new core starts with.
#[must_use]
pub const fn boot_sequence(vector_table: u32, stack_pointer: u32, entry: u32) -> [u32; 6] {
    [0, 0, 1, vector_table, stack_pointer, entry]
}

/// The launch state machine: one cursor over the boot sequence.
///
/// Separate from any business logic so a scripted mailbox can drive every
/// path: clean echo, corrupt echo, dead peer.
pub struct CoreLaunch<'a> {
    sequence: &'a [u32],
    index: usize,
    retries: u32,
}

impl<'a> CoreLaunch<'a> {
    /// A launch poised at the first word of `sequence`.
    pub fn new(sequence: &'a [u32]) -> Self {
        Self {
            sequence,
            index: 0,
            retries: 0,
        }
    }

    /// `true` once every word has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.index >= self.sequence.len()
    }

    /// Position of the word currently being negotiated.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Drive the handshake to completion.
    ///
    /// For each word: drain stale echoes when (re)synchronising on a zero
    /// word, send, await the echo, advance on a match, re-send on a
    /// mismatch. Every FIFO wait is bounded by `spin_limit` iterations.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::MailboxDead`] when the FIFO stops moving,
    /// [`HandshakeError::RetriesExhausted`] when a word keeps echoing wrong.
    pub fn run<M: Mailbox>(
        &mut self,
        mailbox: &mut M,
        spin_limit: u32,
    ) -> Result<(), HandshakeError> {
        while let Some(&word) = self.sequence.get(self.index) {
            // Zero words resynchronise the protocol: the parked core
            // flushes its state, so stale echoes must be flushed here too.
            if word == 0 {
                mailbox.drain();
            }

            Self::spin(spin_limit, || mailbox.try_write(word))
                .ok_or(HandshakeError::MailboxDead { index: self.index })?;

            let mut echo = None;
            Self::spin(spin_limit, || {
                echo = mailbox.try_read();
                echo.is_some()
            })
            .ok_or(HandshakeError::MailboxDead { index: self.index })?;

            if echo == Some(word) {
                self.index = self.index.saturating_add(1);
                self.retries = 0;
            } else {
                self.retries = self.retries.saturating_add(1);
                if self.retries >= LAUNCH_RETRY_LIMIT {
                    return Err(HandshakeError::RetriesExhausted { index: self.index });
                }
            }
        }
        Ok(())
    }

    fn spin(spin_limit: u32, mut ready: impl FnMut() -> bool) -> Option<()> {
        let mut spins: u32 = 0;
        loop {
            if ready() {
                return Some(());
            }
            spins = spins.saturating_add(1);
            if spins >= spin_limit {
                return None;
            }
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Scripted peer: echoes writes according to a per-write script.
    struct MockMailbox {
        /// For write `n`, how the peer responds.
        script: Vec<Echo>,
        echoes: VecDeque<u32>,
        writes: Vec<u32>,
        drains: usize,
    }

    #[derive(Clone, Copy)]
    enum Echo {
        /// Echo the word back unchanged.
        Clean,
        /// Echo the word with flipped bits.
        Corrupt,
        /// Swallow the word; nothing comes back.
        Silent,
    }

    impl MockMailbox {
        fn new(script: Vec<Echo>) -> Self {
            Self {
                script,
                echoes: VecDeque::new(),
                writes: Vec::new(),
                drains: 0,
            }
        }

        fn clean() -> Self {
            Self::new(Vec::new())
        }
    }

    impl Mailbox for MockMailbox {
        fn try_write(&mut self, word: u32) -> bool {
            let behaviour = self
                .script
                .get(self.writes.len())
                .copied()
                .unwrap_or(Echo::Clean);
            self.writes.push(word);
            match behaviour {
                Echo::Clean => self.echoes.push_back(word),
                Echo::Corrupt => self.echoes.push_back(!word),
                Echo::Silent => {}
            }
            true
        }

        fn try_read(&mut self) -> Option<u32> {
            self.echoes.pop_front()
        }

        fn drain(&mut self) {
            self.drains += 1;
            self.echoes.clear();
        }
    }

    const SEQUENCE: [u32; 6] = boot_sequence(0x1000_0100, 0x2004_0800, 0x1000_0201);

    #[test]
    fn test_boot_sequence_layout() {
        assert_eq!(
            SEQUENCE,
            [0, 0, 1, 0x1000_0100, 0x2004_0800, 0x1000_0201]
        );
    }

    #[test]
    fn test_clean_handshake_sends_each_word_once() {
        let mut mailbox = MockMailbox::clean();
        let mut launch = CoreLaunch::new(&SEQUENCE);
        launch.run(&mut mailbox, 16).unwrap();

        assert!(launch.is_complete());
        assert_eq!(mailbox.writes, SEQUENCE);
        // Both sync zeros resynchronise the FIFO.
        assert_eq!(mailbox.drains, 2);
    }

    #[test]
    fn test_corrupt_echo_is_resent_until_acknowledged() {
        // Writes 3 and 4 (the wake marker and the vector table's first try)
        // come back corrupted.
        let script = vec![
            Echo::Clean,
            Echo::Clean,
            Echo::Corrupt,
            Echo::Corrupt,
            Echo::Clean,
        ];
        let mut mailbox = MockMailbox::new(script);
        let mut launch = CoreLaunch::new(&SEQUENCE);
        launch.run(&mut mailbox, 16).unwrap();

        assert!(launch.is_complete());
        // The wake marker was sent three times: twice corrupted, once clean.
        assert_eq!(
            mailbox.writes,
            [0, 0, 1, 1, 1, 0x1000_0100, 0x2004_0800, 0x1000_0201]
        );
    }

    #[test]
    fn test_persistently_corrupt_word_exhausts_retries() {
        let script = vec![Echo::Clean, Echo::Clean]
            .into_iter()
            .chain(std::iter::repeat(Echo::Corrupt))
            .take(64)
            .collect();
        let mut mailbox = MockMailbox::new(script);
        let mut launch = CoreLaunch::new(&SEQUENCE);

        assert_eq!(
            launch.run(&mut mailbox, 16),
            Err(HandshakeError::RetriesExhausted { index: 2 })
        );
        assert!(!launch.is_complete());
    }

    #[test]
    fn test_silent_peer_is_a_dead_mailbox() {
        let script = vec![Echo::Clean, Echo::Clean, Echo::Silent];
        let mut mailbox = MockMailbox::new(script);
        let mut launch = CoreLaunch::new(&SEQUENCE);

        assert_eq!(
            launch.run(&mut mailbox, 16),
            Err(HandshakeError::MailboxDead { index: 2 })
        );
    }

    #[test]
    fn test_full_fifo_is_a_dead_mailbox() {
        struct FullFifo;
        impl Mailbox for FullFifo {
            fn try_write(&mut self, _word: u32) -> bool {
                false
            }
            fn try_read(&mut self) -> Option<u32> {
                None
            }
        }

        let mut launch = CoreLaunch::new(&SEQUENCE);
        assert_eq!(
            launch.run(&mut FullFifo, 16),
            Err(HandshakeError::MailboxDead { index: 0 })
        );
    }
}

//! Bounded row FIFO between the acquisition and transmission cores.
//!
//! Rows travel **by value**: a push copies the 28 bytes into the queue's
//! own storage, so the producer can never overwrite a row the consumer is
//! still transmitting.
//!
//! [`RowQueue`] itself is a plain single-producer/single-consumer ring with
//! no interior locking — it is not safe to touch from two execution
//! contexts. [`SharedRowQueue`] wraps it in a `critical-section` mutex and
//! adds the blocking push/pop the pipeline uses, with every wait bounded by
//! a spin budget so an absent peer becomes an observable error instead of a
//! silent stall.

use core::cell::RefCell;

use critical_section::Mutex;
use matscan::Row;

/// Queue capacity in rows: at least two full frames (2 × 56), so the
/// producer can start the next frame while the previous one transmits.
pub const QUEUE_DEPTH: usize = 128;

/// Errors surfaced by queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// `try_push` found the queue full.
    Full,
    /// A blocking push exhausted its spin budget — the consumer is not
    /// draining. Backpressure made visible.
    Backpressure,
    /// A blocking pop exhausted its spin budget — the producer has stopped
    /// supplying rows.
    Starved,
}

impl core::fmt::Display for QueueError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "row queue is full"),
            Self::Backpressure => write!(f, "row queue not drained within the spin budget"),
            Self::Starved => write!(f, "no row arrived within the spin budget"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for QueueError {}

/// Fixed-capacity ring of rows. Single context only; see
/// [`SharedRowQueue`] for the cross-core wrapper.
pub struct RowQueue<const N: usize> {
    buf: [Row; N],
    /// Index of the next slot to read from.
    read: usize,
    /// Index of the next slot to write to.
    write: usize,
    /// Number of rows currently held.
    count: usize,
}

impl<const N: usize> RowQueue<N> {
    /// Create a new, empty queue.
    ///
    /// `const` so queues can live in `static` storage without a runtime
    /// initialiser.
    pub const fn new() -> Self {
        Self {
            buf: [[0u8; matscan::ROW_WIDTH]; N],
            read: 0,
            write: 0,
            count: 0,
        }
    }

    /// Copy `row` into the queue.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] if no slot is free; the queue is unchanged.
    #[allow(clippy::indexing_slicing)] // write < N invariant
    #[allow(clippy::arithmetic_side_effects)] // wrap via % N; count < N checked above
    pub fn try_push(&mut self, row: &Row) -> Result<(), QueueError> {
        if self.count == N {
            return Err(QueueError::Full);
        }
        self.buf[self.write] = *row;
        self.write = (self.write + 1) % N;
        self.count += 1;
        Ok(())
    }

    /// Take the oldest row, or `None` when empty.
    #[allow(clippy::indexing_slicing)] // read < N invariant
    #[allow(clippy::arithmetic_side_effects)] // wrap via % N; count > 0 checked above
    pub fn try_pop(&mut self) -> Option<Row> {
        if self.count == 0 {
            return None;
        }
        let row = self.buf[self.read];
        self.read = (self.read + 1) % N;
        self.count -= 1;
        Some(row)
    }

    /// Rows currently queued.
    pub fn len(&self) -> usize {
        self.count
    }

    /// `true` when no rows are queued.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `true` when every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.count == N
    }

    /// Maximum number of rows the queue can hold.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for RowQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-core row queue: [`RowQueue`] under a `critical-section` mutex.
///
/// Each operation holds the critical section only for the 28-byte copy, so
/// the acquisition core's interrupt latency stays bounded.
pub struct SharedRowQueue<const N: usize> {
    inner: Mutex<RefCell<RowQueue<N>>>,
}

impl<const N: usize> SharedRowQueue<N> {
    /// Create a new, empty queue, usable as a `static` initialiser.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(RowQueue::new())),
        }
    }

    /// Copy `row` in if a slot is free.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] if no slot is free.
    pub fn try_push(&self, row: &Row) -> Result<(), QueueError> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).try_push(row))
    }

    /// Take the oldest row, or `None` when empty.
    pub fn try_pop(&self) -> Option<Row> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).try_pop())
    }

    /// Rows currently queued.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len())
    }

    /// `true` when no rows are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push, spinning until a slot frees up.
    ///
    /// # Errors
    ///
    /// [`QueueError::Backpressure`] once `spin_limit` retries pass with the
    /// queue still full.
    pub fn push_blocking(&self, row: &Row, spin_limit: u32) -> Result<(), QueueError> {
        let mut spins: u32 = 0;
        loop {
            match self.try_push(row) {
                Ok(()) => return Ok(()),
                Err(_) => {
                    spins = spins.saturating_add(1);
                    if spins >= spin_limit {
                        return Err(QueueError::Backpressure);
                    }
                    core::hint::spin_loop();
                }
            }
        }
    }

    /// Pop, spinning until a row arrives.
    ///
    /// # Errors
    ///
    /// [`QueueError::Starved`] once `spin_limit` retries pass with the
    /// queue still empty.
    pub fn pop_blocking(&self, spin_limit: u32) -> Result<Row, QueueError> {
        let mut spins: u32 = 0;
        loop {
            if let Some(row) = self.try_pop() {
                return Ok(row);
            }
            spins = spins.saturating_add(1);
            if spins >= spin_limit {
                return Err(QueueError::Starved);
            }
            core::hint::spin_loop();
        }
    }
}

impl<const N: usize> Default for SharedRowQueue<N> {
    fn default() -> Self {
        Self::new()
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
    use matscan::{COL_HEIGHT, ROW_WIDTH};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use std::vec::Vec;

    fn row_tagged(tag: u8) -> Row {
        let mut row = [0u8; ROW_WIDTH];
        row[0] = tag;
        row[ROW_WIDTH - 1] = tag;
        row
    }

    #[test]
    fn test_fifo_order_over_one_frame() {
        let mut queue: RowQueue<QUEUE_DEPTH> = RowQueue::new();
        for i in 0..COL_HEIGHT {
            queue.try_push(&row_tagged(i as u8)).unwrap();
        }
        assert_eq!(queue.len(), COL_HEIGHT);
        for i in 0..COL_HEIGHT {
            assert_eq!(queue.try_pop(), Some(row_tagged(i as u8)));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity_covers_two_frames() {
        let queue: RowQueue<QUEUE_DEPTH> = RowQueue::new();
        assert!(queue.capacity() >= 2 * COL_HEIGHT);
    }

    #[test]
    fn test_push_to_full_fails_without_losing_rows() {
        let mut queue: RowQueue<4> = RowQueue::new();
        for i in 0..4 {
            queue.try_push(&row_tagged(i)).unwrap();
        }
        assert_eq!(queue.try_push(&row_tagged(9)), Err(QueueError::Full));
        // The rejected push altered nothing.
        for i in 0..4 {
            assert_eq!(queue.try_pop(), Some(row_tagged(i)));
        }
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let mut queue: RowQueue<4> = RowQueue::new();
        for round in 0..10u8 {
            queue.try_push(&row_tagged(round)).unwrap();
            assert_eq!(queue.try_pop(), Some(row_tagged(round)));
        }
    }

    #[test]
    fn test_shared_queue_is_static_initialisable() {
        static QUEUE: SharedRowQueue<QUEUE_DEPTH> = SharedRowQueue::new();
        QUEUE.try_push(&row_tagged(1)).unwrap();
        assert_eq!(QUEUE.try_pop(), Some(row_tagged(1)));
    }

    #[test]
    fn test_blocking_push_waits_for_consumer() {
        let queue = Arc::new(SharedRowQueue::<4>::new());
        for i in 0..4 {
            queue.try_push(&row_tagged(i)).unwrap();
        }

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.pop_blocking(u32::MAX).unwrap()
            })
        };

        // Queue is full: this only succeeds because the consumer drains one
        // row while we spin.
        queue.push_blocking(&row_tagged(42), u32::MAX).unwrap();
        assert_eq!(consumer.join().unwrap(), row_tagged(0));

        let drained: Vec<Row> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained.len(), 4);
        assert_eq!(drained.last(), Some(&row_tagged(42)));
    }

    #[test]
    fn test_blocking_push_reports_backpressure() {
        let queue = SharedRowQueue::<2>::new();
        queue.try_push(&row_tagged(0)).unwrap();
        queue.try_push(&row_tagged(1)).unwrap();
        assert_eq!(
            queue.push_blocking(&row_tagged(2), 1_000),
            Err(QueueError::Backpressure)
        );
    }

    #[test]
    fn test_blocking_pop_reports_starvation() {
        let queue = SharedRowQueue::<2>::new();
        assert_eq!(queue.pop_blocking(1_000), Err(QueueError::Starved));
    }

    #[test]
    fn test_producer_consumer_threads_preserve_order() {
        let queue = Arc::new(SharedRowQueue::<QUEUE_DEPTH>::new());
        let total = 3 * COL_HEIGHT;

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..total {
                    queue.push_blocking(&row_tagged(i as u8), u32::MAX).unwrap();
                }
            })
        };

        let mut received = Vec::new();
        for _ in 0..total {
            received.push(queue.pop_blocking(u32::MAX).unwrap());
        }
        producer.join().unwrap();

        for (i, row) in received.iter().enumerate() {
            assert_eq!(row, &row_tagged(i as u8));
        }
    }
}

//! # Bounded FIFO admission queue.
//!
//! Requests that find every slot busy wait here. Each waiter holds the sending
//! half of a oneshot channel; a released slot is *handed over* to the oldest
//! waiter whose receiver is still alive.
//!
//! ```text
//!   push(ticket) ──► [ w1 | w2 | w3 ]  (capacity N)
//!                      ▲
//!   hand_over(slot) ───┘ oldest live waiter wins; dead receivers are skipped
//!   remove(ticket)       cancelled waiter leaves without being served
//! ```
//!
//! ## Rules
//! - `try_push` never grows the queue beyond `capacity`
//! - FIFO order: no waiter is served before an older live waiter
//! - A waiter whose receiver was dropped never consumes a slot

use std::collections::VecDeque;

use tokio::sync::oneshot;

struct Waiter<T> {
    ticket: u64,
    tx: oneshot::Sender<T>,
}

/// FIFO of requests waiting for a free slot.
pub(crate) struct AdmissionQueue<T> {
    waiters: VecDeque<Waiter<T>>,
    capacity: usize,
}

impl<T> AdmissionQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            waiters: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueues a waiter, giving the sender back when the queue is full.
    pub(crate) fn try_push(
        &mut self,
        ticket: u64,
        tx: oneshot::Sender<T>,
    ) -> Result<(), oneshot::Sender<T>> {
        if self.waiters.len() >= self.capacity {
            return Err(tx);
        }
        self.waiters.push_back(Waiter { ticket, tx });
        Ok(())
    }

    /// Removes a waiter by ticket. Returns `false` if it was already served.
    pub(crate) fn remove(&mut self, ticket: u64) -> bool {
        match self.waiters.iter().position(|w| w.ticket == ticket) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Gives `item` to the oldest live waiter, or returns it if nobody takes it.
    pub(crate) fn hand_over(&mut self, mut item: T) -> Option<T> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(item) {
                Ok(()) => return None,
                Err(back) => item = back,
            }
        }
        Some(item)
    }

    /// Empties the queue. Dropping the returned senders wakes every waiter.
    pub(crate) fn drain(&mut self) -> Vec<oneshot::Sender<T>> {
        self.waiters.drain(..).map(|w| w.tx).collect()
    }
}

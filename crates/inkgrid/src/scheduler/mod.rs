//! Cooperative scheduling of live analysis.
//!
//! All computation runs on the interactive execution context. Long work is
//! split into batches drained from a [`WorkQueue`]; between batches the
//! computation yields with [`Scheduler::tick`] so input handling is never
//! blocked end to end.
//!
//! Cancellation works by obsolescence. Every new selection advances a
//! monotonically increasing generation counter and receives a [`Ticket`].
//! A computation whose ticket is no longer current stops at the next batch
//! boundary, and its result is refused at publish time. Nothing is
//! interrupted mid-batch, so wasted work is bounded by one batch.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Proof of which selection a computation belongs to.
#[derive(Debug, Clone)]
pub struct Ticket {
    generation: Option<u64>,
    counter: Arc<AtomicU64>,
}

impl Ticket {
    /// A ticket outside any selection, never superseded.
    pub fn detached() -> Self {
        Self {
            generation: None,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// False once a newer selection has begun.
    pub fn is_current(&self) -> bool {
        match self.generation {
            Some(generation) => self.counter.load(Ordering::Acquire) == generation,
            None => true,
        }
    }
}

/// A result published for the current selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Published<T> {
    pub generation: u64,
    pub value: T,
}

/// Generation counter plus the channel observers read current results from.
pub struct Scheduler<T> {
    counter: Arc<AtomicU64>,
    batch_size: usize,
    sender: watch::Sender<Option<Published<T>>>,
}

impl<T> Scheduler<T> {
    pub fn new(batch_size: usize) -> Self {
        let (sender, _receiver) = watch::channel(None);
        Self {
            counter: Arc::new(AtomicU64::new(0)),
            batch_size: batch_size.max(1),
            sender,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Current generation; 0 before the first selection.
    pub fn generation(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Start a new selection, superseding every outstanding ticket.
    pub fn begin(&self) -> Ticket {
        let generation = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        Ticket {
            generation: Some(generation),
            counter: Arc::clone(&self.counter),
        }
    }

    /// Publish `value` if `ticket` is still current.
    ///
    /// Returns `false`, dropping the value, when the ticket has been superseded.
    pub fn publish(&self, ticket: &Ticket, value: T) -> bool {
        let Some(generation) = ticket.generation.filter(|_| ticket.is_current()) else {
            tracing::debug!(
                "Discarding stale result of generation {:?} (current {})",
                ticket.generation,
                self.generation()
            );
            return false;
        };

        self.sender.send_replace(Some(Published { generation, value }));
        true
    }

    /// Observe published results.
    pub fn subscribe(&self) -> watch::Receiver<Option<Published<T>>> {
        self.sender.subscribe()
    }

    /// Queue `items` for batched processing.
    pub fn queue<I>(&self, items: I) -> WorkQueue<I::Item>
    where
        I: IntoIterator,
    {
        WorkQueue::new(items, self.batch_size)
    }

    /// Yield control back to the host before the next batch.
    pub async fn tick(&self) {
        tokio::task::yield_now().await;
    }
}

/// Bounded FIFO of pending work drained in fixed-size batches.
#[derive(Debug, Clone)]
pub struct WorkQueue<T> {
    pending: VecDeque<T>,
    batch_size: usize,
}

impl<T> WorkQueue<T> {
    pub fn new<I>(items: I, batch_size: usize) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Self {
            pending: items.into_iter().collect(),
            batch_size: batch_size.max(1),
        }
    }

    /// Remove and return the next batch, in queue order.
    pub fn next_batch(&mut self) -> Option<Vec<T>> {
        if self.pending.is_empty() {
            return None;
        }
        let take = self.batch_size.min(self.pending.len());
        Some(self.pending.drain(..take).collect())
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

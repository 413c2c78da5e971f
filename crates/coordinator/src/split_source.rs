//! Batch hand-out of finished splits to the engine's scheduler threads.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::split::CoverageSplit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSourceState {
    /// Nothing handed out yet.
    Unconsumed,
    Draining,
    /// Every split has been handed out. Terminal.
    Exhausted,
}

#[derive(Debug)]
pub struct SplitBatch<S = CoverageSplit> {
    pub splits: Vec<S>,
    /// Set once the source holds nothing more, including on the batch that
    /// carried the last splits.
    pub no_more_splits: bool,
}

/// Queue of splits drained in batches, each split delivered exactly once.
///
/// The pending queue is the only mutable state and sits behind a mutex, so
/// concurrent `next_batch` callers never receive the same split. Dropping the
/// source abandons whatever was not claimed.
#[derive(Debug)]
pub struct SplitSource<S = CoverageSplit> {
    pending: Mutex<VecDeque<S>>,
    total: usize,
}

impl<S> SplitSource<S> {
    /// Keeps the given order.
    pub fn new(splits: Vec<S>) -> Self {
        Self {
            total: splits.len(),
            pending: Mutex::new(splits.into()),
        }
    }

    /// Shuffles once with `rng` so the first ring nodes are not always
    /// scanned first.
    pub fn shuffled<R: Rng + ?Sized>(mut splits: Vec<S>, rng: &mut R) -> Self {
        splits.shuffle(rng);
        Self::new(splits)
    }

    /// Claims up to `max_size` splits. A zero `max_size` claims nothing.
    pub fn next_batch(&self, max_size: usize) -> SplitBatch<S> {
        let mut pending = self.lock();
        let take = max_size.min(pending.len());
        let splits: Vec<S> = pending.drain(..take).collect();
        SplitBatch {
            splits,
            no_more_splits: pending.is_empty(),
        }
    }

    pub fn state(&self) -> SplitSourceState {
        let remaining = self.remaining();
        if remaining == 0 {
            SplitSourceState::Exhausted
        } else if remaining == self.total {
            SplitSourceState::Unconsumed
        } else {
            SplitSourceState::Draining
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state() == SplitSourceState::Exhausted
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<S>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

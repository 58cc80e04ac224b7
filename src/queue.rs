// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The work queue between the dispatcher and the worker pool.
//!
//! A multi-producer multi-consumer crossbeam channel carries the items;
//! it is the only synchronisation point in the engine.  Workers block on
//! it with a timeout.  The dispatcher never blocks: it drains whatever
//! is still queued, then refills with the new generation.  Items that a
//! worker already holds are not affected by a drain.
//!
//! The queue also counts outstanding work (queued plus claimed) so that
//! a caller can tell when the current view has settled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::partition::WorkItem;

/// Concurrent FIFO of work items.
#[derive(Debug)]
pub struct WorkQueue {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    outstanding: AtomicUsize,
}

/// An item a worker has taken off the queue.  Dropping it marks the work
/// as finished, even if the worker unwound while computing it.
#[derive(Debug)]
pub struct Claim<'a> {
    /// The claimed item.
    pub item: WorkItem,
    queue: &'a WorkQueue,
}

impl<'a> Drop for Claim<'a> {
    fn drop(&mut self) {
        self.queue.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        WorkQueue::new()
    }
}

impl WorkQueue {
    /// An empty queue.
    pub fn new() -> WorkQueue {
        let (sender, receiver) = unbounded();
        WorkQueue {
            sender,
            receiver,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Items waiting to be claimed.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True when nothing is waiting to be claimed.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// True when nothing is queued and no claimed item is still running.
    pub fn is_settled(&self) -> bool {
        self.outstanding.load(Ordering::Acquire) == 0
    }

    /// Removes every queued item without waiting.  Returns how many were
    /// removed.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while self.receiver.try_recv().is_ok() {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            drained += 1;
        }
        drained
    }

    /// Starts a new generation: drains the stale items, then enqueues
    /// the new ones in order.  Returns how many stale items were dropped.
    pub fn replace<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = WorkItem>,
    {
        let drained = self.drain();
        for item in items {
            self.outstanding.fetch_add(1, Ordering::AcqRel);
            // We hold a receiver, so the channel cannot be disconnected.
            let _ = self.sender.send(item);
        }
        drained
    }

    /// Waits up to `timeout` for an item.  `None` means the queue stayed
    /// empty; that is an idle worker, not an error.
    pub fn pop(&self, timeout: Duration) -> Option<Claim<'_>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Some(Claim { item, queue: self }),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A fixed set of worker threads feeding on the work queue.
//!
//! Workers are stateless: take an item, render its band into the shared
//! buffer, repeat.  They never talk to each other and carry no
//! generation number, so an item claimed just before a viewport change
//! still finishes and writes its rows.  Shutdown is cooperative: a flag
//! checked each time a dequeue times out or an item completes, so an
//! idle worker notices within one timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::buffer::PixelBuffer;
use crate::errors::{Result, TilebrotError};
use crate::kernel::render_band;
use crate::queue::WorkQueue;

/// Owns the worker threads.  Dropping the pool shuts it down.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `workers` threads.  If any spawn fails the threads already
    /// started are stopped before the error is returned.
    pub fn start(
        workers: usize,
        queue: Arc<WorkQueue>,
        buffer: Arc<PixelBuffer>,
        timeout: Duration,
    ) -> Result<WorkerPool> {
        let mut pool = WorkerPool {
            handles: Vec::with_capacity(workers),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        for id in 0..workers {
            let name = format!("tilebrot-worker-{}", id);
            let queue = Arc::clone(&queue);
            let buffer = Arc::clone(&buffer);
            let shutdown = Arc::clone(&pool.shutdown);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || work(id, &queue, &buffer, &shutdown, timeout))
                .map_err(|cause| TilebrotError::Spawn { name, cause })?;
            pool.handles.push(handle);
        }
        info!("started {} workers", workers);
        Ok(pool)
    }

    /// Number of threads the pool started.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when the pool has no threads.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Raises the shutdown flag without waiting.  Workers finish the item
    /// they hold, if any, then exit.
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Raises the shutdown flag and waits for every worker to exit.
    pub fn shutdown(&mut self) {
        self.signal_shutdown();
        let mut crashed = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                crashed += 1;
            }
        }
        if crashed > 0 {
            warn!("{} workers had panicked before shutdown", crashed);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.shutdown();
            info!("worker pool stopped");
        }
    }
}

fn work(
    id: usize,
    queue: &WorkQueue,
    buffer: &PixelBuffer,
    shutdown: &AtomicBool,
    timeout: Duration,
) {
    while !shutdown.load(Ordering::Acquire) {
        if let Some(claim) = queue.pop(timeout) {
            let band = claim.item.band;
            trace!(
                "worker {} rendering rows {}..{}",
                id,
                band.row_offset,
                band.row_offset + band.row_count
            );
            render_band(&claim.item, buffer);
        }
    }
    debug!("worker {} exiting", id);
}

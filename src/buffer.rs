// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The shared pixel buffer: one `i32` per raster pixel, addressed
//! `x + y * width`, allocated once and never resized.
//!
//! Cells are `AtomicI32` accessed with `Relaxed` ordering.  There is no
//! lock: within a generation bands cover disjoint rows, and a straggler
//! from an older generation may overwrite a row the current generation
//! already wrote.  Atomic cells make that overlap well-defined without
//! costing anything on the platforms we care about.  Readers take a
//! snapshot whenever they like and may see rows from different
//! generations.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::errors::{Result, TilebrotError};
use crate::planes::Raster;

/// Fixed-size shared array of pixel values.
#[derive(Debug)]
pub struct PixelBuffer {
    raster: Raster,
    cells: Vec<AtomicI32>,
}

impl PixelBuffer {
    /// Allocates a zeroed buffer for the raster.
    pub fn new(raster: Raster) -> PixelBuffer {
        let cells = (0..raster.len()).map(|_| AtomicI32::new(0)).collect();
        PixelBuffer { raster, cells }
    }

    /// The raster this buffer was sized for.
    pub fn raster(&self) -> Raster {
        self.raster
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when the buffer has no pixels.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Reads one pixel.
    #[inline]
    pub fn get(&self, offset: usize) -> Option<i32> {
        self.cells.get(offset).map(|c| c.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, offset: usize, value: i32) {
        self.cells[offset].store(value, Ordering::Relaxed);
    }

    /// Copies the current contents out.  No synchronisation with the
    /// writers: the copy may mix generations.
    pub fn snapshot(&self) -> Vec<i32> {
        self.cells.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    /// Overwrites the whole buffer with a complete frame.
    pub fn publish(&self, frame: &[i32]) -> Result<()> {
        if frame.len() != self.cells.len() {
            return Err(TilebrotError::FrameSize {
                expected: self.cells.len(),
                actual: frame.len(),
            });
        }
        for (cell, &value) in self.cells.iter().zip(frame) {
            cell.store(value, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed_and_sized_to_the_raster() {
        let buffer = PixelBuffer::new(Raster::new(4, 3));
        assert_eq!(buffer.len(), 12);
        assert!(buffer.snapshot().iter().all(|&v| v == 0));
        assert_eq!(buffer.get(12), None);
    }

    #[test]
    fn disjoint_writers_need_no_lock() {
        let raster = Raster::new(8, 8);
        let buffer = PixelBuffer::new(raster);
        crossbeam::scope(|spawner| {
            for row in 0..8u32 {
                let buffer = &buffer;
                spawner.spawn(move |_| {
                    for x in 0..8 {
                        buffer.store(raster.offset(crate::planes::Pixel(x, row)), row as i32);
                    }
                });
            }
        })
        .unwrap();
        let snapshot = buffer.snapshot();
        for (i, v) in snapshot.iter().enumerate() {
            assert_eq!(*v, (i / 8) as i32);
        }
    }

    #[test]
    fn publish_replaces_everything_or_nothing() {
        let buffer = PixelBuffer::new(Raster::new(2, 2));
        buffer.publish(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.snapshot(), vec![1, 2, 3, 4]);
        match buffer.publish(&[9]) {
            Err(TilebrotError::FrameSize { expected, actual }) => {
                assert_eq!((expected, actual), (4, 1))
            }
            other => panic!("expected a frame size error, got {:?}", other),
        }
        assert_eq!(buffer.snapshot(), vec![1, 2, 3, 4]);
    }
}

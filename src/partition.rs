// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splits the raster into horizontal bands of rows, and pairs each band
//! with a viewport snapshot to make a unit of work.
//!
//! Every band but the last is `height / chunks` rows tall; the last band
//! takes whatever is left.  The bands of one partition cover `[0, height)`
//! exactly, in order, without gaps or overlaps, and none of them is
//! empty.  The worker pool relies on this to write the shared pixel
//! buffer without locks.

use std::ops::Range;

use crate::errors::{Result, TilebrotError};
use crate::viewport::Viewport;

/// A contiguous run of raster rows.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Band {
    /// First row of the band.
    pub row_offset: u32,
    /// Number of rows, always at least one.
    pub row_count: u32,
}

impl Band {
    /// The rows covered by this band.
    pub fn rows(&self) -> Range<u32> {
        self.row_offset..self.row_offset + self.row_count
    }
}

/// One band together with everything needed to compute it.  Work items
/// are immutable once built; the viewport is a copy, not a reference.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WorkItem {
    /// Rows to compute.
    pub band: Band,
    /// The viewport in force when the item was made.
    pub viewport: Viewport,
}

/// Splits `height` rows into `chunks` bands.  Fails when `chunks` is
/// zero or larger than `height`, since either would produce an empty
/// band.
pub fn partition(height: u32, chunks: u32) -> Result<Vec<Band>> {
    if chunks == 0 || chunks > height {
        return Err(TilebrotError::InvalidPartition { height, chunks });
    }
    let chunk_size = height / chunks;
    Ok((0..chunks)
        .map(|i| {
            let row_offset = i * chunk_size;
            let row_count = if i < chunks - 1 {
                chunk_size
            } else {
                height - row_offset
            };
            Band {
                row_offset,
                row_count,
            }
        })
        .collect())
}

/// The work items of one generation, in partition order.
pub fn work_items(viewport: &Viewport, height: u32, chunks: u32) -> Result<Vec<WorkItem>> {
    Ok(partition(height, chunks)?
        .into_iter()
        .map(|band| WorkItem {
            band,
            viewport: *viewport,
        })
        .collect())
}

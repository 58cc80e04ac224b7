// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The window onto the complex plane, plus the iteration cap.
//!
//! A `Viewport` is plain `Copy` data.  The dispatcher owns the live one
//! and every work item carries its own snapshot, so a worker never sees
//! a viewport change underneath it.  The vertical span is always derived
//! from the horizontal span and the aspect ratio so that the image is
//! never stretched.

use crate::errors::{Result, TilebrotError};
use crate::planes::Raster;

/// Each edge moves inward by this fraction of the old width on a click.
const ZOOM_STEP: f64 = 0.4;
const ITERATION_GROWTH: f64 = 1.25;
const ITERATION_SHRINK: f64 = 0.8;
/// Decreasing the iteration cap never goes below this.
pub const MIN_ITERATION_CAP: u32 = 10;

/// A rectangle on the complex plane and the iteration cap used to
/// render it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    /// Real part of the left edge.
    pub x_min: f64,
    /// Real part of the right edge.
    pub x_max: f64,
    /// Imaginary part of the bottom edge.
    pub y_min: f64,
    /// Imaginary part of the top edge.
    pub y_max: f64,
    /// Maximum number of iterations per pixel.
    pub iteration_cap: u32,
}

/// A request to change some or all of the viewport's fields.  Unset
/// fields keep their current value.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ViewportOverride {
    /// New left edge.
    pub x_min: Option<f64>,
    /// New right edge.
    pub x_max: Option<f64>,
    /// New bottom edge.
    pub y_min: Option<f64>,
    /// New top edge.
    pub y_max: Option<f64>,
    /// New iteration cap.
    pub iteration_cap: Option<u32>,
}

impl Viewport {
    /// Builds a viewport from its horizontal span and top edge.  The
    /// bottom edge is derived from the aspect ratio.
    pub fn new(
        x_min: f64,
        x_max: f64,
        y_max: f64,
        aspect_ratio: f64,
        iteration_cap: u32,
    ) -> Result<Viewport> {
        let vp = Viewport {
            x_min,
            x_max,
            y_min: y_max - (x_max - x_min) / aspect_ratio,
            y_max,
            iteration_cap,
        };
        vp.validate()?;
        Ok(vp)
    }

    /// Ensures the bounds are finite and non-empty and the cap is usable.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.x_min, self.x_max, self.y_min, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x_max <= self.x_min || self.y_max <= self.y_min {
            return Err(TilebrotError::InvalidViewport {
                x_min: self.x_min,
                x_max: self.x_max,
                y_min: self.y_min,
                y_max: self.y_max,
            });
        }
        if self.iteration_cap == 0 {
            return Err(TilebrotError::InvalidIterationCap);
        }
        Ok(())
    }

    /// Width of the window on the real axis.
    pub fn x_extent(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Height of the window on the imaginary axis.
    pub fn y_extent(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// The point in the middle of the window, as (re, im).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Recentres on the clicked pixel and zooms in: each edge moves
    /// inward by 0.4 of the old width (vertical edges by the same amount
    /// divided by the aspect ratio), so the new window is a fifth of the
    /// old one.  Vertical pixel offsets are measured in horizontal pixel
    /// widths.
    ///
    /// Bounds are not re-validated: at extreme depth the extents can
    /// collapse under f64 rounding and the picture degrades.
    pub fn zoom_at(
        &self,
        mouse_x: f64,
        mouse_y: f64,
        raster: Raster,
        aspect_ratio: f64,
    ) -> Viewport {
        let pixel_width = self.x_extent() / f64::from(raster.width);
        let x_offset = mouse_x - f64::from(raster.width) / 2.0;
        let y_offset = mouse_y - f64::from(raster.height) / 2.0;

        let zoom_x = self.x_extent() * ZOOM_STEP;
        let zoom_y = zoom_x / aspect_ratio;

        let x_min = self.x_min + x_offset * pixel_width + zoom_x;
        let x_max = self.x_max + x_offset * pixel_width - zoom_x;
        let y_max = self.y_max - (y_offset * pixel_width + zoom_y);
        Viewport {
            x_min,
            x_max,
            y_min: y_max - (x_max - x_min) / aspect_ratio,
            y_max,
            iteration_cap: self.iteration_cap,
        }
    }

    /// Raises the cap by a quarter, rounded.
    pub fn more_iterations(&self) -> Viewport {
        let cap = (f64::from(self.iteration_cap) * ITERATION_GROWTH).round() as u32;
        Viewport {
            iteration_cap: cap,
            ..*self
        }
    }

    /// Lowers the cap by a fifth, rounded, never below
    /// [`MIN_ITERATION_CAP`].
    pub fn fewer_iterations(&self) -> Viewport {
        let cap = (f64::from(self.iteration_cap) * ITERATION_SHRINK).round() as u32;
        Viewport {
            iteration_cap: cap.max(MIN_ITERATION_CAP),
            ..*self
        }
    }

    /// Applies an override request.  The horizontal span and the cap are
    /// taken as given.  The vertical span is re-derived from the aspect
    /// ratio, anchored on the top edge unless the request only moves the
    /// bottom edge.
    pub fn apply(&self, request: &ViewportOverride, aspect_ratio: f64) -> Result<Viewport> {
        let x_min = request.x_min.unwrap_or(self.x_min);
        let x_max = request.x_max.unwrap_or(self.x_max);
        let iteration_cap = request.iteration_cap.unwrap_or(self.iteration_cap);
        let y_extent = (x_max - x_min) / aspect_ratio;
        let y_max = match (request.y_max, request.y_min) {
            (Some(top), _) => top,
            (None, Some(bottom)) => bottom + y_extent,
            (None, None) => self.y_max,
        };
        Viewport::new(x_min, x_max, y_max, aspect_ratio, iteration_cap)
    }
}

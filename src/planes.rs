// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contains the PlaneMapper struct, which describes a relationship
//! between the output raster, an integral plane with its origin in the
//! upper-left corner, and the window of the complex plane described by
//! a viewport.  Row 0 of the raster is the top edge of the viewport.
use num::Complex;

use crate::viewport::Viewport;

/// The size of the output raster.  Fixed at startup.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    /// Pixels per row.
    pub width: u32,
    /// Rows.
    pub height: u32,
}

impl Raster {
    /// Constructor.
    pub fn new(width: u32, height: u32) -> Raster {
        Raster { width, height }
    }

    /// The total number of pixels.  Used to size the pixel buffer.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Describes that the raster has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Linear offset of a pixel in a row-major buffer.
    #[inline]
    pub fn offset(&self, pixel: Pixel) -> usize {
        pixel.0 as usize + pixel.1 as usize * self.width as usize
    }
}

/// The column and row of a pixel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pixel(pub u32, pub u32);

/// Maps pixels on the raster to points inside a viewport.
#[derive(Debug)]
pub struct PlaneMapper {
    /// The integral plane.
    pub raster: Raster,
    origin: Complex<f64>,
    // Width and height of the window on the complex plane.
    extents: (f64, f64),
}

impl PlaneMapper {
    /// Constructor.  The viewport's top-left corner becomes the origin.
    pub fn new(raster: Raster, viewport: &Viewport) -> PlaneMapper {
        PlaneMapper {
            raster,
            origin: Complex::new(viewport.x_min, viewport.y_max),
            extents: (viewport.x_extent(), viewport.y_extent()),
        }
    }

    /// Given a pixel on the raster, return the complex number under it.
    /// Multiplication comes before division so the same pixel always
    /// rounds to the same point, whichever backend asks.
    #[inline]
    pub fn pixel_to_point(&self, pixel: Pixel) -> Complex<f64> {
        Complex::new(
            self.origin.re + f64::from(pixel.0) * self.extents.0 / f64::from(self.raster.width),
            self.origin.im - f64::from(pixel.1) * self.extents.1 / f64::from(self.raster.height),
        )
    }
}

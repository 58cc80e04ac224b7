// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The escape-time kernel.
//!
//! Each pixel maps to a point `c`.  The orbit starts at `z = c` (not at
//! zero) and is iterated as `z = z * z + c` at most `cap` times.  On every
//! step two checks run, in this order:
//!
//! 1. if `z * z + c == z` the orbit has landed exactly on a fixed point
//!    and will never escape: the pixel is interior;
//! 2. if `|z|^2 > 4` the orbit has left the radius-2 disk: the pixel
//!    escaped on this step.
//!
//! An orbit that does neither within the budget is treated as interior.
//! The colour of an escaped pixel is `floor(step * 255 / cap)` shifted
//! into the second byte; interior pixels are 0.  An orbit escaping on
//! step 0 is therefore also 0.

use itertools::iproduct;
use num::Complex;

use crate::buffer::PixelBuffer;
use crate::partition::WorkItem;
use crate::planes::{Pixel, PlaneMapper, Raster};
use crate::viewport::Viewport;

/// How an orbit ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Escape {
    /// Left the radius-2 disk on this step.
    Escaped(u32),
    /// Reached an exact fixed point on this step.
    FixedPoint(u32),
    /// Still bounded after the whole budget.
    Bounded,
}

impl Escape {
    /// The pixel value handed to the display.
    #[inline]
    pub fn color(self, cap: u32) -> i32 {
        match self {
            Escape::Escaped(step) => ((u64::from(step) * 255 / u64::from(cap)) as i32) * 256,
            Escape::FixedPoint(_) | Escape::Bounded => 0,
        }
    }
}

/// Runs the orbit of `c` for at most `cap` steps.
#[inline]
pub fn escape_time(c: Complex<f64>, cap: u32) -> Escape {
    let mut z = c;
    for step in 0..cap {
        let next = z * z + c;
        if z == next {
            return Escape::FixedPoint(step);
        }
        if z.norm_sqr() > 4.0 {
            return Escape::Escaped(step);
        }
        z = next;
    }
    Escape::Bounded
}

/// The pixel value for `c` under an iteration cap.
#[inline]
pub fn color(c: Complex<f64>, cap: u32) -> i32 {
    escape_time(c, cap).color(cap)
}

/// Computes every pixel of a work item's band and stores it in the
/// shared buffer.
pub fn render_band(item: &WorkItem, buffer: &PixelBuffer) {
    let raster = buffer.raster();
    let plane = PlaneMapper::new(raster, &item.viewport);
    let cap = item.viewport.iteration_cap;
    for (y, x) in iproduct!(item.band.rows(), 0..raster.width) {
        let pixel = Pixel(x, y);
        buffer.store(raster.offset(pixel), color(plane.pixel_to_point(pixel), cap));
    }
}

/// Fills `frame` with whole rows starting at `first_row`.
pub fn render_rows(plane: &PlaneMapper, first_row: u32, frame: &mut [i32], cap: u32) {
    let width = plane.raster.width as usize;
    if width == 0 {
        return;
    }
    for (i, row) in frame.chunks_mut(width).enumerate() {
        let y = first_row + i as u32;
        for (x, value) in row.iter_mut().enumerate() {
            *value = color(plane.pixel_to_point(Pixel(x as u32, y)), cap);
        }
    }
}

/// Single-threaded reference rendering of a whole raster.
pub fn render_frame(raster: Raster, viewport: &Viewport) -> Vec<i32> {
    let plane = PlaneMapper::new(raster, viewport);
    let mut frame = vec![0i32; raster.len()];
    render_rows(&plane, 0, &mut frame, viewport.iteration_cap);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{work_items, Band};

    #[test]
    fn origin_is_a_fixed_point() {
        for &cap in &[1, 2, 10, 500] {
            assert_eq!(escape_time(Complex::new(0.0, 0.0), cap), Escape::FixedPoint(0));
            assert_eq!(color(Complex::new(0.0, 0.0), cap), 0);
        }
    }

    #[test]
    fn far_points_escape_at_step_zero_and_are_black() {
        let c = Complex::new(3.0, 0.0);
        for &cap in &[1, 7, 500] {
            assert_eq!(escape_time(c, cap), Escape::Escaped(0));
            assert_eq!(color(c, cap), 0);
        }
    }

    #[test]
    fn minus_two_settles_on_a_fixed_point_early() {
        // -2 -> 2 -> 2: |2|^2 == 4 never exceeds the threshold.
        let c = Complex::new(-2.0, 0.0);
        match escape_time(c, 500) {
            Escape::FixedPoint(step) => assert!(step < 500),
            other => panic!("expected a fixed point, got {:?}", other),
        }
        assert_eq!(escape_time(c, 500), Escape::FixedPoint(1));
        assert_eq!(color(c, 500), 0);
    }

    #[test]
    fn escape_colour_lands_in_the_second_byte() {
        // 1 -> 2 -> 5: escapes on step 2.
        let c = Complex::new(1.0, 0.0);
        assert_eq!(escape_time(c, 100), Escape::Escaped(2));
        assert_eq!(color(c, 100), (2 * 255 / 100) * 256);
        assert_eq!(color(c, 100) & 0xff, 0);
    }

    #[test]
    fn budget_exhaustion_is_interior() {
        // -1 cycles between -1 and 0 forever, never a fixed point.
        let c = Complex::new(-1.0, 0.0);
        assert_eq!(escape_time(c, 50), Escape::Bounded);
        assert_eq!(color(c, 50), 0);
        // With a budget of two the escape on step 2 is never reached.
        assert_eq!(escape_time(Complex::new(1.0, 0.0), 2), Escape::Bounded);
    }

    #[test]
    fn kernel_is_deterministic() {
        let c = Complex::new(-0.743_643_887, 0.131_825_904);
        let first = color(c, 1000);
        for _ in 0..10 {
            assert_eq!(color(c, 1000), first);
        }
    }

    #[test]
    fn colours_stay_in_the_documented_set() {
        let vp = Viewport::new(-2.0, 0.75, 0.7734375, 16.0 / 9.0, 37).unwrap();
        let frame = render_frame(Raster::new(48, 27), &vp);
        let allowed: Vec<i32> = (0..37).map(|k| (k * 255 / 37) * 256).collect();
        assert!(frame.iter().all(|v| *v == 0 || allowed.contains(v)));
        assert!(frame.iter().any(|v| *v != 0));
    }

    #[test]
    fn bands_fill_exactly_their_rows() {
        let raster = Raster::new(16, 9);
        let vp = Viewport::new(-2.0, 0.75, 0.7734375, 16.0 / 9.0, 64).unwrap();
        let buffer = PixelBuffer::new(raster);
        let sentinel = -1;
        buffer.publish(&vec![sentinel; raster.len()]).unwrap();

        let items = work_items(&vp, 9, 3).unwrap();
        assert_eq!(items[1].band, Band { row_offset: 3, row_count: 3 });
        render_band(&items[1], &buffer);

        let expected = render_frame(raster, &vp);
        let got = buffer.snapshot();
        for (i, v) in got.iter().enumerate() {
            let row = i / 16;
            if (3..6).contains(&row) {
                assert_eq!(*v, expected[i]);
            } else {
                assert_eq!(*v, sentinel);
            }
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Startup configuration.  Built once, validated, then handed by value
//! to the dispatcher and everything it starts.  Nothing in here changes
//! after startup: the raster size, the aspect ratio and the number of
//! bands per generation are fixed for the life of the process.

use std::time::Duration;

use crate::errors::{Result, TilebrotError};
use crate::viewport::Viewport;

/// The horizontal span of the view shown at startup and on reset.  The
/// vertical span is derived from it and the aspect ratio, centred on the
/// real axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DefaultView {
    /// Left edge of the default view.
    pub x_min: f64,
    /// Right edge of the default view.
    pub x_max: f64,
}

/// Everything the engine needs to know before the first generation.
#[derive(Clone, Debug)]
pub struct Config {
    /// Raster width in pixels.
    pub width: u32,
    /// Raster height in pixels.
    pub height: u32,
    /// Width over height of the complex-plane window.
    pub aspect_ratio: f64,
    /// Bands per generation.
    pub chunk_count: u32,
    /// Number of worker threads in the CPU pool.
    pub workers: usize,
    /// Iteration cap at startup and on reset.
    pub iteration_cap: u32,
    /// View at startup and on reset.
    pub view: DefaultView,
    /// How long an idle worker waits on the queue before re-checking
    /// the shutdown flag.
    pub dequeue_timeout: Duration,
}

const ASPECT_RATIO: f64 = 16.0 / 9.0;
const ROWS_PER_CHUNK: u32 = 5;

impl Default for Config {
    fn default() -> Self {
        Config::with_size(80 * 16, (f64::from(80 * 16) / ASPECT_RATIO) as u32)
    }
}

impl Config {
    /// A default configuration for a raster of the given size.  The band
    /// count follows the height at five rows per band.
    pub fn with_size(width: u32, height: u32) -> Self {
        Config {
            width,
            height,
            aspect_ratio: ASPECT_RATIO,
            chunk_count: (height / ROWS_PER_CHUNK).max(1),
            workers: num_cpus::get(),
            iteration_cap: 500,
            view: DefaultView {
                x_min: -2.0,
                x_max: 0.75,
            },
            dequeue_timeout: Duration::from_millis(50),
        }
    }

    /// Number of pixels in the raster.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the raster holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The viewport shown at startup and restored on reset.
    pub fn default_viewport(&self) -> Result<Viewport> {
        let half_height = (self.view.x_max - self.view.x_min) / self.aspect_ratio / 2.0;
        Viewport::new(
            self.view.x_min,
            self.view.x_max,
            half_height,
            self.aspect_ratio,
            self.iteration_cap,
        )
    }

    /// Checks every field; the engine assumes a validated configuration.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(TilebrotError::InvalidConfig(msg));
        if self.is_empty() {
            return fail(format!(
                "raster must not be empty ({}x{})",
                self.width, self.height
            ));
        }
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return fail(format!("aspect ratio {} is not positive", self.aspect_ratio));
        }
        if self.chunk_count == 0 || self.chunk_count > self.height {
            return fail(format!(
                "chunk count {} must be between 1 and {}",
                self.chunk_count, self.height
            ));
        }
        if self.workers == 0 {
            return fail("at least one worker is required".to_string());
        }
        if self.dequeue_timeout == Duration::from_millis(0) {
            return fail("dequeue timeout must be non-zero".to_string());
        }
        self.default_viewport().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_classic_window() {
        let config = Config::default();
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);
        assert_eq!(config.chunk_count, 144);
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_viewport_is_centred_on_the_real_axis() {
        let vp = Config::default().default_viewport().unwrap();
        assert_eq!(vp.x_min, -2.0);
        assert_eq!(vp.x_max, 0.75);
        assert!((vp.y_max - 0.7734375).abs() < 1e-12);
        assert!((vp.y_min + 0.7734375).abs() < 1e-12);
        assert_eq!(vp.iteration_cap, 500);
    }

    #[test]
    fn tiny_rasters_still_get_one_band() {
        let config = Config::with_size(8, 3);
        assert_eq!(config.chunk_count, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_configurations() {
        let mut config = Config::with_size(16, 9);
        config.chunk_count = 10;
        assert!(config.validate().is_err());

        let mut config = Config::with_size(16, 9);
        config.workers = 0;
        assert!(config.validate().is_err());

        let config = Config::with_size(0, 9);
        assert!(config.validate().is_err());

        let mut config = Config::with_size(16, 9);
        config.aspect_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::with_size(16, 9);
        config.iteration_cap = 0;
        assert!(config.validate().is_err());
    }
}

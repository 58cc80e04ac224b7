// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type shared by every part of the engine.

use failure::Fail;

/// Everything that can go wrong while configuring or driving the
/// explorer.  Idle dequeue timeouts are not errors and never show up
/// here.
#[derive(Debug, Fail)]
pub enum TilebrotError {
    /// The bounds of a viewport are empty, inverted, or not finite.
    #[fail(
        display = "Invalid viewport: x [{}, {}], y [{}, {}]",
        x_min, x_max, y_min, y_max
    )]
    InvalidViewport {
        /// Left edge.
        x_min: f64,
        /// Right edge.
        x_max: f64,
        /// Bottom edge.
        y_min: f64,
        /// Top edge.
        y_max: f64,
    },

    /// The iteration cap must be at least one.
    #[fail(display = "Iteration cap must be at least 1")]
    InvalidIterationCap,

    /// The startup configuration cannot be used.
    #[fail(display = "Invalid configuration: {}", _0)]
    InvalidConfig(String),

    /// A row band cannot be built for this raster.
    #[fail(display = "Cannot split {} rows into {} bands", height, chunks)]
    InvalidPartition {
        /// Rows in the raster.
        height: u32,
        /// Requested band count.
        chunks: u32,
    },

    /// A whole frame did not match the size of the pixel buffer.
    #[fail(
        display = "Frame has {} pixels, buffer has {}",
        actual, expected
    )]
    FrameSize {
        /// Pixels in the buffer.
        expected: usize,
        /// Pixels in the frame offered.
        actual: usize,
    },

    /// The operating system refused to start a thread.
    #[fail(display = "Could not spawn {}: {}", name, cause)]
    Spawn {
        /// Name of the thread we tried to start.
        name: String,
        /// The underlying error.
        #[cause]
        cause: std::io::Error,
    },

    /// The bulk offload device is unavailable or failed mid-pass.  The
    /// dispatcher treats this as a signal to fall back to the tiled CPU path.
    #[fail(display = "Offload device {} failed: {}", device, reason)]
    Offload {
        /// Name of the device that failed.
        device: String,
        /// What went wrong.
        reason: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TilebrotError>;

#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tile-parallel Mandelbrot explorer engine
//!
//! The Mandelbrot set is drawn by taking each pixel as a point `c` on
//! the complex plane and iterating `z = z * z + c` until the orbit
//! either leaves the disk of radius 2 or the iteration budget runs out.
//! How quickly it leaves is the "velocity" used to shade the pixel.
//!
//! This crate is the engine behind an interactive explorer.  The raster
//! is cut into horizontal bands of rows; each band, together with a copy
//! of the viewport it belongs to, is a work item on a shared queue.  A
//! fixed pool of worker threads takes items off the queue and writes the
//! pixels of their band straight into one shared buffer, which a display
//! layer may read at any moment.  Whenever the user clicks to zoom,
//! changes the iteration cap, or resets the view, the dispatcher drops
//! the items nobody has started on and queues the bands of the new
//! view.  Bands already being computed finish anyway; the picture
//! briefly mixes two views and then settles.
//!
//! A second backend computes the whole frame in one pass on an offload
//! device and publishes it at once.  If the device fails, the
//! dispatcher falls back to the worker pool.

extern crate crossbeam;
extern crate failure;
extern crate itertools;
#[macro_use]
extern crate log;
extern crate num;
extern crate num_cpus;

pub mod backend;
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod kernel;
pub mod partition;
pub mod planes;
pub mod queue;
pub mod viewport;
pub mod worker;

pub use backend::{BackendKind, ComputeBackend, HostDevice, OffloadDevice};
pub use buffer::PixelBuffer;
pub use config::Config;
pub use dispatch::{Dispatcher, Status};
pub use errors::{Result, TilebrotError};
pub use partition::{partition, Band, WorkItem};
pub use planes::Raster;
pub use viewport::{Viewport, ViewportOverride};

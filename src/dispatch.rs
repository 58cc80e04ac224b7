// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The dispatch controller.
//!
//! Owns the live viewport and the active backend.  Every viewport
//! change (click, iteration step, reset, explicit override) starts a new
//! generation: the backend drops the work that has not been claimed yet
//! and queues the new view.  Nothing waits for the old generation.
//! Workers still busy with it finish and write their rows, and the next
//! generation overwrites them as it completes.
//!
//! An offload failure is picked up on the next call and switches the
//! controller to the CPU path, re-dispatching the current view there.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{
    BackendKind, BulkOffload, ComputeBackend, HostDevice, OffloadDevice, TiledCpu,
};
use crate::buffer::PixelBuffer;
use crate::config::Config;
use crate::errors::Result;
use crate::planes::Raster;
use crate::viewport::{Viewport, ViewportOverride};

const SETTLE_POLL: Duration = Duration::from_millis(1);

/// Drives generations for one raster.
pub struct Dispatcher {
    config: Config,
    raster: Raster,
    viewport: Viewport,
    buffer: Arc<PixelBuffer>,
    device: Arc<dyn OffloadDevice>,
    backend: Box<dyn ComputeBackend>,
}

/// What the controller is showing, in the shape of the on-screen text
/// of an interactive front end.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Status {
    /// Active backend.
    pub backend: BackendKind,
    /// The live viewport.
    pub viewport: Viewport,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Method: {}", self.backend)?;
        writeln!(f, "Iterations: {}", self.viewport.iteration_cap)?;
        writeln!(f, "X-Start: {}", Scientific(self.viewport.x_min))?;
        writeln!(f, "X-End:   {}", Scientific(self.viewport.x_max))?;
        writeln!(f, "Y-Start: {}", Scientific(self.viewport.y_min))?;
        write!(f, "Y-End:   {}", Scientific(self.viewport.y_max))
    }
}

/// Six-digit scientific notation with a signed, two-digit exponent:
/// `-2.000000E+00`.
struct Scientific(f64);

impl fmt::Display for Scientific {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let plain = format!("{:.6E}", self.0);
        let split = plain
            .find('E')
            .and_then(|at| plain[at + 1..].parse::<i32>().ok().map(|exp| (at, exp)));
        match split {
            Some((at, exp)) => {
                let sign = if exp < 0 { '-' } else { '+' };
                write!(f, "{}E{}{:02}", &plain[..at], sign, exp.abs())
            }
            // inf and NaN carry no exponent.
            None => write!(f, "{}", plain),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("raster", &self.raster)
            .field("viewport", &self.viewport)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl Dispatcher {
    /// Validates `config`, allocates the pixel buffer, starts `kind` and
    /// dispatches the default view.  The offload backend uses a
    /// [`HostDevice`] with one thread per configured worker.
    pub fn new(config: Config, kind: BackendKind) -> Result<Dispatcher> {
        let device = Arc::new(HostDevice::new(config.workers));
        Dispatcher::with_device(config, kind, device)
    }

    /// Like [`Dispatcher::new`] with a caller-supplied offload device.
    pub fn with_device(
        config: Config,
        kind: BackendKind,
        device: Arc<dyn OffloadDevice>,
    ) -> Result<Dispatcher> {
        config.validate()?;
        let raster = Raster::new(config.width, config.height);
        let viewport = config.default_viewport()?;
        let buffer = Arc::new(PixelBuffer::new(raster));
        let backend = start_backend(kind, &config, &buffer, &device)?;
        info!(
            "dispatcher ready: {}x{} raster, {} bands, {} backend",
            raster.width, raster.height, config.chunk_count, kind
        );
        let mut dispatcher = Dispatcher {
            config,
            raster,
            viewport,
            buffer,
            device,
            backend,
        };
        dispatcher.backend.produce(&viewport)?;
        Ok(dispatcher)
    }

    /// The live viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// The raster size.
    pub fn raster(&self) -> Raster {
        self.raster
    }

    /// The configuration the controller was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle to the shared pixel buffer, for the display side.
    pub fn buffer(&self) -> Arc<PixelBuffer> {
        Arc::clone(&self.buffer)
    }

    /// The backend currently producing pixels.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// The current backend and viewport.
    pub fn status(&self) -> Status {
        Status {
            backend: self.backend.kind(),
            viewport: self.viewport,
        }
    }

    /// Applies an override request and starts a new generation.
    pub fn apply(&mut self, request: &ViewportOverride) -> Result<()> {
        let next = self.viewport.apply(request, self.config.aspect_ratio)?;
        self.start_generation(next)
    }

    /// Recentres on the clicked raster position and zooms in.
    pub fn click(&mut self, mouse_x: f64, mouse_y: f64) -> Result<()> {
        let next = self
            .viewport
            .zoom_at(mouse_x, mouse_y, self.raster, self.config.aspect_ratio);
        self.start_generation(next)
    }

    /// Raises the iteration cap by a quarter.
    pub fn more_iterations(&mut self) -> Result<()> {
        let next = self.viewport.more_iterations();
        self.start_generation(next)
    }

    /// Lowers the iteration cap by a fifth, never below ten.
    pub fn fewer_iterations(&mut self) -> Result<()> {
        let next = self.viewport.fewer_iterations();
        self.start_generation(next)
    }

    /// Restores the startup view and iteration cap.
    pub fn reset(&mut self) -> Result<()> {
        let next = self.config.default_viewport()?;
        self.start_generation(next)
    }

    /// Swaps to the other backend and re-dispatches the current view on it.
    pub fn switch_backend(&mut self) -> Result<BackendKind> {
        let kind = self.backend.kind().toggled();
        self.replace_backend(kind)?;
        Ok(kind)
    }

    /// Waits until the active backend has nothing pending or running, or
    /// until `timeout` passes.  Returns whether it settled.  An offload
    /// failure seen while waiting triggers the CPU fallback and the wait
    /// continues on the CPU path.
    pub fn wait_settled(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_backend()?;
            if self.backend.is_settled() {
                // A failure may have landed between the two checks.
                self.check_backend()?;
                if self.backend.is_settled() {
                    return Ok(true);
                }
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(SETTLE_POLL);
        }
    }

    /// A copy of the pixel buffer as it is right now.
    pub fn snapshot(&self) -> Vec<i32> {
        self.buffer.snapshot()
    }

    /// Stops all work and joins every thread.
    pub fn shutdown(mut self) {
        self.backend.halt();
        info!("dispatcher shutting down");
        // Dropping the backend joins its threads.
    }

    fn start_generation(&mut self, next: Viewport) -> Result<()> {
        self.check_backend()?;
        self.viewport = next;
        self.backend.produce(&next)
    }

    fn check_backend(&mut self) -> Result<()> {
        if let Some(failure) = self.backend.take_failure() {
            warn!("{}; falling back to the cpu backend", failure);
            self.replace_backend(BackendKind::TiledCpu)?;
        }
        Ok(())
    }

    fn replace_backend(&mut self, kind: BackendKind) -> Result<()> {
        let started = start_backend(kind, &self.config, &self.buffer, &self.device);
        self.install_backend(started)
    }

    /// Swaps in a freshly started backend.  If it failed to start, the
    /// current one is left running untouched.
    fn install_backend(&mut self, started: Result<Box<dyn ComputeBackend>>) -> Result<()> {
        let next = started?;
        let mut old = mem::replace(&mut self.backend, next);
        old.halt();
        // Joins the old backend's threads before the new one gets work.
        drop(old);
        info!("switched to the {} backend", self.backend.kind());
        self.backend.produce(&self.viewport)
    }
}

fn start_backend(
    kind: BackendKind,
    config: &Config,
    buffer: &Arc<PixelBuffer>,
    device: &Arc<dyn OffloadDevice>,
) -> Result<Box<dyn ComputeBackend>> {
    let backend: Box<dyn ComputeBackend> = match kind {
        BackendKind::TiledCpu => Box::new(TiledCpu::start(config, Arc::clone(buffer))?),
        BackendKind::BulkOffload => {
            Box::new(BulkOffload::start(Arc::clone(device), Arc::clone(buffer))?)
        }
    };
    Ok(backend)
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Compute backends.  The dispatcher holds exactly one at a time.
//!
//! * [`TiledCpu`] splits each generation into bands and leaves them on
//!   the work queue for the worker pool.
//! * [`BulkOffload`] hands the whole viewport to an [`OffloadDevice`] on
//!   a dedicated thread and publishes the finished frame in one copy.
//!   Device failures come back on a channel so the dispatcher can fall
//!   back to the CPU path instead of waiting forever.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::buffer::PixelBuffer;
use crate::config::Config;
use crate::errors::{Result, TilebrotError};
use crate::kernel::render_rows;
use crate::partition::work_items;
use crate::planes::{PlaneMapper, Raster};
use crate::queue::WorkQueue;
use crate::viewport::Viewport;
use crate::worker::WorkerPool;

/// Which backend to run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Banded work on the CPU worker pool.
    TiledCpu,
    /// One whole-frame pass on an offload device.
    BulkOffload,
}

impl BackendKind {
    /// The other backend.
    pub fn toggled(self) -> BackendKind {
        match self {
            BackendKind::TiledCpu => BackendKind::BulkOffload,
            BackendKind::BulkOffload => BackendKind::TiledCpu,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendKind::TiledCpu => write!(f, "cpu"),
            BackendKind::BulkOffload => write!(f, "offload"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(BackendKind::TiledCpu),
            "offload" => Ok(BackendKind::BulkOffload),
            other => Err(format!("Unknown backend '{}', expected cpu or offload", other)),
        }
    }
}

/// Something that can turn a viewport into pixels in the shared buffer.
pub trait ComputeBackend: Send {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Starts a generation for `viewport`.  Returns without waiting for
    /// it to finish.
    fn produce(&mut self, viewport: &Viewport) -> Result<()>;

    /// True when no work for any generation is pending or running.
    fn is_settled(&self) -> bool;

    /// Takes the oldest unreported failure, if any.
    fn take_failure(&mut self) -> Option<TilebrotError>;

    /// Abandons pending work so another backend can take over.
    fn halt(&mut self);
}

/// The banded CPU path: a work queue and the pool draining it.
#[derive(Debug)]
pub struct TiledCpu {
    queue: Arc<WorkQueue>,
    pool: WorkerPool,
    height: u32,
    chunk_count: u32,
}

impl TiledCpu {
    /// Starts the worker pool described by `config`, writing into `buffer`.
    pub fn start(config: &Config, buffer: Arc<PixelBuffer>) -> Result<TiledCpu> {
        let queue = Arc::new(WorkQueue::new());
        let pool = WorkerPool::start(
            config.workers,
            Arc::clone(&queue),
            buffer,
            config.dequeue_timeout,
        )?;
        Ok(TiledCpu {
            queue,
            pool,
            height: config.height,
            chunk_count: config.chunk_count,
        })
    }

    /// The queue the pool reads from.
    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }
}

impl ComputeBackend for TiledCpu {
    fn kind(&self) -> BackendKind {
        BackendKind::TiledCpu
    }

    fn produce(&mut self, viewport: &Viewport) -> Result<()> {
        let items = work_items(viewport, self.height, self.chunk_count)?;
        let bands = items.len();
        let drained = self.queue.replace(items);
        debug!(
            "cpu generation: x [{}, {}] y [{}, {}] cap {}: {} bands queued, {} stale dropped",
            viewport.x_min,
            viewport.x_max,
            viewport.y_min,
            viewport.y_max,
            viewport.iteration_cap,
            bands,
            drained
        );
        Ok(())
    }

    fn is_settled(&self) -> bool {
        self.queue.is_settled()
    }

    fn take_failure(&mut self) -> Option<TilebrotError> {
        None
    }

    fn halt(&mut self) {
        let drained = self.queue.drain();
        self.pool.signal_shutdown();
        debug!("cpu backend halted, {} bands dropped", drained);
    }
}

/// A device able to compute a whole frame in one pass.
pub trait OffloadDevice: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Computes every pixel of `raster` for `viewport`, row-major.
    fn compute(&self, viewport: &Viewport, raster: Raster) -> Result<Vec<i32>>;
}

/// Whole-frame computation on the host, split across scoped threads.
#[derive(Debug)]
pub struct HostDevice {
    threads: usize,
}

impl HostDevice {
    /// A device using `threads` threads per pass.
    pub fn new(threads: usize) -> HostDevice {
        HostDevice {
            threads: threads.max(1),
        }
    }
}

impl OffloadDevice for HostDevice {
    fn name(&self) -> &str {
        "host"
    }

    fn compute(&self, viewport: &Viewport, raster: Raster) -> Result<Vec<i32>> {
        if raster.is_empty() {
            return Ok(vec![]);
        }
        let plane = PlaneMapper::new(raster, viewport);
        let mut frame = vec![0i32; raster.len()];
        let width = raster.width as usize;
        let rows_per_region = (raster.height as usize + self.threads - 1) / self.threads;
        let cap = viewport.iteration_cap;
        {
            let plane = &plane;
            let regions: Vec<&mut [i32]> = frame.chunks_mut(rows_per_region * width).collect();
            crossbeam::scope(|spawner| {
                for (i, region) in regions.into_iter().enumerate() {
                    let first_row = (i * rows_per_region) as u32;
                    spawner.spawn(move |_| render_rows(plane, first_row, region, cap));
                }
            })
            .map_err(|_| TilebrotError::Offload {
                device: self.name().to_string(),
                reason: "a render thread panicked".to_string(),
            })?;
        }
        Ok(frame)
    }
}

/// The bulk path: one long-lived thread computing whole frames.
///
/// Requests go to the thread over a channel.  Before each pass the
/// thread drains whatever else is queued and keeps only the newest
/// viewport, so the device never runs two passes at once and a burst of
/// inputs costs at most one stale pass.  Every request carries a
/// generation stamp; a frame is published only if its stamp is still
/// current when the pass ends.
pub struct BulkOffload {
    device: Arc<dyn OffloadDevice>,
    requests: Option<Sender<Pass>>,
    generation: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
    failures: Receiver<TilebrotError>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Copy, Clone, Debug)]
struct Pass {
    viewport: Viewport,
    stamp: u64,
}

impl fmt::Debug for BulkOffload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BulkOffload")
            .field("device", &self.device.name())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish()
    }
}

impl BulkOffload {
    /// Starts the offload thread for `device`, publishing into `buffer`.
    pub fn start(
        device: Arc<dyn OffloadDevice>,
        buffer: Arc<PixelBuffer>,
    ) -> Result<BulkOffload> {
        let (requests, incoming) = unbounded();
        let (report, failures) = unbounded();
        let generation = Arc::new(AtomicU64::new(0));
        let pending = Arc::new(AtomicUsize::new(0));

        let name = format!("tilebrot-offload-{}", device.name());
        let handle = {
            let device = Arc::clone(&device);
            let generation = Arc::clone(&generation);
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    serve(&*device, &buffer, &incoming, &generation, &pending, &report)
                })
                .map_err(|cause| TilebrotError::Spawn { name, cause })?
        };
        info!("offload thread started on {}", device.name());
        Ok(BulkOffload {
            device,
            requests: Some(requests),
            generation,
            pending,
            failures,
            handle: Some(handle),
        })
    }

    fn close(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        // Dropping the sender ends the thread's receive loop.
        self.requests = None;
    }
}

fn serve(
    device: &dyn OffloadDevice,
    buffer: &PixelBuffer,
    incoming: &Receiver<Pass>,
    generation: &AtomicU64,
    pending: &AtomicUsize,
    report: &Sender<TilebrotError>,
) {
    while let Ok(mut pass) = incoming.recv() {
        let mut taken = 1;
        while let Ok(newer) = incoming.try_recv() {
            pass = newer;
            taken += 1;
        }
        if taken > 1 {
            debug!("offload skipped {} superseded passes", taken - 1);
        }
        if generation.load(Ordering::Acquire) == pass.stamp {
            if let Err(e) = run_pass(device, &pass.viewport, buffer, generation, pass.stamp) {
                let _ = report.send(e);
            }
        }
        pending.fetch_sub(taken, Ordering::AcqRel);
    }
    debug!("offload thread exiting");
}

fn run_pass(
    device: &dyn OffloadDevice,
    viewport: &Viewport,
    buffer: &PixelBuffer,
    generation: &AtomicU64,
    stamp: u64,
) -> Result<()> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        device.compute(viewport, buffer.raster())
    }));
    let frame = match outcome {
        Ok(computed) => computed?,
        Err(_) => {
            return Err(TilebrotError::Offload {
                device: device.name().to_string(),
                reason: "device panicked".to_string(),
            })
        }
    };
    if generation.load(Ordering::Acquire) == stamp {
        buffer.publish(&frame)?;
        debug!("offload pass {} published", stamp);
    } else {
        debug!("offload pass {} superseded, discarded", stamp);
    }
    Ok(())
}

impl ComputeBackend for BulkOffload {
    fn kind(&self) -> BackendKind {
        BackendKind::BulkOffload
    }

    fn produce(&mut self, viewport: &Viewport) -> Result<()> {
        let requests = match self.requests {
            Some(ref requests) => requests,
            None => {
                return Err(TilebrotError::Offload {
                    device: self.device.name().to_string(),
                    reason: "backend already halted".to_string(),
                })
            }
        };
        let stamp = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.pending.fetch_add(1, Ordering::AcqRel);
        let pass = Pass {
            viewport: *viewport,
            stamp,
        };
        if requests.send(pass).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(TilebrotError::Offload {
                device: self.device.name().to_string(),
                reason: "offload thread is gone".to_string(),
            });
        }
        debug!(
            "offload pass {} queued on {}: cap {}",
            stamp,
            self.device.name(),
            viewport.iteration_cap
        );
        Ok(())
    }

    fn is_settled(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    fn take_failure(&mut self) -> Option<TilebrotError> {
        self.failures.try_recv().ok()
    }

    fn halt(&mut self) {
        // A pass still running sees a newer generation and discards its
        // frame; queued passes are skipped.
        self.close();
        debug!("offload backend halted");
    }
}

impl Drop for BulkOffload {
    fn drop(&mut self) {
        self.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("offload thread had panicked before shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::render_frame;
    use std::time::{Duration, Instant};

    struct BrokenDevice;

    impl OffloadDevice for BrokenDevice {
        fn name(&self) -> &str {
            "broken"
        }

        fn compute(&self, _: &Viewport, _: Raster) -> Result<Vec<i32>> {
            Err(TilebrotError::Offload {
                device: "broken".to_string(),
                reason: "no adapter".to_string(),
            })
        }
    }

    struct PanickingDevice;

    impl OffloadDevice for PanickingDevice {
        fn name(&self) -> &str {
            "panicky"
        }

        fn compute(&self, _: &Viewport, _: Raster) -> Result<Vec<i32>> {
            panic!("device lost")
        }
    }

    /// Renders slowly and records how many passes overlap.
    #[derive(Default)]
    struct SlowDevice {
        running: AtomicUsize,
        peak: AtomicUsize,
        passes: AtomicUsize,
    }

    impl OffloadDevice for SlowDevice {
        fn name(&self) -> &str {
            "slow"
        }

        fn compute(&self, viewport: &Viewport, raster: Raster) -> Result<Vec<i32>> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            self.passes.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(40));
            let frame = render_frame(raster, viewport);
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(frame)
        }
    }

    fn home(cap: u32) -> Viewport {
        Viewport::new(-2.0, 0.75, 0.7734375, 16.0 / 9.0, cap).unwrap()
    }

    fn wait(backend: &dyn ComputeBackend) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !backend.is_settled() {
            assert!(Instant::now() < deadline, "backend never settled");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn backend_names_parse_and_toggle() {
        assert_eq!("cpu".parse::<BackendKind>(), Ok(BackendKind::TiledCpu));
        assert_eq!("offload".parse::<BackendKind>(), Ok(BackendKind::BulkOffload));
        assert!("CUDA".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::TiledCpu.toggled(), BackendKind::BulkOffload);
        assert_eq!(format!("{}", BackendKind::BulkOffload), "offload");
    }

    #[test]
    fn host_device_matches_the_reference_frame() {
        let raster = Raster::new(40, 23);
        let vp = home(60);
        for &threads in &[1, 3, 8, 64] {
            let frame = HostDevice::new(threads).compute(&vp, raster).unwrap();
            assert_eq!(frame, render_frame(raster, &vp));
        }
    }

    #[test]
    fn bulk_pass_publishes_a_whole_frame() {
        let raster = Raster::new(32, 18);
        let buffer = Arc::new(PixelBuffer::new(raster));
        let mut backend = BulkOffload::start(Arc::new(HostDevice::new(2)), buffer.clone()).unwrap();
        backend.produce(&home(50)).unwrap();
        wait(&backend);
        assert!(backend.take_failure().is_none());
        assert_eq!(buffer.snapshot(), render_frame(raster, &home(50)));
    }

    #[test]
    fn device_errors_and_panics_are_reported() {
        let raster = Raster::new(8, 4);
        let buffer = Arc::new(PixelBuffer::new(raster));

        let mut broken = BulkOffload::start(Arc::new(BrokenDevice), buffer.clone()).unwrap();
        broken.produce(&home(10)).unwrap();
        wait(&broken);
        match broken.take_failure() {
            Some(TilebrotError::Offload { device, .. }) => assert_eq!(device, "broken"),
            other => panic!("expected an offload failure, got {:?}", other),
        }

        let mut panicky = BulkOffload::start(Arc::new(PanickingDevice), buffer.clone()).unwrap();
        panicky.produce(&home(10)).unwrap();
        wait(&panicky);
        assert!(panicky.take_failure().is_some());
        assert!(buffer.snapshot().iter().all(|&v| v == 0));
    }

    #[test]
    fn halted_passes_do_not_publish() {
        let raster = Raster::new(32, 18);
        let buffer = Arc::new(PixelBuffer::new(raster));
        buffer.publish(&vec![-1; raster.len()]).unwrap();
        let mut backend = BulkOffload::start(Arc::new(HostDevice::new(1)), buffer.clone()).unwrap();
        backend.generation.store(5, Ordering::Release);
        // A pass stamped with an older generation is discarded.
        run_pass(&HostDevice::new(1), &home(20), &buffer, &backend.generation, 4).unwrap();
        assert!(buffer.snapshot().iter().all(|&v| v == -1));
        backend.halt();
        assert_eq!(backend.generation.load(Ordering::Acquire), 6);
    }

    #[test]
    fn one_pass_at_a_time_and_the_newest_view_wins() {
        let raster = Raster::new(24, 14);
        let buffer = Arc::new(PixelBuffer::new(raster));
        let device = Arc::new(SlowDevice::default());
        let mut backend = BulkOffload::start(device.clone(), buffer.clone()).unwrap();
        for cap in 10..30 {
            backend.produce(&home(cap)).unwrap();
        }
        wait(&backend);
        assert!(backend.take_failure().is_none());
        assert_eq!(device.peak.load(Ordering::SeqCst), 1);
        assert!(device.passes.load(Ordering::SeqCst) < 20);
        assert_eq!(buffer.snapshot(), render_frame(raster, &home(29)));

        drop(backend);
        assert_eq!(device.running.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn a_halted_offload_refuses_new_work() {
        let buffer = Arc::new(PixelBuffer::new(Raster::new(8, 4)));
        let mut backend = BulkOffload::start(Arc::new(HostDevice::new(1)), buffer).unwrap();
        backend.halt();
        assert!(backend.produce(&home(10)).is_err());
        wait(&backend);
    }

    #[test]
    fn tiled_cpu_drains_on_halt() {
        let mut config = Config::with_size(32, 18);
        config.workers = 2;
        config.dequeue_timeout = Duration::from_millis(5);
        let buffer = Arc::new(PixelBuffer::new(Raster::new(32, 18)));
        let mut backend = TiledCpu::start(&config, buffer.clone()).unwrap();
        backend.produce(&home(40)).unwrap();
        wait(&backend);
        assert_eq!(buffer.snapshot(), render_frame(Raster::new(32, 18), &home(40)));
        backend.halt();
        assert!(backend.queue().is_empty());
    }
}

//! Dedicated analyzer thread

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use camera_capture::RawFrame;
use result_channel::{ResultChannel, Subscription};
use tracing::{debug, info};

use crate::pipeline::{DepartureResult, LanePipeline, PipelineStats};
use crate::LaneError;

const THREAD_NAME: &str = "lane-analyzer";

/// Frame waiting for the analyzer. Holds at most one.
#[derive(Default)]
struct PendingSlot {
    frame: Option<RawFrame>,
    shutdown: bool,
}

struct Shared {
    slot: Mutex<PendingSlot>,
    ready: Condvar,
    skipped: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PendingSlot> {
        // the slot holds no invariant a panicking holder could break
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs a [`LanePipeline`] on its own thread, one frame at a time.
///
/// Frames submitted while the analyzer is busy replace each other, so only
/// the newest one is processed next.
pub struct FrameWorker {
    shared: Arc<Shared>,
    results: Arc<ResultChannel<DepartureResult>>,
    handle: Option<JoinHandle<LanePipeline>>,
}

impl FrameWorker {
    /// Move the pipeline onto a new analyzer thread
    pub fn spawn(pipeline: LanePipeline) -> Result<Self, LaneError> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(PendingSlot::default()),
            ready: Condvar::new(),
            skipped: AtomicU64::new(0),
        });
        let results = pipeline.results();

        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(worker_shared, pipeline))
            .map_err(|e| LaneError::Worker(e.to_string()))?;

        info!("Started {} thread", THREAD_NAME);
        Ok(Self {
            shared,
            results,
            handle: Some(handle),
        })
    }

    /// Hand a frame to the analyzer without waiting. Returns `false` if the
    /// worker is shutting down and the frame was discarded.
    pub fn submit(&self, frame: RawFrame) -> bool {
        let mut slot = self.shared.lock();
        if slot.shutdown {
            debug!("Worker stopping, frame {} discarded", frame.sequence);
            return false;
        }
        if let Some(stale) = slot.frame.replace(frame) {
            self.shared.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Frame {} superseded before analysis", stale.sequence);
        }
        drop(slot);
        self.shared.ready.notify_one();
        true
    }

    /// Register a display consumer
    pub fn subscribe(&self) -> Subscription<DepartureResult> {
        self.results.subscribe()
    }

    /// Frames replaced by a newer one before they were analyzed
    pub fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    /// Stop after the frame in flight, release the model and return the counters
    pub fn shutdown(mut self) -> Result<PipelineStats, LaneError> {
        self.stop()
            .ok_or_else(|| LaneError::Worker("worker already stopped".into()))?
    }

    fn stop(&mut self) -> Option<Result<PipelineStats, LaneError>> {
        let handle = self.handle.take()?;
        {
            let mut slot = self.shared.lock();
            slot.shutdown = true;
            if slot.frame.take().is_some() {
                self.shared.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.shared.ready.notify_all();

        Some(match handle.join() {
            Ok(mut pipeline) => {
                pipeline.shutdown();
                Ok(pipeline.stats())
            }
            Err(_) => Err(LaneError::Worker(format!("{} thread panicked", THREAD_NAME))),
        })
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.stop() {
            tracing::error!("Failed to stop analyzer: {}", e);
        }
    }
}

fn run(shared: Arc<Shared>, mut pipeline: LanePipeline) -> LanePipeline {
    debug!("Analyzer loop running");
    loop {
        let frame = {
            let mut slot = shared.lock();
            loop {
                if slot.shutdown {
                    debug!("Analyzer loop exiting");
                    return pipeline;
                }
                if let Some(frame) = slot.frame.take() {
                    break frame;
                }
                slot = shared
                    .ready
                    .wait(slot)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };
        pipeline.handle_frame(frame);
    }
}

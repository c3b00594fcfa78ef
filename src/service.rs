//! Async driver: one tokio task owns the pipeline (single writer).
//!
//! Accelerometer samples reach the task through a bounded channel and are
//! dropped, not queued, when it is full. Speed fixes go straight into the
//! shared `LocationCell`; the vehicle profile travels over a `watch`
//! channel. The speed-breaker aggregation window is closed by a tokio timer
//! armed when a window opens, or earlier by a sample whose timestamp passes
//! the deadline. Emitted events go out over a crossbeam channel so
//! consumers can live on plain threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender as EventSender;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

use crate::config::DetectorConfig;
use crate::error::HazardResult;
use crate::pipeline::{HazardPipeline, LocationCell, PipelineStats};
use crate::types::{AccelSample, LocationFix, RoadEvent, VehicleProfile};

const SAMPLE_QUEUE: usize = 500;

pub struct HazardService;

impl HazardService {
    /// Start the detection task. Must be called from within a tokio runtime.
    pub fn spawn(config: DetectorConfig, events: EventSender<RoadEvent>) -> HazardResult<HazardHandle> {
        let location = LocationCell::new();
        let window = Duration::from_millis(config.aggregation_window_ms.max(0) as u64);
        let profile = config.vehicle_profile;
        let pipeline = HazardPipeline::with_location_cell(config, location.clone())?;

        let (sample_tx, sample_rx) = mpsc::channel::<AccelSample>(SAMPLE_QUEUE);
        let (profile_tx, profile_rx) = watch::channel(profile);
        let counters = Arc::new(HandleCounters::default());

        let task = tokio::spawn(run(pipeline, sample_rx, profile_rx, events, window));

        log::info!("Hazard service started (profile {:?})", profile);

        Ok(HazardHandle {
            samples: sample_tx,
            profile: profile_tx,
            location,
            counters,
            task,
        })
    }
}

#[derive(Default)]
struct HandleCounters {
    dropped_samples: AtomicU64,
    speed_fixes: AtomicU64,
}

pub struct HazardHandle {
    samples: mpsc::Sender<AccelSample>,
    profile: watch::Sender<VehicleProfile>,
    location: LocationCell,
    counters: Arc<HandleCounters>,
    task: JoinHandle<PipelineStats>,
}

impl HazardHandle {
    /// Non-blocking; the sample is dropped if the detection task is behind.
    pub fn feed_accel_sample(&self, x: f64, y: f64, z: f64, timestamp_ms: i64) {
        let sample = AccelSample::new(x, y, z, timestamp_ms);
        match self.samples.try_send(sample) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.counters.dropped_samples.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    log::warn!("Sample queue full, dropped {} samples so far", dropped);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("Hazard service stopped, dropping sample at {}", timestamp_ms);
            }
        }
    }

    pub fn feed_speed(&self, speed_kmh: f64, latitude: f64, longitude: f64, timestamp_ms: i64) {
        let fix = LocationFix::new(speed_kmh, latitude, longitude, timestamp_ms);
        if !fix.is_valid() {
            log::warn!("Dropping invalid location fix: {:?}", fix);
            return;
        }
        self.counters.speed_fixes.fetch_add(1, Ordering::Relaxed);
        self.location.set(fix);
    }

    pub fn set_vehicle_profile(&self, profile: VehicleProfile) {
        self.profile.send_replace(profile);
    }

    pub fn location_cell(&self) -> LocationCell {
        self.location.clone()
    }

    /// Stop accepting samples, drain the queue, flush the aggregation window.
    pub async fn shutdown(self) -> PipelineStats {
        let HazardHandle {
            samples,
            profile: _profile,
            counters,
            task,
            ..
        } = self;
        drop(samples);

        let mut stats = match task.await {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("Hazard task failed: {}", e);
                PipelineStats::default()
            }
        };
        stats.dropped_samples += counters.dropped_samples.load(Ordering::Relaxed);
        stats.speed_fixes += counters.speed_fixes.load(Ordering::Relaxed);
        log::info!("Hazard service stopped: {:?}", stats);
        stats
    }
}

fn emit(events: &EventSender<RoadEvent>, event: RoadEvent) {
    if let Err(e) = events.send(event) {
        log::warn!("Event consumer disconnected, dropping {:?}", e.0.kind);
    }
}

async fn run(
    mut pipeline: HazardPipeline,
    mut samples: mpsc::Receiver<AccelSample>,
    mut profile: watch::Receiver<VehicleProfile>,
    events: EventSender<RoadEvent>,
    window: Duration,
) -> PipelineStats {
    let timer = sleep(window);
    tokio::pin!(timer);
    // Deadline of the window the timer was armed for
    let mut armed_for: Option<i64> = None;

    loop {
        tokio::select! {
            sample = samples.recv() => {
                let Some(sample) = sample else { break };

                if profile.has_changed().unwrap_or(false) {
                    pipeline.set_vehicle_profile(*profile.borrow_and_update());
                }

                for event in pipeline.feed_accel_sample(sample.x, sample.y, sample.z, sample.timestamp_ms) {
                    emit(&events, event);
                }

                if armed_for.is_none() {
                    if let Some(deadline) = pipeline.aggregation_deadline() {
                        timer.as_mut().reset(Instant::now() + window);
                        armed_for = Some(deadline);
                    }
                }
            }
            () = &mut timer, if armed_for.is_some() => {
                let fired_for = armed_for.take();
                if pipeline.aggregation_deadline() == fired_for {
                    if let Some(event) = pipeline.close_window() {
                        emit(&events, event);
                    }
                }
                // A sample already closed that window and opened a newer one
                if let Some(deadline) = pipeline.aggregation_deadline() {
                    timer.as_mut().reset(Instant::now() + window);
                    armed_for = Some(deadline);
                }
            }
        }
    }

    if let Some(event) = pipeline.flush() {
        emit(&events, event);
    }
    pipeline.stats()
}

//! Synchronous composition of the detection chain.
//!
//! raw sample → orientation → reorientation → detector → aggregator → `RoadEvent`
//!
//! A `HazardPipeline` owns every piece of detector state; `&mut self` is the
//! single writer. The current speed and position arrive through a
//! `LocationCell` that other threads may write at any time.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::aggregator::{EventAggregator, EventContext};
use crate::config::DetectorConfig;
use crate::detector::{DetectorState, EventDetector};
use crate::error::HazardResult;
use crate::orientation::{OrientationEstimator, OrientationState};
use crate::reorient::AxisReorienter;
use crate::simulation::TraceSample;
use crate::types::{AccelSample, LocationFix, RoadEvent, VehicleProfile};

/// Latest location fix, shared between the location and sensor paths.
/// Last write wins; a poisoned lock reads as "no fix".
#[derive(Clone, Debug, Default)]
pub struct LocationCell {
    inner: Arc<Mutex<Option<LocationFix>>>,
}

impl LocationCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, fix: LocationFix) {
        match self.inner.lock() {
            Ok(mut guard) => *guard = Some(fix),
            Err(e) => log::warn!("Location cell poisoned, dropping fix: {}", e),
        }
    }

    pub fn get(&self) -> Option<LocationFix> {
        self.inner.lock().map(|guard| *guard).unwrap_or(None)
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub accel_samples: u64,
    pub dropped_samples: u64,
    pub speed_fixes: u64,
    pub raw_events: u64,
    /// Raw events discarded for missing location or low speed.
    pub gated_events: u64,
    pub emitted_events: u64,
    pub calibrations: u64,
}

pub struct HazardPipeline {
    config: DetectorConfig,
    profile: VehicleProfile,
    orientation: OrientationEstimator,
    reorienter: AxisReorienter,
    detector: EventDetector,
    aggregator: EventAggregator,
    location: LocationCell,
    stats: PipelineStats,
}

impl HazardPipeline {
    pub fn new(config: DetectorConfig) -> HazardResult<Self> {
        Self::with_location_cell(config, LocationCell::new())
    }

    pub fn with_location_cell(config: DetectorConfig, location: LocationCell) -> HazardResult<Self> {
        config.validate()?;
        let aggregator = EventAggregator::new(&config);
        Ok(Self::assemble(config, location, aggregator))
    }

    /// Event ids become `<session_id>-<seq>`, reproducible across runs.
    pub fn with_session_id(config: DetectorConfig, session_id: &str) -> HazardResult<Self> {
        config.validate()?;
        let aggregator = EventAggregator::with_session_id(&config, session_id);
        Ok(Self::assemble(config, LocationCell::new(), aggregator))
    }

    fn assemble(config: DetectorConfig, location: LocationCell, aggregator: EventAggregator) -> Self {
        let gravity_offset = config
            .gravity_compensation
            .then_some(config.orientation.gravity);
        Self {
            profile: config.vehicle_profile,
            orientation: OrientationEstimator::new(config.orientation.clone()),
            reorienter: AxisReorienter::new(config.vertical_lpf_alpha, gravity_offset),
            detector: EventDetector::new(&config),
            aggregator,
            location,
            stats: PipelineStats::default(),
            config,
        }
    }

    /// Process one raw accelerometer sample. Returns the events that became
    /// final, which may include a speed-breaker window closed by this
    /// sample's timestamp.
    pub fn feed_accel_sample(&mut self, x: f64, y: f64, z: f64, timestamp_ms: i64) -> Vec<RoadEvent> {
        let sample = AccelSample::new(x, y, z, timestamp_ms);
        if !sample.is_finite() {
            self.stats.dropped_samples += 1;
            log::warn!("Dropping non-finite accel sample at {}", timestamp_ms);
            return Vec::new();
        }
        self.stats.accel_samples += 1;

        let mut emitted: Vec<RoadEvent> = self.aggregator.poll(timestamp_ms).into_iter().collect();

        let orientation = self.orientation.update(&sample);
        self.stats.calibrations = orientation.calibration_count;
        let vehicle = self.reorienter.reorient(&sample, &orientation);

        let fix = self.location.get();
        let speed = fix.map(|f| f.speed_kmh).unwrap_or(0.0);

        if let Some(raw) = self.detector.on_sample(vehicle.z, speed, self.profile, timestamp_ms) {
            self.stats.raw_events += 1;
            match fix {
                Some(fix) if self.aggregator.accepts_speed(fix.speed_kmh) => {
                    let ctx = EventContext {
                        latitude: fix.latitude,
                        longitude: fix.longitude,
                        speed_kmh: fix.speed_kmh,
                        timestamp_ms,
                    };
                    emitted.extend(self.aggregator.on_raw_event(raw, ctx));
                }
                Some(fix) => {
                    self.stats.gated_events += 1;
                    log::debug!("{:?} gated at {:.1} km/h", raw, fix.speed_kmh);
                }
                None => {
                    self.stats.gated_events += 1;
                    log::debug!("{:?} discarded: no location fix yet", raw);
                }
            }
        }

        self.stats.emitted_events += emitted.len() as u64;
        emitted
    }

    /// Record the latest speed and position. Invalid fixes are dropped.
    pub fn feed_speed(&mut self, speed_kmh: f64, latitude: f64, longitude: f64, timestamp_ms: i64) {
        let fix = LocationFix::new(speed_kmh, latitude, longitude, timestamp_ms);
        if !fix.is_valid() {
            log::warn!("Dropping invalid location fix: {:?}", fix);
            return;
        }
        self.stats.speed_fixes += 1;
        self.location.set(fix);
    }

    /// Takes effect from the next sample.
    pub fn set_vehicle_profile(&mut self, profile: VehicleProfile) {
        if profile != self.profile {
            log::info!("Vehicle profile {:?} -> {:?}", self.profile, profile);
        }
        self.profile = profile;
    }

    pub fn vehicle_profile(&self) -> VehicleProfile {
        self.profile
    }

    /// Close the speed-breaker window if its deadline has passed.
    pub fn poll(&mut self, now_ms: i64) -> Option<RoadEvent> {
        let event = self.aggregator.poll(now_ms);
        if event.is_some() {
            self.stats.emitted_events += 1;
        }
        event
    }

    /// Close the speed-breaker window now (timer fire).
    pub fn close_window(&mut self) -> Option<RoadEvent> {
        let event = self.aggregator.close_window();
        if event.is_some() {
            self.stats.emitted_events += 1;
        }
        event
    }

    /// Shutdown path: emits whatever the aggregation window still holds.
    pub fn flush(&mut self) -> Option<RoadEvent> {
        let event = self.aggregator.flush();
        if event.is_some() {
            self.stats.emitted_events += 1;
        }
        event
    }

    pub fn feed_trace_sample(&mut self, sample: &TraceSample) -> Vec<RoadEvent> {
        match sample {
            TraceSample::Accel(a) => self.feed_accel_sample(a.x, a.y, a.z, a.timestamp_ms),
            TraceSample::Location(f) => {
                self.feed_speed(f.speed_kmh, f.latitude, f.longitude, f.timestamp_ms);
                Vec::new()
            }
        }
    }

    /// Run a whole trace and flush; returns every emitted event in order.
    pub fn run_trace(&mut self, trace: &[TraceSample]) -> Vec<RoadEvent> {
        let mut events: Vec<RoadEvent> = trace
            .iter()
            .flat_map(|sample| self.feed_trace_sample(sample))
            .collect();
        events.extend(self.flush());
        events
    }

    pub fn aggregation_deadline(&self) -> Option<i64> {
        self.aggregator.deadline()
    }

    pub fn orientation(&self) -> OrientationState {
        self.orientation.state()
    }

    pub fn detector_state(&self) -> DetectorState {
        self.detector.state()
    }

    pub fn location_cell(&self) -> LocationCell {
        self.location.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.clone()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{RoadSimulator, ScheduledHazard, SimulatedHazard, SimulationConfig};
    use crate::types::EventKind;

    fn sim_config() -> DetectorConfig {
        DetectorConfig {
            gravity_compensation: true,
            ..DetectorConfig::default()
        }
    }

    fn run(config: DetectorConfig, sim: SimulationConfig) -> (Vec<RoadEvent>, PipelineStats) {
        let mut pipeline = HazardPipeline::with_session_id(config, "sim").unwrap();
        let events = pipeline.run_trace(&RoadSimulator::new(sim).unwrap().generate());
        (events, pipeline.stats())
    }

    fn single(at_ms: i64, kind: SimulatedHazard, duration_ms: i64) -> SimulationConfig {
        SimulationConfig {
            hazards: vec![ScheduledHazard { at_ms, kind }],
            ..SimulationConfig::with_duration(duration_ms)
        }
    }

    #[test]
    fn test_location_cell_last_write_wins() {
        let cell = LocationCell::new();
        assert_eq!(cell.get(), None);
        cell.set(LocationFix::new(10.0, 1.0, 2.0, 0));
        cell.set(LocationFix::new(20.0, 1.0, 2.0, 5));
        assert_eq!(cell.get().map(|f| f.speed_kmh), Some(20.0));

        let shared = cell.clone();
        shared.clear();
        assert_eq!(cell.get(), None);
    }

    #[test]
    fn test_smooth_drive_emits_nothing() {
        let sim = SimulationConfig {
            hazards: Vec::new(),
            ..SimulationConfig::with_duration(20_000)
        };
        let (events, stats) = run(sim_config(), sim);
        assert!(events.is_empty());
        assert_eq!(stats.raw_events, 0);
        assert!(stats.calibrations > 0);
    }

    #[test]
    fn test_speed_breaker_at_cruise() {
        let (events, stats) = run(sim_config(), single(14_000, SimulatedHazard::SpeedBreaker, 20_000));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::SpeedBreaker);
        assert!((events[0].speed_kmh - 25.0).abs() < 0.5);
        assert_eq!(events[0].timestamp_ms, 14_020);
        assert_eq!(stats.emitted_events, 1);
    }

    #[test]
    fn test_pothole_emitted_immediately() {
        let mut pipeline = HazardPipeline::new(sim_config()).unwrap();
        let trace = RoadSimulator::new(single(14_000, SimulatedHazard::Pothole, 20_000))
            .unwrap()
            .generate();

        let mut emitted_at = None;
        for sample in &trace {
            let events = pipeline.feed_trace_sample(sample);
            if !events.is_empty() {
                assert_eq!(events[0].kind, EventKind::Pothole);
                emitted_at = Some(sample.timestamp_ms());
                break;
            }
        }
        assert_eq!(emitted_at, Some(14_000));
    }

    #[test]
    fn test_broken_patch_detected() {
        let (events, _) = run(sim_config(), single(14_000, SimulatedHazard::BrokenPatch, 20_000));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::BrokenPatch);
    }

    #[test]
    fn test_default_schedule_detects_each_hazard() {
        let (events, _) = run(sim_config(), SimulationConfig::default());
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::SpeedBreaker, EventKind::Pothole, EventKind::BrokenPatch]
        );
    }

    #[test]
    fn test_consecutive_bumps_merge() {
        let sim = SimulationConfig {
            hazards: vec![
                ScheduledHazard { at_ms: 14_000, kind: SimulatedHazard::SpeedBreaker },
                ScheduledHazard { at_ms: 14_500, kind: SimulatedHazard::SpeedBreaker },
            ],
            ..SimulationConfig::with_duration(20_000)
        };
        // The second bump lands inside the detector cooldown
        let (events, stats) = run(sim_config(), sim.clone());
        assert_eq!(events.len(), 1);
        assert_eq!(stats.raw_events, 1);

        // With a short cooldown both bumps reach the aggregator and merge
        let config = DetectorConfig {
            cooldown_ms: 300,
            ..sim_config()
        };
        let (events, stats) = run(config, sim);
        assert_eq!(stats.raw_events, 2);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::MultipleSpeedBreakers);
    }

    #[test]
    fn test_no_location_discards_events() {
        let mut pipeline = HazardPipeline::new(sim_config()).unwrap();
        let trace = RoadSimulator::new(single(14_000, SimulatedHazard::Pothole, 20_000))
            .unwrap()
            .generate();
        let mut events = Vec::new();
        for sample in &trace {
            if let TraceSample::Accel(a) = sample {
                events.extend(pipeline.feed_accel_sample(a.x, a.y, a.z, a.timestamp_ms));
            }
        }
        events.extend(pipeline.flush());
        assert!(events.is_empty());
        // Speed 0 keeps the pothole gate closed; nothing reaches the aggregator
        assert_eq!(pipeline.stats().emitted_events, 0);
    }

    #[test]
    fn test_slow_speed_gated() {
        let mut pipeline = HazardPipeline::new(sim_config()).unwrap();
        pipeline.feed_speed(5.0, 12.9, 77.6, 0);
        let zs = [0.0, 0.0, 0.0, 25.0, -15.0];
        let mut events = Vec::new();
        for (i, dz) in zs.iter().enumerate() {
            events.extend(pipeline.feed_accel_sample(0.0, 0.0, 9.8 + dz, i as i64 * 20));
        }
        events.extend(pipeline.flush());
        assert!(events.is_empty());
        let stats = pipeline.stats();
        assert_eq!(stats.raw_events, 1);
        assert_eq!(stats.gated_events, 1);
    }

    #[test]
    fn test_nan_sample_counted_and_dropped() {
        let mut pipeline = HazardPipeline::new(sim_config()).unwrap();
        assert!(pipeline.feed_accel_sample(f64::NAN, 0.0, 9.8, 0).is_empty());
        assert!(pipeline.feed_accel_sample(0.0, f64::INFINITY, 9.8, 20).is_empty());
        let stats = pipeline.stats();
        assert_eq!(stats.dropped_samples, 2);
        assert_eq!(stats.accel_samples, 0);
        assert_eq!(pipeline.detector_state(), DetectorState::Idle);
    }

    #[test]
    fn test_invalid_fix_dropped() {
        let mut pipeline = HazardPipeline::new(DetectorConfig::default()).unwrap();
        pipeline.feed_speed(-3.0, 12.9, 77.6, 0);
        pipeline.feed_speed(20.0, f64::NAN, 77.6, 0);
        assert_eq!(pipeline.location_cell().get(), None);
        assert_eq!(pipeline.stats().speed_fixes, 0);
    }

    #[test]
    fn test_profile_switch_changes_thresholds() {
        // 1.5 m/s² peaks stay below the two-wheeler threshold but trip a car's;
        // 8 km/h keeps the pothole branch out of it
        let pattern = [1.5, -1.0, 1.5, -1.0, 1.5];
        let feed = |pipeline: &mut HazardPipeline| {
            pipeline.feed_speed(8.0, 12.9, 77.6, 0);
            let mut raw = 0;
            for (i, dz) in pattern.iter().enumerate() {
                pipeline.feed_accel_sample(0.0, 0.0, 9.8 + dz, i as i64 * 20);
                raw = pipeline.stats().raw_events;
            }
            raw
        };

        let mut two = HazardPipeline::new(sim_config()).unwrap();
        assert_eq!(feed(&mut two), 0);

        let mut four = HazardPipeline::new(sim_config()).unwrap();
        four.set_vehicle_profile(VehicleProfile::FourWheeler);
        assert_eq!(four.vehicle_profile(), VehicleProfile::FourWheeler);
        assert_eq!(feed(&mut four), 1);
    }

    #[test]
    fn test_late_sample_closes_window() {
        let mut pipeline = HazardPipeline::new(sim_config()).unwrap();
        pipeline.feed_speed(25.0, 12.9, 77.6, 0);
        for (i, dz) in [0.0, 0.0, 0.0, 25.0, -15.0].iter().enumerate() {
            pipeline.feed_accel_sample(0.0, 0.0, 9.8 + dz, i as i64 * 20);
        }
        assert_eq!(pipeline.aggregation_deadline(), Some(2080));
        assert!(pipeline.feed_accel_sample(0.0, 0.0, 9.8, 2000).is_empty());
        let events = pipeline.feed_accel_sample(0.0, 0.0, 9.8, 2100);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::SpeedBreaker);
    }

    #[test]
    fn test_pipelines_hand_out_distinct_ids() {
        let first_id = || {
            let mut pipeline = HazardPipeline::new(sim_config()).unwrap();
            pipeline.feed_speed(30.0, 12.9, 77.6, 0);
            let mut events = Vec::new();
            for (i, dz) in [0.0, 0.0, 0.0, 0.0, -22.0].iter().enumerate() {
                events.extend(pipeline.feed_accel_sample(0.0, 0.0, 9.8 + dz, i as i64 * 20));
            }
            assert_eq!(events.len(), 1);
            events[0].id.clone()
        };
        assert_ne!(first_id(), first_id());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DetectorConfig {
            window_min_fill: 0,
            ..DetectorConfig::default()
        };
        assert!(HazardPipeline::new(config).is_err());
    }
}

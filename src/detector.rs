//! Sliding-window classifier for vertical acceleration.
//!
//! ```text
//! Idle ──sample──▶ WindowFilling (len < min_fill)
//!                       │ len ≥ min_fill
//!                       ▼
//!                    Active ──match──▶ Cooldown (cooldown_ms) ──▶ WindowFilling
//! ```
//!
//! Classification order is speed breaker, pothole, broken patch; the first
//! match wins. A hit clears the window (unless disabled) so the same defect
//! cannot re-trigger from the samples that are still buffered.

use std::collections::VecDeque;

use crate::config::{BrokenPatchPolicy, DetectorConfig, ThresholdConfig};
use crate::smoothing::SpeedHistory;
use crate::threshold::ThresholdModel;
use crate::types::{RawEventType, ThresholdPair, VehicleProfile};

/// Bounded FIFO of `(z_accel, speed_kmh)` pairs.
#[derive(Clone, Debug)]
pub struct SlidingWindow {
    samples: VecDeque<(f64, f64)>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, z_accel: f64, speed_kmh: f64) {
        self.samples.push_back((z_accel, speed_kmh));
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn max_z(&self) -> f64 {
        self.samples.iter().map(|(z, _)| *z).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_z(&self) -> f64 {
        self.samples.iter().map(|(z, _)| *z).fold(f64::INFINITY, f64::min)
    }

    pub fn avg_speed(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|(_, s)| *s).sum::<f64>() / self.samples.len() as f64
    }

    /// `max - min` of the last `n` buffered speeds.
    pub fn speed_spread(&self, n: usize) -> f64 {
        spread(self.samples.iter().rev().take(n).map(|(_, s)| *s))
    }
}

fn spread(values: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min.is_finite() && max.is_finite() {
        max - min
    } else {
        0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    WindowFilling,
    Active,
    Cooldown,
}

/// Broken-patch rule, shared by both policies.
#[derive(Clone, Debug)]
struct BrokenPatchRule {
    spread_kmh: f64,
    max_avg_speed_kmh: f64,
    min_abs_z: f64,
    spread_samples: usize,
}

impl BrokenPatchRule {
    fn from_config(config: &ThresholdConfig) -> Self {
        Self {
            spread_kmh: config.broken_patch_spread_kmh,
            max_avg_speed_kmh: config.broken_patch_max_avg_speed_kmh,
            min_abs_z: config.broken_patch_min_abs_z,
            spread_samples: config.broken_patch_spread_samples,
        }
    }

    fn matches(&self, speed_spread: f64, avg_speed: f64, z_accel: f64) -> bool {
        speed_spread > self.spread_kmh
            && avg_speed < self.max_avg_speed_kmh
            && z_accel.abs() > self.min_abs_z
    }
}

/// Broken-patch detection with its own history and cooldown
/// (`BrokenPatchPolicy::Independent`).
#[derive(Clone, Debug)]
struct IndependentBrokenPatch {
    rule: BrokenPatchRule,
    speeds: VecDeque<f64>,
    capacity: usize,
    cooldown_ms: i64,
    last_event_time: Option<i64>,
}

impl IndependentBrokenPatch {
    fn new(rule: BrokenPatchRule, capacity: usize, cooldown_ms: i64) -> Self {
        Self {
            rule,
            speeds: VecDeque::with_capacity(capacity),
            capacity,
            cooldown_ms,
            last_event_time: None,
        }
    }

    fn record(&mut self, speed_kmh: f64) {
        self.speeds.push_back(speed_kmh);
        while self.speeds.len() > self.capacity {
            self.speeds.pop_front();
        }
    }

    fn evaluate(&mut self, z_accel: f64, timestamp_ms: i64) -> Option<RawEventType> {
        if let Some(last) = self.last_event_time {
            if timestamp_ms - last < self.cooldown_ms {
                return None;
            }
        }
        if self.speeds.len() <= self.rule.spread_samples {
            return None;
        }

        let avg = self.speeds.iter().sum::<f64>() / self.speeds.len() as f64;
        let speed_spread = spread(self.speeds.iter().rev().take(self.rule.spread_samples).copied());
        if !self.rule.matches(speed_spread, avg, z_accel) {
            return None;
        }

        log::info!(
            "EVENT DETECTED: BROKEN_PATCH (independent) -> spread {:.1} km/h, avg {:.1} km/h, |z| {:.2}",
            speed_spread,
            avg,
            z_accel.abs()
        );
        self.last_event_time = Some(timestamp_ms);
        self.speeds.clear();
        Some(RawEventType::BrokenPatch)
    }
}

pub struct EventDetector {
    window: SlidingWindow,
    speed_history: SpeedHistory,
    threshold_model: ThresholdModel,
    min_fill: usize,
    cooldown_ms: i64,
    clear_on_fire: bool,
    sb_negative_ratio: f64,
    pothole_min_speed_kmh: f64,
    shared_broken_patch: Option<BrokenPatchRule>,
    independent_broken_patch: Option<IndependentBrokenPatch>,
    last_event_time: Option<i64>,
    last_timestamp: Option<i64>,
    last_thresholds: Option<ThresholdPair>,
}

impl EventDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        let rule = BrokenPatchRule::from_config(&config.thresholds);
        let (shared_broken_patch, independent_broken_patch) = match config.broken_patch_policy {
            BrokenPatchPolicy::Shared => (Some(rule), None),
            BrokenPatchPolicy::Independent => (
                None,
                Some(IndependentBrokenPatch::new(
                    rule,
                    config.window_capacity,
                    config.cooldown_ms,
                )),
            ),
        };

        Self {
            window: SlidingWindow::new(config.window_capacity),
            speed_history: SpeedHistory::new(config.thresholds.speed_average_len),
            threshold_model: ThresholdModel::new(config.thresholds.clone()),
            min_fill: config.window_min_fill,
            cooldown_ms: config.cooldown_ms,
            clear_on_fire: config.clear_window_on_fire,
            sb_negative_ratio: config.thresholds.speed_breaker_negative_ratio,
            pothole_min_speed_kmh: config.thresholds.pothole_min_speed_kmh,
            shared_broken_patch,
            independent_broken_patch,
            last_event_time: None,
            last_timestamp: None,
            last_thresholds: None,
        }
    }

    /// Feed one reoriented vertical sample; returns a classification if one fires.
    pub fn on_sample(
        &mut self,
        z_accel: f64,
        speed_kmh: f64,
        profile: VehicleProfile,
        timestamp_ms: i64,
    ) -> Option<RawEventType> {
        if !z_accel.is_finite() || !speed_kmh.is_finite() {
            return None;
        }
        self.last_timestamp = Some(timestamp_ms);

        if let Some(ref mut bp) = self.independent_broken_patch {
            bp.record(speed_kmh);
        }

        let shared = self.evaluate_shared(z_accel, speed_kmh, profile, timestamp_ms);
        if shared.is_some() {
            return shared;
        }

        self.independent_broken_patch
            .as_mut()
            .and_then(|bp| bp.evaluate(z_accel, timestamp_ms))
    }

    fn evaluate_shared(
        &mut self,
        z_accel: f64,
        speed_kmh: f64,
        profile: VehicleProfile,
        timestamp_ms: i64,
    ) -> Option<RawEventType> {
        if self.in_cooldown(timestamp_ms) {
            return None;
        }

        self.speed_history.push(speed_kmh);
        let thresholds = self.threshold_model.thresholds(profile, &self.speed_history);
        self.last_thresholds = Some(thresholds);

        self.window.push(z_accel, speed_kmh);
        if self.window.len() < self.min_fill {
            return None;
        }

        let max_z = self.window.max_z();
        let min_z = self.window.min_z();
        let avg_speed = self.window.avg_speed();

        log::debug!(
            "Buffer Stats -> MaxZ: {:.3}, MinZ: {:.3}, AvgSpeed: {:.1}",
            max_z,
            min_z,
            avg_speed
        );

        let detected = if max_z > thresholds.speed_breaker
            && min_z < -thresholds.speed_breaker * self.sb_negative_ratio
        {
            log::info!(
                "EVENT DETECTED: SPEED_BREAKER -> maxZ {:.2} > {:.2}, minZ {:.2} < {:.2}",
                max_z,
                thresholds.speed_breaker,
                min_z,
                -thresholds.speed_breaker * self.sb_negative_ratio
            );
            Some(RawEventType::SpeedBreaker)
        } else if min_z < -thresholds.pothole && avg_speed > self.pothole_min_speed_kmh {
            log::info!(
                "EVENT DETECTED: POTHOLE -> minZ {:.2} < {:.2}, avgSpeed {:.1}",
                min_z,
                -thresholds.pothole,
                avg_speed
            );
            Some(RawEventType::Pothole)
        } else if let Some(ref rule) = self.shared_broken_patch {
            let speed_spread = self.window.speed_spread(rule.spread_samples);
            if rule.matches(speed_spread, avg_speed, z_accel) {
                log::info!(
                    "EVENT DETECTED: BROKEN_PATCH -> spread {:.1} km/h, avgSpeed {:.1}, |z| {:.2}",
                    speed_spread,
                    avg_speed,
                    z_accel.abs()
                );
                Some(RawEventType::BrokenPatch)
            } else {
                None
            }
        } else {
            None
        };

        if detected.is_some() {
            self.last_event_time = Some(timestamp_ms);
            if self.clear_on_fire {
                self.window.clear();
            }
        }

        detected
    }

    fn in_cooldown(&self, timestamp_ms: i64) -> bool {
        self.last_event_time
            .map(|last| timestamp_ms - last < self.cooldown_ms)
            .unwrap_or(false)
    }

    pub fn state(&self) -> DetectorState {
        match self.last_timestamp {
            None => DetectorState::Idle,
            Some(now) if self.in_cooldown(now) => DetectorState::Cooldown,
            Some(_) if self.window.len() < self.min_fill => DetectorState::WindowFilling,
            Some(_) => DetectorState::Active,
        }
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn last_thresholds(&self) -> Option<ThresholdPair> {
        self.last_thresholds
    }

    pub fn last_event_time(&self) -> Option<i64> {
        self.last_event_time
    }
}

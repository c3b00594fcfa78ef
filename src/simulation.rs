//! Synthetic drive traces with injected road hazards.
//!
//! The trace is a deterministic function of the config: accelerometer
//! samples at a fixed rate with gravity along a tilted mount plus low sensor
//! noise, and GPS fixes once per second following a stop → ramp → cruise
//! speed profile. Hazards are injected as vertical (vehicle-frame)
//! acceleration spikes:
//!
//! - speed breaker: +25 then −15 m/s² on consecutive samples
//! - pothole: a single −22 m/s² drop
//! - broken patch: five moderate jolts 150 ms apart while the vehicle
//!   crawls over the patch and its GPS speed jitters

use serde::{Deserialize, Serialize};

use crate::error::{HazardError, HazardResult};
use crate::types::{AccelSample, LocationFix};

const GRAVITY: f64 = 9.80;
const METERS_PER_DEG_LAT: f64 = 111_320.0;

const SPEED_BREAKER_SPIKES: [f64; 2] = [25.0, -15.0];
// |g + spike| must stay outside the near-static band of the orientation gate
const POTHOLE_SPIKE: f64 = -22.0;
const BROKEN_PATCH_JOLTS: [f64; 5] = [1.2, 1.5, 1.0, 1.4, 1.1];
const BROKEN_PATCH_JOLT_SPACING_MS: i64 = 150;
const BROKEN_PATCH_LEAD_MS: i64 = 200;
const BROKEN_PATCH_GPS_INTERVAL_MS: i64 = 40;
const BROKEN_PATCH_SPEEDS_KMH: [f64; 2] = [8.0, 24.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulatedHazard {
    SpeedBreaker,
    Pothole,
    BrokenPatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledHazard {
    pub at_ms: i64,
    pub kind: SimulatedHazard,
}

/// One input event, in the order it would reach the pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TraceSample {
    Accel(AccelSample),
    Location(LocationFix),
}

impl TraceSample {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            TraceSample::Accel(s) => s.timestamp_ms,
            TraceSample::Location(f) => f.timestamp_ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    pub duration_ms: i64,
    pub start_ms: i64,
    pub sample_interval_ms: i64,
    pub gps_interval_ms: i64,

    // ── Mount ──
    pub mount_pitch_deg: f64,
    pub mount_roll_deg: f64,
    pub noise_amplitude: f64,

    // ── Speed profile ──
    pub stopped_ms: i64,
    pub accel_kmh_per_s: f64,
    pub cruise_speed_kmh: f64,

    pub start_latitude: f64,
    pub start_longitude: f64,

    pub hazards: Vec<ScheduledHazard>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let duration_ms = 40_000;
        Self {
            duration_ms,
            start_ms: 0,
            sample_interval_ms: 20,
            gps_interval_ms: 1000,
            mount_pitch_deg: 35.0,
            mount_roll_deg: 5.0,
            noise_amplitude: 0.05,
            stopped_ms: 2000,
            accel_kmh_per_s: 2.5,
            cruise_speed_kmh: 25.0,
            start_latitude: 12.9716,
            start_longitude: 77.5946,
            hazards: default_schedule(duration_ms),
        }
    }
}

impl SimulationConfig {
    pub fn with_duration(duration_ms: i64) -> Self {
        Self {
            duration_ms,
            hazards: default_schedule(duration_ms),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> HazardResult<()> {
        if self.duration_ms <= 0 {
            return Err(invalid("duration_ms must be positive"));
        }
        if self.sample_interval_ms <= 0 || self.gps_interval_ms <= 0 {
            return Err(invalid(format!(
                "sample_interval_ms ({}) and gps_interval_ms ({}) must be positive",
                self.sample_interval_ms, self.gps_interval_ms
            )));
        }
        if self.stopped_ms < 0 {
            return Err(invalid("stopped_ms must be >= 0"));
        }
        let speeds = [self.accel_kmh_per_s, self.cruise_speed_kmh, self.noise_amplitude];
        if speeds.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(invalid(
                "accel_kmh_per_s, cruise_speed_kmh and noise_amplitude must be non-negative numbers",
            ));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> HazardError {
    HazardError::InvalidConfig(msg.into())
}

/// Speed breaker, pothole, broken patch, repeating every 8 s from 14 s on.
pub fn default_schedule(duration_ms: i64) -> Vec<ScheduledHazard> {
    let kinds = [
        SimulatedHazard::SpeedBreaker,
        SimulatedHazard::Pothole,
        SimulatedHazard::BrokenPatch,
    ];
    let last_start = duration_ms - 3000;
    (0..)
        .map(|i: i64| 14_000 + i * 8_000)
        .take_while(|at| *at <= last_start)
        .enumerate()
        .map(|(i, at_ms)| ScheduledHazard {
            at_ms,
            kind: kinds[i % kinds.len()],
        })
        .collect()
}

pub struct RoadSimulator {
    config: SimulationConfig,
}

impl RoadSimulator {
    pub fn new(config: SimulationConfig) -> HazardResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Speed (km/h) from the drive profile, before any hazard-specific jitter.
    pub fn profile_speed(&self, t_ms: i64) -> f64 {
        let c = &self.config;
        let moving_ms = (t_ms - c.start_ms - c.stopped_ms).max(0);
        (moving_ms as f64 / 1000.0 * c.accel_kmh_per_s).min(c.cruise_speed_kmh)
    }

    fn patch_speed(&self, t_ms: i64) -> Option<f64> {
        self.config
            .hazards
            .iter()
            .filter(|h| h.kind == SimulatedHazard::BrokenPatch)
            .find_map(|h| {
                let start = h.at_ms - BROKEN_PATCH_LEAD_MS;
                let end = h.at_ms + BROKEN_PATCH_JOLT_SPACING_MS * BROKEN_PATCH_JOLTS.len() as i64;
                if t_ms >= start && t_ms < end {
                    let step = ((t_ms - start) / BROKEN_PATCH_GPS_INTERVAL_MS) as usize;
                    Some(BROKEN_PATCH_SPEEDS_KMH[step % BROKEN_PATCH_SPEEDS_KMH.len()])
                } else {
                    None
                }
            })
    }

    fn speed_at(&self, t_ms: i64) -> f64 {
        self.patch_speed(t_ms).unwrap_or_else(|| self.profile_speed(t_ms))
    }

    fn is_gps_time(&self, t_ms: i64) -> bool {
        let rel = t_ms - self.config.start_ms;
        rel % self.config.gps_interval_ms == 0
            || (self.patch_speed(t_ms).is_some() && rel % BROKEN_PATCH_GPS_INTERVAL_MS == 0)
    }

    /// Vertical acceleration injected at `t_ms` (vehicle frame, m/s²).
    fn hazard_accel(&self, t_ms: i64) -> f64 {
        let dt = self.config.sample_interval_ms;
        self.config
            .hazards
            .iter()
            .map(|h| {
                let offset = t_ms - h.at_ms;
                if offset < 0 {
                    return 0.0;
                }
                match h.kind {
                    SimulatedHazard::SpeedBreaker => SPEED_BREAKER_SPIKES
                        .get((offset / dt) as usize)
                        .copied()
                        .unwrap_or(0.0),
                    SimulatedHazard::Pothole if offset < dt => POTHOLE_SPIKE,
                    SimulatedHazard::Pothole => 0.0,
                    SimulatedHazard::BrokenPatch
                        if offset % BROKEN_PATCH_JOLT_SPACING_MS < dt =>
                    {
                        BROKEN_PATCH_JOLTS
                            .get((offset / BROKEN_PATCH_JOLT_SPACING_MS) as usize)
                            .copied()
                            .unwrap_or(0.0)
                    }
                    SimulatedHazard::BrokenPatch => 0.0,
                }
            })
            .sum()
    }

    pub fn generate(&self) -> Vec<TraceSample> {
        let c = &self.config;
        let pitch = c.mount_pitch_deg.to_radians();
        let roll = c.mount_roll_deg.to_radians();
        // Unit "up" vector in the device frame for this mount
        let up = (-roll.sin(), roll.cos() * pitch.sin(), roll.cos() * pitch.cos());

        let mut trace = Vec::new();
        let mut latitude = c.start_latitude;
        let mut last_t = c.start_ms;
        let end = c.start_ms + c.duration_ms;

        let mut t = c.start_ms;
        let mut index: u64 = 0;
        while t < end {
            let speed = self.speed_at(t);
            latitude += speed / 3.6 * (t - last_t) as f64 / 1000.0 / METERS_PER_DEG_LAT;
            last_t = t;

            if self.is_gps_time(t) {
                trace.push(TraceSample::Location(LocationFix::new(
                    speed,
                    latitude,
                    c.start_longitude,
                    t,
                )));
            }

            let vertical = GRAVITY + self.hazard_accel(t);
            let i = index as f64;
            let amp = c.noise_amplitude;
            trace.push(TraceSample::Accel(AccelSample::new(
                vertical * up.0 + amp * (i * 0.7).sin(),
                vertical * up.1 + amp * (i * 1.3).cos(),
                vertical * up.2 + amp * (i * 2.1).sin(),
                t,
            )));

            index += 1;
            t += c.sample_interval_ms;
        }

        trace
    }
}

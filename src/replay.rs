//! Recorded session logs and offline replay.
//!
//! Log layout (plain JSON or gzip when the path ends in `.gz`):
//!
//! ```json
//! {"readings": [
//!   {"timestamp": 12.34,
//!    "accel": {"timestamp": 12.34, "x": 0.1, "y": 5.6, "z": 8.0},
//!    "gps": {"timestamp": 12.0, "latitude": 12.97, "longitude": 77.59, "speed": 6.9}}
//! ]}
//! ```
//!
//! Timestamps are seconds, GPS speed is m/s. Either payload may be absent.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;
use crate::error::{HazardError, HazardResult};
use crate::hazard_map::HazardMap;
use crate::pipeline::{HazardPipeline, PipelineStats};
use crate::simulation::TraceSample;
use crate::types::{AccelSample, LocationFix, RoadEvent};

const MS_PER_S: f64 = 1000.0;
const KMH_PER_MS: f64 = 3.6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelReading {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsReading {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// m/s
    pub speed: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default)]
    pub accuracy: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accel: Option<AccelReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsReading>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub readings: Vec<Reading>,
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

fn to_ms(seconds: f64) -> i64 {
    (seconds * MS_PER_S).round() as i64
}

impl SessionLog {
    pub fn load(path: impl AsRef<Path>) -> HazardResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let log: SessionLog = if is_gz(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
        } else {
            serde_json::from_reader(BufReader::new(file))?
        };
        if log.readings.is_empty() {
            return Err(HazardError::InvalidLog(format!(
                "{} contains no readings",
                path.display()
            )));
        }
        log::info!("Loaded {} readings from {}", log.readings.len(), path.display());
        Ok(log)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> HazardResult<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        if is_gz(path) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn from_trace(trace: &[TraceSample]) -> Self {
        let readings = trace
            .iter()
            .map(|sample| match sample {
                TraceSample::Accel(a) => Reading {
                    timestamp: a.timestamp_ms as f64 / MS_PER_S,
                    accel: Some(AccelReading {
                        timestamp: a.timestamp_ms as f64 / MS_PER_S,
                        x: a.x,
                        y: a.y,
                        z: a.z,
                    }),
                    gps: None,
                },
                TraceSample::Location(f) => Reading {
                    timestamp: f.timestamp_ms as f64 / MS_PER_S,
                    accel: None,
                    gps: Some(GpsReading {
                        timestamp: f.timestamp_ms as f64 / MS_PER_S,
                        latitude: f.latitude,
                        longitude: f.longitude,
                        speed: f.speed_kmh / KMH_PER_MS,
                        bearing: 0.0,
                        accuracy: 0.0,
                    }),
                },
            })
            .collect();
        SessionLog { readings }
    }

    /// Pipeline inputs in log order; a reading's fix precedes its sample.
    pub fn to_trace(&self) -> Vec<TraceSample> {
        let mut trace = Vec::with_capacity(self.readings.len());
        for reading in &self.readings {
            if let Some(ref gps) = reading.gps {
                trace.push(TraceSample::Location(LocationFix::new(
                    gps.speed * KMH_PER_MS,
                    gps.latitude,
                    gps.longitude,
                    to_ms(gps.timestamp),
                )));
            }
            if let Some(ref accel) = reading.accel {
                trace.push(TraceSample::Accel(AccelSample::new(
                    accel.x,
                    accel.y,
                    accel.z,
                    to_ms(accel.timestamp),
                )));
            }
        }
        trace
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProximityWarning {
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    pub events: Vec<RoadEvent>,
    pub warnings: Vec<ProximityWarning>,
    pub stats: PipelineStats,
}

/// Run a recorded session through a fresh pipeline.
///
/// With a hazard map, every fix is checked for nearby known hazards; a
/// warning is recorded each time the active warning changes.
pub fn replay(
    log: &SessionLog,
    config: DetectorConfig,
    hazards: Option<&HazardMap>,
) -> HazardResult<ReplayReport> {
    let mut pipeline = HazardPipeline::with_session_id(config, "replay")?;
    let mut events = Vec::new();
    let mut warnings = Vec::new();
    let mut active_warning: Option<String> = None;

    for sample in log.to_trace() {
        if let (TraceSample::Location(fix), Some(map)) = (&sample, hazards) {
            let warning = map.warning_at(fix.latitude, fix.longitude);
            match warning {
                Some(ref message) if warning != active_warning => {
                    log::info!("{} at ({:.6}, {:.6})", message, fix.latitude, fix.longitude);
                    warnings.push(ProximityWarning {
                        timestamp_ms: fix.timestamp_ms,
                        latitude: fix.latitude,
                        longitude: fix.longitude,
                        message: message.clone(),
                    });
                }
                _ => {}
            }
            active_warning = warning;
        }
        events.extend(pipeline.feed_trace_sample(&sample));
    }
    events.extend(pipeline.flush());

    let stats = pipeline.stats();
    log::info!(
        "Replay finished: {} events, {} warnings, {} samples",
        events.len(),
        warnings.len(),
        stats.accel_samples
    );

    Ok(ReplayReport {
        events,
        warnings,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hazard_map::{HazardKind, KnownHazard};
    use crate::simulation::{RoadSimulator, SimulationConfig};
    use crate::types::EventKind;

    fn sim_config() -> DetectorConfig {
        DetectorConfig {
            gravity_compensation: true,
            ..DetectorConfig::default()
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("road_hazard_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_parses_recorded_layout() {
        let json = r#"{"readings": [
            {"timestamp": 1.0, "gps": {"timestamp": 1.0, "latitude": 12.9, "longitude": 77.6,
                                       "speed": 5.0, "bearing": 90.0, "accuracy": 4.0}},
            {"timestamp": 1.02, "accel": {"timestamp": 1.02, "x": 0.0, "y": 0.1, "z": 9.8}},
            {"timestamp": 1.04, "gyro": {"timestamp": 1.04, "x": 0.0, "y": 0.0, "z": 0.0}}
        ]}"#;
        let log: SessionLog = serde_json::from_str(json).unwrap();
        let trace = log.to_trace();
        assert_eq!(trace.len(), 2);
        match trace[0] {
            TraceSample::Location(fix) => {
                assert!((fix.speed_kmh - 18.0).abs() < 1e-9);
                assert_eq!(fix.timestamp_ms, 1000);
            }
            _ => panic!("expected location first"),
        }
        assert_eq!(trace[1].timestamp_ms(), 1020);
    }

    #[test]
    fn test_gz_save_and_load() {
        let trace = RoadSimulator::new(SimulationConfig::with_duration(2000)).unwrap().generate();
        let log = SessionLog::from_trace(&trace);
        let path = temp_path("session.json.gz");
        log.save(&path).unwrap();
        let loaded = SessionLog::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.readings.len(), log.readings.len());
        assert_eq!(loaded.to_trace().len(), trace.len());
    }

    #[test]
    fn test_empty_log_rejected() {
        let path = temp_path("empty.json");
        SessionLog::default().save(&path).unwrap();
        let result = SessionLog::load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(HazardError::InvalidLog(_))));
    }

    #[test]
    fn test_replay_matches_live_run() {
        let trace = RoadSimulator::new(SimulationConfig::default()).unwrap().generate();
        let mut live = HazardPipeline::with_session_id(sim_config(), "replay").unwrap();
        let live_events = live.run_trace(&trace);

        let report = replay(&SessionLog::from_trace(&trace), sim_config(), None).unwrap();
        let kinds: Vec<EventKind> = report.events.iter().map(|e| e.kind).collect();
        let live_kinds: Vec<EventKind> = live_events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, live_kinds);
        assert_eq!(report.events.len(), 3);
        assert_eq!(report.stats.accel_samples, 2000);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_warning_raised_once_per_hazard() {
        let sim = SimulationConfig {
            hazards: Vec::new(),
            ..SimulationConfig::with_duration(20_000)
        };
        let trace = RoadSimulator::new(sim).unwrap().generate();
        // Place a known pothole on the route near the 15 s fix
        let fix_at_15s = trace
            .iter()
            .find_map(|s| match s {
                TraceSample::Location(f) if f.timestamp_ms == 15_000 => Some(*f),
                _ => None,
            })
            .unwrap();
        let map = HazardMap::from_hazards(vec![KnownHazard {
            latitude: fix_at_15s.latitude,
            longitude: fix_at_15s.longitude,
            kind: HazardKind::Pothole,
        }]);

        let report = replay(&SessionLog::from_trace(&trace), sim_config(), Some(&map)).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].message, "Pothole Ahead");
        assert!(report.events.is_empty());
    }
}

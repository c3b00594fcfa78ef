pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Raw accelerometer sample, device frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp_ms: i64,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: i64) -> Self {
        Self {
            x,
            y,
            z,
            timestamp_ms,
        }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn as_vector(&self) -> AccelVec {
        AccelVec::new(self.x, self.y, self.z)
    }
}

/// Latest location-derived reading. Speed is km/h.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub speed_kmh: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: i64,
}

impl LocationFix {
    pub fn new(speed_kmh: f64, latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            speed_kmh,
            latitude,
            longitude,
            timestamp_ms,
        }
    }

    /// Speed must be finite and non-negative, coordinates finite.
    pub fn is_valid(&self) -> bool {
        self.speed_kmh.is_finite()
            && self.speed_kmh >= 0.0
            && self.latitude.is_finite()
            && self.longitude.is_finite()
    }
}

/// Vehicle class, selects the base detection thresholds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleProfile {
    #[default]
    TwoWheeler,
    ThreeWheeler,
    FourWheeler,
    Bus,
}

impl std::str::FromStr for VehicleProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "two-wheeler" | "2w" => Ok(VehicleProfile::TwoWheeler),
            "three-wheeler" | "3w" => Ok(VehicleProfile::ThreeWheeler),
            "four-wheeler" | "4w" => Ok(VehicleProfile::FourWheeler),
            "bus" => Ok(VehicleProfile::Bus),
            other => Err(format!("unknown vehicle profile: {other}")),
        }
    }
}

/// Detection thresholds (m/s²) for one sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub speed_breaker: f64,
    pub pothole: f64,
}

/// Classification produced by the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawEventType {
    SpeedBreaker,
    Pothole,
    BrokenPatch,
}

/// Kind of an emitted road event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    SpeedBreaker,
    Pothole,
    BrokenPatch,
    MultipleSpeedBreakers,
}

impl EventKind {
    /// Hazard type string used by the remote hazard service.
    pub fn api_type(&self) -> &'static str {
        match self {
            EventKind::SpeedBreaker => "SINGLE_SPEED_BUMP",
            EventKind::MultipleSpeedBreakers => "MULTIPLE_SPEED_BUMP",
            EventKind::Pothole => "POTHOLE",
            EventKind::BrokenPatch => "ROAD_PATCH",
        }
    }
}

impl From<RawEventType> for EventKind {
    fn from(raw: RawEventType) -> Self {
        match raw {
            RawEventType::SpeedBreaker => EventKind::SpeedBreaker,
            RawEventType::Pothole => EventKind::Pothole,
            RawEventType::BrokenPatch => EventKind::BrokenPatch,
        }
    }
}

/// A classified, de-duplicated hazard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: i64,
    pub confidence: f32,
    pub speed_kmh: f32,
    #[serde(default)]
    pub confirmed: bool,
}

impl RoadEvent {
    /// Copy of this event marked as confirmed by the user.
    pub fn confirm(self) -> Self {
        Self {
            confirmed: true,
            ..self
        }
    }
}

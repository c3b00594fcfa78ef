//! Known hazards and proximity warnings.
//!
//! Hazards reported by the backend are indexed in an R-tree keyed on
//! (longitude, latitude). A query first narrows candidates with a degree
//! envelope around the position, then filters by great-circle distance.

use std::path::Path;

use geo::{HaversineDistance, Point};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::error::HazardResult;
use crate::types::{EventKind, RoadEvent};

pub const DEFAULT_WARNING_RADIUS_M: f64 = 30.0;

const METERS_PER_DEG_LAT: f64 = 111_320.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    SpeedBreaker,
    Pothole,
    BrokenPatch,
    Unknown,
}

impl HazardKind {
    /// Backend hazard type string → local kind. Both speed bump variants
    /// collapse to `SpeedBreaker`.
    pub fn from_api_type(api_type: &str) -> Self {
        match api_type {
            "SINGLE_SPEED_BUMP" | "MULTIPLE_SPEED_BUMP" => HazardKind::SpeedBreaker,
            "POTHOLE" => HazardKind::Pothole,
            "ROAD_PATCH" => HazardKind::BrokenPatch,
            _ => HazardKind::Unknown,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            HazardKind::SpeedBreaker => "Speed Breaker",
            HazardKind::Pothole => "Pothole",
            HazardKind::BrokenPatch => "Broken Patch",
            HazardKind::Unknown => "Hazard",
        }
    }
}

impl From<EventKind> for HazardKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::SpeedBreaker | EventKind::MultipleSpeedBreakers => HazardKind::SpeedBreaker,
            EventKind::Pothole => HazardKind::Pothole,
            EventKind::BrokenPatch => HazardKind::BrokenPatch,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnownHazard {
    pub latitude: f64,
    pub longitude: f64,
    pub kind: HazardKind,
}

impl KnownHazard {
    pub fn distance_m(&self, latitude: f64, longitude: f64) -> f64 {
        Point::new(self.longitude, self.latitude).haversine_distance(&Point::new(longitude, latitude))
    }
}

impl From<&RoadEvent> for KnownHazard {
    fn from(event: &RoadEvent) -> Self {
        KnownHazard {
            latitude: event.latitude,
            longitude: event.longitude,
            kind: event.kind.into(),
        }
    }
}

/// Hazard record as served by the backend.
#[derive(Debug, Deserialize)]
struct HazardRecord {
    latitude: f64,
    longitude: f64,
    #[serde(rename = "hazardType")]
    hazard_type: String,
}

type IndexedHazard = GeomWithData<[f64; 2], KnownHazard>;

pub struct HazardMap {
    tree: RTree<IndexedHazard>,
}

impl Default for HazardMap {
    fn default() -> Self {
        Self::new()
    }
}

impl HazardMap {
    pub fn new() -> Self {
        HazardMap { tree: RTree::new() }
    }

    pub fn from_hazards(hazards: Vec<KnownHazard>) -> Self {
        let entries = hazards
            .into_iter()
            .map(|h| GeomWithData::new([h.longitude, h.latitude], h))
            .collect();
        HazardMap {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Load `[{"latitude", "longitude", "hazardType"}, ...]`.
    pub fn from_json_file(path: impl AsRef<Path>) -> HazardResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let records: Vec<HazardRecord> = serde_json::from_str(&text)?;
        let hazards: Vec<KnownHazard> = records
            .into_iter()
            .map(|r| KnownHazard {
                latitude: r.latitude,
                longitude: r.longitude,
                kind: HazardKind::from_api_type(&r.hazard_type),
            })
            .collect();
        log::info!("Loaded {} known hazards", hazards.len());
        Ok(Self::from_hazards(hazards))
    }

    pub fn insert(&mut self, hazard: KnownHazard) {
        self.tree
            .insert(GeomWithData::new([hazard.longitude, hazard.latitude], hazard));
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Closest hazard within `radius_m` of the position, if any.
    pub fn nearest_within(&self, latitude: f64, longitude: f64, radius_m: f64) -> Option<KnownHazard> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        let dlat = radius_m / METERS_PER_DEG_LAT;
        let dlon = radius_m / (METERS_PER_DEG_LAT * latitude.to_radians().cos().abs().max(1e-6));
        let envelope = AABB::from_corners(
            [longitude - dlon, latitude - dlat],
            [longitude + dlon, latitude + dlat],
        );

        self.tree
            .locate_in_envelope(&envelope)
            .map(|entry| (entry.data, entry.data.distance_m(latitude, longitude)))
            .filter(|(_, d)| *d <= radius_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(hazard, _)| hazard)
    }

    /// `"<Kind> Ahead"` when a hazard lies within the default warning radius.
    pub fn warning_at(&self, latitude: f64, longitude: f64) -> Option<String> {
        self.nearest_within(latitude, longitude, DEFAULT_WARNING_RADIUS_M)
            .map(|h| format!("{} Ahead", h.kind.display_name()))
    }
}

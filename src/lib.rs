pub mod aggregator;
pub mod config;
pub mod detector;
pub mod error;
pub mod hazard_map;
pub mod orientation;
pub mod pipeline;
pub mod reorient;
pub mod replay;
pub mod service;
pub mod simulation;
pub mod smoothing;
pub mod threshold;
pub mod types;

pub use aggregator::{EventAggregator, EventContext};
pub use config::{BrokenPatchPolicy, DetectorConfig, OrientationConfig, ThresholdConfig};
pub use detector::{DetectorState, EventDetector, SlidingWindow};
pub use error::{HazardError, HazardResult};
pub use hazard_map::{HazardKind, HazardMap, KnownHazard};
pub use orientation::{OrientationEstimator, OrientationState};
pub use pipeline::{HazardPipeline, LocationCell, PipelineStats};
pub use reorient::{AxisReorienter, VehicleAccel};
pub use replay::{replay, ReplayReport, SessionLog};
pub use service::{HazardHandle, HazardService};
pub use simulation::{RoadSimulator, SimulationConfig, TraceSample};
pub use threshold::ThresholdModel;
pub use types::{
    AccelSample, EventKind, LocationFix, RawEventType, RoadEvent, ThresholdPair, VehicleProfile,
};

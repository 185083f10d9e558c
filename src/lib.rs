pub mod config;
pub mod constants;
pub mod detector;
pub mod error;
pub mod output;
pub mod service;
pub mod signal_processing;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use config::DistanceConfig;
pub use detector::{DetectorState, DistanceDetector, DistanceResult, Metadata, ResultInfo};
pub use error::{DetectorError, Result};
pub use service::{ReplayService, SensorService};

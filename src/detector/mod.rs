mod handle;
mod pipeline;

use serde::Serialize;

pub use handle::DistanceDetector;

/// Lifecycle state of a [`DistanceDetector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Configured, no service binding
    Created,
    /// Bound to the service and ready to record or sample
    Activated,
    /// Binding released; configuration and background kept
    Deactivated,
    /// Terminal
    Destroyed,
}

impl DetectorState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::Destroyed => "destroyed",
        }
    }
}

/// Measurement layout after quantization by the sensor service
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metadata {
    /// Actual start of measurement in meters
    pub start_m: f32,
    /// Actual length of measurement in meters
    pub length_m: f32,
    /// Distance between reported bins in meters
    pub step_length_m: f32,
    /// Number of values in a background profile
    pub background_length: usize,
}

/// One detected reflector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DistanceResult {
    pub amplitude: u16,
    pub distance_m: f32,
}

/// Diagnostics reported with every `get_next`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultInfo {
    /// Valid entries written to the result buffer
    pub result_count: usize,
    /// Peaks found after merging, before truncation to the buffer
    pub peaks_found: usize,
    /// Results produced since activation
    pub sweep_index: u64,
    /// Service sequence number of the last sweep used
    pub sequence: u64,
    /// Sweeps averaged into this result
    pub sweeps_averaged: u16,
    /// The receiver clipped in at least one of the sweeps
    pub saturated: bool,
    /// The service dropped sweeps before this result
    pub missed_data: bool,
}

/// Outcome of a background recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordedBackgroundInfo {
    /// Sweeps reduced into the profile
    pub sweeps_used: usize,
    /// Sweeps in which the receiver clipped
    pub saturated_sweeps: usize,
    /// Largest value in the profile
    pub max_amplitude: u16,
}

//! Configuration for the envelope distance detector.
//!
//! All detection parameters live in one [`DistanceConfig`]. Fields are plain
//! values and may be set in any combination; incompatible combinations are
//! only rejected by [`DistanceConfig::validate`], which the detector runs on
//! `activate` and `reconfigure`.
//!
//! A configuration can also be loaded from TOML. Missing keys keep their
//! defaults:
//!
//! ```toml
//! start_m = 0.25
//! length_m = 1.0
//! threshold_type = "cfar"
//! peak_sorting = "closest-first"
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_HW_ACCELERATED_AVERAGE_SAMPLES, MAX_RANGE_M};
use crate::error::{DetectorError, Result};

/// Sensor timing and gain preset
///
/// Lower profiles use shorter pulses (better resolution, less energy),
/// higher profiles use longer pulses (more range, coarser resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProfile {
    Profile1,
    Profile2,
    Profile3,
    Profile4,
    Profile5,
}

impl ServiceProfile {
    /// Approximate envelope pulse width at half amplitude in meters
    pub fn pulse_width_m(&self) -> f32 {
        match self {
            Self::Profile1 => 0.04,
            Self::Profile2 => 0.07,
            Self::Profile3 => 0.14,
            Self::Profile4 => 0.19,
            Self::Profile5 => 0.32,
        }
    }
}

/// Threshold algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdType {
    /// Same threshold at every distance
    Fixed,
    /// Threshold derived from a recorded background profile
    Recorded,
    /// Constant false alarm rate threshold from neighbouring bins
    Cfar,
}

/// Order in which detected peaks are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PeakSorting {
    /// Ascending distance
    ClosestFirst,
    /// Descending amplitude
    StrongestFirst,
    /// Descending amplitude corrected for point-reflector attenuation
    StrongestReflectorFirst,
    /// Descending amplitude corrected for flat-reflector attenuation
    StrongestFlatReflectorFirst,
}

impl PeakSorting {
    /// Whether the policy applies a distance-dependent attenuation correction
    pub fn corrects_attenuation(&self) -> bool {
        matches!(
            self,
            Self::StrongestReflectorFirst | Self::StrongestFlatReflectorFirst
        )
    }
}

/// How recorded background sweeps are reduced to one profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundReducer {
    /// Per-bin arithmetic mean
    Mean,
    /// Per-bin median, robust to occasional interference
    Median,
    /// Per-bin maximum, the most conservative baseline
    Maximum,
}

/// Caller-supplied handler invoked with every processed sweep
///
/// The handler runs synchronously inside `get_next`, before peak detection.
#[derive(Clone)]
pub struct SweepCallback(Arc<dyn Fn(&[u16]) + Send + Sync>);

impl SweepCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&[u16]) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub fn call(&self, sweep: &[u16]) {
        (self.0)(sweep)
    }
}

impl fmt::Debug for SweepCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SweepCallback(..)")
    }
}

/// Distance detector configuration
///
/// Use `DistanceConfig::default()` for sensible defaults and change fields
/// as needed. Creating a detector copies the configuration, so later edits
/// to this value do not affect a running detector.
///
/// # Example
/// ```
/// use radar_distance::config::{DistanceConfig, PeakSorting, ThresholdType};
///
/// let mut config = DistanceConfig::default();
/// config.start_m = 0.3;
/// config.length_m = 1.5;
/// config.threshold_type = ThresholdType::Cfar;
/// config.peak_sorting = PeakSorting::ClosestFirst;
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Sensor to bind
    pub sensor: u32,
    /// Requested start of measurement in meters (may be negative)
    pub start_m: f32,
    /// Requested length of measurement in meters
    pub length_m: f32,
    /// Keep every n-th distance bin
    pub downsampling_factor: u16,
    /// Sensor timing and gain preset
    pub service_profile: ServiceProfile,
    /// Ask the sensor to attenuate the signal as much as possible
    pub maximize_signal_attenuation: bool,
    /// Receiver gain (0-1 range)
    pub receiver_gain: f32,
    /// Samples averaged in hardware per distance bin
    pub hw_accelerated_average_samples: u8,
    /// Sweeps averaged in software per result
    pub sweep_averaging: u16,
    /// Threshold algorithm
    pub threshold_type: ThresholdType,
    /// Threshold amplitude for `ThresholdType::Fixed`, at reference gain
    pub fixed_threshold: u16,
    /// Sweeps to record when calibrating the background
    pub record_background_sweeps: u16,
    /// Reduction applied to recorded background sweeps
    pub background_reducer: BackgroundReducer,
    /// Threshold sensitivity (0-1 range, higher detects weaker peaks)
    pub threshold_sensitivity: f32,
    /// CFAR distance between bin under test and reference window in meters
    pub cfar_guard_m: f32,
    /// CFAR reference window width in meters
    pub cfar_window_m: f32,
    /// CFAR only uses reference bins closer than the bin under test
    pub cfar_only_lower_distance: bool,
    /// Order of reported peaks
    pub peak_sorting: PeakSorting,
    /// Peaks closer than this are merged, in meters
    pub peak_merge_limit_m: f32,
    /// Optional handler called with every processed sweep
    #[serde(skip)]
    pub sweep_callback: Option<SweepCallback>,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            sensor: 1,
            start_m: 0.2,
            length_m: 0.6,
            downsampling_factor: 1,
            service_profile: ServiceProfile::Profile2,
            maximize_signal_attenuation: false,
            receiver_gain: 0.7,
            hw_accelerated_average_samples: 10,
            sweep_averaging: 5,
            threshold_type: ThresholdType::Fixed,
            fixed_threshold: 400,
            record_background_sweeps: 20,
            background_reducer: BackgroundReducer::Mean,
            threshold_sensitivity: 0.5,
            cfar_guard_m: 0.12,
            cfar_window_m: 0.03,
            cfar_only_lower_distance: false,
            peak_sorting: PeakSorting::StrongestFirst,
            peak_merge_limit_m: 0.005,
            sweep_callback: None,
        }
    }
}

impl DistanceConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DetectorError::config("toml", e.to_string()))
    }

    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DetectorError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every field and field combination
    ///
    /// Returns the first offending field as `DetectorError::Configuration`.
    pub fn validate(&self) -> Result<()> {
        if !self.start_m.is_finite() || self.start_m.abs() > MAX_RANGE_M {
            return Err(DetectorError::config(
                "start_m",
                format!("must be within ±{} m, got {}", MAX_RANGE_M, self.start_m),
            ));
        }
        if !self.length_m.is_finite() || self.length_m <= 0.0 || self.length_m > MAX_RANGE_M {
            return Err(DetectorError::config(
                "length_m",
                format!("must be within 0-{} m, got {}", MAX_RANGE_M, self.length_m),
            ));
        }
        if self.downsampling_factor < 1 {
            return Err(DetectorError::config("downsampling_factor", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.receiver_gain) {
            return Err(DetectorError::config(
                "receiver_gain",
                format!("must be within 0-1, got {}", self.receiver_gain),
            ));
        }
        if self.hw_accelerated_average_samples < 1
            || self.hw_accelerated_average_samples > MAX_HW_ACCELERATED_AVERAGE_SAMPLES
        {
            return Err(DetectorError::config(
                "hw_accelerated_average_samples",
                format!(
                    "must be within 1-{}, got {}",
                    MAX_HW_ACCELERATED_AVERAGE_SAMPLES, self.hw_accelerated_average_samples
                ),
            ));
        }
        if self.sweep_averaging < 1 {
            return Err(DetectorError::config("sweep_averaging", "must be at least 1"));
        }
        if self.record_background_sweeps < 1 {
            return Err(DetectorError::config(
                "record_background_sweeps",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold_sensitivity) {
            return Err(DetectorError::config(
                "threshold_sensitivity",
                format!("must be within 0-1, got {}", self.threshold_sensitivity),
            ));
        }
        if !(0.0..=MAX_RANGE_M).contains(&self.cfar_guard_m) {
            return Err(DetectorError::config(
                "cfar_guard_m",
                format!("must be within 0-{} m, got {}", MAX_RANGE_M, self.cfar_guard_m),
            ));
        }
        if !self.cfar_window_m.is_finite()
            || self.cfar_window_m <= 0.0
            || self.cfar_window_m > MAX_RANGE_M
        {
            return Err(DetectorError::config(
                "cfar_window_m",
                format!("must be within 0-{} m, got {}", MAX_RANGE_M, self.cfar_window_m),
            ));
        }
        if !(0.0..=MAX_RANGE_M).contains(&self.peak_merge_limit_m) {
            return Err(DetectorError::config(
                "peak_merge_limit_m",
                format!(
                    "must be within 0-{} m, got {}",
                    MAX_RANGE_M, self.peak_merge_limit_m
                ),
            ));
        }
        if self.peak_sorting.corrects_attenuation() && self.start_m < 0.0 {
            return Err(DetectorError::config(
                "peak_sorting",
                format!(
                    "{:?} cannot be combined with negative start_m ({})",
                    self.peak_sorting, self.start_m
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(config: &DistanceConfig) -> &'static str {
        match config.validate() {
            Err(DetectorError::Configuration { field, .. }) => field,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DistanceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut config = DistanceConfig::default();
        config.length_m = 0.0;
        assert_eq!(invalid_field(&config), "length_m");
    }

    #[test]
    fn test_distances_beyond_max_range_rejected() {
        let cases: [(fn(&mut DistanceConfig, f32), &str); 5] = [
            (|c, v| c.start_m = -v, "start_m"),
            (|c, v| c.length_m = v, "length_m"),
            (|c, v| c.cfar_guard_m = v, "cfar_guard_m"),
            (|c, v| c.cfar_window_m = v, "cfar_window_m"),
            (|c, v| c.peak_merge_limit_m = v, "peak_merge_limit_m"),
        ];
        for (set, field) in cases {
            for value in [1e30, MAX_RANGE_M * 1.01, f32::INFINITY, f32::NAN] {
                let mut config = DistanceConfig::default();
                set(&mut config, value);
                assert_eq!(invalid_field(&config), field, "{} = {}", field, value);
            }

            let mut config = DistanceConfig::default();
            set(&mut config, MAX_RANGE_M);
            assert!(config.validate().is_ok(), "{} at the limit", field);
        }
    }

    #[test]
    fn test_zero_downsampling_rejected() {
        let mut config = DistanceConfig::default();
        config.downsampling_factor = 0;
        assert_eq!(invalid_field(&config), "downsampling_factor");
    }

    #[test]
    fn test_reflector_sorting_with_negative_start_rejected() {
        for sorting in [
            PeakSorting::StrongestReflectorFirst,
            PeakSorting::StrongestFlatReflectorFirst,
        ] {
            let mut config = DistanceConfig::default();
            config.start_m = -0.1;
            config.peak_sorting = sorting;
            assert_eq!(invalid_field(&config), "peak_sorting");
        }
    }

    #[test]
    fn test_negative_start_allowed_for_plain_sorting() {
        let mut config = DistanceConfig::default();
        config.start_m = -0.1;
        config.peak_sorting = PeakSorting::ClosestFirst;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_gain_and_sensitivity_rejected() {
        let mut config = DistanceConfig::default();
        config.receiver_gain = 1.5;
        assert_eq!(invalid_field(&config), "receiver_gain");

        let mut config = DistanceConfig::default();
        config.threshold_sensitivity = -0.1;
        assert_eq!(invalid_field(&config), "threshold_sensitivity");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DistanceConfig::from_toml_str(
            r#"
            start_m = 0.5
            threshold_type = "cfar"
            peak_sorting = "strongest-flat-reflector-first"
            background_reducer = "median"
            "#,
        )
        .unwrap();

        assert_eq!(config.start_m, 0.5);
        assert_eq!(config.threshold_type, ThresholdType::Cfar);
        assert_eq!(
            config.peak_sorting,
            PeakSorting::StrongestFlatReflectorFirst
        );
        assert_eq!(config.background_reducer, BackgroundReducer::Median);
        assert_eq!(config.length_m, DistanceConfig::default().length_m);
        assert!(config.sweep_callback.is_none());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = DistanceConfig::from_toml_str("length_m = \"long\"").unwrap_err();
        assert!(matches!(
            err,
            DetectorError::Configuration { field: "toml", .. }
        ));
    }

    #[test]
    fn test_copy_is_independent() {
        let mut original = DistanceConfig::default();
        let copy = original.clone();
        original.length_m = 3.0;
        assert_eq!(copy.length_m, DistanceConfig::default().length_m);
    }
}

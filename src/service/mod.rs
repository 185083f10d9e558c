//! Boundary to the sensor service that owns timing and produces sweeps.
//!
//! The detector only needs three operations from a service: bind a sensor
//! with a measurement window, pull the next sweep (blocking), and unbind.
//! Deadlines are the service's business and are reported as
//! [`ServiceError::Timeout`].

pub mod channel;
pub mod replay;

use std::time::Duration;

use num_complex::Complex;
use thiserror::Error;

use crate::config::{DistanceConfig, ServiceProfile};
use crate::constants::{MAX_SWEEP_BINS, QUANTIZATION_TOLERANCE};

pub use channel::ChannelService;
pub use replay::{ReplayService, SweepFileHeader, SweepRecord, write_sweep_file};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("binding rejected: {0}")]
    Rejected(String),

    #[error("no sweep within {0:?}")]
    Timeout(Duration),

    #[error("sweep source disconnected")]
    Disconnected,

    #[error("short sweep: expected {expected} samples, got {actual}")]
    ShortData { expected: usize, actual: usize },

    #[error("unknown binding {0}")]
    UnknownBinding(u64),

    #[error("sweep source error: {0}")]
    Source(String),
}

/// Everything a service needs to set up a measurement
#[derive(Debug, Clone, PartialEq)]
pub struct BindRequest {
    pub sensor: u32,
    pub profile: ServiceProfile,
    pub start_m: f32,
    pub length_m: f32,
    pub receiver_gain: f32,
    pub hw_accelerated_average_samples: u8,
    pub maximize_signal_attenuation: bool,
}

impl BindRequest {
    pub fn from_config(config: &DistanceConfig) -> Self {
        Self {
            sensor: config.sensor,
            profile: config.service_profile,
            start_m: config.start_m,
            length_m: config.length_m,
            receiver_gain: config.receiver_gain,
            hw_accelerated_average_samples: config.hw_accelerated_average_samples,
            maximize_signal_attenuation: config.maximize_signal_attenuation,
        }
    }
}

/// Distance layout of the bins in a sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepGeometry {
    /// Distance of bin 0 in meters
    pub start_m: f32,
    /// Distance between consecutive bins in meters
    pub step_length_m: f32,
    /// Number of bins
    pub data_length: usize,
}

impl SweepGeometry {
    /// Snap a requested window onto a grid of `step_length_m`
    ///
    /// The start is rounded to the nearest bin; the length is rounded up so
    /// the window always covers the requested range. Only a shortfall within
    /// f32 noise of a whole bin count is rounded down.
    pub fn quantize(start_m: f32, length_m: f32, step_length_m: f32) -> Self {
        let start_bin = (start_m / step_length_m).round();
        let bins = f64::from(length_m) / f64::from(step_length_m);
        let data_length = (bins * (1.0 - QUANTIZATION_TOLERANCE)).ceil().max(1.0);
        Self {
            start_m: start_bin * step_length_m,
            step_length_m,
            data_length: data_length as usize,
        }
    }

    pub fn length_m(&self) -> f32 {
        self.data_length as f32 * self.step_length_m
    }

    pub fn end_m(&self) -> f32 {
        self.start_m + self.length_m()
    }

    /// Distance of a (possibly fractional) bin position
    pub fn distance_at(&self, bin: f32) -> f32 {
        self.start_m + bin * self.step_length_m
    }

    /// Geometry after keeping every `factor`-th bin
    pub fn decimated(&self, factor: usize) -> Self {
        let factor = factor.max(1);
        Self {
            start_m: self.start_m,
            step_length_m: self.step_length_m * factor as f32,
            data_length: self.data_length.div_ceil(factor),
        }
    }
}

/// Handle to an active service binding
#[derive(Debug)]
pub struct ServiceBinding {
    id: u64,
    geometry: SweepGeometry,
}

impl ServiceBinding {
    pub fn new(id: u64, geometry: SweepGeometry) -> Self {
        Self { id, geometry }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn geometry(&self) -> &SweepGeometry {
        &self.geometry
    }
}

/// Per-sweep status reported by the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepInfo {
    /// Monotonic sweep counter of the binding
    pub sequence: u64,
    /// The receiver clipped during this sweep
    pub saturated: bool,
    /// At least one sweep was dropped before this one
    pub missed_data: bool,
}

/// Sweep data as delivered by a service
#[derive(Debug, Clone, PartialEq)]
pub enum RawSweep {
    /// Amplitude per bin
    Envelope(Vec<u16>),
    /// Complex baseband sample per bin
    Iq(Vec<Complex<f32>>),
}

impl Default for RawSweep {
    fn default() -> Self {
        Self::Envelope(Vec::new())
    }
}

impl RawSweep {
    pub fn len(&self) -> usize {
        match self {
            Self::Envelope(data) => data.len(),
            Self::Iq(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the amplitude of every bin into `out`
    pub fn envelope_into(&self, out: &mut Vec<f32>) {
        out.clear();
        match self {
            Self::Envelope(data) => out.extend(data.iter().map(|&v| v as f32)),
            Self::Iq(data) => out.extend(data.iter().map(|z| z.norm())),
        }
    }

    /// Copy `len` bins starting at `offset` into `out`, reusing its storage
    pub fn copy_window_into(
        &self,
        offset: usize,
        len: usize,
        out: &mut RawSweep,
    ) -> Result<(), ServiceError> {
        let needed = offset.saturating_add(len);
        if self.len() < needed {
            return Err(ServiceError::ShortData {
                expected: needed,
                actual: self.len(),
            });
        }
        match (self, out) {
            (Self::Envelope(src), Self::Envelope(dst)) => {
                dst.clear();
                dst.extend_from_slice(&src[offset..needed]);
            }
            (Self::Iq(src), Self::Iq(dst)) => {
                dst.clear();
                dst.extend_from_slice(&src[offset..needed]);
            }
            (Self::Envelope(src), dst) => {
                *dst = Self::Envelope(src[offset..needed].to_vec());
            }
            (Self::Iq(src), dst) => {
                *dst = Self::Iq(src[offset..needed].to_vec());
            }
        }
        Ok(())
    }
}

/// A sensor service the detector can bind and pull sweeps from
pub trait SensorService: Send {
    /// Set up a measurement and report its quantized geometry
    fn bind(&mut self, request: &BindRequest) -> Result<ServiceBinding, ServiceError>;

    /// Block until the next sweep is available and write it into `sweep`
    fn pull_sweep(
        &mut self,
        binding: &ServiceBinding,
        sweep: &mut RawSweep,
    ) -> Result<SweepInfo, ServiceError>;

    /// Release a binding
    fn unbind(&mut self, binding: ServiceBinding);
}

/// Window of a recorded sweep stream, used by services that replay data
/// captured over a fixed distance range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RecordedWindow {
    pub start_m: f32,
    pub step_length_m: f32,
}

impl RecordedWindow {
    /// Quantize a request onto the recording grid
    ///
    /// Returns the geometry and the bin offset of its start within recorded
    /// sweeps. Requests starting before the recording, or spanning more than
    /// [`MAX_SWEEP_BINS`], are rejected.
    pub fn bind_geometry(
        &self,
        request: &BindRequest,
    ) -> Result<(SweepGeometry, usize), ServiceError> {
        if !self.step_length_m.is_finite() || self.step_length_m <= 0.0 {
            return Err(ServiceError::Rejected(format!(
                "invalid step length {}",
                self.step_length_m
            )));
        }
        let geometry =
            SweepGeometry::quantize(request.start_m, request.length_m, self.step_length_m);
        let offset = ((geometry.start_m - self.start_m) / self.step_length_m).round();
        if offset < 0.0 {
            return Err(ServiceError::Rejected(format!(
                "start {:.3} m is before recorded start {:.3} m",
                request.start_m, self.start_m
            )));
        }
        if geometry.data_length > MAX_SWEEP_BINS || offset > MAX_SWEEP_BINS as f32 {
            return Err(ServiceError::Rejected(format!(
                "{:.3} m from {:.3} m spans more than {} bins",
                request.length_m, request.start_m, MAX_SWEEP_BINS
            )));
        }
        Ok((geometry, offset as usize))
    }
}

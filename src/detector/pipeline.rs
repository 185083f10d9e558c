use crate::config::{DistanceConfig, PeakSorting};
use crate::detector::Metadata;
use crate::error::Result;
use crate::service::{RawSweep, SensorService, ServiceBinding, ServiceError, SweepGeometry};
use crate::signal_processing::{
    BackgroundProfile, Peak, PeakDetector, SweepAverager, ThresholdEngine, decimate_into,
    merge_peaks, sort_peaks, to_amplitudes_into,
};

/// Status of the sweeps that went into one processed sweep
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct SweepStatus {
    pub sequence: u64,
    pub saturated: bool,
    pub missed_data: bool,
}

/// Per-binding processing state
///
/// Everything that depends on the bound geometry lives here, with scratch
/// buffers sized once so that sampling does not allocate.
pub(super) struct Pipeline {
    raw_length: usize,
    downsampling: usize,
    merge_limit_m: f32,
    sorting: PeakSorting,
    threshold: ThresholdEngine,
    detector: PeakDetector,
    averager: SweepAverager,
    raw: RawSweep,
    envelope: Vec<f32>,
    decimated: Vec<f32>,
    sweep: Vec<f32>,
    amplitudes: Vec<u16>,
    threshold_curve: Vec<f32>,
    peaks: Vec<Peak>,
}

impl Pipeline {
    pub fn new(config: &DistanceConfig, raw_geometry: &SweepGeometry) -> Self {
        let downsampling = config.downsampling_factor.max(1) as usize;
        let geometry = raw_geometry.decimated(downsampling);
        let length = geometry.data_length;

        Self {
            raw_length: raw_geometry.data_length,
            downsampling,
            merge_limit_m: config.peak_merge_limit_m,
            sorting: config.peak_sorting,
            threshold: ThresholdEngine::new(config, geometry.step_length_m),
            detector: PeakDetector::new(geometry),
            averager: SweepAverager::new(length),
            raw: RawSweep::Envelope(Vec::with_capacity(raw_geometry.data_length)),
            envelope: Vec::with_capacity(raw_geometry.data_length),
            decimated: Vec::with_capacity(length),
            sweep: Vec::with_capacity(length),
            amplitudes: Vec::with_capacity(length),
            threshold_curve: Vec::with_capacity(length),
            peaks: Vec::with_capacity(length / 2),
        }
    }

    pub fn metadata(&self) -> Metadata {
        let geometry = self.detector.geometry();
        Metadata {
            start_m: geometry.start_m,
            length_m: geometry.length_m(),
            step_length_m: geometry.step_length_m,
            background_length: geometry.data_length,
        }
    }

    pub fn requires_background(&self) -> bool {
        self.threshold.requires_background()
    }

    /// Pull `count` sweeps and average them into the current sweep
    pub fn acquire<S: SensorService>(
        &mut self,
        service: &mut S,
        binding: &ServiceBinding,
        count: usize,
    ) -> std::result::Result<SweepStatus, ServiceError> {
        let mut status = SweepStatus::default();
        self.averager.reset();

        for _ in 0..count.max(1) {
            let info = service.pull_sweep(binding, &mut self.raw)?;
            if self.raw.len() != self.raw_length {
                return Err(ServiceError::ShortData {
                    expected: self.raw_length,
                    actual: self.raw.len(),
                });
            }

            let clipped = match &self.raw {
                RawSweep::Envelope(data) => data.contains(&u16::MAX),
                RawSweep::Iq(_) => false,
            };
            status.sequence = info.sequence;
            status.saturated |= info.saturated || clipped;
            status.missed_data |= info.missed_data;

            self.raw.envelope_into(&mut self.envelope);
            decimate_into(&self.envelope, self.downsampling, &mut self.decimated);
            self.averager.add(&self.decimated);
        }

        self.averager.average_into(&mut self.sweep);
        Ok(status)
    }

    /// Current sweep as envelope amplitudes
    pub fn amplitudes(&mut self) -> &[u16] {
        to_amplitudes_into(&self.sweep, &mut self.amplitudes);
        &self.amplitudes
    }

    /// Threshold, detect, merge and sort peaks of the current sweep
    pub fn detect(&mut self, background: Option<&BackgroundProfile>) -> Result<&[Peak]> {
        self.threshold
            .compute(&self.sweep, background, &mut self.threshold_curve)?;
        self.detector
            .find_peaks(&self.sweep, &self.threshold_curve, &mut self.peaks);
        merge_peaks(&mut self.peaks, self.merge_limit_m);
        sort_peaks(&mut self.peaks, self.sorting);
        Ok(&self.peaks)
    }

    pub fn sweep(&self) -> &[f32] {
        &self.sweep
    }

    pub fn threshold_curve(&self) -> &[f32] {
        &self.threshold_curve
    }
}

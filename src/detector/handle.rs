use crate::config::DistanceConfig;
use crate::detector::pipeline::Pipeline;
use crate::detector::{
    DetectorState, DistanceResult, Metadata, RecordedBackgroundInfo, ResultInfo,
};
use crate::error::{DetectorError, Result};
use crate::service::{BindRequest, SensorService, ServiceBinding};
use crate::signal_processing::{BackgroundProfile, BackgroundRecorder, to_amplitude};

fn invalid_state(operation: &'static str, state: DetectorState) -> DetectorError {
    DetectorError::InvalidState {
        operation,
        state: state.name(),
    }
}

/// Distance detector bound to one sensor
///
/// Owns a copy of its configuration, the background profile and the
/// service binding. Lifecycle:
///
/// ```text
/// Created --activate--> Activated --deactivate--> Deactivated
///                          ^  |                       |
///                          |  +----reconfigure----+   |
///                          +--------activate----------+
/// any state --destroy--> Destroyed
/// ```
///
/// Every call after `destroy` fails with `DetectorError::UseAfterDestroy`.
///
/// # Example
/// ```
/// use radar_distance::config::DistanceConfig;
/// use radar_distance::detector::{DistanceDetector, DistanceResult};
/// use radar_distance::service::ReplayService;
///
/// let mut sweep = vec![0u16; 100];
/// sweep[45] = 2000;
/// let service = ReplayService::from_envelopes(0.0, 0.01, vec![sweep; 5]);
///
/// let mut config = DistanceConfig::default();
/// config.sweep_averaging = 1;
/// let mut detector = DistanceDetector::new(&config, service);
/// detector.activate().unwrap();
///
/// let mut results = [DistanceResult::default(); 4];
/// let info = detector.get_next(&mut results).unwrap();
/// assert_eq!(info.result_count, 1);
/// assert!((results[0].distance_m - 0.45).abs() < 1e-3);
/// ```
pub struct DistanceDetector<S: SensorService> {
    service: S,
    config: DistanceConfig,
    state: DetectorState,
    binding: Option<ServiceBinding>,
    pipeline: Option<Pipeline>,
    metadata: Option<Metadata>,
    background: Option<BackgroundProfile>,
    sweep_index: u64,
}

impl<S: SensorService> DistanceDetector<S> {
    /// Create a detector from a copy of `config`
    ///
    /// Nothing is validated or bound until [`activate`](Self::activate).
    pub fn new(config: &DistanceConfig, service: S) -> Self {
        Self {
            service,
            config: config.clone(),
            state: DetectorState::Created,
            binding: None,
            pipeline: None,
            metadata: None,
            background: None,
            sweep_index: 0,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Configuration currently in effect
    pub fn config(&self) -> &DistanceConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Installed background profile, if any
    pub fn background(&self) -> Option<&[u16]> {
        self.background.as_ref().map(|b| b.values())
    }

    /// Most recent processed sweep
    pub fn last_sweep(&self) -> &[f32] {
        self.pipeline.as_ref().map_or(&[], |p| p.sweep())
    }

    /// Threshold curve applied to the most recent sweep
    pub fn last_threshold(&self) -> &[f32] {
        self.pipeline.as_ref().map_or(&[], |p| p.threshold_curve())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state == DetectorState::Destroyed {
            Err(DetectorError::UseAfterDestroy)
        } else {
            Ok(())
        }
    }

    /// Validate the configuration and bind the sensor service
    pub fn activate(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if self.state == DetectorState::Activated {
            return Err(invalid_state("activate", self.state));
        }

        self.config.validate()?;
        let binding = self
            .service
            .bind(&BindRequest::from_config(&self.config))
            .map_err(DetectorError::Activation)?;
        self.install(binding);
        self.state = DetectorState::Activated;

        if let Some(metadata) = &self.metadata {
            log::info!(
                "Sensor {} activated: {:.3}-{:.3} m, {} bins",
                self.config.sensor,
                metadata.start_m,
                metadata.start_m + metadata.length_m,
                metadata.background_length
            );
        }
        Ok(())
    }

    /// Release the service binding
    ///
    /// Keeps configuration and background. Calling it again is a no-op.
    pub fn deactivate(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if let Some(binding) = self.binding.take() {
            self.service.unbind(binding);
            log::info!("Sensor {} deactivated", self.config.sensor);
        }
        if self.state == DetectorState::Activated {
            self.state = DetectorState::Deactivated;
        }
        Ok(())
    }

    /// Replace the configuration of an activated or deactivated detector
    ///
    /// On any failure the detector keeps its previous configuration,
    /// binding and background. The background survives a successful
    /// reconfiguration only if its length still matches.
    pub fn reconfigure(&mut self, config: &DistanceConfig) -> Result<()> {
        self.ensure_alive()?;
        match self.state {
            DetectorState::Activated => {}
            DetectorState::Deactivated => {
                config.validate()?;
                self.config = config.clone();
                self.pipeline = None;
                self.metadata = None;
                log::info!("Sensor {} reconfigured while deactivated", self.config.sensor);
                return Ok(());
            }
            state => return Err(invalid_state("reconfigure", state)),
        }

        config.validate()?;
        if let Some(old) = self.binding.take() {
            self.service.unbind(old);
        }

        match self.service.bind(&BindRequest::from_config(config)) {
            Ok(binding) => {
                self.config = config.clone();
                self.install(binding);
                log::info!("Sensor {} reconfigured", self.config.sensor);
                Ok(())
            }
            Err(err) => {
                match self.service.bind(&BindRequest::from_config(&self.config)) {
                    Ok(binding) => self.binding = Some(binding),
                    Err(restore_err) => {
                        log::warn!(
                            "Sensor {} could not restore previous binding: {}",
                            self.config.sensor,
                            restore_err
                        );
                        self.state = DetectorState::Deactivated;
                    }
                }
                Err(DetectorError::Activation(err))
            }
        }
    }

    /// Release everything; the detector cannot be used afterwards
    pub fn destroy(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if let Some(binding) = self.binding.take() {
            self.service.unbind(binding);
        }
        self.pipeline = None;
        self.metadata = None;
        self.background = None;
        self.state = DetectorState::Destroyed;
        log::info!("Sensor {} detector destroyed", self.config.sensor);
        Ok(())
    }

    /// Measurement layout of the current or last activation
    pub fn metadata(&self) -> Result<Metadata> {
        self.ensure_alive()?;
        self.metadata
            .ok_or_else(|| invalid_state("read metadata", self.state))
    }

    /// Record a background profile into `background` and keep a copy
    ///
    /// `background` must hold exactly `metadata().background_length` values.
    /// On failure the previously installed profile is left untouched.
    pub fn record_background(
        &mut self,
        background: &mut [u16],
    ) -> Result<RecordedBackgroundInfo> {
        self.ensure_alive()?;
        let state = self.state;
        let (Some(binding), Some(pipeline)) = (self.binding.as_ref(), self.pipeline.as_mut())
        else {
            return Err(invalid_state("record background", state));
        };

        let expected = pipeline.metadata().background_length;
        if background.len() != expected {
            return Err(DetectorError::config(
                "background_length",
                format!("expected {} values, got {}", expected, background.len()),
            ));
        }

        let requested = self.config.record_background_sweeps as usize;
        let mut recorder = BackgroundRecorder::new(self.config.background_reducer, expected, requested);
        let mut saturated_sweeps = 0;
        for recorded in 0..requested {
            let status = pipeline
                .acquire(&mut self.service, binding, 1)
                .map_err(|source| DetectorError::BackgroundRecording {
                    recorded,
                    requested,
                    source,
                })?;
            if status.saturated {
                saturated_sweeps += 1;
            }
            recorder.add(pipeline.sweep());
        }

        recorder.finish_into(background);
        let info = RecordedBackgroundInfo {
            sweeps_used: recorder.count(),
            saturated_sweeps,
            max_amplitude: background.iter().copied().max().unwrap_or(0),
        };
        if saturated_sweeps > 0 {
            log::warn!(
                "Background recording saturated in {} of {} sweeps",
                saturated_sweeps,
                requested
            );
        }

        self.background = Some(BackgroundProfile::new(
            background.to_vec(),
            self.config.receiver_gain,
        ));
        log::info!(
            "Recorded background from {} sweeps, peak amplitude {}",
            info.sweeps_used,
            info.max_amplitude
        );
        Ok(info)
    }

    /// Install a previously recorded background profile
    ///
    /// The profile is assumed to have been recorded at the current receiver
    /// gain.
    pub fn set_background(&mut self, background: &[u16]) -> Result<()> {
        self.ensure_alive()?;
        let metadata = self
            .metadata
            .ok_or_else(|| invalid_state("set background", self.state))?;
        if background.len() != metadata.background_length {
            return Err(DetectorError::config(
                "background_length",
                format!(
                    "expected {} values, got {}",
                    metadata.background_length,
                    background.len()
                ),
            ));
        }

        self.background = Some(BackgroundProfile::new(
            background.to_vec(),
            self.config.receiver_gain,
        ));
        Ok(())
    }

    /// Measure once and write the detected peaks into `results`
    ///
    /// Blocks until the service delivers `sweep_averaging` sweeps. Results
    /// are written in final order; entries past `ResultInfo::result_count`
    /// are left untouched.
    pub fn get_next(&mut self, results: &mut [DistanceResult]) -> Result<ResultInfo> {
        self.ensure_alive()?;
        let state = self.state;
        let (DetectorState::Activated, Some(binding), Some(pipeline)) =
            (state, self.binding.as_ref(), self.pipeline.as_mut())
        else {
            return Err(invalid_state("get next result", state));
        };

        if pipeline.requires_background() && self.background.is_none() {
            return Err(DetectorError::MissingBackground);
        }

        let sweeps_averaged = self.config.sweep_averaging;
        let status = pipeline
            .acquire(&mut self.service, binding, sweeps_averaged as usize)
            .map_err(DetectorError::ServiceUnavailable)?;

        if let Some(callback) = &self.config.sweep_callback {
            callback.call(pipeline.amplitudes());
        }

        let peaks = pipeline.detect(self.background.as_ref())?;
        let peaks_found = peaks.len();
        let mut result_count = 0;
        for (slot, peak) in results.iter_mut().zip(peaks) {
            *slot = DistanceResult {
                amplitude: to_amplitude(peak.amplitude),
                distance_m: peak.distance_m,
            };
            result_count += 1;
        }

        self.sweep_index += 1;
        if status.saturated {
            log::warn!("Sweep {} saturated", self.sweep_index);
        }
        if status.missed_data {
            log::warn!("Sweeps missed before sweep {}", self.sweep_index);
        }
        log::debug!(
            "Sweep {}: {} peaks, {} reported",
            self.sweep_index,
            peaks_found,
            result_count
        );

        Ok(ResultInfo {
            result_count,
            peaks_found,
            sweep_index: self.sweep_index,
            sequence: status.sequence,
            sweeps_averaged,
            saturated: status.saturated,
            missed_data: status.missed_data,
        })
    }

    fn install(&mut self, binding: ServiceBinding) {
        let pipeline = Pipeline::new(&self.config, binding.geometry());
        let metadata = pipeline.metadata();

        let stale = self
            .background
            .as_ref()
            .is_some_and(|b| b.len() != metadata.background_length);
        if stale {
            log::info!(
                "Discarding background: length changed to {}",
                metadata.background_length
            );
            self.background = None;
        }

        self.metadata = Some(metadata);
        self.pipeline = Some(pipeline);
        self.binding = Some(binding);
        self.sweep_index = 0;
    }
}

impl<S: SensorService> Drop for DistanceDetector<S> {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            self.service.unbind(binding);
        }
    }
}

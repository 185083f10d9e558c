use crate::config::{DistanceConfig, ThresholdType};
use crate::constants::{
    CFAR_FACTOR_SPAN, CFAR_MIN_FACTOR, RECORDED_MAX_RELATIVE_MARGIN, RECORDED_MIN_OFFSET,
    RECORDED_OFFSET_SPAN, REFERENCE_RECEIVER_GAIN,
};
use crate::error::{DetectorError, Result};
use crate::signal_processing::BackgroundProfile;

/// Fixed threshold level at the given receiver gain
pub fn fixed_level(fixed_threshold: u16, receiver_gain: f32) -> f32 {
    fixed_threshold as f32 * receiver_gain / REFERENCE_RECEIVER_GAIN
}

/// Relative scale and absolute offset applied on top of a recorded background
///
/// Lower sensitivity widens both margins.
pub fn recorded_margin(sensitivity: f32) -> (f32, f32) {
    let slack = 1.0 - sensitivity.clamp(0.0, 1.0);
    (
        1.0 + RECORDED_MAX_RELATIVE_MARGIN * slack,
        RECORDED_MIN_OFFSET + RECORDED_OFFSET_SPAN * slack,
    )
}

/// Factor applied to the CFAR reference mean
pub fn cfar_factor(sensitivity: f32) -> f32 {
    CFAR_MIN_FACTOR + CFAR_FACTOR_SPAN * (1.0 - sensitivity.clamp(0.0, 1.0))
}

/// CFAR window layout in bins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfarWindow {
    /// Bins skipped on each side of the bin under test
    pub guard_bins: usize,
    /// Reference bins on each side
    pub window_bins: usize,
    /// Only use the reference window at lower distance
    pub only_lower: bool,
}

impl CfarWindow {
    pub fn from_config(config: &DistanceConfig, step_length_m: f32) -> Self {
        Self {
            guard_bins: (config.cfar_guard_m / step_length_m).round() as usize,
            window_bins: ((config.cfar_window_m / step_length_m).round() as usize).max(1),
            only_lower: config.cfar_only_lower_distance,
        }
    }

    /// Mean of the reference bins of `index`, or `None` if a window does
    /// not fit inside the sweep
    ///
    /// `prefix[k]` holds the sum of the first `k` bins.
    fn reference_mean(&self, prefix: &[f64], index: usize) -> Option<f32> {
        let n = prefix.len() - 1;
        let reach = self.guard_bins.saturating_add(self.window_bins);

        let lower = (index >= reach).then(|| {
            let first = index - reach;
            prefix[first + self.window_bins] - prefix[first]
        })?;
        if self.only_lower {
            return Some((lower / self.window_bins as f64) as f32);
        }

        let upper = index.checked_add(reach).is_some_and(|end| end < n).then(|| {
            let first = index + self.guard_bins + 1;
            prefix[first + self.window_bins] - prefix[first]
        })?;
        Some(((lower + upper) / (2.0 * self.window_bins as f64)) as f32)
    }
}

enum ThresholdKind {
    Fixed { level: f32 },
    Recorded { scale: f32, offset: f32 },
    Cfar { window: CfarWindow, factor: f32 },
}

/// Produces the per-bin threshold curve for a sweep
///
/// Fixed and recorded thresholds do not depend on the sweep; CFAR derives
/// each bin's threshold from the mean amplitude of the current sweep in
/// reference windows on either side of it.
pub struct ThresholdEngine {
    kind: ThresholdKind,
    receiver_gain: f32,
    prefix: Vec<f64>,
    valid: Vec<bool>,
}

impl ThresholdEngine {
    /// Create an engine for sweeps whose bins are `step_length_m` apart
    pub fn new(config: &DistanceConfig, step_length_m: f32) -> Self {
        let kind = match config.threshold_type {
            ThresholdType::Fixed => ThresholdKind::Fixed {
                level: fixed_level(config.fixed_threshold, config.receiver_gain),
            },
            ThresholdType::Recorded => {
                let (scale, offset) = recorded_margin(config.threshold_sensitivity);
                ThresholdKind::Recorded { scale, offset }
            }
            ThresholdType::Cfar => ThresholdKind::Cfar {
                window: CfarWindow::from_config(config, step_length_m),
                factor: cfar_factor(config.threshold_sensitivity),
            },
        };

        Self {
            kind,
            receiver_gain: config.receiver_gain,
            prefix: Vec::new(),
            valid: Vec::new(),
        }
    }

    /// Whether the engine needs a background profile
    pub fn requires_background(&self) -> bool {
        matches!(self.kind, ThresholdKind::Recorded { .. })
    }

    /// Compute the threshold for every bin of `sweep` into `out`
    pub fn compute(
        &mut self,
        sweep: &[f32],
        background: Option<&BackgroundProfile>,
        out: &mut Vec<f32>,
    ) -> Result<()> {
        out.clear();
        match self.kind {
            ThresholdKind::Fixed { level } => {
                out.resize(sweep.len(), level);
            }
            ThresholdKind::Recorded { scale, offset } => {
                let background = background.ok_or(DetectorError::MissingBackground)?;
                if background.len() != sweep.len() {
                    return Err(DetectorError::config(
                        "background_length",
                        format!(
                            "background has {} bins, sweep has {}",
                            background.len(),
                            sweep.len()
                        ),
                    ));
                }
                let gain_scale = background.gain_scale(self.receiver_gain);
                out.extend(
                    background
                        .values()
                        .iter()
                        .map(|&b| b as f32 * gain_scale * scale + offset),
                );
            }
            ThresholdKind::Cfar { window, factor } => {
                self.cfar_into(sweep, window, factor, out);
            }
        }
        Ok(())
    }

    fn cfar_into(&mut self, sweep: &[f32], window: CfarWindow, factor: f32, out: &mut Vec<f32>) {
        self.prefix.clear();
        self.prefix.push(0.0);
        let mut running = 0.0f64;
        for &value in sweep {
            running += value as f64;
            self.prefix.push(running);
        }

        self.valid.clear();
        for index in 0..sweep.len() {
            match window.reference_mean(&self.prefix, index) {
                Some(mean) => {
                    out.push(mean * factor);
                    self.valid.push(true);
                }
                None => {
                    out.push(0.0);
                    self.valid.push(false);
                }
            }
        }

        fill_edges(out, &self.valid);
    }
}

/// Give every bin without a reference window the highest threshold among
/// its nearest computed neighbours
///
/// If no bin could be computed the whole curve is raised to `f32::MAX` so
/// nothing is detected.
fn fill_edges(threshold: &mut [f32], valid: &[bool]) {
    let mut index = 0;
    while index < threshold.len() {
        if valid[index] {
            index += 1;
            continue;
        }

        let run_start = index;
        while index < threshold.len() && !valid[index] {
            index += 1;
        }
        let before = run_start.checked_sub(1).map(|i| threshold[i]);
        let after = threshold.get(index).copied();

        let fill = match (before, after) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => {
                log::debug!("CFAR window does not fit in a sweep of {} bins", threshold.len());
                f32::MAX
            }
        };
        threshold[run_start..index].fill(fill);
    }
}

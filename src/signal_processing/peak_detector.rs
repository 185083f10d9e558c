use crate::constants::INTERPOLATION_EPSILON;
use crate::service::SweepGeometry;

/// A detected reflection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Fractional bin position within the sweep
    pub position: f32,
    /// Distance in meters
    pub distance_m: f32,
    /// Interpolated amplitude at the peak
    pub amplitude: f32,
}

/// Refine a local maximum by fitting a parabola through it and its two
/// neighbours
///
/// Returns the offset of the vertex from the middle sample (within
/// -0.5..=0.5) and the amplitude at the vertex.
pub fn interpolate_peak(left: f32, center: f32, right: f32) -> (f32, f32) {
    let curvature = left - 2.0 * center + right;
    if curvature.abs() < INTERPOLATION_EPSILON {
        return (0.0, center);
    }
    let offset = (0.5 * (left - right) / curvature).clamp(-0.5, 0.5);
    let amplitude = center - 0.25 * (left - right) * offset;
    (offset, amplitude)
}

/// Threshold-gated local maximum detector for envelope sweeps
///
/// A bin is a candidate when it rises above both neighbours and exceeds its
/// threshold. Flat tops are reported once, at the centre of the plateau.
/// Bins at either end of the sweep are never reported since they cannot be
/// interpolated.
pub struct PeakDetector {
    geometry: SweepGeometry,
}

impl PeakDetector {
    /// Create a detector mapping bins to distance with `geometry`
    pub fn new(geometry: SweepGeometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &SweepGeometry {
        &self.geometry
    }

    /// Find all peaks of `sweep` above `threshold`
    ///
    /// Peaks are appended to `peaks` in ascending distance.
    pub fn find_peaks(&self, sweep: &[f32], threshold: &[f32], peaks: &mut Vec<Peak>) {
        peaks.clear();
        let n = sweep.len().min(threshold.len());

        let mut i = 1;
        while i + 1 < n {
            if sweep[i] <= sweep[i - 1] {
                i += 1;
                continue;
            }

            // Extend over a plateau of equal values
            let mut j = i;
            while j + 1 < n && sweep[j + 1] == sweep[i] {
                j += 1;
            }

            if j + 1 < n && sweep[j + 1] < sweep[j] {
                let center_bin = (i + j) / 2;
                if sweep[center_bin] > threshold[center_bin] {
                    peaks.push(self.refine(sweep, i, j));
                }
            }
            i = j + 1;
        }
    }

    fn refine(&self, sweep: &[f32], first: usize, last: usize) -> Peak {
        let (position, amplitude) = if first == last {
            let (offset, amplitude) =
                interpolate_peak(sweep[first - 1], sweep[first], sweep[first + 1]);
            (first as f32 + offset, amplitude)
        } else {
            ((first + last) as f32 / 2.0, sweep[first])
        };

        Peak {
            position,
            distance_m: self.geometry.distance_at(position),
            amplitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn detector() -> PeakDetector {
        PeakDetector::new(SweepGeometry {
            start_m: 0.5,
            step_length_m: 0.01,
            data_length: 100,
        })
    }

    #[test]
    fn test_single_spike_maps_to_bin_distance() {
        let mut sweep = vec![0.0; 100];
        sweep[40] = 1000.0;
        let threshold = vec![100.0; 100];

        let mut peaks = Vec::new();
        detector().find_peaks(&sweep, &threshold, &mut peaks);

        assert_eq!(peaks.len(), 1);
        assert_abs_diff_eq!(peaks[0].position, 40.0);
        assert_abs_diff_eq!(peaks[0].distance_m, 0.9, epsilon = 1e-5);
        assert_abs_diff_eq!(peaks[0].amplitude, 1000.0);
    }

    #[test]
    fn test_interpolation_shifts_towards_stronger_neighbour() {
        let (offset, amplitude) = interpolate_peak(4.0, 10.0, 8.0);
        assert!(offset > 0.0 && offset < 0.5);
        assert!(amplitude > 10.0);

        // y = 10 - (x - 0.25)^2 sampled at -1, 0, 1
        let (offset, amplitude) = interpolate_peak(8.4375, 9.9375, 9.4375);
        assert_abs_diff_eq!(offset, 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(amplitude, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_below_threshold_not_reported() {
        let mut sweep = vec![0.0; 20];
        sweep[5] = 50.0;
        sweep[12] = 150.0;
        let threshold = vec![100.0; 20];

        let mut peaks = Vec::new();
        detector().find_peaks(&sweep, &threshold, &mut peaks);
        assert_eq!(peaks.len(), 1);
        assert_abs_diff_eq!(peaks[0].position, 12.0);
    }

    #[test]
    fn test_plateau_resolves_to_centre() {
        let sweep = vec![0.0, 10.0, 50.0, 50.0, 50.0, 50.0, 10.0, 0.0];
        let threshold = vec![20.0; 8];

        let mut peaks = Vec::new();
        detector().find_peaks(&sweep, &threshold, &mut peaks);
        assert_eq!(peaks.len(), 1);
        assert_abs_diff_eq!(peaks[0].position, 3.5);
        assert_abs_diff_eq!(peaks[0].amplitude, 50.0);
    }

    #[test]
    fn test_edges_and_shoulders_ignored() {
        // Rising into the last bin and a step that never falls again
        let sweep = vec![90.0, 10.0, 20.0, 30.0, 30.0, 40.0, 50.0];
        let threshold = vec![0.0; 7];

        let mut peaks = Vec::new();
        detector().find_peaks(&sweep, &threshold, &mut peaks);
        assert!(peaks.is_empty());
    }

    #[test]
    fn test_peaks_in_ascending_distance() {
        let mut sweep = vec![0.0; 30];
        sweep[25] = 300.0;
        sweep[8] = 900.0;
        sweep[15] = 500.0;
        let threshold = vec![100.0; 30];

        let mut peaks = Vec::new();
        detector().find_peaks(&sweep, &threshold, &mut peaks);
        let positions: Vec<f32> = peaks.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![8.0, 15.0, 25.0]);
    }
}

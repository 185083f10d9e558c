use crate::config::PeakSorting;
use crate::constants::{FLAT_REFLECTOR_EXPONENT, POINT_REFLECTOR_EXPONENT};
use crate::signal_processing::Peak;

/// Collapse peaks closer than `merge_limit_m` into the strongest of them
///
/// Leaves `peaks` in ascending distance. When two peaks are merged the one
/// with the higher amplitude survives with its own distance; on equal
/// amplitude the closer one is kept.
pub fn merge_peaks(peaks: &mut Vec<Peak>, merge_limit_m: f32) {
    peaks.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

    let mut kept = 0;
    for index in 0..peaks.len() {
        let peak = peaks[index];
        if kept > 0 && peak.distance_m - peaks[kept - 1].distance_m < merge_limit_m {
            if peak.amplitude > peaks[kept - 1].amplitude {
                peaks[kept - 1] = peak;
            }
        } else {
            peaks[kept] = peak;
            kept += 1;
        }
    }
    peaks.truncate(kept);
}

/// Ranking strength of a peak under a sorting policy
///
/// Reflector policies compensate the amplitude for its expected decay with
/// distance before comparing.
pub fn ranking_strength(peak: &Peak, sorting: PeakSorting) -> f32 {
    let distance = peak.distance_m.max(0.0);
    match sorting {
        PeakSorting::ClosestFirst | PeakSorting::StrongestFirst => peak.amplitude,
        PeakSorting::StrongestReflectorFirst => {
            peak.amplitude * distance.powi(POINT_REFLECTOR_EXPONENT)
        }
        PeakSorting::StrongestFlatReflectorFirst => {
            peak.amplitude * distance.powi(FLAT_REFLECTOR_EXPONENT)
        }
    }
}

/// Order peaks according to `sorting`
///
/// The sort is stable, so peaks of equal strength keep their current order
/// and sorting an already sorted list leaves it unchanged.
pub fn sort_peaks(peaks: &mut [Peak], sorting: PeakSorting) {
    match sorting {
        PeakSorting::ClosestFirst => {
            peaks.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        }
        _ => {
            peaks.sort_by(|a, b| {
                ranking_strength(b, sorting).total_cmp(&ranking_strength(a, sorting))
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(distance_m: f32, amplitude: f32) -> Peak {
        Peak {
            position: 0.0,
            distance_m,
            amplitude,
        }
    }

    #[test]
    fn test_close_peaks_merge_to_stronger() {
        let mut peaks = vec![peak(1.0, 300.0), peak(1.004, 500.0)];
        merge_peaks(&mut peaks, 0.005);
        assert_eq!(peaks, vec![peak(1.004, 500.0)]);

        let mut peaks = vec![peak(1.004, 200.0), peak(1.0, 500.0)];
        merge_peaks(&mut peaks, 0.005);
        assert_eq!(peaks, vec![peak(1.0, 500.0)]);
    }

    #[test]
    fn test_peaks_at_merge_limit_stay_apart() {
        let near = peak(1.0, 300.0);
        let far = peak(1.005, 500.0);
        let limit = far.distance_m - near.distance_m;

        let mut peaks = vec![near, far];
        merge_peaks(&mut peaks, limit);
        assert_eq!(peaks.len(), 2);
    }

    #[test]
    fn test_zero_merge_limit_keeps_everything() {
        let mut peaks = vec![peak(0.3, 1.0), peak(0.3, 2.0), peak(0.2, 3.0)];
        merge_peaks(&mut peaks, 0.0);
        assert_eq!(peaks.len(), 3);
        assert_eq!(peaks[0].distance_m, 0.2);
    }

    #[test]
    fn test_closest_first() {
        let mut peaks = vec![peak(0.8, 10.0), peak(0.3, 5.0), peak(0.5, 50.0)];
        sort_peaks(&mut peaks, PeakSorting::ClosestFirst);
        let distances: Vec<f32> = peaks.iter().map(|p| p.distance_m).collect();
        assert_eq!(distances, vec![0.3, 0.5, 0.8]);
    }

    #[test]
    fn test_strongest_first_breaks_ties_by_distance() {
        let mut peaks = vec![peak(0.3, 100.0), peak(0.5, 400.0), peak(0.7, 100.0)];
        sort_peaks(&mut peaks, PeakSorting::StrongestFirst);
        let distances: Vec<f32> = peaks.iter().map(|p| p.distance_m).collect();
        assert_eq!(distances, vec![0.5, 0.3, 0.7]);
    }

    #[test]
    fn test_reflector_sorting_compensates_distance() {
        // Weaker but farther peak wins once attenuation is accounted for
        let near = peak(0.5, 1000.0);
        let far = peak(2.0, 200.0);

        let mut peaks = vec![near, far];
        sort_peaks(&mut peaks, PeakSorting::StrongestFirst);
        assert_eq!(peaks[0], near);

        let mut peaks = vec![near, far];
        sort_peaks(&mut peaks, PeakSorting::StrongestReflectorFirst);
        assert_eq!(peaks[0], far);

        // 1000 * 0.5 = 500 vs 200 * 2.0 = 400
        let mut peaks = vec![near, far];
        sort_peaks(&mut peaks, PeakSorting::StrongestFlatReflectorFirst);
        assert_eq!(peaks[0], near);
    }

    #[test]
    fn test_sorting_is_idempotent() {
        let original = vec![
            peak(0.9, 120.0),
            peak(0.2, 300.0),
            peak(0.4, 120.0),
            peak(1.5, 60.0),
            peak(0.6, 300.0),
        ];
        for sorting in [
            PeakSorting::ClosestFirst,
            PeakSorting::StrongestFirst,
            PeakSorting::StrongestReflectorFirst,
            PeakSorting::StrongestFlatReflectorFirst,
        ] {
            let mut once = original.clone();
            sort_peaks(&mut once, sorting);
            let mut twice = once.clone();
            sort_peaks(&mut twice, sorting);
            assert_eq!(once, twice, "{:?} not idempotent", sorting);
        }
    }
}

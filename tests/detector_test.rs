mod test_sweeps;

use approx::assert_abs_diff_eq;
use num_complex::Complex;
use radar_distance::config::{PeakSorting, ThresholdType};
use radar_distance::service::{RawSweep, ReplayService};
use radar_distance::signal_processing::{decode_background, encode_background};
use radar_distance::{DetectorError, DistanceDetector, DistanceResult};
use test_sweeps::{STEP_M, add_spike, detector_config, floor_sweep, replay};

fn distances(results: &[DistanceResult]) -> Vec<f32> {
    results.iter().map(|r| (r.distance_m * 100.0).round() / 100.0).collect()
}

#[test]
fn test_metadata_covers_requested_range() {
    for downsampling in 1..=4 {
        let mut previous_length = 0.0;
        for i in 1..=32 {
            let mut config = detector_config();
            config.start_m = 0.1;
            config.length_m = i as f32 * 0.037;
            config.downsampling_factor = downsampling;

            let mut detector = DistanceDetector::new(&config, replay(vec![floor_sweep(0)]));
            detector.activate().unwrap();
            let metadata = detector.metadata().unwrap();

            assert_abs_diff_eq!(metadata.start_m, 0.1, epsilon = 1e-5);
            assert!(
                metadata.length_m >= config.length_m * (1.0 - 1e-6),
                "ds {} requested {} got {}",
                downsampling,
                config.length_m,
                metadata.length_m
            );
            assert!(metadata.length_m >= previous_length);
            assert_abs_diff_eq!(
                metadata.length_m,
                metadata.background_length as f32 * metadata.step_length_m,
                epsilon = 1e-5
            );
            previous_length = metadata.length_m;
        }
    }
}

#[test]
fn test_length_just_past_bin_boundary_gains_a_bin() {
    let mut config = detector_config();
    config.start_m = 0.0;
    config.length_m = 0.500005;

    let mut detector = DistanceDetector::new(&config, replay(vec![floor_sweep(0)]));
    detector.activate().unwrap();
    let metadata = detector.metadata().unwrap();
    assert_eq!(metadata.background_length, 51);
    assert!(metadata.length_m >= config.length_m);

    config.length_m = 0.5;
    detector.reconfigure(&config).unwrap();
    assert_eq!(detector.metadata().unwrap().background_length, 50);
}

#[test]
fn test_huge_distances_rejected_before_binding() {
    let mut cfar = detector_config();
    cfar.threshold_type = ThresholdType::Cfar;
    cfar.cfar_guard_m = 1e30;
    let mut long = detector_config();
    long.length_m = 1e30;

    for (config, field) in [(cfar, "cfar_guard_m"), (long, "length_m")] {
        let mut detector = DistanceDetector::new(&config, replay(vec![floor_sweep(0)]));
        assert!(matches!(
            detector.activate(),
            Err(DetectorError::Configuration { field: f, .. }) if f == field
        ));

        let mut running = DistanceDetector::new(&detector_config(), replay(vec![floor_sweep(0)]));
        running.activate().unwrap();
        assert!(running.reconfigure(&config).is_err());
        let mut results = [DistanceResult::default(); 4];
        assert!(running.get_next(&mut results).is_ok());
    }
}

#[test]
fn test_single_spike_over_zero_background() {
    let mut sweep = floor_sweep(0);
    add_spike(&mut sweep, 0.55, 1000);

    for sorting in [
        PeakSorting::ClosestFirst,
        PeakSorting::StrongestFirst,
        PeakSorting::StrongestReflectorFirst,
        PeakSorting::StrongestFlatReflectorFirst,
    ] {
        let mut config = detector_config();
        config.threshold_type = ThresholdType::Recorded;
        config.peak_sorting = sorting;

        let mut detector = DistanceDetector::new(&config, replay(vec![sweep.clone()]));
        detector.activate().unwrap();
        let length = detector.metadata().unwrap().background_length;
        detector.set_background(&vec![0; length]).unwrap();

        let mut results = [DistanceResult::default(); 4];
        let info = detector.get_next(&mut results).unwrap();
        assert_eq!(info.result_count, 1, "{:?}", sorting);
        assert_eq!(results[0].amplitude, 1000);
        assert_abs_diff_eq!(results[0].distance_m, 0.55, epsilon = 1e-4);
    }
}

#[test]
fn test_saved_background_reproduces_results() {
    let mut clutter = floor_sweep(100);
    add_spike(&mut clutter, 0.35, 3000);
    let mut target = clutter.clone();
    add_spike(&mut target, 0.62, 900);

    let mut config = detector_config();
    config.threshold_type = ThresholdType::Recorded;

    let mut sweeps = vec![clutter; 4];
    sweeps.push(target.clone());
    let mut recording = DistanceDetector::new(&config, replay(sweeps));
    recording.activate().unwrap();
    let mut background = vec![0u16; recording.metadata().unwrap().background_length];
    recording.record_background(&mut background).unwrap();

    let mut expected = [DistanceResult::default(); 4];
    let expected_info = recording.get_next(&mut expected).unwrap();
    assert_eq!(expected_info.result_count, 1);
    assert_abs_diff_eq!(expected[0].distance_m, 0.62, epsilon = 1e-4);

    let blob = encode_background(&background);
    let mut restored = DistanceDetector::new(&config, replay(vec![target]));
    restored.activate().unwrap();
    restored.set_background(&decode_background(&blob).unwrap()).unwrap();

    let mut actual = [DistanceResult::default(); 4];
    let info = restored.get_next(&mut actual).unwrap();
    assert_eq!(info.result_count, expected_info.result_count);
    assert_eq!(actual, expected);
}

#[test]
fn test_close_echoes_merge() {
    let mut sweep = floor_sweep(0);
    add_spike(&mut sweep, 0.40, 800);
    add_spike(&mut sweep, 0.42, 600);

    let mut config = detector_config();
    config.peak_merge_limit_m = 0.03;
    let mut detector = DistanceDetector::new(&config, replay(vec![sweep.clone()]));
    detector.activate().unwrap();

    let mut results = [DistanceResult::default(); 4];
    let info = detector.get_next(&mut results).unwrap();
    assert_eq!(info.result_count, 1);
    assert_eq!(results[0].amplitude, 800);
    assert_abs_diff_eq!(results[0].distance_m, 0.40, epsilon = 1e-4);

    config.peak_merge_limit_m = 0.005;
    detector.reconfigure(&config).unwrap();
    let info = detector.get_next(&mut results).unwrap();
    assert_eq!(info.result_count, 2);
}

#[test]
fn test_sorting_policies() {
    let mut sweep = floor_sweep(0);
    add_spike(&mut sweep, 0.3, 1000);
    add_spike(&mut sweep, 0.6, 450);
    add_spike(&mut sweep, 0.9, 380);

    let cases = [
        (PeakSorting::ClosestFirst, vec![0.3, 0.6, 0.9]),
        (PeakSorting::StrongestFirst, vec![0.3, 0.6, 0.9]),
        // 1000 * 0.09, 450 * 0.36, 380 * 0.81
        (PeakSorting::StrongestReflectorFirst, vec![0.9, 0.6, 0.3]),
        // 1000 * 0.3, 450 * 0.6, 380 * 0.9
        (PeakSorting::StrongestFlatReflectorFirst, vec![0.9, 0.3, 0.6]),
    ];

    for (sorting, expected) in cases {
        let mut config = detector_config();
        config.length_m = 0.8;
        config.fixed_threshold = 200;
        config.peak_sorting = sorting;

        let mut detector = DistanceDetector::new(&config, replay(vec![sweep.clone()]));
        detector.activate().unwrap();

        let mut results = [DistanceResult::default(); 8];
        let info = detector.get_next(&mut results).unwrap();
        assert_eq!(
            distances(&results[..info.result_count]),
            expected,
            "{:?}",
            sorting
        );
    }
}

#[test]
fn test_downsampled_detection() {
    let mut sweep = floor_sweep(0);
    add_spike(&mut sweep, 0.44, 1500);

    let mut config = detector_config();
    config.downsampling_factor = 2;
    let mut detector = DistanceDetector::new(&config, replay(vec![sweep]));
    detector.activate().unwrap();
    assert_abs_diff_eq!(
        detector.metadata().unwrap().step_length_m,
        2.0 * STEP_M,
        epsilon = 1e-6
    );

    let mut results = [DistanceResult::default(); 4];
    let info = detector.get_next(&mut results).unwrap();
    assert_eq!(info.result_count, 1);
    assert_abs_diff_eq!(results[0].distance_m, 0.44, epsilon = 1e-4);
}

#[test]
fn test_iq_sweeps_use_magnitude() {
    let mut iq = vec![Complex::new(0.0f32, 0.0); test_sweeps::RECORDED_BINS];
    iq[50] = Complex::new(600.0, 800.0);
    let service = ReplayService::new(0.0, STEP_M, vec![RawSweep::Iq(iq)]);

    let mut detector = DistanceDetector::new(&detector_config(), service);
    detector.activate().unwrap();

    let mut results = [DistanceResult::default(); 4];
    let info = detector.get_next(&mut results).unwrap();
    assert_eq!(info.result_count, 1);
    assert_eq!(results[0].amplitude, 1000);
    assert_abs_diff_eq!(results[0].distance_m, 0.5, epsilon = 1e-4);
}

#[test]
fn test_rejected_reconfigure_changes_nothing() {
    let mut sweep = floor_sweep(50);
    add_spike(&mut sweep, 0.33, 700);
    add_spike(&mut sweep, 0.71, 1900);

    let config = detector_config();
    let mut detector = DistanceDetector::new(&config, replay(vec![sweep]));
    detector.activate().unwrap();
    let metadata = detector.metadata().unwrap();

    let mut before = [DistanceResult::default(); 4];
    detector.get_next(&mut before).unwrap();

    let mut invalid = config.clone();
    invalid.threshold_sensitivity = 1.5;
    assert!(matches!(
        detector.reconfigure(&invalid),
        Err(DetectorError::Configuration {
            field: "threshold_sensitivity",
            ..
        })
    ));

    let mut after = [DistanceResult::default(); 4];
    detector.get_next(&mut after).unwrap();
    assert_eq!(before, after);
    assert_eq!(detector.metadata().unwrap(), metadata);
    assert_eq!(detector.config().threshold_sensitivity, config.threshold_sensitivity);
}

#[test]
fn test_background_of_wrong_length_rejected() {
    let mut detector = DistanceDetector::new(&detector_config(), replay(vec![floor_sweep(0)]));
    detector.activate().unwrap();
    let length = detector.metadata().unwrap().background_length;

    for wrong in [length - 1, length + 1, 0] {
        let err = detector.set_background(&vec![0; wrong]).unwrap_err();
        assert!(matches!(
            err,
            DetectorError::Configuration {
                field: "background_length",
                ..
            }
        ));
    }
    assert!(detector.background().is_none());
}

#[test]
fn test_cfar_only_lower_distance_ignores_farther_echo() {
    // Weak echo with a strong one inside its far reference window
    let mut sweep = floor_sweep(100);
    add_spike(&mut sweep, 0.45, 500);
    add_spike(&mut sweep, 0.59, 5000);

    let mut config = detector_config();
    config.threshold_type = ThresholdType::Cfar;
    config.peak_sorting = PeakSorting::ClosestFirst;

    let mut detector = DistanceDetector::new(&config, replay(vec![sweep.clone()]));
    detector.activate().unwrap();
    let mut results = [DistanceResult::default(); 4];
    let info = detector.get_next(&mut results).unwrap();
    assert_eq!(distances(&results[..info.result_count]), vec![0.59]);

    config.cfar_only_lower_distance = true;
    let mut detector = DistanceDetector::new(&config, replay(vec![sweep]));
    detector.activate().unwrap();
    let info = detector.get_next(&mut results).unwrap();
    assert_eq!(distances(&results[..info.result_count]), vec![0.45, 0.59]);
}

#[test]
fn test_reflector_sorting_rejects_negative_start() {
    for sorting in [
        PeakSorting::StrongestReflectorFirst,
        PeakSorting::StrongestFlatReflectorFirst,
    ] {
        let mut config = detector_config();
        config.start_m = -0.05;
        config.peak_sorting = sorting;

        let mut detector = DistanceDetector::new(&config, replay(vec![floor_sweep(0)]));
        assert!(matches!(
            detector.activate(),
            Err(DetectorError::Configuration {
                field: "peak_sorting",
                ..
            })
        ));

        let mut running = DistanceDetector::new(&detector_config(), replay(vec![floor_sweep(0)]));
        running.activate().unwrap();
        assert!(running.reconfigure(&config).is_err());
        assert_eq!(running.config().peak_sorting, PeakSorting::StrongestFirst);
    }

    // Point-like sorting has no distance weighting and accepts any start
    let mut config = detector_config();
    config.start_m = -0.05;
    config.peak_sorting = PeakSorting::ClosestFirst;
    assert!(config.validate().is_ok());
}

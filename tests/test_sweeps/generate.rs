use radar_distance::config::DistanceConfig;
use radar_distance::service::ReplayService;

/// Bin spacing of the synthetic recordings
pub const STEP_M: f32 = 0.01;
/// Recordings cover 0-2 m
pub const RECORDED_BINS: usize = 200;

/// Recording with every bin at `level`
pub fn floor_sweep(level: u16) -> Vec<u16> {
    vec![level; RECORDED_BINS]
}

/// Set the bin nearest `distance_m` to `amplitude`
pub fn add_spike(sweep: &mut [u16], distance_m: f32, amplitude: u16) {
    let bin = (distance_m / STEP_M).round() as usize;
    sweep[bin] = amplitude;
}

/// Add a bell-shaped echo centred on `distance_m`
pub fn add_pulse(sweep: &mut [u16], distance_m: f32, amplitude: f32, half_width_m: f32) {
    for (bin, value) in sweep.iter_mut().enumerate() {
        let offset = bin as f32 * STEP_M - distance_m;
        let echo = amplitude * (-(offset / half_width_m).powi(2) * std::f32::consts::LN_2).exp();
        *value = (*value as f32 + echo).round().min(u16::MAX as f32) as u16;
    }
}

/// Looping replay of `sweeps` recorded from 0 m
pub fn replay(sweeps: Vec<Vec<u16>>) -> ReplayService {
    ReplayService::from_envelopes(0.0, STEP_M, sweeps).looping(true)
}

/// Default configuration without sweep averaging
pub fn detector_config() -> DistanceConfig {
    DistanceConfig {
        sweep_averaging: 1,
        record_background_sweeps: 4,
        ..DistanceConfig::default()
    }
}

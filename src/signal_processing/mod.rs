pub mod background;
pub mod peak_detector;
pub mod peak_ranking;
pub mod sweep;
pub mod threshold;

pub use background::{BackgroundProfile, BackgroundRecorder, decode_background, encode_background};
pub use peak_detector::{Peak, PeakDetector, interpolate_peak};
pub use peak_ranking::{merge_peaks, ranking_strength, sort_peaks};
pub use sweep::{SweepAverager, decimate_into, to_amplitude, to_amplitudes_into};
pub use threshold::{CfarWindow, ThresholdEngine, cfar_factor, fixed_level, recorded_margin};

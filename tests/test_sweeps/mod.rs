#![allow(dead_code)]

pub mod generate;

pub use generate::{
    RECORDED_BINS, STEP_M, add_pulse, add_spike, detector_config, floor_sweep, replay,
};

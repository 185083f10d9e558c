use std::f32::consts::LN_2;

use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use crate::config::ServiceProfile;
use crate::constants::{FLAT_REFLECTOR_EXPONENT, POINT_REFLECTOR_EXPONENT, REFERENCE_RECEIVER_GAIN};
use crate::service::SweepGeometry;

/// Reflectors closer than this are rendered as if they were at this distance
const MIN_REFLECTOR_DISTANCE_M: f32 = 0.05;

/// A reflecting object in the simulated scene
///
/// `amplitude` is the envelope amplitude the reflector would produce at
/// 1 m and the reference receiver gain.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reflector {
    /// Small object; amplitude falls with the square of distance
    Point { distance_m: f32, amplitude: f32 },
    /// Extended surface such as a liquid level; amplitude falls linearly
    Flat { distance_m: f32, amplitude: f32 },
}

impl Reflector {
    pub fn distance_m(&self) -> f32 {
        match *self {
            Self::Point { distance_m, .. } | Self::Flat { distance_m, .. } => distance_m,
        }
    }

    /// Envelope amplitude received from this reflector at its own distance
    pub fn received_amplitude(&self) -> f32 {
        let (distance, amplitude, exponent) = match *self {
            Self::Point {
                distance_m,
                amplitude,
            } => (distance_m, amplitude, POINT_REFLECTOR_EXPONENT),
            Self::Flat {
                distance_m,
                amplitude,
            } => (distance_m, amplitude, FLAT_REFLECTOR_EXPONENT),
        };
        amplitude / distance.max(MIN_REFLECTOR_DISTANCE_M).powi(exponent)
    }
}

/// What the simulated radar sees
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Seed for the noise generator; random when absent
    pub seed: Option<u64>,
    /// Distance between sensor bins in meters
    pub step_length_m: f32,
    /// Farthest distance the sensor can measure
    pub max_range_m: f32,
    /// Constant receiver floor added to every bin
    pub noise_floor: f32,
    /// Standard deviation of the Gaussian noise before hardware averaging
    pub noise_std: f32,
    /// Direct leakage from transmitter to receiver, centred at 0 m
    pub leakage_amplitude: f32,
    pub reflectors: Vec<Reflector>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            seed: None,
            step_length_m: 0.002,
            max_range_m: 7.0,
            noise_floor: 100.0,
            noise_std: 20.0,
            leakage_amplitude: 3000.0,
            reflectors: Vec::new(),
        }
    }
}

impl SceneConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_reflector(mut self, reflector: Reflector) -> Self {
        self.reflectors.push(reflector);
        self
    }

    /// Load a scene from TOML
    ///
    /// ```toml
    /// seed = 7
    /// noise_std = 10.0
    ///
    /// [[reflectors]]
    /// type = "point"
    /// distance_m = 1.2
    /// amplitude = 400.0
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Noise-free envelope at `distance_m`
    pub fn ideal_envelope(&self, distance_m: f32, profile: ServiceProfile, receiver_gain: f32) -> f32 {
        let half_width = profile.pulse_width_m() / 2.0;
        let pulse = |offset: f32| (-(offset / half_width).powi(2) * LN_2).exp();

        let echoes: f32 = self
            .reflectors
            .iter()
            .map(|r| r.received_amplitude() * pulse(distance_m - r.distance_m()))
            .sum();
        let signal = self.noise_floor + self.leakage_amplitude * pulse(distance_m) + echoes;
        signal * receiver_gain / REFERENCE_RECEIVER_GAIN
    }

    /// Render one noisy sweep into `out`
    ///
    /// Returns true if any bin clipped at `u16::MAX`.
    pub(crate) fn render(
        &self,
        geometry: &SweepGeometry,
        profile: ServiceProfile,
        receiver_gain: f32,
        hw_averages: u8,
        rng: &mut ChaCha8Rng,
        out: &mut Vec<u16>,
    ) -> bool {
        let std = self.noise_std.max(0.0) / (hw_averages.max(1) as f32).sqrt();
        let noise = Normal::new(0.0f32, std).ok();

        out.clear();
        let mut saturated = false;
        for bin in 0..geometry.data_length {
            let mut value = self.ideal_envelope(geometry.distance_at(bin as f32), profile, receiver_gain);
            if let Some(normal) = &noise {
                value += normal.sample(rng);
            }
            let clipped = value.round().clamp(0.0, u16::MAX as f32);
            saturated |= clipped >= u16::MAX as f32;
            out.push(clipped as u16);
        }
        saturated
    }
}

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::SceneConfig;
use crate::config::ServiceProfile;
use crate::constants::MAX_SWEEP_BINS;
use crate::service::{
    BindRequest, RawSweep, SensorService, ServiceBinding, ServiceError, SweepGeometry, SweepInfo,
};

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

struct ActiveBinding {
    id: u64,
    geometry: SweepGeometry,
    profile: ServiceProfile,
    receiver_gain: f32,
    hw_averages: u8,
}

/// Sensor service rendering a [`SceneConfig`]
///
/// The scene can be changed between pulls through
/// [`scene_mut`](Self::scene_mut). Failures can be injected with
/// [`reject_binds`](Self::reject_binds) and [`fail_after`](Self::fail_after).
pub struct SimulatedService {
    scene: SceneConfig,
    rng: ChaCha8Rng,
    active: Option<ActiveBinding>,
    next_binding: u64,
    sequence: u64,
    reject_binds: bool,
    fail_after: Option<u64>,
    pulls: u64,
}

impl SimulatedService {
    pub fn new(scene: SceneConfig) -> Self {
        let rng = create_rng(scene.seed);
        Self {
            scene,
            rng,
            active: None,
            next_binding: 1,
            sequence: 0,
            reject_binds: false,
            fail_after: None,
            pulls: 0,
        }
    }

    pub fn scene(&self) -> &SceneConfig {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneConfig {
        &mut self.scene
    }

    /// Reject every bind request while set
    pub fn reject_binds(&mut self, reject: bool) {
        self.reject_binds = reject;
    }

    /// Fail every pull after `pulls` more successful ones; `None` clears it
    pub fn fail_after(&mut self, pulls: Option<u64>) {
        self.fail_after = pulls.map(|n| self.pulls + n);
    }

    /// Whether a binding is currently held
    pub fn is_bound(&self) -> bool {
        self.active.is_some()
    }
}

impl SensorService for SimulatedService {
    fn bind(&mut self, request: &BindRequest) -> Result<ServiceBinding, ServiceError> {
        if self.reject_binds {
            return Err(ServiceError::Rejected("injected bind failure".to_string()));
        }

        let geometry =
            SweepGeometry::quantize(request.start_m, request.length_m, self.scene.step_length_m);
        if geometry.data_length > MAX_SWEEP_BINS || geometry.end_m() > self.scene.max_range_m {
            return Err(ServiceError::Rejected(format!(
                "range ends at {:.3} m, sensor reaches {:.3} m",
                geometry.end_m(),
                self.scene.max_range_m
            )));
        }

        let id = self.next_binding;
        self.next_binding += 1;
        self.active = Some(ActiveBinding {
            id,
            geometry,
            profile: request.profile,
            receiver_gain: request.receiver_gain,
            hw_averages: request.hw_accelerated_average_samples,
        });
        log::debug!(
            "Simulated sensor {} bound: {:.3}-{:.3} m",
            request.sensor,
            geometry.start_m,
            geometry.end_m()
        );
        Ok(ServiceBinding::new(id, geometry))
    }

    fn pull_sweep(
        &mut self,
        binding: &ServiceBinding,
        sweep: &mut RawSweep,
    ) -> Result<SweepInfo, ServiceError> {
        let active = match &self.active {
            Some(active) if active.id == binding.id() => active,
            _ => return Err(ServiceError::UnknownBinding(binding.id())),
        };

        if self.fail_after.is_some_and(|limit| self.pulls >= limit) {
            return Err(ServiceError::Source(format!(
                "injected failure after {} pulls",
                self.pulls
            )));
        }
        self.pulls += 1;

        let mut data = match std::mem::take(sweep) {
            RawSweep::Envelope(data) => data,
            RawSweep::Iq(_) => Vec::new(),
        };
        let saturated = self.scene.render(
            &active.geometry,
            active.profile,
            active.receiver_gain,
            active.hw_averages,
            &mut self.rng,
            &mut data,
        );
        *sweep = RawSweep::Envelope(data);

        self.sequence += 1;
        Ok(SweepInfo {
            sequence: self.sequence,
            saturated,
            missed_data: false,
        })
    }

    fn unbind(&mut self, binding: ServiceBinding) {
        if self.active.as_ref().is_some_and(|a| a.id == binding.id()) {
            self.active = None;
        }
    }
}

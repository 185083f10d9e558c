//! Synthetic sensor for tests and demos.
//!
//! [`SceneConfig`] describes what the radar sees; [`SimulatedService`]
//! renders it into envelope sweeps on demand and can inject the service
//! failures the detector has to cope with.

mod scene;
mod service;

pub use scene::{Reflector, SceneConfig};
pub use service::SimulatedService;

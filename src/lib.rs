//! Avatar locomotion physics.
//!
//! Turns per-frame intent into collision-resolved motion for avatars, with a stack
//! of brains choosing between walking, swimming, climbing, flying and riding.

pub mod avatar;
pub mod config;
pub mod error;

pub use config::LocomotionConfig;
pub use error::{LocomotionError, Result};

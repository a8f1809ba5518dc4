use crate::avatar::physics::ObjectId;
use crate::config::ConfigError;

/// Errors surfaced by the locomotion core.
///
/// Transient physics anomalies (degenerate rays, non-finite velocities) are clamped
/// where they occur and never become errors. The variants here are programming
/// errors or missing collaborators.
#[derive(Debug, thiserror::Error)]
pub enum LocomotionError {
    #[error("no movement strategy bound to controller of avatar {0}")]
    NoStrategyBound(ObjectId),
    #[error("brain stack is empty")]
    EmptyBrainStack,
    #[error("refusing to pop the base brain")]
    BasePop,
    #[error("non-finite {what} on avatar {avatar}")]
    NonFiniteState { avatar: ObjectId, what: &'static str },
    #[error("collision proxy {0} is not registered with the backend")]
    MissingProxy(ObjectId),
    #[error("avatar {0} already exists")]
    DuplicateAvatar(ObjectId),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = LocomotionError> = std::result::Result<T, E>;

//! Avatar locomotion: the physics controller, its movement strategies, and the
//! brain stack that decides which kind of locomotion is active.

pub mod animation;
pub mod armature;
pub mod behavior;
pub mod brain;
pub mod constants;
pub mod controller;
pub mod input;
pub mod math;
pub mod messages;
pub mod panic_reporting;
pub mod physics;
pub mod scene;
pub mod simulation;
pub mod strategy;
pub mod swim_region;
pub mod task;

pub use armature::Avatar;
pub use brain::{BrainKind, BrainSpec};
pub use controller::{CorrectionMessage, PhysicalController};
pub use input::ControlCode;
pub use messages::{AvatarEvent, AvatarMessage, AvatarOutput, AvatarOutputs, AvatarSender};
pub use physics::{CollisionBackend, ObjectId, PlaneWorld, RapierWorld};
pub use simulation::Simulation;

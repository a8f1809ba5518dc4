use crate::avatar::math::Transform;
use crate::avatar::physics::ObjectId;

/// Corrected avatar transform, published after every controller update so the
/// scene graph and dependent modifiers follow the physics result.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionMessage {
    pub avatar: ObjectId,
    pub local_to_world: Transform,
    pub world_to_local: Transform,
    pub dirty_synch: bool,
}

impl CorrectionMessage {
    pub fn new(avatar: ObjectId, local_to_world: Transform) -> Self {
        Self {
            avatar,
            local_to_world,
            world_to_local: local_to_world.inverse(),
            dirty_synch: true,
        }
    }
}

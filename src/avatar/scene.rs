//! Read side of the scene graph: transforms of subworlds and seek targets.

use std::collections::HashMap;

use super::math::Transform;
use super::physics::ObjectId;

pub trait SceneGraph {
    fn local_to_world(&self, object: ObjectId) -> Option<Transform>;

    fn world_to_local(&self, object: ObjectId) -> Option<Transform> {
        self.local_to_world(object).map(|t| t.inverse())
    }
}

/// Scene graph backed by a plain map, for callers that own their transforms.
#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    objects: HashMap<ObjectId, Transform>,
}

impl StaticScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, object: ObjectId, local_to_world: Transform) {
        self.objects.insert(object, local_to_world);
    }

    pub fn remove(&mut self, object: ObjectId) -> bool {
        self.objects.remove(&object).is_some()
    }
}

impl SceneGraph for StaticScene {
    fn local_to_world(&self, object: ObjectId) -> Option<Transform> {
        self.objects.get(&object).copied()
    }
}

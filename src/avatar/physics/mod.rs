//! Collision capability consumed by the controller.
//!
//! The controller never integrates rigid bodies itself. It asks a backend to move the
//! avatar's capsule proxy, sweep paths, cast rays and report object velocities.

pub mod plane;
pub mod rapier_world;

pub use plane::PlaneWorld;
pub use rapier_world::RapierWorld;

use bitflags::bitflags;
use serde::Deserialize;
use std::fmt;

use super::math::{Point, Vec3};

/// Identifier of a scene object known to the backend (avatars included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Which kinds of geometry a query collides with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CollisionMask: u32 {
        /// Walls, floors, terrain
        const STATIC = 1 << 0;
        /// Invisible geometry that only stops avatars
        const AVATAR_BLOCKER = 1 << 1;
        /// Props the avatar can shove
        const DYNAMIC = 1 << 2;
        /// Volumes that keep avatars out unless they are seeking
        const EXCLUDE_REGION = 1 << 3;
        const AVATAR = 1 << 4;
    }
}

impl CollisionMask {
    /// Mask used for ordinary avatar movement.
    pub fn avatar_movement(seeking: bool) -> CollisionMask {
        let mask = CollisionMask::STATIC | CollisionMask::AVATAR_BLOCKER | CollisionMask::DYNAMIC;
        if seeking {
            mask
        } else {
            mask | CollisionMask::EXCLUDE_REGION
        }
    }
}

/// Which parts of the capsule touched something during a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionFlags {
    pub top: bool,
    pub bottom: bool,
    pub sides: bool,
}

impl CollisionFlags {
    /// Normals tilted more than this out of the horizontal hit a hemisphere.
    const HEMISPHERE_Z: f32 = 0.05;

    /// Classifies a contact by the obstacle normal that resolved it.
    pub fn classify(normal: &Vec3) -> CollisionFlags {
        if normal.z > Self::HEMISPHERE_Z {
            CollisionFlags { bottom: true, ..Default::default() }
        } else if normal.z < -Self::HEMISPHERE_Z {
            CollisionFlags { top: true, ..Default::default() }
        } else {
            CollisionFlags { sides: true, ..Default::default() }
        }
    }

    pub fn merge(&mut self, other: CollisionFlags) {
        self.top |= other.top;
        self.bottom |= other.bottom;
        self.sides |= other.sides;
    }

    pub fn any(&self) -> bool {
        self.top || self.bottom || self.sides
    }
}

/// One obstacle the capsule ran into during a move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactHit {
    pub object: Option<ObjectId>,
    /// Obstacle surface normal pointing back toward the avatar
    pub normal: Vec3,
    pub dynamic: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveResult {
    /// Displacement actually applied
    pub translation: Vec3,
    pub flags: CollisionFlags,
    pub contacts: Vec<ContactHit>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    pub object: ObjectId,
    pub point: Point,
    pub normal: Vec3,
    /// Fraction of the path travelled before contact, in [0, 1]
    pub t: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub object: Option<ObjectId>,
    pub point: Point,
    pub normal: Vec3,
    pub distance: f32,
}

/// Collision/physics services the controller consumes.
///
/// Positions handed across this trait are world-space. Avatar proxy positions are
/// the feet (bottom of the capsule).
pub trait CollisionBackend {
    fn add_avatar_proxy(&mut self, avatar: ObjectId, feet: Point, radius: f32, height: f32);

    fn remove_avatar_proxy(&mut self, avatar: ObjectId) -> bool;

    fn proxy_position(&self, avatar: ObjectId) -> Option<Point>;

    /// Teleports the proxy without collision.
    fn set_proxy_position(&mut self, avatar: ObjectId, feet: Point);

    /// Toggles whether the proxy participates in collision at all.
    fn set_proxy_enabled(&mut self, avatar: ObjectId, enabled: bool);

    /// Moves the proxy by `displacement`, resolving against `mask`.
    fn move_proxy(
        &mut self,
        avatar: ObjectId,
        displacement: Vec3,
        mask: CollisionMask,
        dt: f32,
    ) -> MoveResult;

    /// Sweeps a sphere from `start` to `end` and returns every hit ordered by `t`.
    fn sweep_path(
        &self,
        start: Point,
        end: Point,
        radius: f32,
        mask: CollisionMask,
        exclude: Option<ObjectId>,
    ) -> Vec<SweepHit>;

    /// `direction` need not be normalized. Zero-length directions never hit.
    fn raycast(
        &self,
        origin: Point,
        direction: Vec3,
        max_distance: f32,
        mask: CollisionMask,
        exclude: Option<ObjectId>,
    ) -> Option<RayHit>;

    fn line_of_sight(&self, from: Point, to: Point, exclude: Option<ObjectId>) -> bool {
        let delta = to - from;
        let dist = delta.norm();
        if dist < 0.001 {
            return true;
        }
        self.raycast(
            from,
            delta,
            dist,
            CollisionMask::STATIC | CollisionMask::AVATAR_BLOCKER,
            exclude,
        )
        .is_none()
    }

    fn object_velocity(&self, object: ObjectId) -> Option<Vec3>;

    /// Advances dynamic objects.
    fn step(&mut self, dt: f32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_normal() {
        assert!(CollisionFlags::classify(&Vec3::new(0.0, 0.0, 1.0)).bottom);
        assert!(CollisionFlags::classify(&Vec3::new(0.7, 0.0, 0.7)).bottom);
        assert!(CollisionFlags::classify(&Vec3::new(1.0, 0.0, 0.0)).sides);
        assert!(CollisionFlags::classify(&Vec3::new(0.0, 0.0, -1.0)).top);
    }

    #[test]
    fn test_movement_mask_drops_exclude_regions_while_seeking() {
        assert!(CollisionMask::avatar_movement(false).contains(CollisionMask::EXCLUDE_REGION));
        assert!(!CollisionMask::avatar_movement(true).contains(CollisionMask::EXCLUDE_REGION));
        assert!(CollisionMask::avatar_movement(true).contains(CollisionMask::DYNAMIC));
        assert_eq!(
            CollisionMask::avatar_movement(false),
            CollisionMask::STATIC
                | CollisionMask::AVATAR_BLOCKER
                | CollisionMask::DYNAMIC
                | CollisionMask::EXCLUDE_REGION
        );
        assert!(!CollisionMask::avatar_movement(false).intersects(CollisionMask::AVATAR));
        assert_eq!(CollisionMask::avatar_movement(true).bits(), 0b0111);
    }
}

use rapier3d::control::{CharacterAutostep, CharacterCollision, CharacterLength, KinematicCharacterController};
use rapier3d::prelude::*;
use rapier3d::parry::query::ShapeCastOptions;
use std::collections::{HashMap, HashSet};

use super::{
    CollisionBackend, CollisionFlags, CollisionMask, ContactHit, MoveResult, ObjectId, RayHit,
    SweepHit,
};
use crate::avatar::constants::physics as consts;
use crate::avatar::math::{Point, Quat, Transform, Vec3};
use crate::avatar::scene::SceneGraph;

// Collision groups mirror CollisionMask bit-for-bit.
const GROUP_STATIC: Group = Group::GROUP_1;
const GROUP_AVATAR_BLOCKER: Group = Group::GROUP_2;
const GROUP_DYNAMIC: Group = Group::GROUP_3;
const GROUP_EXCLUDE_REGION: Group = Group::GROUP_4;
const GROUP_AVATAR: Group = Group::GROUP_5;

/// Sweeps stop collecting after this many distinct hits.
const MAX_SWEEP_HITS: usize = 16;

fn mask_to_group(mask: CollisionMask) -> Group {
    Group::from_bits_truncate(mask.bits())
}

/// Kind of non-avatar geometry added to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolidKind {
    Static,
    AvatarBlocker,
    ExcludeRegion,
}

impl SolidKind {
    fn group(self) -> Group {
        match self {
            SolidKind::Static => GROUP_STATIC,
            SolidKind::AvatarBlocker => GROUP_AVATAR_BLOCKER,
            SolidKind::ExcludeRegion => GROUP_EXCLUDE_REGION,
        }
    }
}

/// Capsule proxy standing in for an avatar.
pub struct AvatarProxy {
    pub body_handle: RigidBodyHandle,
    pub collider_handle: ColliderHandle,
    pub radius: f32,
    pub height: f32,
    /// Capsule center; authoritative between physics steps
    center: Point,
}

impl AvatarProxy {
    fn feet(&self) -> Point {
        self.center - Vec3::z() * (self.height / 2.0)
    }
}

/// Wrapper around a Rapier3D world serving avatar collision queries.
/// Static geometry, blockers, exclude regions, shoveable props and kinematic
/// platforms live here next to one kinematic capsule per avatar.
pub struct RapierWorld {
    pub gravity: Vector<Real>,
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,

    pub object_to_body: HashMap<ObjectId, RigidBodyHandle>,
    pub body_to_object: HashMap<RigidBodyHandle, ObjectId>,
    pub proxies: HashMap<ObjectId, AvatarProxy>,
    /// Avatar mass used when shoving dynamic props
    pub avatar_mass: f32,
    pub step_height: f32,
    pub skin_width: f32,
}

impl RapierWorld {
    pub fn new(gravity_z: f32) -> Self {
        Self {
            gravity: vector![0.0, 0.0, gravity_z],
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            object_to_body: HashMap::new(),
            body_to_object: HashMap::new(),
            proxies: HashMap::new(),
            avatar_mass: consts::AVATAR_MASS,
            step_height: consts::STEP_HEIGHT,
            skin_width: consts::SKIN_WIDTH,
        }
    }

    fn register(&mut self, object: ObjectId, body: RigidBodyHandle) {
        self.object_to_body.insert(object, body);
        self.body_to_object.insert(body, object);
    }

    fn insert_box(
        &mut self,
        object: ObjectId,
        body: RigidBody,
        half_extents: Vec3,
        memberships: Group,
        density: Option<f32>,
    ) -> RigidBodyHandle {
        let handle = self.rigid_body_set.insert(body);
        let mut builder = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .collision_groups(InteractionGroups::new(memberships, Group::ALL));
        if let Some(density) = density {
            builder = builder.density(density);
        }
        self.collider_set
            .insert_with_parent(builder.build(), handle, &mut self.rigid_body_set);
        self.register(object, handle);
        self.query_pipeline.update(&self.collider_set);
        handle
    }

    /// Adds fixed box geometry centered at `center`.
    pub fn add_solid(
        &mut self,
        object: ObjectId,
        center: Point,
        half_extents: Vec3,
        rotation: Quat,
        kind: SolidKind,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::fixed()
            .position(Isometry::from_parts(center.coords.into(), rotation))
            .build();
        self.insert_box(object, body, half_extents, kind.group(), None)
    }

    /// Adds a box that gravity and avatars can move.
    pub fn add_dynamic_box(
        &mut self,
        object: ObjectId,
        center: Point,
        half_extents: Vec3,
        density: f32,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(center.coords)
            .build();
        self.insert_box(object, body, half_extents, GROUP_DYNAMIC, Some(density))
    }

    /// Adds a velocity-driven platform (elevators, boats, moving floors).
    pub fn add_platform(
        &mut self,
        object: ObjectId,
        center: Point,
        half_extents: Vec3,
        velocity: Vec3,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::kinematic_velocity_based()
            .translation(center.coords)
            .linvel(velocity)
            .build();
        self.insert_box(object, body, half_extents, GROUP_STATIC, None)
    }

    pub fn set_platform_velocity(&mut self, object: ObjectId, velocity: Vec3) {
        if let Some(body) = self
            .object_to_body
            .get(&object)
            .and_then(|h| self.rigid_body_set.get_mut(*h))
        {
            body.set_linvel(velocity, true);
        }
    }

    pub fn object_position(&self, object: ObjectId) -> Option<Transform> {
        let handle = self.object_to_body.get(&object)?;
        self.rigid_body_set.get(*handle).map(|b| *b.position())
    }

    fn object_for_collider(&self, collider: ColliderHandle) -> Option<ObjectId> {
        let parent = self.collider_set.get(collider)?.parent()?;
        self.body_to_object.get(&parent).copied()
    }

    fn is_dynamic_collider(&self, collider: ColliderHandle) -> bool {
        self.collider_set
            .get(collider)
            .and_then(|c| c.parent())
            .and_then(|p| self.rigid_body_set.get(p))
            .map(|b| b.is_dynamic())
            .unwrap_or(false)
    }

    fn exclusion_filter<'a>(
        exclude_body: Option<RigidBodyHandle>,
        mask: CollisionMask,
    ) -> QueryFilter<'a> {
        let filter = QueryFilter::default()
            .exclude_sensors()
            .groups(InteractionGroups::new(GROUP_AVATAR, mask_to_group(mask)));
        match exclude_body {
            Some(handle) => filter.exclude_rigid_body(handle),
            None => filter,
        }
    }

    fn character_controller(&self) -> KinematicCharacterController {
        KinematicCharacterController {
            up: Vector::z_axis(),
            offset: CharacterLength::Absolute(self.skin_width),
            autostep: Some(CharacterAutostep {
                max_height: CharacterLength::Absolute(self.step_height),
                min_width: CharacterLength::Absolute(consts::EPSILON * 10.0),
                include_dynamic_bodies: false,
            }),
            // Slope handling is the walking strategy's job; let every slope be climbable
            max_slope_climb_angle: 89.0_f32.to_radians(),
            min_slope_slide_angle: 89.0_f32.to_radians(),
            snap_to_ground: None,
            ..Default::default()
        }
    }

    /// Steps the physics simulation forward by dt seconds
    fn step_pipeline(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new(consts::GRAVITY)
    }
}

impl CollisionBackend for RapierWorld {
    fn add_avatar_proxy(&mut self, avatar: ObjectId, feet: Point, radius: f32, height: f32) {
        let center = feet + Vec3::z() * (height / 2.0);
        let body = RigidBodyBuilder::kinematic_position_based()
            .translation(center.coords)
            .build();
        let body_handle = self.rigid_body_set.insert(body);

        // Capsule half-height is the cylinder part; total height = 2*half_height + 2*radius
        let half_height = (height - 2.0 * radius).max(0.0) / 2.0;
        let collider = ColliderBuilder::capsule_z(half_height, radius)
            .collision_groups(InteractionGroups::new(
                GROUP_AVATAR,
                GROUP_STATIC | GROUP_AVATAR_BLOCKER | GROUP_DYNAMIC,
            ))
            .build();
        let collider_handle =
            self.collider_set
                .insert_with_parent(collider, body_handle, &mut self.rigid_body_set);

        self.register(avatar, body_handle);
        self.proxies.insert(
            avatar,
            AvatarProxy {
                body_handle,
                collider_handle,
                radius,
                height,
                center,
            },
        );
        self.query_pipeline.update(&self.collider_set);
    }

    fn remove_avatar_proxy(&mut self, avatar: ObjectId) -> bool {
        let Some(proxy) = self.proxies.remove(&avatar) else {
            return false;
        };
        self.rigid_body_set.remove(
            proxy.body_handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.object_to_body.remove(&avatar);
        self.body_to_object.remove(&proxy.body_handle);
        self.query_pipeline.update(&self.collider_set);
        true
    }

    fn proxy_position(&self, avatar: ObjectId) -> Option<Point> {
        self.proxies.get(&avatar).map(AvatarProxy::feet)
    }

    fn set_proxy_position(&mut self, avatar: ObjectId, feet: Point) {
        let Some(proxy) = self.proxies.get_mut(&avatar) else {
            return;
        };
        proxy.center = feet + Vec3::z() * (proxy.height / 2.0);
        if let Some(body) = self.rigid_body_set.get_mut(proxy.body_handle) {
            body.set_translation(proxy.center.coords, true);
            body.set_next_kinematic_translation(proxy.center.coords);
        }
    }

    fn set_proxy_enabled(&mut self, avatar: ObjectId, enabled: bool) {
        let Some(proxy) = self.proxies.get(&avatar) else {
            return;
        };
        if let Some(collider) = self.collider_set.get_mut(proxy.collider_handle) {
            collider.set_enabled(enabled);
        }
    }

    fn move_proxy(
        &mut self,
        avatar: ObjectId,
        displacement: Vec3,
        mask: CollisionMask,
        dt: f32,
    ) -> MoveResult {
        let Some(proxy) = self.proxies.get(&avatar) else {
            return MoveResult::default();
        };
        let body_handle = proxy.body_handle;
        let collider_handle = proxy.collider_handle;
        let start = proxy.center;

        let enabled = self
            .collider_set
            .get(collider_handle)
            .map(|c| c.is_enabled())
            .unwrap_or(false);
        if !enabled {
            let center = start + displacement;
            if let Some(proxy) = self.proxies.get_mut(&avatar) {
                proxy.center = center;
            }
            if let Some(body) = self.rigid_body_set.get_mut(body_handle) {
                body.set_next_kinematic_translation(center.coords);
            }
            return MoveResult {
                translation: displacement,
                ..Default::default()
            };
        }

        let controller = self.character_controller();
        let filter = Self::exclusion_filter(Some(body_handle), mask);
        let position = Isometry::translation(start.x, start.y, start.z);

        let mut collisions: Vec<CharacterCollision> = Vec::new();
        let movement = {
            let Some(collider) = self.collider_set.get(collider_handle) else {
                return MoveResult::default();
            };
            controller.move_shape(
                dt,
                &self.rigid_body_set,
                &self.collider_set,
                &self.query_pipeline,
                collider.shape(),
                &position,
                displacement,
                filter,
                |collision| collisions.push(collision),
            )
        };

        let mut result = MoveResult {
            translation: movement.translation,
            ..Default::default()
        };
        let mut seen: HashSet<ColliderHandle> = HashSet::new();
        for collision in &collisions {
            if !seen.insert(collision.handle) {
                continue;
            }
            let mut normal = collision.hit.normal1.into_inner();
            // The obstacle normal must face back against the blocked motion
            if normal.dot(&collision.translation_remaining) > 0.0 {
                normal = -normal;
            }
            result.flags.merge(CollisionFlags::classify(&normal));
            result.contacts.push(ContactHit {
                object: self.object_for_collider(collision.handle),
                normal,
                dynamic: self.is_dynamic_collider(collision.handle),
            });
        }
        if movement.grounded && !result.flags.bottom {
            result.flags.bottom = true;
            result.contacts.push(ContactHit {
                object: None,
                normal: Vec3::z(),
                dynamic: false,
            });
        }

        if result.contacts.iter().any(|c| c.dynamic) {
            if let Some(collider) = self.collider_set.get(collider_handle) {
                controller.solve_character_collision_impulses(
                    dt,
                    &mut self.rigid_body_set,
                    &self.collider_set,
                    &self.query_pipeline,
                    collider.shape(),
                    self.avatar_mass,
                    &collisions,
                    filter,
                );
            }
        }

        let center = start + movement.translation;
        if let Some(proxy) = self.proxies.get_mut(&avatar) {
            proxy.center = center;
        }
        if let Some(body) = self.rigid_body_set.get_mut(body_handle) {
            body.set_next_kinematic_translation(center.coords);
        }
        result
    }

    fn sweep_path(
        &self,
        start: Point,
        end: Point,
        radius: f32,
        mask: CollisionMask,
        exclude: Option<ObjectId>,
    ) -> Vec<SweepHit> {
        let delta = end - start;
        if delta.norm() < 1e-6 {
            return Vec::new();
        }
        let exclude_body = exclude.and_then(|o| self.object_to_body.get(&o).copied());
        let shape = Ball::new(radius);
        let origin = Isometry::translation(start.x, start.y, start.z);
        let options = ShapeCastOptions {
            max_time_of_impact: 1.0,
            target_distance: 0.0,
            stop_at_penetration: true,
            compute_impact_geometry_on_penetration: true,
        };

        // Each cast returns the earliest hit; exclude it and cast again for the next one.
        let mut excluded: HashSet<ColliderHandle> = HashSet::new();
        let mut hits = Vec::new();
        while hits.len() < MAX_SWEEP_HITS {
            let predicate = |handle: ColliderHandle, _: &Collider| !excluded.contains(&handle);
            let filter = Self::exclusion_filter(exclude_body, mask).predicate(&predicate);
            let Some((handle, hit)) = self.query_pipeline.cast_shape(
                &self.rigid_body_set,
                &self.collider_set,
                &origin,
                &delta,
                &shape,
                options,
                filter,
            ) else {
                break;
            };
            if let Some(object) = self.object_for_collider(handle) {
                hits.push(SweepHit {
                    object,
                    point: hit.witness1,
                    normal: hit.normal1.into_inner(),
                    t: hit.time_of_impact.clamp(0.0, 1.0),
                });
            }
            excluded.insert(handle);
        }
        hits
    }

    fn raycast(
        &self,
        origin: Point,
        direction: Vec3,
        max_distance: f32,
        mask: CollisionMask,
        exclude: Option<ObjectId>,
    ) -> Option<RayHit> {
        let len = direction.norm();
        if len < 1e-6 || !len.is_finite() {
            return None;
        }
        let ray = Ray::new(origin, direction / len);
        let exclude_body = exclude.and_then(|o| self.object_to_body.get(&o).copied());
        let filter = Self::exclusion_filter(exclude_body, mask);

        let (handle, intersection) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true, // solid
            filter,
        )?;
        Some(RayHit {
            object: self.object_for_collider(handle),
            point: ray.point_at(intersection.time_of_impact),
            normal: intersection.normal,
            distance: intersection.time_of_impact,
        })
    }

    fn object_velocity(&self, object: ObjectId) -> Option<Vec3> {
        let handle = self.object_to_body.get(&object)?;
        self.rigid_body_set.get(*handle).map(|b| *b.linvel())
    }

    fn step(&mut self, dt: f32) {
        self.step_pipeline(dt);
    }
}

impl SceneGraph for RapierWorld {
    fn local_to_world(&self, object: ObjectId) -> Option<Transform> {
        self.object_position(object)
    }
}

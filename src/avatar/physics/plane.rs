//! Analytic collision backend built from bounded half-spaces.
//!
//! Useful where a full rigid-body engine is overkill: unit tests, tools, and servers
//! that only need floors, walls, ceilings and simple moving platforms.

use std::collections::HashMap;

use super::{
    CollisionBackend, CollisionFlags, CollisionMask, ContactHit, MoveResult, ObjectId, RayHit,
    SweepHit,
};
use crate::avatar::math::{Point, Vec3};

const RESOLVE_ITERATIONS: usize = 4;
const CONTACT_SLOP: f32 = 0.01;

/// A half-space whose free side is `normal·p >= offset`.
#[derive(Debug, Clone)]
pub struct Plane {
    pub object: ObjectId,
    pub normal: Vec3,
    pub offset: f32,
    pub mask: CollisionMask,
    /// Horizontal extent `[min_x, min_y, max_x, max_y]`; unbounded when `None`
    pub bounds: Option<[f32; 4]>,
    pub velocity: Vec3,
}

impl Plane {
    fn covers(&self, p: &Point) -> bool {
        match self.bounds {
            Some([min_x, min_y, max_x, max_y]) => {
                p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y
            }
            None => true,
        }
    }

    fn signed_distance(&self, p: &Point) -> f32 {
        self.normal.dot(&p.coords) - self.offset
    }
}

#[derive(Debug, Clone)]
struct PlaneProxy {
    feet: Point,
    radius: f32,
    height: f32,
    enabled: bool,
}

impl PlaneProxy {
    fn sphere_centers(&self, feet: &Point) -> [Point; 2] {
        [
            feet + Vec3::z() * self.radius,
            feet + Vec3::z() * (self.height - self.radius).max(self.radius),
        ]
    }

    /// Gap between the capsule surface and the plane; negative when penetrating.
    fn gap(&self, feet: &Point, plane: &Plane) -> f32 {
        let [low, high] = self.sphere_centers(feet);
        plane
            .signed_distance(&low)
            .min(plane.signed_distance(&high))
            - self.radius
    }
}

#[derive(Debug)]
pub struct PlaneWorld {
    planes: Vec<Plane>,
    proxies: HashMap<ObjectId, PlaneProxy>,
    next_object: u64,
}

impl PlaneWorld {
    pub fn new() -> Self {
        Self {
            planes: Vec::new(),
            proxies: HashMap::new(),
            next_object: 1_000_000,
        }
    }

    /// Infinite floor at height `z`.
    pub fn with_ground(z: f32) -> Self {
        let mut world = Self::new();
        world.add_ground(z);
        world
    }

    fn allocate_id(&mut self) -> ObjectId {
        self.next_object += 1;
        ObjectId(self.next_object)
    }

    pub fn add_plane(&mut self, plane: Plane) -> ObjectId {
        let id = plane.object;
        self.planes.push(plane);
        id
    }

    pub fn add_ground(&mut self, z: f32) -> ObjectId {
        let object = self.allocate_id();
        self.add_plane(Plane {
            object,
            normal: Vec3::z(),
            offset: z,
            mask: CollisionMask::STATIC,
            bounds: None,
            velocity: Vec3::zeros(),
        })
    }

    pub fn add_ceiling(&mut self, z: f32) -> ObjectId {
        let object = self.allocate_id();
        self.add_plane(Plane {
            object,
            normal: -Vec3::z(),
            offset: -z,
            mask: CollisionMask::STATIC,
            bounds: None,
            velocity: Vec3::zeros(),
        })
    }

    /// Half-space through `point` whose free side faces `normal`.
    pub fn add_wall(&mut self, point: Point, normal: Vec3, mask: CollisionMask) -> ObjectId {
        let object = self.allocate_id();
        let normal = normal.normalize();
        self.add_plane(Plane {
            object,
            normal,
            offset: normal.dot(&point.coords),
            mask,
            bounds: None,
            velocity: Vec3::zeros(),
        })
    }

    /// Horizontal platform top at `z` covering the given rectangle.
    pub fn add_platform(&mut self, z: f32, bounds: [f32; 4], velocity: Vec3) -> ObjectId {
        let object = self.allocate_id();
        self.add_plane(Plane {
            object,
            normal: Vec3::z(),
            offset: z,
            mask: CollisionMask::STATIC,
            bounds: Some(bounds),
            velocity,
        })
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }
}

impl Default for PlaneWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionBackend for PlaneWorld {
    fn add_avatar_proxy(&mut self, avatar: ObjectId, feet: Point, radius: f32, height: f32) {
        self.proxies.insert(
            avatar,
            PlaneProxy {
                feet,
                radius,
                height,
                enabled: true,
            },
        );
    }

    fn remove_avatar_proxy(&mut self, avatar: ObjectId) -> bool {
        self.proxies.remove(&avatar).is_some()
    }

    fn proxy_position(&self, avatar: ObjectId) -> Option<Point> {
        self.proxies.get(&avatar).map(|p| p.feet)
    }

    fn set_proxy_position(&mut self, avatar: ObjectId, feet: Point) {
        if let Some(proxy) = self.proxies.get_mut(&avatar) {
            proxy.feet = feet;
        }
    }

    fn set_proxy_enabled(&mut self, avatar: ObjectId, enabled: bool) {
        if let Some(proxy) = self.proxies.get_mut(&avatar) {
            proxy.enabled = enabled;
        }
    }

    fn move_proxy(
        &mut self,
        avatar: ObjectId,
        displacement: Vec3,
        mask: CollisionMask,
        _dt: f32,
    ) -> MoveResult {
        let Some(proxy) = self.proxies.get(&avatar) else {
            return MoveResult::default();
        };
        let start = proxy.feet;
        let mut feet = start + displacement;

        if !proxy.enabled {
            if let Some(proxy) = self.proxies.get_mut(&avatar) {
                proxy.feet = feet;
            }
            return MoveResult {
                translation: displacement,
                ..Default::default()
            };
        }

        let relevant: Vec<&Plane> = self
            .planes
            .iter()
            .filter(|plane| plane.mask.intersects(mask))
            .collect();

        let mut pushed_by = vec![false; relevant.len()];
        for _ in 0..RESOLVE_ITERATIONS {
            let mut any = false;
            for (i, plane) in relevant.iter().enumerate() {
                if !plane.covers(&feet) {
                    continue;
                }
                let gap = proxy.gap(&feet, plane);
                if gap < 0.0 {
                    feet += plane.normal * -gap;
                    pushed_by[i] = true;
                    any = true;
                }
            }
            if !any {
                break;
            }
        }

        let mut result = MoveResult {
            translation: feet - start,
            ..Default::default()
        };
        for (i, plane) in relevant.iter().enumerate() {
            if !plane.covers(&feet) {
                continue;
            }
            let touching = proxy.gap(&feet, plane) <= CONTACT_SLOP;
            let moving_into = displacement.dot(&plane.normal) < 0.0;
            if pushed_by[i] || (touching && moving_into) {
                result.flags.merge(CollisionFlags::classify(&plane.normal));
                result.contacts.push(ContactHit {
                    object: Some(plane.object),
                    normal: plane.normal,
                    dynamic: plane.mask.intersects(CollisionMask::DYNAMIC),
                });
            }
        }

        if let Some(proxy) = self.proxies.get_mut(&avatar) {
            proxy.feet = feet;
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
        let mut hits: Vec<SweepHit> = self
            .planes
            .iter()
            .filter(|plane| plane.mask.intersects(mask) && Some(plane.object) != exclude)
            .filter_map(|plane| {
                let d0 = plane.signed_distance(&start) - radius;
                let d1 = plane.signed_distance(&end) - radius;
                let t = if d0 < 0.0 {
                    0.0
                } else if d1 < 0.0 {
                    d0 / (d0 - d1)
                } else {
                    return None;
                };
                let center = start + delta * t;
                if !plane.covers(&center) {
                    return None;
                }
                Some(SweepHit {
                    object: plane.object,
                    point: center - plane.normal * radius,
                    normal: plane.normal,
                    t,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.t.total_cmp(&b.t));
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
        let dir = direction / len;
        self.planes
            .iter()
            .filter(|plane| plane.mask.intersects(mask) && Some(plane.object) != exclude)
            .filter_map(|plane| {
                let denom = plane.normal.dot(&dir);
                let start_dist = plane.signed_distance(&origin);
                if denom >= -1e-6 || start_dist < 0.0 {
                    return None;
                }
                let distance = -start_dist / denom;
                if distance > max_distance {
                    return None;
                }
                let point = origin + dir * distance;
                plane.covers(&point).then_some(RayHit {
                    object: Some(plane.object),
                    point,
                    normal: plane.normal,
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn object_velocity(&self, object: ObjectId) -> Option<Vec3> {
        self.planes
            .iter()
            .find(|plane| plane.object == object)
            .map(|plane| plane.velocity)
    }

    fn step(&mut self, dt: f32) {
        for plane in &mut self.planes {
            if plane.velocity == Vec3::zeros() {
                continue;
            }
            let shift = plane.velocity * dt;
            plane.offset += plane.normal.dot(&shift);
            if let Some(bounds) = plane.bounds.as_mut() {
                bounds[0] += shift.x;
                bounds[1] += shift.y;
                bounds[2] += shift.x;
                bounds[3] += shift.y;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVATAR: ObjectId = ObjectId(1);

    fn world_with_avatar(feet: Point) -> PlaneWorld {
        let mut world = PlaneWorld::with_ground(0.0);
        world.add_avatar_proxy(AVATAR, feet, 1.0, 6.0);
        world
    }

    #[test]
    fn test_move_into_ground_reports_bottom_contact() {
        let mut world = world_with_avatar(Point::new(0.0, 0.0, 0.0));
        let result = world.move_proxy(AVATAR, Vec3::new(0.5, 0.0, -0.1), CollisionMask::STATIC, 0.016);
        assert!(result.flags.bottom, "resting move should touch the floor");
        assert_eq!(result.contacts.len(), 1);
        let feet = world.proxy_position(AVATAR).unwrap();
        assert!(feet.z.abs() < 1e-5, "feet pushed back onto the floor, got {}", feet.z);
        assert!((feet.x - 0.5).abs() < 1e-5, "horizontal motion kept");
    }

    #[test]
    fn test_wall_blocks_and_reports_side() {
        let mut world = world_with_avatar(Point::new(0.0, 0.0, 0.0));
        world.add_wall(Point::new(2.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), CollisionMask::STATIC);
        let result = world.move_proxy(AVATAR, Vec3::new(3.0, 0.0, 0.0), CollisionMask::STATIC, 0.016);
        assert!(result.flags.sides);
        let feet = world.proxy_position(AVATAR).unwrap();
        assert!((feet.x - 1.0).abs() < 1e-4, "capsule stops one radius from the wall, got {}", feet.x);
    }

    #[test]
    fn test_disabled_proxy_passes_through() {
        let mut world = world_with_avatar(Point::new(0.0, 0.0, 0.0));
        world.set_proxy_enabled(AVATAR, false);
        let result = world.move_proxy(AVATAR, Vec3::new(0.0, 0.0, -2.0), CollisionMask::STATIC, 0.016);
        assert!(!result.flags.any());
        assert!((world.proxy_position(AVATAR).unwrap().z + 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_mask_filters_geometry() {
        let mut world = world_with_avatar(Point::new(0.0, 0.0, 0.0));
        world.add_wall(
            Point::new(2.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            CollisionMask::EXCLUDE_REGION,
        );
        world.move_proxy(AVATAR, Vec3::new(3.0, 0.0, 0.0), CollisionMask::STATIC, 0.016);
        assert!((world.proxy_position(AVATAR).unwrap().x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_raycast_and_sweep_find_floor() {
        let world = PlaneWorld::with_ground(0.0);
        let hit = world
            .raycast(Point::new(0.0, 0.0, 5.0), -Vec3::z(), 10.0, CollisionMask::STATIC, None)
            .expect("ray should hit the floor");
        assert!((hit.distance - 5.0).abs() < 1e-5);
        assert!(world
            .raycast(Point::new(0.0, 0.0, 5.0), Vec3::zeros(), 10.0, CollisionMask::STATIC, None)
            .is_none());

        let hits = world.sweep_path(
            Point::new(0.0, 0.0, 2.0),
            Point::new(0.0, 0.0, -2.0),
            1.0,
            CollisionMask::STATIC,
            None,
        );
        assert_eq!(hits.len(), 1);
        assert!((hits[0].t - 0.25).abs() < 1e-5, "sphere touches after a quarter, got {}", hits[0].t);
    }

    #[test]
    fn test_moving_platform_steps_with_velocity() {
        let mut world = PlaneWorld::new();
        let lift = world.add_platform(0.0, [-5.0, -5.0, 5.0, 5.0], Vec3::new(0.0, 0.0, 2.0));
        world.step(0.5);
        assert!((world.planes()[0].offset - 1.0).abs() < 1e-5);
        assert_eq!(world.object_velocity(lift), Some(Vec3::new(0.0, 0.0, 2.0)));
    }
}

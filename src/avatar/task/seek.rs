//! Seeking: getting the avatar to an exact pose.
//!
//! A smart seek walks there with synthesized control keys (the user's own input is
//! parked meanwhile), then floats the last bit and snaps rotation. A dumb seek
//! interpolates the pose directly with physics off.

use std::f32::consts::FRAC_PI_2;

use tracing::{debug, info};

use crate::avatar::brain::BrainContext;
use crate::avatar::input::ControlCode;
use crate::avatar::math::{
    angle_diff, from_heading, heading, heading_towards, horizontal, transform_from, Point, Transform,
    Vec3,
};
use crate::avatar::messages::AvatarEvent;
use crate::avatar::physics::ObjectId;
use crate::config::SeekConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum SeekTarget {
    Point(Point),
    Transform(Transform),
    /// Followed every tick; the seek aborts if the object disappears
    Object(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekAlignment {
    /// End with the target's rotation
    #[default]
    MatchTarget,
    /// End facing the target position from where the seek started
    FaceTarget,
    /// Leave the heading alone
    KeepHeading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekMode {
    #[default]
    Smart,
    Dumb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeekRequest {
    pub target: SeekTarget,
    pub alignment: SeekAlignment,
    pub mode: SeekMode,
    /// Abandon instead of warping to the goal on timeout
    pub no_warp: bool,
}

impl SeekRequest {
    pub fn smart(target: SeekTarget, alignment: SeekAlignment) -> Self {
        Self {
            target,
            alignment,
            mode: SeekMode::Smart,
            no_warp: false,
        }
    }

    pub fn dumb(target: SeekTarget) -> Self {
        Self {
            target,
            alignment: SeekAlignment::MatchTarget,
            mode: SeekMode::Dumb,
            no_warp: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekPhase {
    Walking,
    Floating,
}

/// Near/far movement limits in the avatar's forward axis.
struct ShuffleLimits {
    min_forward: f32,
    max_back: f32,
}

const NEAR_LIMITS: ShuffleLimits = ShuffleLimits {
    min_forward: 0.5,
    max_back: -0.2,
};
const FAR_LIMITS: ShuffleLimits = ShuffleLimits {
    min_forward: 0.2,
    max_back: -2.0,
};

/// Remaining fraction of the float distance at which position snaps.
const FLOAT_SNAP_FRACTION: f32 = 0.1;
/// Remaining fraction of a dumb seek at which the pose snaps.
const DUMB_SNAP_FRACTION: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct SeekTask {
    request: SeekRequest,
    tunables: SeekConfig,
    started_at: f32,
    warp_count: u64,
    phase: SeekPhase,
    float_start: f32,
    face_heading: Option<f32>,
    start_pose: Transform,
    aborted: bool,
}

impl SeekTask {
    pub fn new(request: SeekRequest, tunables: SeekConfig) -> Self {
        Self {
            request,
            tunables,
            started_at: 0.0,
            warp_count: 0,
            phase: SeekPhase::Walking,
            float_start: 0.0,
            face_heading: None,
            start_pose: Transform::identity(),
            aborted: false,
        }
    }

    pub fn request(&self) -> &SeekRequest {
        &self.request
    }

    fn target_transform(&self, ctx: &BrainContext<'_>) -> Option<Transform> {
        match &self.request.target {
            SeekTarget::Point(p) => Some(transform_from(*p, ctx.controller.global_transform().rotation)),
            SeekTarget::Transform(t) => Some(*t),
            SeekTarget::Object(id) => ctx.scene.local_to_world(*id),
        }
    }

    /// World-space goal pose, or `None` when the target is gone.
    fn goal(&self, ctx: &BrainContext<'_>) -> Option<Transform> {
        let target = self.target_transform(ctx)?;
        let current = ctx.controller.global_transform().rotation;
        let rotation = match self.request.alignment {
            SeekAlignment::MatchTarget => target.rotation,
            SeekAlignment::KeepHeading => current,
            SeekAlignment::FaceTarget => self.face_heading.map(from_heading).unwrap_or(current),
        };
        Some(Transform::from_parts(target.translation, rotation))
    }

    pub(super) fn start(&mut self, ctx: &mut BrainContext<'_>) -> bool {
        let Some(target) = self.target_transform(ctx) else {
            debug!(avatar = %ctx.avatar, "seek target missing at start");
            self.aborted = true;
            ctx.events.push(AvatarEvent::SeekDone { aborted: true });
            return false;
        };
        self.started_at = ctx.time;
        self.warp_count = *ctx.warp_count;
        self.start_pose = ctx.controller.global_transform();
        let towards = horizontal(&(target.translation.vector - self.start_pose.translation.vector));
        if towards.norm() > 1e-4 {
            self.face_heading = Some(heading_towards(&towards));
        }

        match self.request.mode {
            SeekMode::Smart => {
                ctx.input.suspend();
                ctx.controller.set_seeking(true);
            }
            SeekMode::Dumb => ctx.controller.enable(false, ctx.backend),
        }
        info!(avatar = %ctx.avatar, mode = ?self.request.mode, "seek started");
        true
    }

    pub(super) fn process(&mut self, ctx: &mut BrainContext<'_>) -> bool {
        if *ctx.warp_count != self.warp_count {
            debug!(avatar = %ctx.avatar, "seek abandoned by warp");
            self.aborted = true;
            return false;
        }
        let Some(goal) = self.goal(ctx) else {
            debug!(avatar = %ctx.avatar, "seek target lost");
            self.aborted = true;
            return false;
        };
        match self.request.mode {
            SeekMode::Smart => self.process_smart(ctx, goal),
            SeekMode::Dumb => self.process_dumb(ctx, goal),
        }
    }

    fn process_smart(&mut self, ctx: &mut BrainContext<'_>, goal: Transform) -> bool {
        if ctx.time - self.started_at > self.tunables.timeout {
            ctx.input.clear_synthetic_movement();
            if self.request.no_warp {
                debug!(avatar = %ctx.avatar, "seek timed out");
                self.aborted = true;
            } else {
                debug!(avatar = %ctx.avatar, "seek timed out; warping to goal");
                ctx.controller.warp(goal, ctx.backend, ctx.scene);
            }
            return false;
        }

        let pose = ctx.controller.global_transform();
        let position = Point::from(pose.translation.vector);
        let offset = horizontal(&(goal.translation.vector - position.coords));
        let distance = offset.norm();
        let current_heading = heading(&pose.rotation);
        let heading_err = angle_diff(current_heading, heading(&goal.rotation));

        if self.phase == SeekPhase::Walking {
            let keys = self.shuffle_keys(&pose, &offset, distance, heading_err);
            ctx.input.clear_synthetic_movement();
            if keys.is_empty() {
                self.phase = SeekPhase::Floating;
                self.float_start = distance.max(self.tunables.position_tolerance);
            } else {
                for key in keys {
                    ctx.input.set_synthetic(key, true);
                }
                return true;
            }
        }

        if distance > self.tunables.position_tolerance {
            let step = self.tunables.float_speed * ctx.dt;
            let remaining = distance - step;
            let next = if remaining <= self.float_start * FLOAT_SNAP_FRACTION {
                goal.translation.vector
            } else {
                position.coords + offset / distance * step
            };
            let placed = Point::new(next.x, next.y, position.z);
            ctx.controller
                .set_world_pose(transform_from(placed, pose.rotation), ctx.backend, ctx.scene);
            return true;
        }

        let settled = Point::new(goal.translation.x, goal.translation.y, position.z);
        ctx.controller
            .set_world_pose(transform_from(settled, goal.rotation), ctx.backend, ctx.scene);
        false
    }

    fn shuffle_keys(
        &self,
        pose: &Transform,
        offset: &Vec3,
        distance: f32,
        heading_err: f32,
    ) -> Vec<ControlCode> {
        let t = &self.tunables;
        let mut keys = Vec::new();

        if distance > t.max_sidle_range {
            // Too far to sidle: face the goal and walk
            let travel_err = angle_diff(heading(&pose.rotation), heading_towards(offset));
            if travel_err > t.sidle_angle {
                keys.push(ControlCode::TurnLeft);
            } else if travel_err < -t.sidle_angle {
                keys.push(ControlCode::TurnRight);
            }
            if travel_err.abs() < FRAC_PI_2 {
                keys.push(ControlCode::MoveForward);
            }
            return keys;
        }

        let limits = if distance < t.near_distance {
            &NEAR_LIMITS
        } else {
            &FAR_LIMITS
        };
        let forward = offset.dot(&(pose.rotation * Vec3::y()));
        let right = offset.dot(&(pose.rotation * Vec3::x()));

        if forward > limits.min_forward {
            keys.push(ControlCode::MoveForward);
        } else if forward < limits.max_back {
            keys.push(ControlCode::MoveBackward);
        }
        if right > t.shuffle_range {
            keys.push(ControlCode::StrafeRight);
        } else if right < -t.shuffle_range {
            keys.push(ControlCode::StrafeLeft);
        }
        if heading_err > t.rotation_tolerance {
            keys.push(ControlCode::TurnLeft);
        } else if heading_err < -t.rotation_tolerance {
            keys.push(ControlCode::TurnRight);
        }
        keys
    }

    fn process_dumb(&mut self, ctx: &mut BrainContext<'_>, goal: Transform) -> bool {
        let duration = self.tunables.dumb_seek_duration.max(f32::EPSILON);
        let t = ((ctx.time - self.started_at) / duration).clamp(0.0, 1.0);
        if 1.0 - t < DUMB_SNAP_FRACTION {
            ctx.controller.set_world_pose(goal, ctx.backend, ctx.scene);
            return false;
        }
        let pose = self.start_pose.lerp_slerp(&goal, t);
        ctx.controller.set_world_pose(pose, ctx.backend, ctx.scene);
        true
    }

    pub(super) fn finish(&mut self, ctx: &mut BrainContext<'_>) {
        match self.request.mode {
            SeekMode::Smart => {
                ctx.input.clear_synthetic_movement();
                ctx.input.resume();
                ctx.controller.set_seeking(false);
            }
            SeekMode::Dumb => ctx.controller.enable(true, ctx.backend),
        }
        info!(avatar = %ctx.avatar, aborted = self.aborted, "seek done");
        ctx.events.push(AvatarEvent::SeekDone {
            aborted: self.aborted,
        });
    }

    pub(super) fn abandon(&mut self, ctx: &mut BrainContext<'_>) {
        self.aborted = true;
        self.finish(ctx);
    }
}

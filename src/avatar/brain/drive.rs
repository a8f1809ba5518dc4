//! Physics-free flying, steered straight from the keys.

use tracing::info;

use super::{queue_task_message, BrainContext};
use crate::avatar::math::{increment_angle, transform_from, up, Point, Vec3};
use crate::avatar::messages::AvatarMessage;
use crate::avatar::task::TaskQueue;
use crate::config::DriveConfig;
use crate::error::Result;

#[derive(Debug)]
pub struct DriveBrain {
    tasks: TaskQueue,
    tunables: DriveConfig,
}

impl DriveBrain {
    pub fn new(tunables: DriveConfig) -> Self {
        Self {
            tasks: TaskQueue::new(),
            tunables,
        }
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub(super) fn tasks_mut(&mut self) -> &mut TaskQueue {
        &mut self.tasks
    }

    pub(super) fn activate(&mut self, ctx: &mut BrainContext<'_>) {
        ctx.controller.enable(false, ctx.backend);
    }

    pub(super) fn deactivate(&mut self, ctx: &mut BrainContext<'_>) {
        ctx.controller.enable(true, ctx.backend);
        ctx.controller.reset_strategy(false);
    }

    /// Avatar-local direction the keys ask for, not normalized.
    fn key_direction(ctx: &BrainContext<'_>) -> Vec3 {
        let input = &*ctx.input;
        let mut dir = Vec3::zeros();
        if input.forward() {
            dir.y += 1.0;
        }
        if input.backward() {
            dir.y -= 1.0;
        }
        if input.strafe_right() {
            dir.x += 1.0;
        }
        if input.strafe_left() {
            dir.x -= 1.0;
        }
        if input.jump() {
            // Jump climbs, jump with fast descends
            dir.z += if input.fast() { -1.0 } else { 1.0 };
        }
        dir
    }

    pub(super) fn apply(&mut self, ctx: &mut BrainContext<'_>) -> Result<bool> {
        self.tasks.process(ctx);

        let pose = ctx.controller.global_transform();
        let turn = ctx.input.turn_direction() * self.tunables.turn_rate * ctx.dt;
        let rotation = increment_angle(&pose.rotation, turn);

        let local = Self::key_direction(ctx);
        let velocity = match local.try_normalize(1e-6) {
            Some(dir) => {
                let horizontal = rotation * Vec3::new(dir.x, dir.y, 0.0);
                (horizontal + up() * dir.z) * self.tunables.max_velocity
            }
            None => Vec3::zeros(),
        };

        let position = Point::from(pose.translation.vector + velocity * ctx.dt);
        ctx.controller
            .set_world_pose(transform_from(position, rotation), ctx.backend, ctx.scene);
        Ok(true)
    }

    pub(super) fn msg_receive(&mut self, ctx: &mut BrainContext<'_>, msg: &AvatarMessage) -> bool {
        match msg {
            AvatarMessage::TogglePhysical => {
                info!(avatar = %ctx.avatar, "leaving drive mode");
                ctx.stack_ops.pop();
                true
            }
            _ => queue_task_message(&mut self.tasks, msg, ctx.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::avatar::brain::test_rig::{Rig, DT};
    use crate::avatar::brain::{BrainKind, BrainSpec, BrainStack};
    use crate::avatar::input::ControlCode;
    use crate::avatar::math::{heading, Point};
    use crate::avatar::messages::AvatarMessage;

    fn drive_stack(rig: &mut Rig) -> BrainStack {
        let mut stack = BrainStack::new();
        let human = BrainSpec::Human.build(&rig.config);
        stack.push(human, false, &mut rig.ctx());
        assert!(stack.msg_receive(&mut rig.ctx(), &AvatarMessage::TogglePhysical));
        stack.apply_ops(&mut rig.ctx());
        assert_eq!(stack.top_kind(), Some(BrainKind::Drive));
        stack
    }

    #[test]
    fn test_flies_without_gravity() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 5.0));
        let mut stack = drive_stack(&mut rig);
        assert!(!rig.controller.is_enabled());
        for _ in 0..30 {
            rig.tick(&mut stack);
        }
        assert!((rig.controller.world_position().z - 5.0).abs() < 1e-4, "no falling");

        rig.input.set_key(ControlCode::MoveForward, true);
        rig.input.set_key(ControlCode::Jump, true);
        for _ in 0..60 {
            rig.tick(&mut stack);
        }
        let p = rig.controller.world_position();
        let expected = 20.0 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((p.y - expected).abs() < 0.05, "forward {}", p.y);
        assert!((p.z - 5.0 - expected).abs() < 0.05, "up {}", p.z);
    }

    #[test]
    fn test_turn_keys_rotate_at_turn_rate() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = drive_stack(&mut rig);
        rig.input.set_key(ControlCode::TurnLeft, true);
        for _ in 0..30 {
            rig.tick(&mut stack);
        }
        let h = heading(&rig.controller.global_transform().rotation);
        assert!((h - 30.0 * DT).abs() < 1e-3, "heading {h}");
    }

    #[test]
    fn test_toggle_again_pops_and_restores_physics() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = drive_stack(&mut rig);
        assert!(stack.msg_receive(&mut rig.ctx(), &AvatarMessage::TogglePhysical));
        rig.tick(&mut stack);
        assert_eq!(stack.top_kind(), Some(BrainKind::Human));
        assert!(rig.controller.is_enabled());
    }
}

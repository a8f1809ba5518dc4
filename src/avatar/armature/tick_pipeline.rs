use tracing::trace;

use super::Avatar;
use crate::avatar::brain::{BrainContext, BrainStack};
use crate::avatar::messages::{AvatarMessage, AvatarOutput};
use crate::avatar::physics::CollisionBackend;
use crate::avatar::scene::SceneGraph;
use crate::error::Result;

/// Executes the phases that run before the backend steps.
/// Ordered so brains see this tick's input and stack changes land on boundaries:
/// inbox -> stack ops -> brain apply -> stack ops -> animation -> controller apply.
pub(super) fn run_pre_step_phases(
    avatar: &mut Avatar,
    time: f32,
    dt: f32,
    backend: &mut dyn CollisionBackend,
    scene: &dyn SceneGraph,
) -> Result<()> {
    let messages: Vec<AvatarMessage> = avatar.inbox.try_iter().collect();

    {
        let (brains, mut ctx) = avatar.split(backend, scene, time, dt);

        for message in messages {
            route_message(brains, &mut ctx, message);
        }

        // Pushes and pops requested by message handlers.
        brains.apply_ops(&mut ctx);

        // Current brain turns input into behaviors and velocity, and runs its tasks.
        brains.apply(&mut ctx)?;

        // Pops from a finished brain, pushes from tasks.
        brains.apply_ops(&mut ctx);
    }

    avatar.animation.advance(dt);

    // Reconciles deferred enable/kinematic requests, then integrates.
    avatar.controller.apply(dt, backend, scene)?;
    Ok(())
}

/// Executes the phases after the backend stepped: readback, correction, settle.
pub(super) fn run_post_step_phases(
    avatar: &mut Avatar,
    dt: f32,
    backend: &mut dyn CollisionBackend,
    scene: &dyn SceneGraph,
) -> Result<()> {
    let correction = avatar.controller.update(dt, backend, scene)?;
    avatar.publish(AvatarOutput::Correction(correction));

    avatar.controller.post_step();

    avatar.flush_events();
    Ok(())
}

/// Control-level messages go straight to the avatar; the rest go through the brains.
fn route_message(brains: &mut BrainStack, ctx: &mut BrainContext<'_>, message: AvatarMessage) {
    trace!(avatar = %ctx.avatar, ?message, "message");
    match message {
        AvatarMessage::Control { code, pressed } => ctx.input.set_key(code, pressed),
        AvatarMessage::AnalogTurn(turn) => ctx.input.set_analog_turn(turn),
        AvatarMessage::KeyboardTurnStrength(strength) => {
            ctx.input.set_keyboard_turn_strength(strength)
        }
        AvatarMessage::Warp(world) => ctx.warp(world),
        AvatarMessage::SetSubworld(subworld) => {
            ctx.controller.set_subworld(subworld, ctx.backend, ctx.scene)
        }
        other => {
            brains.msg_receive(ctx, &other);
        }
    }
}

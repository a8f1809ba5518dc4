use tracing::warn;

use crate::avatar::brain::BrainContext;
use crate::avatar::messages::AvatarEvent;

/// Blend-out level below which a fading clip is detached.
const DETACH_BLEND: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct AnimRequest {
    pub name: String,
    /// Blend gained per second; 0 snaps
    pub blend_in: f32,
    /// Blend lost per second; 0 snaps
    pub blend_out: f32,
    /// Keep playing until a stop message arrives
    pub looping: bool,
}

impl AnimRequest {
    pub fn once(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blend_in: 2.0,
            blend_out: 2.0,
            looping: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnimPhase {
    FadingIn,
    Playing,
    FadingOut,
}

#[derive(Debug, Clone)]
pub struct AnimTask {
    request: AnimRequest,
    blend: f32,
    phase: AnimPhase,
    stop_requested: bool,
}

impl AnimTask {
    pub fn new(request: AnimRequest) -> Self {
        Self {
            request,
            blend: 0.0,
            phase: AnimPhase::FadingIn,
            stop_requested: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.request.name
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub(super) fn start(&mut self, ctx: &mut BrainContext<'_>) -> bool {
        if !ctx.animation.attach(&self.request.name, 0.0) {
            warn!(avatar = %ctx.avatar, anim = %self.request.name, "unknown animation");
            return false;
        }
        true
    }

    pub(super) fn process(&mut self, ctx: &mut BrainContext<'_>) -> bool {
        let name = self.request.name.as_str();
        match self.phase {
            AnimPhase::FadingIn => {
                self.blend = step_blend(self.blend, 1.0, self.request.blend_in, ctx.dt);
                if self.blend >= 1.0 {
                    self.phase = AnimPhase::Playing;
                }
            }
            AnimPhase::Playing => {
                let done = self.stop_requested || (!self.request.looping && ctx.animation.is_done(name));
                if done {
                    self.phase = AnimPhase::FadingOut;
                }
            }
            AnimPhase::FadingOut => {
                self.blend = step_blend(self.blend, 0.0, self.request.blend_out, ctx.dt);
                if self.blend < DETACH_BLEND {
                    ctx.animation.detach(name);
                    return false;
                }
            }
        }
        ctx.animation.set_blend(name, self.blend);
        true
    }

    pub(super) fn finish(&mut self, ctx: &mut BrainContext<'_>) {
        ctx.events.push(AvatarEvent::AnimationDone(self.request.name.clone()));
    }

    pub(super) fn abandon(&mut self, ctx: &mut BrainContext<'_>) {
        ctx.animation.detach(&self.request.name);
    }
}

/// Moves a blend toward `target` by `rate` per second. A zero rate snaps.
pub(crate) fn step_blend(current: f32, target: f32, rate: f32, dt: f32) -> f32 {
    if rate <= 0.0 {
        return target;
    }
    if target > current {
        (current + rate * dt).min(target)
    } else {
        (current - rate * dt).max(target)
    }
}

//! Animation layer consumed by brains and tasks.
//!
//! Brains only decide blend strengths; the layer owns playback. Root motion (the
//! velocity animations would move the avatar at) flows back into the controller.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::math::Vec3;

/// Velocity contributed by the blended animations, avatar-local.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RootMotion {
    pub linear: Vec3,
    /// Turn rate about Z, positive turns left
    pub angular: f32,
}

pub trait AnimationLayer {
    /// Starts playing `name` at `blend`. Returns false for unknown clips.
    fn attach(&mut self, name: &str, blend: f32) -> bool;

    fn detach(&mut self, name: &str);

    fn is_attached(&self, name: &str) -> bool;

    fn set_blend(&mut self, name: &str, blend: f32);

    /// 0.0 for detached clips.
    fn blend(&self, name: &str) -> f32;

    /// True once a non-looping clip played to its end.
    fn is_done(&self, name: &str) -> bool;

    fn advance(&mut self, dt: f32);

    fn root_motion(&self) -> RootMotion;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipDef {
    pub length: f32,
    pub looping: bool,
    /// Nominal root velocity at full blend, avatar-local
    pub velocity: Vec3,
    pub angular: f32,
    /// Root motion applies only until this clip time. Jumps use it for takeoff.
    pub motion_until: Option<f32>,
}

impl ClipDef {
    pub fn looping(velocity: Vec3) -> Self {
        Self {
            length: 1.0,
            looping: true,
            velocity,
            angular: 0.0,
            motion_until: None,
        }
    }

    pub fn once(length: f32, velocity: Vec3) -> Self {
        Self {
            length,
            looping: false,
            velocity,
            angular: 0.0,
            motion_until: None,
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveClip {
    blend: f32,
    time: f32,
}

/// Minimal blend mixer: tracks clip time and blend, and reports the
/// blend-weighted sum of nominal root velocities.
#[derive(Debug)]
pub struct BlendMixer {
    clips: HashMap<String, ClipDef>,
    active: HashMap<String, ActiveClip>,
    rng: StdRng,
}

impl Default for BlendMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlendMixer {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
            active: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic start phases for looping clips.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new()
        }
    }

    pub fn define(&mut self, name: impl Into<String>, clip: ClipDef) {
        self.clips.insert(name.into(), clip);
    }

    /// Mixer preloaded with the human and swim locomotion clips.
    pub fn with_locomotion_clips(seed: Option<u64>) -> Self {
        let mut mixer = match seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        };
        let jump = |forward: f32, up: f32| ClipDef {
            length: 1.0,
            looping: false,
            velocity: Vec3::new(0.0, forward, up),
            angular: 0.0,
            motion_until: Some(0.2),
        };
        let clips = [
            ("Idle", ClipDef::looping(Vec3::zeros())),
            ("Walk", ClipDef::looping(Vec3::new(0.0, 5.0, 0.0))),
            ("Run", ClipDef::looping(Vec3::new(0.0, 13.0, 0.0))),
            ("WalkBack", ClipDef::looping(Vec3::new(0.0, -4.0, 0.0))),
            ("StandingTurnLeft", ClipDef::looping(Vec3::zeros())),
            ("StandingTurnRight", ClipDef::looping(Vec3::zeros())),
            ("StepLeft", ClipDef::looping(Vec3::new(-3.5, 0.0, 0.0))),
            ("StepRight", ClipDef::looping(Vec3::new(3.5, 0.0, 0.0))),
            ("Fall", ClipDef::looping(Vec3::zeros())),
            ("StandingJump", jump(0.0, 12.0)),
            ("WalkingJump", jump(5.0, 12.0)),
            ("RunningJump", jump(13.0, 12.0)),
            ("GroundImpact", ClipDef::once(0.5, Vec3::zeros())),
            ("RunningImpact", ClipDef::once(0.5, Vec3::new(0.0, 6.0, 0.0))),
            ("MovingTurnLeft", ClipDef::looping(Vec3::new(0.0, 5.0, 0.0))),
            ("MovingTurnRight", ClipDef::looping(Vec3::new(0.0, 5.0, 0.0))),
            ("PushWalk", ClipDef::looping(Vec3::new(0.0, 2.5, 0.0))),
            ("TreadWater", ClipDef::looping(Vec3::zeros())),
            ("SwimForward", ClipDef::looping(Vec3::new(0.0, 4.0, 0.0))),
            ("SwimForwardFast", ClipDef::looping(Vec3::new(0.0, 8.0, 0.0))),
            ("SwimBack", ClipDef::looping(Vec3::new(0.0, -2.0, 0.0))),
            ("SwimLeft", ClipDef::looping(Vec3::new(-2.0, 0.0, 0.0))),
            ("SwimRight", ClipDef::looping(Vec3::new(2.0, 0.0, 0.0))),
            ("SwimTurnLeft", ClipDef::looping(Vec3::new(0.0, 3.0, 0.0))),
            ("SwimTurnRight", ClipDef::looping(Vec3::new(0.0, 3.0, 0.0))),
            ("TreadTurnLeft", ClipDef::looping(Vec3::zeros())),
            ("TreadTurnRight", ClipDef::looping(Vec3::zeros())),
        ];
        for (name, clip) in clips {
            mixer.define(name, clip);
        }
        mixer
    }

    pub fn clip_time(&self, name: &str) -> Option<f32> {
        self.active.get(name).map(|a| a.time)
    }
}

impl AnimationLayer for BlendMixer {
    fn attach(&mut self, name: &str, blend: f32) -> bool {
        let Some(clip) = self.clips.get(name) else {
            return false;
        };
        // Looping clips start at a random phase so avatars don't move in lockstep
        let time = if clip.looping && clip.length > 0.0 {
            self.rng.gen_range(0.0..clip.length)
        } else {
            0.0
        };
        self.active.insert(
            name.to_string(),
            ActiveClip {
                blend: blend.clamp(0.0, 1.0),
                time,
            },
        );
        true
    }

    fn detach(&mut self, name: &str) {
        self.active.remove(name);
    }

    fn is_attached(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    fn set_blend(&mut self, name: &str, blend: f32) {
        if let Some(active) = self.active.get_mut(name) {
            active.blend = blend.clamp(0.0, 1.0);
        }
    }

    fn blend(&self, name: &str) -> f32 {
        self.active.get(name).map_or(0.0, |a| a.blend)
    }

    fn is_done(&self, name: &str) -> bool {
        match (self.clips.get(name), self.active.get(name)) {
            (Some(clip), Some(active)) => !clip.looping && active.time >= clip.length,
            _ => false,
        }
    }

    fn advance(&mut self, dt: f32) {
        for (name, active) in self.active.iter_mut() {
            let Some(clip) = self.clips.get(name) else {
                continue;
            };
            active.time += dt;
            if clip.looping && clip.length > 0.0 {
                active.time %= clip.length;
            } else {
                active.time = active.time.min(clip.length);
            }
        }
    }

    fn root_motion(&self) -> RootMotion {
        let mut motion = RootMotion::default();
        for (name, active) in &self.active {
            let Some(clip) = self.clips.get(name) else {
                continue;
            };
            if clip.motion_until.is_some_and(|until| active.time >= until) {
                continue;
            }
            motion.linear += clip.velocity * active.blend;
            motion.angular += clip.angular * active.blend;
        }
        motion
    }
}

//! Messages into an avatar and the outputs it publishes.

use crossbeam_channel::{Receiver, Sender};

use super::brain::climb::ClimbDirection;
use super::brain::generic::GenericCommand;
use super::brain::{BrainKind, BrainSpec};
use super::controller::CorrectionMessage;
use super::input::ControlCode;
use super::math::Transform;
use super::physics::ObjectId;
use super::swim_region::SwimRegion;
use super::task::anim::AnimRequest;
use super::task::seek::SeekRequest;

#[derive(Debug, Clone)]
pub enum AvatarMessage {
    Control { code: ControlCode, pressed: bool },
    AnalogTurn(f32),
    KeyboardTurnStrength(f32),
    /// Teleport to a world transform; abandons any running seek
    Warp(Transform),
    SetSubworld(Option<ObjectId>),
    TogglePhysical,
    SwimEnter(SwimRegion),
    SwimLeave,
    ClimbStart { target: Transform, direction: ClimbDirection },
    EnableClimb { direction: ClimbDirection, on: bool },
    EnableDismount { direction: ClimbDirection, on: bool },
    ClimbRelease,
    ClimbFallOff,
    RideEnter,
    RideLeave,
    Seek(SeekRequest),
    PlayAnimation(AnimRequest),
    StopAnimation(String),
    PushBrain { spec: BrainSpec, suspend_current: bool },
    PopBrain,
    Generic(GenericCommand),
    /// Anything no brain recognizes; logged and dropped
    Custom(String),
}

impl AvatarMessage {
    pub fn control(code: ControlCode, pressed: bool) -> Self {
        AvatarMessage::Control { code, pressed }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AvatarEvent {
    SeekDone { aborted: bool },
    /// Fell for too long; the caller should link the avatar somewhere safe
    PanicLink,
    Warped,
    BrainPushed(BrainKind),
    BrainPopped(BrainKind),
    AnimationDone(String),
    GenericStage { stage: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AvatarOutput {
    Correction(CorrectionMessage),
    Event(AvatarEvent),
}

/// Cloneable handle for feeding messages into one avatar.
#[derive(Debug, Clone)]
pub struct AvatarSender {
    avatar: ObjectId,
    tx: Sender<AvatarMessage>,
}

impl AvatarSender {
    pub(crate) fn new(avatar: ObjectId, tx: Sender<AvatarMessage>) -> Self {
        Self { avatar, tx }
    }

    pub fn avatar(&self) -> ObjectId {
        self.avatar
    }

    /// Returns false once the avatar is gone.
    pub fn send(&self, message: AvatarMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn press(&self, code: ControlCode) -> bool {
        self.send(AvatarMessage::control(code, true))
    }

    pub fn release(&self, code: ControlCode) -> bool {
        self.send(AvatarMessage::control(code, false))
    }
}

/// Receiving end of an avatar's outputs.
#[derive(Debug, Clone)]
pub struct AvatarOutputs {
    rx: Receiver<AvatarOutput>,
}

impl AvatarOutputs {
    pub(crate) fn new(rx: Receiver<AvatarOutput>) -> Self {
        Self { rx }
    }

    pub fn drain(&self) -> Vec<AvatarOutput> {
        self.rx.try_iter().collect()
    }

    /// Drains and keeps only events.
    pub fn events(&self) -> Vec<AvatarEvent> {
        self.rx
            .try_iter()
            .filter_map(|output| match output {
                AvatarOutput::Event(event) => Some(event),
                AvatarOutput::Correction(_) => None,
            })
            .collect()
    }
}

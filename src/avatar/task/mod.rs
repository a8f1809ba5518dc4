//! Queued brain work.
//!
//! Each brain owns a [`TaskQueue`]: one running task plus a FIFO of pending ones. A
//! task goes `start → process* → finish`, or is abandoned when its brain goes away.

pub mod anim;
pub mod seek;

use std::collections::VecDeque;

use tracing::debug;

use super::brain::{BrainContext, BrainSpec};
use anim::AnimTask;
use seek::SeekTask;

#[derive(Debug, Clone)]
pub enum AvTask {
    Seek(SeekTask),
    PlayAnimation(AnimTask),
    PushBrain { spec: BrainSpec, suspend_current: bool },
    PopBrain,
}

impl AvTask {
    pub fn name(&self) -> &'static str {
        match self {
            AvTask::Seek(_) => "seek",
            AvTask::PlayAnimation(_) => "play-animation",
            AvTask::PushBrain { .. } => "push-brain",
            AvTask::PopBrain => "pop-brain",
        }
    }

    /// Returns false when the task can't run; it is then dropped.
    fn start(&mut self, ctx: &mut BrainContext<'_>) -> bool {
        match self {
            AvTask::Seek(task) => task.start(ctx),
            AvTask::PlayAnimation(task) => task.start(ctx),
            AvTask::PushBrain {
                spec,
                suspend_current,
            } => {
                ctx.stack_ops.push(spec.clone(), *suspend_current);
                true
            }
            AvTask::PopBrain => {
                ctx.stack_ops.pop();
                true
            }
        }
    }

    /// Returns true while the task wants more time.
    fn process(&mut self, ctx: &mut BrainContext<'_>) -> bool {
        match self {
            AvTask::Seek(task) => task.process(ctx),
            AvTask::PlayAnimation(task) => task.process(ctx),
            AvTask::PushBrain { .. } | AvTask::PopBrain => false,
        }
    }

    fn finish(&mut self, ctx: &mut BrainContext<'_>) {
        match self {
            AvTask::Seek(task) => task.finish(ctx),
            AvTask::PlayAnimation(task) => task.finish(ctx),
            AvTask::PushBrain { .. } | AvTask::PopBrain => {}
        }
    }

    fn abandon(&mut self, ctx: &mut BrainContext<'_>) {
        match self {
            AvTask::Seek(task) => task.abandon(ctx),
            AvTask::PlayAnimation(task) => task.abandon(ctx),
            AvTask::PushBrain { .. } | AvTask::PopBrain => {}
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    current: Option<AvTask>,
    pending: VecDeque<AvTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, task: AvTask) {
        debug!(task = task.name(), pending = self.pending.len(), "queued task");
        self.pending.push_back(task);
    }

    pub fn current(&self) -> Option<&AvTask> {
        self.current.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    /// Runs the current task; once it finishes, starts the next pending one.
    pub fn process(&mut self, ctx: &mut BrainContext<'_>) {
        if let Some(task) = self.current.as_mut() {
            if task.process(ctx) {
                return;
            }
            task.finish(ctx);
            debug!(avatar = %ctx.avatar, task = task.name(), "task finished");
            self.current = None;
        }

        while let Some(mut next) = self.pending.pop_front() {
            if next.start(ctx) {
                debug!(avatar = %ctx.avatar, task = next.name(), "task started");
                self.current = Some(next);
                break;
            }
            debug!(avatar = %ctx.avatar, task = next.name(), "task failed to start; dropped");
        }
    }

    /// Abandons the running task and drops everything pending.
    pub fn abandon_all(&mut self, ctx: &mut BrainContext<'_>) {
        if let Some(mut task) = self.current.take() {
            debug!(avatar = %ctx.avatar, task = task.name(), "task abandoned");
            task.abandon(ctx);
        }
        self.pending.clear();
    }

    /// Asks a running animation task named `name` to fade out.
    pub fn stop_animation(&mut self, name: &str) -> bool {
        let running = self.current.iter_mut().chain(self.pending.iter_mut());
        for task in running {
            if let AvTask::PlayAnimation(anim) = task {
                if anim.name() == name {
                    anim.request_stop();
                    return true;
                }
            }
        }
        false
    }
}

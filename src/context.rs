//! Per-host-thread context: the handle a host thread uses to attach to and
//! drive a task.

use std::sync::Arc;

use crate::error::Error;
use crate::task::{ContextId, TaskExec, TaskId};
use crate::world::World;

/// Scratch state a context keeps between calls: the last allocator error
/// seen, and the outcome of the most recent operation. Mirrors the design's
/// "allocator error, last-result slot" without a union, since Rust gives us
/// a real sum type for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextScratch {
    pub last_alloc_error: Option<Error>,
    pub last_result: Option<Result<(), Error>>,
}

/// A host thread's binding into a [`World`].
///
/// Holds the task's [`TaskExec`] directly while attached — taken out of the
/// world's task table for the duration, so the interpreter runs with no
/// lock held. The condition variable a contending attacher parks on lives
/// in the world's task table, keyed by this context's id.
pub struct Context {
    pub id: ContextId,
    pub world: Arc<World>,
    active_task_id: Option<TaskId>,
    active_exec: Option<TaskExec>,
    pub scratch: ContextScratch,
}

impl Context {
    pub fn new(id: ContextId, world: Arc<World>) -> Context {
        Context {
            id,
            world,
            active_task_id: None,
            active_exec: None,
            scratch: ContextScratch::default(),
        }
    }

    pub fn active_task_id(&self) -> Option<TaskId> {
        self.active_task_id
    }

    pub fn active_exec(&self) -> Option<&TaskExec> {
        self.active_exec.as_ref()
    }

    pub fn active_exec_mut(&mut self) -> Option<&mut TaskExec> {
        self.active_exec.as_mut()
    }

    /// Installs the exec state taken from a task this context just attached
    /// to. Panics if already holding one — callers must `release` first.
    pub(crate) fn bind(&mut self, task_id: TaskId, exec: TaskExec) {
        assert!(self.active_exec.is_none(), "context already holds a task");
        self.active_task_id = Some(task_id);
        self.active_exec = Some(exec);
    }

    /// Hands the exec state back for `detach` to restore into the task's
    /// node. Returns `None` if no task is currently attached.
    pub(crate) fn release(&mut self) -> Option<(TaskId, TaskExec)> {
        let task_id = self.active_task_id.take()?;
        let exec = self.active_exec.take()?;
        Some((task_id, exec))
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.world.tasks.lock() {
            tasks.unregister_context(self.id);
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("active_task_id", &self.active_task_id)
            .finish_non_exhaustive()
    }
}

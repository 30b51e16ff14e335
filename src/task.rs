//! Tasks: the unit of execution a context attaches to and drives forward.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Condvar};

use crate::consts::{INITIAL_FRAME_CAPACITY, INITIAL_MODMAP_CAPACITY, INITIAL_REG_CAPACITY};
use crate::module::ModuleData;

pub type TaskId = u32;
pub type ContextId = u32;

/// One entry of a task's frame stack.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Index into the task's module map identifying which module this
    /// frame's procedure belongs to.
    pub modmap_index: u32,
    pub proc_index: u32,
    /// Byte offset into the task's register buffer this frame's registers
    /// are based at. Always a multiple of [`crate::consts::REG_BASE_ALIGN`].
    pub reg_base: u32,
    /// Absolute index into the owning module's instruction table of the
    /// next instruction to execute.
    pub cursor: u32,
}

/// The four states a task can be in, each backed by its own queue on the
/// world (protected by the task mutex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Running,
    Waiting,
    Ready,
    Suspended,
}

/// A task's mutable execution state: everything a [`crate::context::Context`]
/// needs exclusive access to while it is attached.
///
/// This is moved, not locked, into the attaching context for the duration
/// of a burst — the task mutex only ever guards whether the `TaskExec` is
/// present in its [`TaskNode`] or has been taken out, never the execution
/// itself. That is how the interpreter avoids any lock on its hot path.
#[derive(Debug)]
pub struct TaskExec {
    pub reg: Vec<u8>,
    pub reg_limit: usize,
    pub frames: Vec<Frame>,
    pub frame_limit: usize,
    /// Modules this task has imported, pre-mapped with the world's core
    /// module at [`crate::consts::CORE_MODULE_MAP_INDEX`].
    pub modmap: Vec<Arc<ModuleData>>,
    /// Set by `kill`, possibly while this task is attached elsewhere; shared
    /// with the owning [`TaskNode`] so a kill reaches a running burst
    /// without taking the task mutex on the interpreter's hot path.
    pub kill_flag: Arc<AtomicBool>,
}

impl TaskExec {
    pub fn new(core_module: Arc<ModuleData>, reg_limit: usize, frame_limit: usize, kill_flag: Arc<AtomicBool>) -> TaskExec {
        let mut modmap = Vec::with_capacity(INITIAL_MODMAP_CAPACITY);
        modmap.push(core_module);
        TaskExec {
            reg: vec![0u8; INITIAL_REG_CAPACITY.min(reg_limit)],
            reg_limit,
            frames: Vec::with_capacity(INITIAL_FRAME_CAPACITY),
            frame_limit,
            modmap,
            kill_flag,
        }
    }

    pub fn module(&self, modmap_index: u32) -> Option<&Arc<ModuleData>> {
        self.modmap.get(modmap_index as usize)
    }
}

/// A task's identity and queue membership, independent of whether its
/// [`TaskExec`] is currently checked out by an attached context.
#[derive(Debug)]
pub struct TaskNode {
    pub id: TaskId,
    pub state: TaskState,
    pub owner: Option<ContextId>,
    pub waiters: VecDeque<ContextId>,
    pub refcount: u32,
    /// `None` while a context holds this task's exec state.
    pub exec: Option<TaskExec>,
    /// Shared with the checked-out [`TaskExec`]; `kill` flips this
    /// regardless of whether the task is currently attached.
    pub kill_flag: Arc<AtomicBool>,
}

impl TaskNode {
    pub fn new(id: TaskId, exec: TaskExec) -> TaskNode {
        TaskNode {
            id,
            state: TaskState::Suspended,
            owner: None,
            waiters: VecDeque::new(),
            refcount: 1,
            kill_flag: Arc::clone(&exec.kill_flag),
            exec: Some(exec),
        }
    }
}

/// Owns every task, keyed by id, independent of the four logical state
/// queues (a task's `state` field is authoritative; no separate linked
/// lists are needed in an in-memory Rust representation).
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: Vec<TaskNode>,
    next_id: TaskId,
    /// One condition variable per currently-attached context, used by the
    /// attach protocol's waiter queue. Lives here rather than on `Context`
    /// because signaling a waiter by id requires looking it up while
    /// already holding the task mutex.
    condvars: HashMap<ContextId, Arc<Condvar>>,
}

impl TaskTable {
    pub fn new() -> TaskTable {
        TaskTable {
            tasks: Vec::new(),
            next_id: 1,
            condvars: HashMap::new(),
        }
    }

    pub fn register_context(&mut self, id: ContextId) {
        self.condvars.insert(id, Arc::new(Condvar::new()));
    }

    pub fn unregister_context(&mut self, id: ContextId) {
        self.condvars.remove(&id);
    }

    pub fn condvar_for(&self, id: ContextId) -> Option<Arc<Condvar>> {
        self.condvars.get(&id).cloned()
    }

    pub fn create(&mut self, core_module: Arc<ModuleData>, reg_limit: usize, frame_limit: usize) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        let kill_flag = Arc::new(AtomicBool::new(false));
        let exec = TaskExec::new(core_module, reg_limit, frame_limit, kill_flag);
        self.tasks.push(TaskNode::new(id, exec));
        id
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Drops a task from the table entirely. Called once its refcount hits
    /// zero via `deref`.
    pub fn remove(&mut self, id: TaskId) {
        self.tasks.retain(|t| t.id != id);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ProcRecord;

    fn core_module() -> Arc<ModuleData> {
        Arc::new(ModuleData {
            id: 0,
            name_block: 0,
            proc_table: vec![ProcRecord::default()],
            reg_sizes: vec![],
            data_block_table: vec![0],
            target_table: vec![],
            insn_table: vec![],
            const128: vec![],
            const64: vec![],
            const32: vec![],
            data: vec![],
        })
    }

    #[test]
    fn create_pre_maps_core_module() {
        let mut table = TaskTable::new();
        let id = table.create(core_module(), 4096, 64);
        let node = table.get(id).unwrap();
        assert_eq!(node.state, TaskState::Suspended);
        let exec = node.exec.as_ref().unwrap();
        assert_eq!(exec.modmap.len(), 1);
    }

    #[test]
    fn deref_to_zero_removes_task() {
        let mut table = TaskTable::new();
        let id = table.create(core_module(), 4096, 64);
        {
            let node = table.get_mut(id).unwrap();
            node.refcount -= 1;
        }
        assert_eq!(table.get(id).unwrap().refcount, 0);
        table.remove(id);
        assert!(table.get(id).is_none());
    }
}

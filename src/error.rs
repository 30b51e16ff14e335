//! Status codes returned by every core operation.
//!
//! Mirrors the taxonomy in the design notes: a handful of *recoverable*
//! variants the caller can act on, and a set of *fatal* variants that mean
//! an internal invariant broke and the [`crate::world::World`] should be
//! torn down.

use thiserror::Error;

/// Status returned by the core API. `Ok(T)` corresponds to `HZA_OK`; every
/// other variant corresponds to one row of the recoverable/fatal taxonomy.
pub type Status<T> = Result<T, Error>;

/// Recoverable or fatal error produced by a core operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The host allocator reported a failure.
    #[error("allocation failed")]
    Alloc,
    /// The operation is not valid for the current state of the object
    /// (e.g. entering a frame on a task that isn't attached).
    #[error("operation invalid in current state")]
    State,
    /// The task's frame stack cannot grow any further.
    #[error("frame stack limit reached")]
    StackLimit,
    /// The task's register space cannot grow any further.
    #[error("register space limit reached")]
    RegLimit,
    /// A procedure index was out of range for the module.
    #[error("procedure index out of range")]
    ProcIndex,
    /// The module binary ends before a declared table does.
    #[error("module truncated")]
    ModuleTruncated,
    /// The module binary does not start with the expected magic.
    #[error("module magic mismatch")]
    ModuleMagic,
    /// The module failed structural or operand verification.
    #[error("module corrupt")]
    ModuleCorrupt,
    /// Failed to create a condition variable for a context.
    #[error("failed creating condition variable")]
    CondCreate,
    /// Failed to allocate the world itself.
    #[error("failed allocating world")]
    WorldAlloc,
    /// Failed to initialize the log sink's mutex.
    #[error("failed initializing log mutex")]
    LogMutexInit,

    /// An internal invariant was violated; the bug is in this crate.
    #[error("internal invariant violated")]
    Bug,
    /// Execution reached an instruction path that isn't implemented.
    #[error("unimplemented code path reached")]
    NoCode,
    /// A mutex guarding world/module/task/log state was poisoned by a
    /// panicking holder.
    #[error("mutex lock failed")]
    MutexLock,
    /// A waiter failed to reacquire a mutex after a condition-variable wait.
    #[error("mutex unlock failed")]
    MutexUnlock,
    /// Failed to tear down a context's condition variable.
    #[error("failed destroying condition variable")]
    CondDestroy,
    /// Failed to free the world's resources at teardown.
    #[error("failed freeing world")]
    WorldFree,
    /// The host allocator detected corruption while freeing a block.
    #[error("heap corruption detected on free")]
    Free,
    /// The interpreter decoded an opcode it doesn't recognize.
    #[error("unsupported opcode")]
    UnsupportedOpcode,
}

impl Error {
    /// Whether this status represents a fatal condition: the world should be
    /// considered unusable and finalized by the host.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Error::Bug
                | Error::NoCode
                | Error::MutexLock
                | Error::MutexUnlock
                | Error::CondDestroy
                | Error::WorldFree
                | Error::Free
                | Error::UnsupportedOpcode
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Error {
        Error::MutexLock
    }
}

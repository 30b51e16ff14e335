//! Module-format and runtime tuning constants.

/// Magic bytes every module binary must start with.
pub const MODULE_MAGIC: [u8; 8] = *b"[hza00]\n";

/// Size in bytes of the fixed module header (14 x u32), magic excluded.
pub const MODULE_HEADER_WORDS: usize = 14;

/// Size in bytes of one procedure-table record (6 x u32).
pub const PROC_RECORD_WORDS: usize = 6;

/// Largest register access width, in bits; also the frame `reg_base`
/// alignment (16 bytes == 128 bits).
pub const MAX_REG_BITS: u32 = 128;

/// `reg_base` and `reg_shift` must be multiples of this many bytes.
pub const REG_BASE_ALIGN: usize = (MAX_REG_BITS / 8) as usize;

/// Initial number of bytes allocated for a task's register space.
pub const INITIAL_REG_CAPACITY: usize = 256;

/// Initial number of frames allocated for a task's frame stack.
pub const INITIAL_FRAME_CAPACITY: usize = 8;

/// Initial number of entries allocated for a task's module map.
pub const INITIAL_MODMAP_CAPACITY: usize = 4;

/// Growth factor applied when a task's register space, frame stack, or
/// module map runs out of room.
pub const GROWTH_FACTOR: usize = 2;

/// Upper bound on the number of procedures a single module may declare,
/// mirroring the source's "16M procs per module tops! or else..." limit.
pub const MAX_PROC: u32 = 0x0100_0000;

/// Task-local module-map index at which the world's "core" module is
/// always pre-mapped.
pub const CORE_MODULE_MAP_INDEX: u32 = 0;

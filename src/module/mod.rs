//! Verified, immutable-after-load modules.
//!
//! A [`ModuleData`] is the trusted, in-memory form of a module binary: every
//! instruction has passed the verifier (see [`verifier`]) and every
//! procedure carries its computed `reg_size`. Nothing in this module ever
//! mutates a [`ModuleData`] after [`codec::decode`] + [`verifier::verify`]
//! hand one back.

pub mod codec;
pub mod core_image;
pub mod verifier;

use crate::opcode::Instruction;

/// One record of the procedure table: start indices into the four pools
/// this procedure draws from, plus a data-block index used both as the
/// procedure's display name and as the key [`ModuleData::export_index`]
/// matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcRecord {
    pub insn_start: u32,
    pub target_start: u32,
    pub const128_start: u32,
    pub const64_start: u32,
    pub const32_start: u32,
    pub name: u32,
}

/// A verified module: every table below has already been validated by
/// [`verifier::verify`] and `reg_sizes` has one entry per procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleData {
    pub id: u32,
    pub name_block: u32,
    pub proc_table: Vec<ProcRecord>,
    pub reg_sizes: Vec<u32>,
    pub data_block_table: Vec<u32>,
    pub target_table: Vec<u32>,
    pub insn_table: Vec<Instruction>,
    pub const128: Vec<u128>,
    pub const64: Vec<u64>,
    pub const32: Vec<u32>,
    pub data: Vec<u8>,
}

/// A read-only view into one procedure's slices of its module's pools.
#[derive(Debug, Clone, Copy)]
pub struct ProcView<'m> {
    pub index: u32,
    pub insn: &'m [Instruction],
    pub target: &'m [u32],
    pub const128: &'m [u128],
    pub const64: &'m [u64],
    pub const32: &'m [u32],
    pub name: u32,
    pub reg_size: u32,
}

impl ModuleData {
    /// Number of procedures declared by this module (the proc table has one
    /// extra sentinel record beyond this count).
    pub fn proc_count(&self) -> u32 {
        self.proc_table.len() as u32 - 1
    }

    /// Returns a view of procedure `index`, or `None` if out of range.
    pub fn proc(&self, index: u32) -> Option<ProcView<'_>> {
        if index >= self.proc_count() {
            return None;
        }
        let rec = self.proc_table[index as usize];
        let next = self.proc_table[index as usize + 1];
        Some(ProcView {
            index,
            insn: &self.insn_table[rec.insn_start as usize..next.insn_start as usize],
            target: &self.target_table[rec.target_start as usize..next.target_start as usize],
            const128: &self.const128[rec.const128_start as usize..next.const128_start as usize],
            const64: &self.const64[rec.const64_start as usize..next.const64_start as usize],
            const32: &self.const32[rec.const32_start as usize..next.const32_start as usize],
            name: rec.name,
            reg_size: self.reg_sizes[index as usize],
        })
    }

    /// Number of data blocks declared (the data-block table has one extra
    /// sentinel offset beyond this count).
    pub fn data_block_count(&self) -> u32 {
        self.data_block_table.len() as u32 - 1
    }

    /// Returns the bytes of data block `index`, or `None` if out of range.
    pub fn data_block(&self, index: u32) -> Option<&[u8]> {
        if index >= self.data_block_count() {
            return None;
        }
        let start = self.data_block_table[index as usize] as usize;
        let end = self.data_block_table[index as usize + 1] as usize;
        Some(&self.data[start..end])
    }

    /// Finds the procedure whose name data-block matches `name` exactly.
    /// There is no separate on-wire export table: a procedure's `name`
    /// field already points at a data block, and any procedure is
    /// considered "exported" under the bytes that block holds.
    pub fn export_index(&self, name: &[u8]) -> Option<u32> {
        (0..self.proc_count()).find(|&i| {
            let rec = self.proc_table[i as usize];
            self.data_block(rec.name) == Some(name)
        })
    }
}

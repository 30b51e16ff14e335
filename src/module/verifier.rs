//! Structural verification: the gate every module binary passes through
//! exactly once, between [`super::codec::decode`] and a usable
//! [`super::ModuleData`].
//!
//! Checks, in order: procedure-table and data-block-table sentinel and
//! monotonicity, then per-instruction operand validation (which also
//! accumulates each procedure's `reg_size`), then the terminating-last-
//! instruction rule.

use crate::bits::RegSize;
use crate::consts::MAX_PROC;
use crate::error::{Error, Status};
use crate::module::codec::RawModule;
use crate::module::{ModuleData, ProcRecord};
use crate::opcode::{nnn, operand_kinds, Class, Instruction, OperandKind};

/// Whether `info` may legally be the last instruction of a procedure: a
/// branching class (which always transfers control), or `halt`/`return`.
fn is_terminating(class: Class, func: u16) -> bool {
    class.is_terminating() || (class == Class::Nnn && matches!(func, nnn::HALT | nnn::RETURN))
}

/// Runs every structural and per-instruction check over `raw` and, on
/// success, returns a [`ModuleData`] ready to be entered.
pub fn verify(id: u32, raw: RawModule) -> Status<ModuleData> {
    check_proc_table(&raw)?;
    check_data_block_table(&raw)?;

    let proc_count = raw.proc_table.len() as u32 - 1;
    if proc_count > MAX_PROC {
        return Err(Error::ModuleCorrupt);
    }

    let mut reg_sizes = Vec::with_capacity(proc_count as usize);
    for index in 0..proc_count {
        reg_sizes.push(verify_proc(&raw, index)?);
    }

    Ok(ModuleData {
        id,
        name_block: raw.name_block,
        proc_table: raw.proc_table,
        reg_sizes,
        data_block_table: raw.data_block_table,
        target_table: raw.target_table,
        insn_table: raw.insn_table,
        const128: raw.const128,
        const64: raw.const64,
        const32: raw.const32,
        data: raw.data,
    })
}

fn check_proc_table(raw: &RawModule) -> Status<()> {
    if raw.proc_table.is_empty() {
        return Err(Error::ModuleCorrupt);
    }
    let last = *raw.proc_table.last().unwrap();
    if last.name != 0 {
        return Err(Error::ModuleCorrupt);
    }
    if last.insn_start as usize != raw.insn_table.len()
        || last.target_start as usize != raw.target_table.len()
        || last.const128_start as usize != raw.const128.len()
        || last.const64_start as usize != raw.const64.len()
        || last.const32_start as usize != raw.const32.len()
    {
        return Err(Error::ModuleCorrupt);
    }
    for pair in raw.proc_table.windows(2) {
        let (cur, next) = (pair[0], pair[1]);
        if cur.insn_start > next.insn_start
            || cur.target_start > next.target_start
            || cur.const128_start > next.const128_start
            || cur.const64_start > next.const64_start
            || cur.const32_start > next.const32_start
        {
            return Err(Error::ModuleCorrupt);
        }
    }
    let data_block_count = raw.data_block_table.len().saturating_sub(1);
    for rec in &raw.proc_table[..raw.proc_table.len() - 1] {
        if rec.name as usize >= data_block_count {
            return Err(Error::ModuleCorrupt);
        }
    }
    Ok(())
}

fn check_data_block_table(raw: &RawModule) -> Status<()> {
    if raw.data_block_table.first() != Some(&0) {
        return Err(Error::ModuleCorrupt);
    }
    if raw.data_block_table.last() != Some(&(raw.data.len() as u32)) {
        return Err(Error::ModuleCorrupt);
    }
    for pair in raw.data_block_table.windows(2) {
        if pair[0] > pair[1] {
            return Err(Error::ModuleCorrupt);
        }
    }
    Ok(())
}

/// Validates every instruction of procedure `index` and returns its
/// computed `reg_size` in bytes.
fn verify_proc(raw: &RawModule, index: u32) -> Status<u32> {
    let rec = raw.proc_table[index as usize];
    let next = raw.proc_table[index as usize + 1];

    let insns = &raw.insn_table[rec.insn_start as usize..next.insn_start as usize];
    if insns.is_empty() {
        return Err(Error::ModuleCorrupt);
    }

    let target_count = next.target_start - rec.target_start;
    let const128_count = next.const128_start - rec.const128_start;
    let const64_count = next.const64_start - rec.const64_start;
    let const32_count = next.const32_start - rec.const32_start;

    let mut reg_size_bits: u32 = 0;

    for (offset_in_proc, insn) in insns.iter().enumerate() {
        let info = insn.decode_info().ok_or(Error::ModuleCorrupt)?;
        let (ka, kb, kc) = operand_kinds(info.class);

        check_operand(insn.a, ka, info, target_count, const128_count, const64_count, const32_count, &mut reg_size_bits)?;
        check_operand(insn.b, kb, info, target_count, const128_count, const64_count, const32_count, &mut reg_size_bits)?;
        check_operand(insn.c, kc, info, target_count, const128_count, const64_count, const32_count, &mut reg_size_bits)?;

        if info.class == Class::Rlt {
            check_table_switch_bounds(insn.b, insn.c, target_count)?;
        }

        let is_last = offset_in_proc + 1 == insns.len();
        if is_last && !is_terminating(info.class, info.func) {
            return Err(Error::ModuleCorrupt);
        }
    }

    Ok(crate::bits::bits_to_bytes(reg_size_bits as u64) as u32)
}

#[allow(clippy::too_many_arguments)]
fn check_operand(
    field: u16,
    kind: OperandKind,
    info: crate::opcode::OpcodeInfo,
    target_count: u32,
    const128_count: u32,
    const64_count: u32,
    const32_count: u32,
    reg_size_bits: &mut u32,
) -> Status<()> {
    match kind {
        OperandKind::Unused => Ok(()),
        OperandKind::RegPrimary => check_register(field, info.pri, reg_size_bits),
        OperandKind::RegSecondary => {
            let sec = info.sec.ok_or(Error::ModuleCorrupt)?;
            check_register(field, sec, reg_size_bits)
        }
        OperandKind::RegDouble => {
            let double = info.pri.widen().ok_or(Error::ModuleCorrupt)?;
            check_register(field, double, reg_size_bits)
        }
        OperandKind::RegAddress => check_register(field, RegSize::S64, reg_size_bits),
        OperandKind::ConstPrimary => {
            // Primaries under 32 bits carry their value inline in the
            // operand field itself, like `Imm16` — only >=32-bit primaries
            // index into a const pool, so only those are bounds-checked.
            if info.pri.bits() < 32 {
                return Ok(());
            }
            let pool_len = match info.pri {
                RegSize::S128 => const128_count,
                RegSize::S64 => const64_count,
                _ => const32_count,
            };
            if field as u32 >= pool_len {
                Err(Error::ModuleCorrupt)
            } else {
                Ok(())
            }
        }
        OperandKind::Imm16 => Ok(()),
        OperandKind::ConstPoolU32 => {
            if field as u32 >= const32_count {
                Err(Error::ModuleCorrupt)
            } else {
                Ok(())
            }
        }
        OperandKind::ConstPoolU64 => {
            if field as u32 >= const64_count {
                Err(Error::ModuleCorrupt)
            } else {
                Ok(())
            }
        }
        OperandKind::TargetPair => {
            if field as u32 + 1 >= target_count {
                Err(Error::ModuleCorrupt)
            } else {
                Ok(())
            }
        }
        OperandKind::TargetTriplet => {
            if field as u32 + 2 >= target_count {
                Err(Error::ModuleCorrupt)
            } else {
                Ok(())
            }
        }
        OperandKind::TargetTableStart => {
            if field as u32 > target_count {
                Err(Error::ModuleCorrupt)
            } else {
                Ok(())
            }
        }
        OperandKind::TargetTableLen => Ok(()),
    }
}

fn check_register(offset: u16, size: RegSize, reg_size_bits: &mut u32) -> Status<()> {
    let offset = offset as u32;
    if offset & (size.bits() - 1) != 0 {
        return Err(Error::ModuleCorrupt);
    }
    *reg_size_bits = (*reg_size_bits).max(offset + size.bits());
    Ok(())
}

/// Validates a table-switch's paired `(start, len)` fields together, since
/// `start + len <= target_count` can't be checked from either field alone.
/// `len == 0` is rejected here rather than left for the interpreter: a
/// table-switch with no entries has no valid dispatch target, and the
/// interpreter treats that case as a fatal bug rather than a runtime error,
/// so it must never reach a verified module.
fn check_table_switch_bounds(start: u16, len: u16, target_count: u32) -> Status<()> {
    if len == 0 {
        return Err(Error::ModuleCorrupt);
    }
    let end = (start as u32)
        .checked_add(len as u32)
        .ok_or(Error::ModuleCorrupt)?;
    if end > target_count {
        Err(Error::ModuleCorrupt)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::codec::RawModule;
    use crate::opcode::{branch_pair, encode_opcode, nnn};

    fn module_with_insns(insns: Vec<Instruction>, target_count: u32) -> RawModule {
        RawModule {
            name_block: 0,
            proc_table: vec![
                ProcRecord::default(),
                ProcRecord {
                    insn_start: insns.len() as u32,
                    target_start: target_count,
                    const128_start: 0,
                    const64_start: 0,
                    const32_start: 0,
                    name: 0,
                },
            ],
            data_block_table: vec![0, 0],
            target_table: vec![0; target_count as usize],
            insn_table: insns,
            const128: vec![],
            const64: vec![],
            const32: vec![],
            data: vec![],
        }
    }

    #[test]
    fn accepts_halt_only_proc() {
        let raw = module_with_insns(
            vec![Instruction::new(
                encode_opcode(Class::Nnn, RegSize::S1, None, nnn::HALT),
                0,
                0,
                0,
            )],
            0,
        );
        let data = verify(1, raw).unwrap();
        assert_eq!(data.reg_sizes, vec![0]);
    }

    #[test]
    fn rejects_non_terminating_last_instruction() {
        let raw = module_with_insns(
            vec![Instruction::new(
                encode_opcode(Class::Nnn, RegSize::S1, None, nnn::NOP),
                0,
                0,
                0,
            )],
            0,
        );
        assert_eq!(verify(1, raw), Err(Error::ModuleCorrupt));
    }

    #[test]
    fn rejects_misaligned_register_operand() {
        let raw = module_with_insns(
            vec![Instruction::new(
                encode_opcode(Class::Rnp, RegSize::S16, None, branch_pair::ZERO),
                3,
                0,
                0,
            )],
            2,
        );
        assert_eq!(verify(1, raw), Err(Error::ModuleCorrupt));
    }

    #[test]
    fn rejects_out_of_range_target_pair() {
        let raw = module_with_insns(
            vec![Instruction::new(
                encode_opcode(Class::Rnp, RegSize::S8, None, branch_pair::ZERO),
                0,
                1,
                0,
            )],
            2,
        );
        assert_eq!(verify(1, raw), Err(Error::ModuleCorrupt));
    }

    #[test]
    fn computes_reg_size_from_widest_operand() {
        let raw = module_with_insns(
            vec![Instruction::new(
                encode_opcode(Class::Rnp, RegSize::S32, None, branch_pair::ZERO),
                32,
                0,
                0,
            )],
            2,
        );
        let data = verify(1, raw).unwrap();
        assert_eq!(data.reg_sizes, vec![8]);
    }
}

//! Compare-and-branch and table-switch classes.

use std::cmp::Ordering;

use crate::bits::{sign_extend, RegSize};
use crate::error::{Error, Status};
use crate::module::ModuleData;
use crate::opcode::{branch_pair, compare_pair, compare_triplet, Class, Instruction, OpcodeInfo};
use crate::task::{Frame, TaskExec};

use super::alu::const_operand;
use super::{read_operand, Step};

fn resolve_target(module: &ModuleData, proc_index: u32, local_table_index: u32) -> Status<u32> {
    let rec = *module.proc_table.get(proc_index as usize).ok_or(Error::Bug)?;
    let next = *module.proc_table.get(proc_index as usize + 1).ok_or(Error::Bug)?;
    let slice = &module.target_table[rec.target_start as usize..next.target_start as usize];
    let local_offset = *slice.get(local_table_index as usize).ok_or(Error::Bug)?;
    Ok(rec.insn_start + local_offset)
}

fn compare_pair_result(func: u16, a: u128, b: u128, size: RegSize) -> bool {
    match func {
        compare_pair::EQ => a == b,
        compare_pair::NE => a != b,
        compare_pair::LT_U => a < b,
        compare_pair::LT_S => {
            (sign_extend(a, size, RegSize::S128) as i128) < (sign_extend(b, size, RegSize::S128) as i128)
        }
        _ => false,
    }
}

/// Three-way compare, returning 0 (less), 1 (equal), or 2 (greater) — the
/// local target-table offset to take.
fn compare_triplet_order(func: u16, a: u128, b: u128, size: RegSize) -> u32 {
    let (av, bv): (i128, i128) = if func == compare_triplet::SIGNED {
        (
            sign_extend(a, size, RegSize::S128) as i128,
            sign_extend(b, size, RegSize::S128) as i128,
        )
    } else {
        (a as i128, b as i128)
    };
    match av.cmp(&bv) {
        Ordering::Less => 0,
        Ordering::Equal => 1,
        Ordering::Greater => 2,
    }
}

pub(crate) fn exec_branch(
    exec: &mut TaskExec,
    module: &ModuleData,
    frame: &Frame,
    insn: Instruction,
    info: OpcodeInfo,
) -> Status<Step> {
    match info.class {
        Class::Rnp => {
            let reg = read_operand(exec, frame, insn.a, info.pri);
            let taken = match info.func {
                branch_pair::ZERO => reg == 0,
                branch_pair::NONZERO => reg != 0,
                _ => return Err(Error::UnsupportedOpcode),
            };
            let local = insn.b as u32 + u32::from(!taken);
            resolve_target(module, frame.proc_index, local).map(Step::Branch)
        }
        Class::Rrp => {
            let a = read_operand(exec, frame, insn.a, info.pri);
            let b = read_operand(exec, frame, insn.b, info.pri);
            let taken = compare_pair_result(info.func, a, b, info.pri);
            let local = insn.c as u32 + u32::from(!taken);
            resolve_target(module, frame.proc_index, local).map(Step::Branch)
        }
        Class::Rcp => {
            let a = read_operand(exec, frame, insn.a, info.pri);
            let c_val = const_operand(module, frame.proc_index, info.pri, insn.b);
            let taken = compare_pair_result(info.func, a, c_val, info.pri);
            let local = insn.c as u32 + u32::from(!taken);
            resolve_target(module, frame.proc_index, local).map(Step::Branch)
        }
        Class::Rrg => {
            let a = read_operand(exec, frame, insn.a, info.pri);
            let b = read_operand(exec, frame, insn.b, info.pri);
            let order = compare_triplet_order(info.func, a, b, info.pri);
            resolve_target(module, frame.proc_index, insn.c as u32 + order).map(Step::Branch)
        }
        Class::Rcg => {
            let a = read_operand(exec, frame, insn.a, info.pri);
            let c_val = const_operand(module, frame.proc_index, info.pri, insn.b);
            let order = compare_triplet_order(info.func, a, c_val, info.pri);
            resolve_target(module, frame.proc_index, insn.c as u32 + order).map(Step::Branch)
        }
        Class::Rlt => {
            let value = read_operand(exec, frame, insn.a, info.pri) as u32;
            let start = insn.b as u32;
            let len = insn.c as u32;
            if len == 0 {
                return Err(Error::Bug);
            }
            let idx = value.min(len - 1);
            resolve_target(module, frame.proc_index, start + idx).map(Step::Branch)
        }
        _ => Err(Error::Bug),
    }
}

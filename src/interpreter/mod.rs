//! Instruction dispatch and the bounded-iteration run loop.
//!
//! Submodules group opcode classes the way the design-level instruction set
//! table does: [`alu`] for arithmetic/shift/extend, [`flow`] for branching,
//! [`mem`] for the address-register load/store classes. [`mod@self`] wires
//! them together behind `enter`/`run`.

pub mod alu;
pub mod flow;
pub mod mem;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::bits::RegSize;
use crate::consts::{GROWTH_FACTOR, INITIAL_REG_CAPACITY, REG_BASE_ALIGN};
use crate::context::Context;
use crate::error::{Error, Status};
use crate::module::ModuleData;
use crate::opcode::{nnn, Class, Instruction};
use crate::task::Frame;
use crate::world::World;

/// What executing one instruction does to control flow.
pub(crate) enum Step {
    /// Advance the current frame's cursor to the given absolute instruction
    /// index; does not count toward the iteration budget.
    Advance(u32),
    /// Same, but counts as a branch for the iteration budget.
    Branch(u32),
    /// Pop the current frame (`return`).
    Return,
    /// Stop the burst immediately; the task halted.
    Halt,
}

/// Pushes a new frame onto `exec`'s frame stack, growing the register
/// buffer if needed. Corresponds to the design's `enter`.
pub fn enter(context: &mut Context, modmap_index: u32, proc_index: u32, reg_shift_bytes: u32) -> Status<()> {
    if reg_shift_bytes as usize % REG_BASE_ALIGN != 0 {
        return Err(Error::Bug);
    }
    let exec = context.active_exec_mut().ok_or(Error::State)?;

    let module: Arc<ModuleData> = exec.module(modmap_index).ok_or(Error::ProcIndex)?.clone();
    let proc = module.proc(proc_index).ok_or(Error::ProcIndex)?;

    let reg_base = match exec.frames.last() {
        Some(f) => f.reg_base + reg_shift_bytes,
        None => reg_shift_bytes,
    };
    let needed = reg_base as usize + proc.reg_size as usize;
    if needed > exec.reg_limit {
        return Err(Error::RegLimit);
    }
    if needed > exec.reg.len() {
        let mut new_len = exec.reg.len().max(INITIAL_REG_CAPACITY);
        while new_len < needed {
            new_len = new_len.saturating_mul(GROWTH_FACTOR);
        }
        let new_len = new_len.min(exec.reg_limit);
        if new_len < needed {
            return Err(Error::RegLimit);
        }
        exec.reg.resize(new_len, 0);
    }

    if exec.frames.len() >= exec.frame_limit {
        return Err(Error::StackLimit);
    }

    let insn_start = module.proc_table[proc_index as usize].insn_start;
    exec.frames.push(Frame {
        modmap_index,
        proc_index,
        reg_base,
        cursor: insn_start,
    });
    Ok(())
}

/// Drives the attached task forward until `frame_stop` is reached, `halt`
/// executes, `iter_limit` is exhausted, or a kill request is observed
/// between bursts. Returns the number of iterations actually counted
/// against the budget.
pub fn run(context: &mut Context, frame_stop: u32, iter_limit: u32) -> Status<u32> {
    let world = Arc::clone(&context.world);
    let exec = context.active_exec_mut().ok_or(Error::State)?;

    if exec.kill_flag.load(Ordering::Relaxed) {
        return Ok(0);
    }

    let mut iterations = 0u32;
    let mut linear_run = 0u32;

    loop {
        let frame = *exec.frames.last().ok_or(Error::State)?;
        let module = exec.module(frame.modmap_index).ok_or(Error::Bug)?.clone();
        let insn = *module
            .insn_table
            .get(frame.cursor as usize)
            .ok_or(Error::Bug)?;
        let info = insn.decode_info().ok_or(Error::UnsupportedOpcode)?;

        linear_run += 1;

        let step = exec_one(&world, exec, &module, frame, insn, info)?;

        match step {
            Step::Advance(next) => {
                exec.frames.last_mut().ok_or(Error::Bug)?.cursor = next;
            }
            Step::Branch(next) => {
                exec.frames.last_mut().ok_or(Error::Bug)?.cursor = next;
                iterations += linear_run;
                linear_run = 0;
                if iterations >= iter_limit {
                    return Ok(iterations);
                }
            }
            Step::Return => {
                exec.frames.pop();
                if exec.frames.len() as u32 <= frame_stop {
                    return Ok(iterations + linear_run);
                }
            }
            Step::Halt => {
                return Ok(iterations + linear_run);
            }
        }

        if exec.kill_flag.load(Ordering::Relaxed) {
            return Ok(iterations + linear_run);
        }
    }
}

fn exec_one(
    world: &World,
    exec: &mut crate::task::TaskExec,
    module: &Arc<ModuleData>,
    frame: Frame,
    insn: Instruction,
    info: crate::opcode::OpcodeInfo,
) -> Status<Step> {
    match info.class {
        Class::Nnn => match info.func {
            nnn::NOP => Ok(Step::Advance(frame.cursor + 1)),
            nnn::HALT => Ok(Step::Halt),
            nnn::RETURN => Ok(Step::Return),
            _ => Err(Error::UnsupportedOpcode),
        },
        Class::Rnn => {
            let value = read_operand(exec, &frame, insn.a, info.pri);
            world.log().debug_out(value as u8);
            Ok(Step::Advance(frame.cursor + 1))
        }
        Class::Rrn | Class::Rrr | Class::Qrr | Class::Rrc | Class::Qrc | Class::Rrs | Class::Qrs
        | Class::Rr4 | Class::Qr4 | Class::Rcn => {
            alu::exec(exec, module, &frame, insn, info)?;
            Ok(Step::Advance(frame.cursor + 1))
        }
        Class::Srn => {
            alu::exec_extend(exec, &frame, insn, info)?;
            Ok(Step::Advance(frame.cursor + 1))
        }
        Class::Rnp | Class::Rrp | Class::Rcp | Class::Rrg | Class::Rcg | Class::Rlt => {
            flow::exec_branch(exec, module, &frame, insn, info)
        }
        Class::Ran | Class::Raa | Class::Ra4 | Class::Ra5 | Class::Ra6 => {
            mem::exec(exec, module, &frame, insn, info)?;
            Ok(Step::Advance(frame.cursor + 1))
        }
    }
}

/// Reads a frame-relative register operand at `field`, sized `size`, from
/// the task's register buffer.
pub(crate) fn read_operand(exec: &crate::task::TaskExec, frame: &Frame, field: u16, size: RegSize) -> u128 {
    let bit_offset = frame.reg_base as usize * 8 + field as usize;
    crate::bits::read_bits(&exec.reg, bit_offset, size)
}

/// Writes a frame-relative register operand.
pub(crate) fn write_operand(exec: &mut crate::task::TaskExec, frame: &Frame, field: u16, size: RegSize, value: u128) {
    let bit_offset = frame.reg_base as usize * 8 + field as usize;
    crate::bits::write_bits(&mut exec.reg, bit_offset, size, value);
}

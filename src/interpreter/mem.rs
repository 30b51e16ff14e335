//! Address-register load/store classes.
//!
//! These classes address into the task's own register buffer as flat,
//! byte-addressable memory: the address register always reads as a 64-bit
//! value regardless of the instruction's primary size, and the accessed
//! byte range is checked against the buffer's current length before any
//! bits move. There is no separate memory space and no inter-task sharing.

use crate::bits::{self, RegSize};
use crate::error::{Error, Status};
use crate::module::ModuleData;
use crate::opcode::{mem, Class, Instruction, OpcodeInfo};
use crate::task::{Frame, TaskExec};

use super::alu::const_primary;
use super::{read_operand, write_operand};

fn read_address(exec: &TaskExec, frame: &Frame, field: u16) -> u64 {
    read_operand(exec, frame, field, RegSize::S64) as u64
}

pub(crate) fn exec(
    exec: &mut TaskExec,
    module: &ModuleData,
    frame: &Frame,
    insn: Instruction,
    info: OpcodeInfo,
) -> Status<()> {
    let base = match info.class {
        Class::Ran => read_address(exec, frame, insn.b),
        Class::Raa => read_address(exec, frame, insn.b).wrapping_add(read_address(exec, frame, insn.c)),
        Class::Ra4 => read_address(exec, frame, insn.b).wrapping_add(insn.c as u64),
        Class::Ra5 => {
            let disp = const_primary(module, frame.proc_index, RegSize::S32, insn.c) as u64;
            read_address(exec, frame, insn.b).wrapping_add(disp)
        }
        Class::Ra6 => {
            let disp = const_primary(module, frame.proc_index, RegSize::S64, insn.c) as u64;
            read_address(exec, frame, insn.b).wrapping_add(disp)
        }
        _ => return Err(Error::Bug),
    };

    let size = info.pri;
    let byte_len = bits::bits_to_bytes(size.bits() as u64) as usize;
    let start = base as usize;
    let end = start.checked_add(byte_len).ok_or(Error::RegLimit)?;
    if end > exec.reg.len() {
        return Err(Error::RegLimit);
    }
    let bit_offset = start * 8;

    match info.func {
        mem::LOAD => {
            let value = bits::read_bits(&exec.reg, bit_offset, size);
            write_operand(exec, frame, insn.a, size, value);
        }
        mem::STORE => {
            let value = read_operand(exec, frame, insn.a, size);
            bits::write_bits(&mut exec.reg, bit_offset, size, value);
        }
        _ => return Err(Error::UnsupportedOpcode),
    }
    Ok(())
}

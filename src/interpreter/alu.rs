//! Arithmetic, shift, extend, and constant-init classes.

use crate::bits::{sign_extend, zero_extend, RegSize};
use crate::error::{Error, Status};
use crate::module::ModuleData;
use crate::opcode::{arith, extend, operand_kinds, shift, widening, Class, Instruction, OpcodeInfo, OperandKind};
use crate::task::{Frame, TaskExec};

use super::{read_operand, write_operand};

pub(crate) fn const_primary(module: &ModuleData, proc_index: u32, pri: RegSize, index: u16) -> u128 {
    let proc = module.proc(proc_index).expect("valid proc index");
    match pri {
        RegSize::S128 => proc.const128[index as usize],
        RegSize::S64 => proc.const64[index as usize] as u128,
        _ => proc.const32[index as usize] as u128,
    }
}

/// Resolves a `ConstPrimary` operand. Primaries of 32 bits or wider index
/// into the matching const pool; anything smaller is an inline immediate
/// carried directly in the operand field, mirroring `Imm16`.
pub(crate) fn const_operand(module: &ModuleData, proc_index: u32, pri: RegSize, field: u16) -> u128 {
    if pri.bits() < 32 {
        field as u128
    } else {
        const_primary(module, proc_index, pri, field)
    }
}

/// Reads operand `field` per its [`OperandKind`], given the primary/secondary
/// widths this instruction decoded to.
fn read_value(exec: &TaskExec, module: &ModuleData, frame: &Frame, kind: OperandKind, field: u16, info: OpcodeInfo) -> u128 {
    match kind {
        OperandKind::RegPrimary => read_operand(exec, frame, field, info.pri),
        OperandKind::RegSecondary => read_operand(exec, frame, field, info.sec.unwrap_or(info.pri)),
        OperandKind::RegDouble => read_operand(exec, frame, field, info.pri.widen().unwrap_or(info.pri)),
        OperandKind::ConstPrimary => const_operand(module, frame.proc_index, info.pri, field),
        OperandKind::Imm16 => field as u128,
        _ => 0,
    }
}

/// Executes one `Rrn`/`Rrr`/`Qrr`/`Rrc`/`Qrc`/`Rrs`/`Qrs`/`Rr4`/`Qr4`/`Rcn`
/// instruction, writing its result into the destination operand.
pub(crate) fn exec(
    exec: &mut TaskExec,
    module: &ModuleData,
    frame: &Frame,
    insn: Instruction,
    info: OpcodeInfo,
) -> Status<()> {
    let (ka, kb, kc) = operand_kinds(info.class);
    let dest_size = match ka {
        OperandKind::RegDouble => info.pri.widen().ok_or(Error::Bug)?,
        _ => info.pri,
    };

    let result = match info.class {
        Class::Rrn => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            unary(info.func, b, info.pri)?
        }
        Class::Rrr => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            let c = read_value(exec, module, frame, kc, insn.c, info);
            binary(info.func, b, c, info.pri)?
        }
        Class::Qrr => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            let c = read_value(exec, module, frame, kc, insn.c, info);
            widen_binary(info.func, b, c, dest_size)?
        }
        Class::Rrc => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            let c = read_value(exec, module, frame, kc, insn.c, info);
            binary(info.func, b, c, info.pri)?
        }
        Class::Qrc => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            let c = read_value(exec, module, frame, kc, insn.c, info);
            widen_binary(info.func, b, c, dest_size)?
        }
        Class::Rrs => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            let c = read_value(exec, module, frame, kc, insn.c, info);
            shift_value(info.func, b, c, info.pri)?
        }
        Class::Qrs => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            let c = read_value(exec, module, frame, kc, insn.c, info);
            shift_value(info.func, b, c, dest_size)?
        }
        Class::Rr4 => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            shift_value(info.func, b, insn.c as u128, info.pri)?
        }
        Class::Qr4 => {
            let b = read_value(exec, module, frame, kb, insn.b, info);
            shift_value(info.func, b, insn.c as u128, dest_size)?
        }
        Class::Rcn => read_value(exec, module, frame, kc, insn.c, info),
        _ => return Err(Error::Bug),
    };

    write_operand(exec, frame, insn.a, dest_size, result & dest_size.mask());
    Ok(())
}

fn unary(func: u16, b: u128, size: RegSize) -> Status<u128> {
    Ok(match func {
        arith::NOT => !b & size.mask(),
        arith::NEG => b.wrapping_neg() & size.mask(),
        _ => return Err(Error::UnsupportedOpcode),
    })
}

fn binary(func: u16, b: u128, c: u128, size: RegSize) -> Status<u128> {
    let r = match func {
        arith::ADD => b.wrapping_add(c),
        arith::SUB => b.wrapping_sub(c),
        arith::OR => b | c,
        arith::XOR => b ^ c,
        arith::AND => b & c,
        _ => return Err(Error::UnsupportedOpcode),
    };
    Ok(r & size.mask())
}

fn widen_binary(func: u16, b: u128, c: u128, dest_size: RegSize) -> Status<u128> {
    let r = match func {
        widening::ADD => b.wrapping_add(c),
        widening::MUL => b.wrapping_mul(c),
        _ => return Err(Error::UnsupportedOpcode),
    };
    Ok(r & dest_size.mask())
}

fn shift_value(func: u16, b: u128, amount: u128, size: RegSize) -> Status<u128> {
    let bits = size.bits();
    let amount = (amount as u32) % bits.max(1);
    Ok(match func {
        shift::SHL => (b << amount) & size.mask(),
        shift::SHR_U => (b & size.mask()) >> amount,
        shift::SHR_S => (sign_extend(b, size, RegSize::S128) as i128 >> amount) as u128 & size.mask(),
        _ => return Err(Error::UnsupportedOpcode),
    })
}

/// Executes an `Srn` zero/sign-extend instruction.
pub(crate) fn exec_extend(exec: &mut TaskExec, frame: &Frame, insn: Instruction, info: OpcodeInfo) -> Status<()> {
    let sec = info.sec.ok_or(Error::Bug)?;
    let b = read_operand(exec, frame, insn.b, info.pri);
    let result = match info.func {
        extend::ZERO => zero_extend(b, info.pri, sec),
        extend::SIGN => sign_extend(b, info.pri, sec),
        _ => return Err(Error::UnsupportedOpcode),
    };
    write_operand(exec, frame, insn.a, sec, result);
    Ok(())
}

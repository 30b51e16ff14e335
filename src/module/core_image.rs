//! The bundled "core" module every world loads at `init` time.
//!
//! Holds two procedures: an unused placeholder at index 0 (so the task's
//! pre-mapped core module has *some* minimal content at that slot) and, at
//! index 1, a procedure that writes `hello!\n` ten times through
//! `debug_out`, one character per instruction, looping via a
//! decrement-and-branch.

use crate::bits::RegSize;
use crate::error::Status;
use crate::module::codec::RawModule;
use crate::module::verifier;
use crate::module::{ModuleData, ProcRecord};
use crate::opcode::{arith, branch_pair, encode_opcode, nnn, Class, Instruction};

const COUNTER: u16 = 0;
const TMP: u16 = 32;
const GREETING: [u8; 7] = [b'h', b'e', b'l', b'l', b'o', b'!', b'\n'];
const LOOP_COUNT: u32 = 10;

/// `Rcn` with an 8-bit primary is an inline immediate, not a pool index —
/// `value` is carried directly in the operand field.
fn init8(dest: u16, value: u8) -> Instruction {
    Instruction::new(encode_opcode(Class::Rcn, RegSize::S8, None, 0), dest, 0, value as u16)
}

fn init32(dest: u16, const_index: u16) -> Instruction {
    Instruction::new(encode_opcode(Class::Rcn, RegSize::S32, None, 0), dest, 0, const_index)
}

fn debug_out(reg: u16) -> Instruction {
    Instruction::new(encode_opcode(Class::Rnn, RegSize::S8, None, 0), reg, 0, 0)
}

fn sub32(dest: u16, src: u16, const_index: u16) -> Instruction {
    Instruction::new(
        encode_opcode(Class::Rrc, RegSize::S32, None, arith::SUB),
        dest,
        src,
        const_index,
    )
}

fn branch_nonzero(reg: u16, target_pair_start: u16) -> Instruction {
    Instruction::new(
        encode_opcode(Class::Rnp, RegSize::S32, None, branch_pair::NONZERO),
        reg,
        target_pair_start,
        0,
    )
}

fn halt() -> Instruction {
    Instruction::new(encode_opcode(Class::Nnn, RegSize::S1, None, nnn::HALT), 0, 0, 0)
}

fn raw() -> RawModule {
    let const32 = vec![LOOP_COUNT, 1]; // [0] loop count, [1] decrement amount

    let proc0_insns = vec![halt()];

    let mut proc1_insns = vec![init32(COUNTER, 0)];
    for &ch in &GREETING {
        proc1_insns.push(init8(TMP, ch));
        proc1_insns.push(debug_out(TMP));
    }
    proc1_insns.push(sub32(COUNTER, COUNTER, 1));
    proc1_insns.push(branch_nonzero(COUNTER, 0));
    proc1_insns.push(halt());

    let loop_start_local = 1u32;
    let exit_local = (proc1_insns.len() - 1) as u32;
    let target_table = vec![loop_start_local, exit_local];

    let proc_table = vec![
        ProcRecord {
            insn_start: 0,
            target_start: 0,
            const128_start: 0,
            const64_start: 0,
            const32_start: 0,
            name: 0,
        },
        ProcRecord {
            insn_start: proc0_insns.len() as u32,
            target_start: 0,
            const128_start: 0,
            const64_start: 0,
            const32_start: 0,
            name: 0,
        },
        ProcRecord {
            insn_start: (proc0_insns.len() + proc1_insns.len()) as u32,
            target_start: target_table.len() as u32,
            const128_start: 0,
            const64_start: 0,
            const32_start: const32.len() as u32,
            name: 0,
        },
    ];

    let mut insn_table = proc0_insns;
    insn_table.extend(proc1_insns);

    RawModule {
        name_block: 0,
        proc_table,
        data_block_table: vec![0, 0],
        target_table,
        insn_table,
        const128: vec![],
        const64: vec![],
        const32,
        data: vec![],
    }
}

pub fn build() -> Status<ModuleData> {
    verifier::verify(0, raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies() {
        let data = build().unwrap();
        assert_eq!(data.proc_count(), 2);
    }

    #[test]
    fn hello_loop_has_two_targets() {
        let data = build().unwrap();
        let proc1 = data.proc(1).unwrap();
        assert_eq!(proc1.target.len(), 2);
        assert_eq!(proc1.target[0], 1);
    }
}

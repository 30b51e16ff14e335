//! Binary decoder/encoder for the module wire format.
//!
//! Layout, all multi-byte integers big-endian: 8-byte magic, a 14-word
//! header, three constant pools (128/64/32-bit, in that order), the
//! procedure table, the data-block offset table, the target table, the
//! instruction table, and finally the raw data blob. [`decode`] only checks
//! structural well-formedness (lengths, magic, declared size); instruction
//! and register-footprint validity is [`super::verifier`]'s job.
//!
//! The header's last three words are an import-module count, an
//! import-procedure count, and one reserved word. This runtime implements
//! no import-resolution semantics, so [`decode`] refuses any module that
//! declares a non-zero import count rather than silently ignoring it.

use crate::consts::{MODULE_HEADER_WORDS, MODULE_MAGIC, PROC_RECORD_WORDS};
use crate::error::{Error, Status};
use crate::module::ProcRecord;
use crate::opcode::Instruction;

/// The structurally-decoded, not-yet-verified contents of a module binary.
/// [`super::verifier::verify`] consumes one of these and hands back a
/// trusted [`super::ModuleData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModule {
    pub name_block: u32,
    pub proc_table: Vec<ProcRecord>,
    pub data_block_table: Vec<u32>,
    pub target_table: Vec<u32>,
    pub insn_table: Vec<Instruction>,
    pub const128: Vec<u128>,
    pub const64: Vec<u64>,
    pub const32: Vec<u32>,
    pub data: Vec<u8>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Cursor<'a> {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Status<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::ModuleTruncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(Error::ModuleTruncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Status<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Status<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().unwrap()))
    }

    fn u128(&mut self) -> Status<u128> {
        let b = self.take(16)?;
        Ok(u128::from_be_bytes(b.try_into().unwrap()))
    }

    fn insn(&mut self) -> Status<Instruction> {
        let b = self.take(Instruction::ENCODED_LEN)?;
        Ok(Instruction::from_be_bytes(b.try_into().unwrap()))
    }
}

/// Decodes a module binary into a [`RawModule`].
///
/// Checks magic, that every field stays within `bytes`, and that the
/// header's declared `size` exactly matches the computed end-of-data-blob
/// offset. Does not run the verifier.
pub fn decode(bytes: &[u8]) -> Status<RawModule> {
    let mut cur = Cursor::new(bytes);

    let magic = cur.take(MODULE_MAGIC.len())?;
    if magic != MODULE_MAGIC {
        return Err(Error::ModuleMagic);
    }

    let mut header = [0u32; MODULE_HEADER_WORDS];
    for slot in header.iter_mut() {
        *slot = cur.u32()?;
    }
    let [size, _checksum, name_block, const128_count, const64_count, const32_count, proc_count, data_block_count, target_count, insn_count, data_size, import_module_count, import_proc_count, _reserved] =
        header;

    // This runtime implements no import-resolution semantics: a module
    // declaring a non-zero import-module count names modules it expects the
    // host to resolve, which would silently go unsatisfied if accepted.
    if import_module_count != 0 || import_proc_count != 0 {
        return Err(Error::ModuleCorrupt);
    }

    let const128 = (0..const128_count)
        .map(|_| cur.u128())
        .collect::<Status<Vec<_>>>()?;
    let const64 = (0..const64_count)
        .map(|_| cur.u64())
        .collect::<Status<Vec<_>>>()?;
    let const32 = (0..const32_count)
        .map(|_| cur.u32())
        .collect::<Status<Vec<_>>>()?;

    let proc_records = proc_count
        .checked_add(1)
        .ok_or(Error::ModuleTruncated)?;
    let proc_table = (0..proc_records)
        .map(|_| -> Status<ProcRecord> {
            Ok(ProcRecord {
                insn_start: cur.u32()?,
                target_start: cur.u32()?,
                const128_start: cur.u32()?,
                const64_start: cur.u32()?,
                const32_start: cur.u32()?,
                name: cur.u32()?,
            })
        })
        .collect::<Status<Vec<_>>>()?;

    let data_block_entries = data_block_count
        .checked_add(1)
        .ok_or(Error::ModuleTruncated)?;
    let data_block_table = (0..data_block_entries)
        .map(|_| cur.u32())
        .collect::<Status<Vec<_>>>()?;

    let target_table = (0..target_count)
        .map(|_| cur.u32())
        .collect::<Status<Vec<_>>>()?;

    let insn_table = (0..insn_count)
        .map(|_| cur.insn())
        .collect::<Status<Vec<_>>>()?;

    let data = cur.take(data_size as usize)?.to_vec();

    if cur.pos as u32 != size {
        return Err(Error::ModuleTruncated);
    }

    Ok(RawModule {
        name_block,
        proc_table,
        data_block_table,
        target_table,
        insn_table,
        const128,
        const64,
        const32,
        data,
    })
}

/// Encodes a [`RawModule`] back into the wire format. Used by
/// [`super::core_image`] to build the bundled startup module and by tests
/// that need to exercise the decoder against hand-built input.
pub fn encode(m: &RawModule) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MODULE_MAGIC);

    let proc_count = m.proc_table.len() as u32 - 1;
    let data_block_count = m.data_block_table.len() as u32 - 1;
    let header_and_magic_len = MODULE_MAGIC.len() + MODULE_HEADER_WORDS * 4;
    let body_len = m.const128.len() * 16
        + m.const64.len() * 8
        + m.const32.len() * 4
        + m.proc_table.len() * PROC_RECORD_WORDS * 4
        + m.data_block_table.len() * 4
        + m.target_table.len() * 4
        + m.insn_table.len() * Instruction::ENCODED_LEN
        + m.data.len();
    let total_size = (header_and_magic_len + body_len) as u32;

    let header: [u32; MODULE_HEADER_WORDS] = [
        total_size,
        0, // checksum: left unset, nothing in this runtime validates it
        m.name_block,
        m.const128.len() as u32,
        m.const64.len() as u32,
        m.const32.len() as u32,
        proc_count,
        data_block_count,
        m.target_table.len() as u32,
        m.insn_table.len() as u32,
        m.data.len() as u32,
        0,
        0,
        0,
    ];
    for word in header {
        out.extend_from_slice(&word.to_be_bytes());
    }

    for v in &m.const128 {
        out.extend_from_slice(&v.to_be_bytes());
    }
    for v in &m.const64 {
        out.extend_from_slice(&v.to_be_bytes());
    }
    for v in &m.const32 {
        out.extend_from_slice(&v.to_be_bytes());
    }

    for rec in &m.proc_table {
        out.extend_from_slice(&rec.insn_start.to_be_bytes());
        out.extend_from_slice(&rec.target_start.to_be_bytes());
        out.extend_from_slice(&rec.const128_start.to_be_bytes());
        out.extend_from_slice(&rec.const64_start.to_be_bytes());
        out.extend_from_slice(&rec.const32_start.to_be_bytes());
        out.extend_from_slice(&rec.name.to_be_bytes());
    }

    for offset in &m.data_block_table {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    for target in &m.target_table {
        out.extend_from_slice(&target.to_be_bytes());
    }
    for insn in &m.insn_table {
        out.extend_from_slice(&insn.to_be_bytes());
    }
    out.extend_from_slice(&m.data);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_module() -> RawModule {
        RawModule {
            name_block: 0,
            proc_table: vec![ProcRecord::default()],
            data_block_table: vec![0],
            target_table: vec![],
            insn_table: vec![],
            const128: vec![],
            const64: vec![],
            const32: vec![],
            data: vec![],
        }
    }

    #[test]
    fn roundtrip_empty_module() {
        let raw = empty_module();
        let bytes = encode(&raw);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(&empty_module());
        bytes[0] = b'X';
        assert_eq!(decode(&bytes), Err(Error::ModuleMagic));
    }

    #[test]
    fn rejects_truncated_body() {
        let bytes = encode(&empty_module());
        let truncated = &bytes[..bytes.len() - 2];
        assert_eq!(decode(truncated), Err(Error::ModuleTruncated));
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut bytes = encode(&empty_module());
        let len = bytes.len() as u32;
        bytes[8..12].copy_from_slice(&(len + 4).to_be_bytes());
        assert_eq!(decode(&bytes), Err(Error::ModuleTruncated));
    }

    #[test]
    fn rejects_nonzero_import_module_count() {
        let bytes = encode(&empty_module());
        let mut bytes = bytes;
        // Header word 11 (byte offset 8 + 11*4) is the import-module count.
        let offset = 8 + 11 * 4;
        bytes[offset..offset + 4].copy_from_slice(&1u32.to_be_bytes());
        assert_eq!(decode(&bytes), Err(Error::ModuleCorrupt));
    }

    #[test]
    fn roundtrip_with_pools_and_instructions() {
        use crate::opcode::{encode_opcode, nnn, Class};
        use crate::bits::RegSize;

        let mut raw = RawModule {
            name_block: 0,
            proc_table: vec![
                ProcRecord {
                    insn_start: 0,
                    target_start: 0,
                    const128_start: 0,
                    const64_start: 0,
                    const32_start: 0,
                    name: 0,
                },
                ProcRecord {
                    insn_start: 1,
                    target_start: 0,
                    const128_start: 1,
                    const64_start: 1,
                    const32_start: 1,
                    name: 0,
                },
            ],
            data_block_table: vec![0, 0],
            target_table: vec![],
            insn_table: vec![Instruction::new(
                encode_opcode(Class::Nnn, RegSize::S1, None, nnn::HALT),
                0,
                0,
                0,
            )],
            const128: vec![0xDEAD_BEEF],
            const64: vec![0xCAFE],
            const32: vec![42],
            data: vec![1, 2, 3],
        };
        raw.data_block_table = vec![0, 3];
        let bytes = encode(&raw);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, raw);
    }
}

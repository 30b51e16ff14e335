//! End-to-end scenarios exercised entirely through the crate's public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hazna_vm::bits::{read_bits, RegSize};
use hazna_vm::module::codec::{self, RawModule};
use hazna_vm::module::ProcRecord;
use hazna_vm::opcode::{branch_pair, encode_opcode, nnn, widening, Class, Instruction};
use hazna_vm::{enter, module_load, run, task_attach, task_create, task_import, world_init, Error, LogLevel, WorldConfig};

#[test]
fn rejects_a_module_with_the_wrong_magic() {
    let (world, ctx) = world_init(LogLevel::None, WorldConfig::default()).unwrap();
    let mut bytes = b"[hza99]\n".to_vec();
    bytes.extend(std::iter::repeat(0u8).take(64));

    assert_eq!(module_load(&ctx, &bytes), Err(Error::ModuleMagic));

    drop(ctx);
    let _ = world;
}

/// Counts `tracing` events emitted on the `hazna::debug_out` target.
struct CountingSubscriber {
    count: AtomicUsize,
}

impl tracing::Subscriber for CountingSubscriber {
    fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _span: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }

    fn record(&self, _span: &tracing::span::Id, _values: &tracing::field::ValueSet<'_>) {}

    fn record_follows_from(&self, _span: &tracing::span::Id, _follows: &tracing::span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        if event.metadata().target() == "hazna::debug_out" {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn enter(&self, _span: &tracing::span::Id) {}
    fn exit(&self, _span: &tracing::span::Id) {}
}

#[test]
fn hello_loop_emits_seventy_debug_out_records() {
    let subscriber = Arc::new(CountingSubscriber { count: AtomicUsize::new(0) });
    let subscriber_for_dispatch = Arc::clone(&subscriber);

    tracing::subscriber::with_default(
        tracing::Dispatch::from(subscriber_for_dispatch),
        || {
            let (world, mut ctx) = world_init(LogLevel::Info, WorldConfig::default()).unwrap();
            let task = task_create(&ctx).unwrap();
            task_attach(&mut ctx, task).unwrap();

            enter(&mut ctx, 0, 1, 0).unwrap();
            run(&mut ctx, 0, 1000).unwrap();

            let _ = world;
        },
    );

    assert_eq!(subscriber.count.load(Ordering::Relaxed), 70);
}

fn encode_widening_add_module() -> Vec<u8> {
    let insns = vec![
        // r[0..16] <- 0xFFFF, inline (primaries under 32 bits carry their
        // value directly in the operand field, not a pool index)
        Instruction::new(encode_opcode(Class::Rcn, RegSize::S16, None, 0), 0, 0, 0xFFFF),
        // r[16..32] <- 0x0002, inline
        Instruction::new(encode_opcode(Class::Rcn, RegSize::S16, None, 0), 16, 0, 0x0002),
        // r[32..64] <- r[0..16] + r[16..32], widened to 32 bits
        Instruction::new(encode_opcode(Class::Qrr, RegSize::S16, None, widening::ADD), 32, 0, 16),
        Instruction::new(encode_opcode(Class::Nnn, RegSize::S1, None, nnn::HALT), 0, 0, 0),
    ];
    let raw = RawModule {
        name_block: 0,
        proc_table: vec![
            ProcRecord::default(),
            ProcRecord {
                insn_start: insns.len() as u32,
                target_start: 0,
                const128_start: 0,
                const64_start: 0,
                const32_start: 0,
                name: 0,
            },
        ],
        data_block_table: vec![0, 0],
        target_table: vec![],
        insn_table: insns,
        const128: vec![],
        const64: vec![],
        const32: vec![],
        data: vec![],
    };
    codec::encode(&raw)
}

#[test]
fn widening_add_produces_a_carry_into_the_upper_half() {
    let (world, mut ctx) = world_init(LogLevel::None, WorldConfig::default()).unwrap();
    let bytes = encode_widening_add_module();
    let module = module_load(&ctx, &bytes).unwrap();

    let task = task_create(&ctx).unwrap();
    task_attach(&mut ctx, task).unwrap();
    let modmap_index = task_import(&mut ctx, module, None).unwrap();

    enter(&mut ctx, modmap_index, 0, 0).unwrap();
    run(&mut ctx, 0, 1000).unwrap();

    let reg = &ctx.active_exec().unwrap().reg;
    assert_eq!(read_bits(reg, 32, RegSize::S32) as u32, 0x0001_0001);

    let _ = world;
}

fn encode_corrupt_target_module() -> Vec<u8> {
    let insns = vec![Instruction::new(
        encode_opcode(Class::Rnp, RegSize::S8, None, branch_pair::ZERO),
        0,
        1,
        0,
    )];
    let raw = RawModule {
        name_block: 0,
        proc_table: vec![
            ProcRecord::default(),
            ProcRecord {
                insn_start: insns.len() as u32,
                target_start: 2,
                const128_start: 0,
                const64_start: 0,
                const32_start: 0,
                name: 0,
            },
        ],
        data_block_table: vec![0, 0],
        target_table: vec![0, 0],
        insn_table: insns,
        const128: vec![],
        const64: vec![],
        const32: vec![],
        data: vec![],
    };
    codec::encode(&raw)
}

#[test]
fn rejects_a_target_pair_that_runs_off_the_table() {
    let (_world, ctx) = world_init(LogLevel::None, WorldConfig::default()).unwrap();
    let bytes = encode_corrupt_target_module();
    assert_eq!(module_load(&ctx, &bytes), Err(Error::ModuleCorrupt));
}

//! End-to-end decode pipeline tests over a scripted engine.
//!
//! The engine implements a small fictional byte-coded ISA, chosen so every
//! control-flow category and failure mode is reachable from raw bytes:
//!
//! | opcode | encoding          | semantics                                   |
//! |--------|-------------------|---------------------------------------------|
//! | `00`   | 1 byte            | scratch-only copy (no architectural effect)  |
//! | `01`   | 1 + imm32 target  | unconditional jump                           |
//! | `02`   | 1 + imm32 target  | save fallthrough to `lr`, then jump (call)   |
//! | `03`   | 1 byte            | indirect branch through `lr` (return)        |
//! | `04`   | 1 + reg           | indirect jump through a register             |
//! | `05`   | 1 + imm32 target  | jump if `zf` (bare conditional)              |
//! | `06`   | 1 + reg           | guard skipping an indirect jump if `zf`      |
//! | `07`   | 1 + reg           | register increment (plain state write)       |
//! | `08`   | 1 byte            | software interrupt user-op                   |
//! | `09`   | 1 byte            | no-op valid only when context `TMode` is 1   |
//! | `0a`   | 1 byte            | two unguarded jumps (unclassifiable flow)    |
//! | `0e`   | 1 byte            | recognized, semantics unimplemented          |
//! | `0f`   | 1 byte            | lies about its length (reports 9)            |
//!
//! Registers live at byte offsets `r0..r7 = 0x00..0x38`, `lr = 0x80`,
//! `sp = 0x88`, `zf = 0x90` in the register space.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use microlift::engine::{
    AsmSink, ContextDatabase, DecodeEngine, EngineError, EngineResult, InstructionImage, PcodeSink,
    RegisterNames, SpecStore,
};
use microlift::flow::{FlowCategory, TakenBranch};
use microlift::pcode::{OpCode, Varnode};
use microlift::{
    ArchId, Category, DecodingContext, Error, Instruction, InstructionDecoder, IntrinsicTable,
    RegisterMappings,
};

const LR: u64 = 0x80;
const ZF: u64 = 0x90;

const SLA_DOCUMENT: &[u8] = b"toy-sla-document";

const PSPEC_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<processor_spec>
  <programcounter register="pc"/>
  <context_data>
    <context_set space="ram">
      <set name="TMode" val="0"/>
    </context_set>
  </context_data>
</processor_spec>"#;

/// Scripted engine binding for the fictional ISA.
///
/// Reads instruction bytes exclusively through the image's fill probe, the
/// way a real engine binding does.
struct ScriptedEngine {
    initialized: bool,
}

impl ScriptedEngine {
    fn new() -> Self {
        Self { initialized: false }
    }

    fn fetch(image: &InstructionImage, address: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        image.fill(address, &mut buf);
        buf
    }

    fn imm32(image: &InstructionImage, address: u64) -> u64 {
        let raw = Self::fetch(image, address, 4);
        u64::from(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn reg_operand(image: &InstructionImage, address: u64) -> Varnode {
        let raw = Self::fetch(image, address, 1);
        Varnode::register(u64::from(raw[0] & 0x07) * 8, 8)
    }

    /// Length and mnemonic of the encoding at `address`, without semantics.
    fn identify(
        image: &InstructionImage,
        ctx: &ContextDatabase,
        address: u64,
    ) -> EngineResult<(u32, &'static str)> {
        let opcode = Self::fetch(image, address, 1)[0];
        match opcode {
            0x00 => Ok((1, "nop")),
            0x01 => Ok((5, "jmp")),
            0x02 => Ok((5, "call")),
            0x03 => Ok((1, "ret")),
            0x04 => Ok((2, "jr")),
            0x05 => Ok((5, "beq")),
            0x06 => Ok((2, "jreq")),
            0x07 => Ok((2, "inc")),
            0x08 => Ok((1, "swi")),
            0x09 if ctx.variable("TMode") == Some(1) => Ok((1, "tnop")),
            0x0A => Ok((1, "djmp")),
            0x0E => Err(EngineError::UnimplementedSemantics),
            0x0F => Ok((9, "bad")),
            _ => Err(EngineError::NoMatchingEncoding),
        }
    }
}

impl RegisterNames for ScriptedEngine {
    fn register_name(&self, varnode: &Varnode) -> Option<String> {
        if varnode.space != microlift::pcode::AddrSpace::Register {
            return None;
        }
        match varnode.offset {
            LR => Some("lr".to_string()),
            0x88 => Some("sp".to_string()),
            ZF => Some("zf".to_string()),
            offset if offset < 0x40 && offset % 8 == 0 => Some(format!("r{}", offset / 8)),
            _ => None,
        }
    }
}

impl DecodeEngine for ScriptedEngine {
    fn initialize(&mut self, store: &SpecStore) -> microlift::Result<()> {
        assert_eq!(store.sla_data(), SLA_DOCUMENT);
        self.initialized = true;
        Ok(())
    }

    fn decode(
        &mut self,
        image: &InstructionImage,
        ctx: &ContextDatabase,
        address: u64,
        sink: &mut dyn PcodeSink,
    ) -> EngineResult<u32> {
        assert!(self.initialized, "decode before initialize");
        let (length, _) = Self::identify(image, ctx, address)?;
        let opcode = Self::fetch(image, address, 1)[0];
        let fallthrough = address + u64::from(length);

        match opcode {
            0x00 | 0x09 => {
                sink.dump(
                    address,
                    OpCode::Copy,
                    Some(Varnode::unique(0, 8)),
                    &[Varnode::constant(0, 8)],
                );
            }
            0x01 => {
                let target = Self::imm32(image, address + 1);
                sink.dump(address, OpCode::Branch, None, &[Varnode::ram(target, 8)]);
            }
            0x02 => {
                let target = Self::imm32(image, address + 1);
                sink.dump(
                    address,
                    OpCode::Copy,
                    Some(Varnode::register(LR, 8)),
                    &[Varnode::constant(fallthrough, 8)],
                );
                sink.dump(address, OpCode::Branch, None, &[Varnode::ram(target, 8)]);
            }
            0x03 => {
                sink.dump(
                    address,
                    OpCode::BranchInd,
                    None,
                    &[Varnode::register(LR, 8)],
                );
            }
            0x04 => {
                let reg = Self::reg_operand(image, address + 1);
                sink.dump(address, OpCode::BranchInd, None, &[reg]);
            }
            0x05 => {
                let target = Self::imm32(image, address + 1);
                sink.dump(
                    address,
                    OpCode::CBranch,
                    None,
                    &[Varnode::ram(target, 8), Varnode::register(ZF, 1)],
                );
            }
            0x06 => {
                let reg = Self::reg_operand(image, address + 1);
                sink.dump(
                    address,
                    OpCode::CBranch,
                    None,
                    &[Varnode::ram(fallthrough, 8), Varnode::register(ZF, 1)],
                );
                sink.dump(address, OpCode::BranchInd, None, &[reg]);
            }
            0x07 => {
                let reg = Self::reg_operand(image, address + 1);
                sink.dump(
                    address,
                    OpCode::IntAdd,
                    Some(reg),
                    &[reg, Varnode::constant(1, 8)],
                );
            }
            0x08 => {
                // Selector 1 indexes software_interrupt in the user-op list.
                sink.dump(address, OpCode::CallOther, None, &[Varnode::constant(1, 4)]);
            }
            0x0A => {
                sink.dump(address, OpCode::Branch, None, &[Varnode::ram(0x2000, 8)]);
                sink.dump(address, OpCode::Branch, None, &[Varnode::ram(0x3000, 8)]);
            }
            0x0F => {}
            other => unreachable!("identify accepted opcode {other:#x}"),
        }

        Ok(length)
    }

    fn disassemble(
        &mut self,
        image: &InstructionImage,
        ctx: &ContextDatabase,
        address: u64,
        sink: &mut dyn AsmSink,
    ) -> EngineResult<u32> {
        assert!(self.initialized, "disassemble before initialize");
        let (length, mnemonic) = Self::identify(image, ctx, address)?;
        sink.dump(address, mnemonic, "");
        Ok(length)
    }

    fn user_op_names(&self) -> Vec<String> {
        vec![
            "count_leading_zeros".to_string(),
            "software_interrupt".to_string(),
        ]
    }
}

static SPEC_DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Writes the spec pair into a fresh temp directory and returns their paths.
fn spec_files() -> (PathBuf, PathBuf) {
    let serial = SPEC_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "microlift-decode-{}-{}",
        std::process::id(),
        serial
    ));
    std::fs::create_dir_all(&dir).unwrap();

    let sla = dir.join("toy.sla");
    let pspec = dir.join("toy.pspec");
    std::fs::write(&sla, SLA_DOCUMENT).unwrap();
    std::fs::write(&pspec, PSPEC_DOCUMENT).unwrap();
    (sla, pspec)
}

fn mappings() -> RegisterMappings {
    RegisterMappings::new()
        .context_register("ISAMode", "TMode")
        .state_register("LR", "lr")
        .link_register("LR")
        .hypercall_op("software_interrupt")
}

fn bare_decoder() -> InstructionDecoder<ScriptedEngine> {
    let (sla, pspec) = spec_files();
    InstructionDecoder::new(
        ArchId::AArch32,
        sla.to_str().unwrap(),
        pspec.to_str().unwrap(),
        ScriptedEngine::new(),
        mappings(),
    )
    .unwrap()
}

fn decoder() -> InstructionDecoder<ScriptedEngine> {
    let decoder = bare_decoder();
    assert!(decoder.set_intrinsics(Arc::new(IntrinsicTable::new(vec![
        "__builtin_trap".to_string(),
    ]))));
    decoder
}

fn decode(
    decoder: &mut InstructionDecoder<ScriptedEngine>,
    address: u64,
    bytes: &[u8],
) -> (Instruction, microlift::Result<()>) {
    let mut inst = Instruction::new();
    let result = decoder.decode_instruction(address, bytes, &mut inst, &DecodingContext::new());
    (inst, result)
}

fn jump_to(target: u32) -> Vec<u8> {
    let mut bytes = vec![0x01];
    bytes.extend_from_slice(&target.to_le_bytes());
    bytes
}

#[test]
fn direct_jump_sets_target_and_truncates() {
    let mut decoder = decoder();

    // Trailing garbage beyond the encoding must be trimmed away.
    let mut bytes = jump_to(0x2000);
    bytes.extend_from_slice(&[0xDE, 0xAD]);

    let (inst, result) = decode(&mut decoder, 0x1000, &bytes);
    result.unwrap();

    assert_eq!(inst.category, Category::DirectJump);
    assert_eq!(inst.pc, 0x1000);
    assert_eq!(inst.next_pc, 0x1005);
    assert_eq!(inst.size(), 5);
    assert_eq!(inst.bytes, jump_to(0x2000));
    assert_eq!(inst.branch_taken_pc, Some(0x2000));
    assert_eq!(inst.branch_not_taken_pc, None);
    assert_eq!(inst.mnemonic, "jmp");
    assert_eq!(inst.flow, Some(FlowCategory::DirectJump { target: 0x2000 }));
}

#[test]
fn scratch_only_instruction_is_noop() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x00]);
    result.unwrap();

    assert_eq!(inst.category, Category::NoOp);
    assert_eq!(inst.next_pc, 0x1001);
    assert_eq!(inst.branch_taken_pc, None);
    assert_eq!(inst.branch_not_taken_pc, None);
    assert_eq!(inst.mnemonic, "nop");

    // Unconditional records carry a lifter without a branch-taken source.
    let lifter = inst.lifter().expect("successful decode attaches a lifter");
    assert!(lifter.branch_taken().is_none());
    assert!(lifter.lifter().intrinsics().contains("__builtin_trap"));
}

#[test]
fn link_register_save_classifies_as_call() {
    let mut decoder = decoder();
    let mut bytes = vec![0x02];
    bytes.extend_from_slice(&0x4000u32.to_le_bytes());

    let (inst, result) = decode(&mut decoder, 0x1000, &bytes);
    result.unwrap();

    assert_eq!(inst.category, Category::DirectFunctionCall);
    assert_eq!(inst.branch_taken_pc, None);
    assert_eq!(inst.branch_not_taken_pc, Some(0x1005));
    assert_eq!(
        inst.flow,
        Some(FlowCategory::DirectFunctionCall { target: 0x4000 })
    );
}

#[test]
fn indirect_branch_through_link_register_is_return() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x03]);
    result.unwrap();

    assert_eq!(inst.category, Category::FunctionReturn);
    assert_eq!(inst.mnemonic, "ret");
    assert_eq!(inst.branch_taken_pc, None);
    assert_eq!(inst.branch_not_taken_pc, None);
}

#[test]
fn register_branch_is_indirect_jump() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x04, 0x03]);
    result.unwrap();

    assert_eq!(inst.category, Category::IndirectJump);
    assert_eq!(inst.next_pc, 0x1002);
    assert_eq!(inst.flow, Some(FlowCategory::IndirectJump));
}

#[test]
fn bare_conditional_branch() {
    let mut decoder = decoder();
    let mut bytes = vec![0x05];
    bytes.extend_from_slice(&0x2000u32.to_le_bytes());

    let (inst, result) = decode(&mut decoder, 0x1000, &bytes);
    result.unwrap();

    assert_eq!(inst.category, Category::ConditionalDirectJump);
    assert_eq!(inst.branch_taken_pc, Some(0x2000));
    assert_eq!(inst.branch_not_taken_pc, Some(0x1005));

    let taken = inst
        .lifter()
        .unwrap()
        .branch_taken()
        .expect("conditional records carry a branch-taken source");
    assert_eq!(taken.condition, Varnode::register(ZF, 1));
    assert!(!taken.negated);
}

#[test]
fn guard_skipping_indirect_jump() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x06, 0x02]);
    result.unwrap();

    assert_eq!(inst.category, Category::ConditionalIndirectJump);
    assert_eq!(inst.branch_taken_pc, None);
    assert_eq!(inst.branch_not_taken_pc, Some(0x1002));
    assert!(matches!(
        inst.flow,
        Some(FlowCategory::Conditional {
            taken: TakenBranch::IndirectJump,
            ..
        })
    ));

    // The guard jumps over the transfer, so the recorded condition is the
    // negation of the taken condition.
    let taken = inst.lifter().unwrap().branch_taken().unwrap();
    assert_eq!(taken.condition, Varnode::register(ZF, 1));
    assert!(taken.negated);
}

#[test]
fn register_write_is_normal() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x07, 0x01]);
    result.unwrap();

    assert_eq!(inst.category, Category::Normal);
    assert_eq!(inst.mnemonic, "inc");
    assert_eq!(inst.branch_taken_pc, None);
    assert_eq!(inst.branch_not_taken_pc, None);
}

#[test]
fn software_interrupt_is_hypercall() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x08]);
    result.unwrap();

    assert_eq!(inst.category, Category::AsyncHyperCall);
    assert_eq!(inst.flow, Some(FlowCategory::AsyncHyperCall));
}

#[test]
fn empty_byte_span_is_undecodable() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[]);

    assert!(matches!(result, Err(Error::Undecodable)));
    assert_eq!(inst.category, Category::Invalid);
    assert!(inst.lifter().is_none());
}

#[test]
fn truncated_encoding_is_undecodable() {
    let mut decoder = decoder();
    // The jump opcode consumes 5 bytes but only 3 are supplied; the engine
    // reports 5 and the window validation rejects it.
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x01, 0x00, 0x20]);

    assert!(matches!(result, Err(Error::Undecodable)));
    assert_eq!(inst.category, Category::Invalid);
}

#[test]
fn unknown_opcode_is_undecodable() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0xC7]);

    assert!(matches!(result, Err(Error::Undecodable)));
    assert_eq!(inst.category, Category::Invalid);
    assert!(inst.mnemonic.is_empty());
}

#[test]
fn unimplemented_semantics_is_undecodable() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x0E]);

    assert!(matches!(result, Err(Error::Undecodable)));
    assert_eq!(inst.category, Category::Invalid);
}

#[test]
fn length_outside_window_is_undecodable() {
    let mut decoder = decoder();
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x0F]);

    assert!(matches!(result, Err(Error::Undecodable)));
    assert_eq!(inst.category, Category::Invalid);
}

#[test]
fn unclassifiable_flow_is_unresolved() {
    let mut decoder = decoder();
    // The encoding decodes (two unguarded jumps), but no category can be
    // derived from its micro-ops, so the decode fails closed.
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x0A]);

    assert!(matches!(result, Err(Error::UnresolvedControlFlow)));
    assert_eq!(inst.category, Category::Invalid);
    assert!(inst.flow.is_none());
    assert!(inst.lifter().is_none());
}

#[test]
fn context_gates_decoding() {
    let mut decoder = decoder();

    // The pspec defaults TMode to 0, so the gated encoding is rejected.
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x09]);
    assert!(matches!(result, Err(Error::Undecodable)));
    assert_eq!(inst.category, Category::Invalid);

    // The caller's context is translated through the mapping table.
    let context = DecodingContext::new().with_value("ISAMode", 1);
    let mut inst = Instruction::new();
    decoder
        .decode_instruction(0x1000, &[0x09], &mut inst, &context)
        .unwrap();
    assert_eq!(inst.category, Category::NoOp);
    assert_eq!(inst.mnemonic, "tnop");

    // The override must not leak into the next plain decode.
    let (inst, result) = decode(&mut decoder, 0x1000, &[0x09]);
    assert!(matches!(result, Err(Error::Undecodable)));
    assert_eq!(inst.category, Category::Invalid);
}

#[test]
fn repeated_decoding_is_idempotent() {
    let mut decoder = decoder();
    let bytes = jump_to(0x2000);

    let (first, first_result) = decode(&mut decoder, 0x1000, &bytes);
    let (second, second_result) = decode(&mut decoder, 0x1000, &bytes);
    first_result.unwrap();
    second_result.unwrap();

    assert_eq!(first.category, second.category);
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.next_pc, second.next_pc);
    assert_eq!(first.branch_taken_pc, second.branch_taken_pc);
    assert_eq!(first.mnemonic, second.mnemonic);
}

#[test]
fn record_reuse_clears_previous_fields() {
    let mut decoder = decoder();
    let mut inst = Instruction::new();
    let context = DecodingContext::new();

    let mut bytes = vec![0x05];
    bytes.extend_from_slice(&0x2000u32.to_le_bytes());
    decoder
        .decode_instruction(0x1000, &bytes, &mut inst, &context)
        .unwrap();
    assert_eq!(inst.category, Category::ConditionalDirectJump);

    // Reusing the same record for a plain no-op must not retain branch state.
    decoder
        .decode_instruction(0x2000, &[0x00], &mut inst, &context)
        .unwrap();
    assert_eq!(inst.category, Category::NoOp);
    assert_eq!(inst.pc, 0x2000);
    assert_eq!(inst.branch_taken_pc, None);
    assert_eq!(inst.branch_not_taken_pc, None);
    assert!(inst.lifter().unwrap().branch_taken().is_none());
}

#[test]
fn failed_decode_leaves_no_stale_success_state() {
    let mut decoder = decoder();
    let mut inst = Instruction::new();
    let context = DecodingContext::new();

    decoder
        .decode_instruction(0x1000, &jump_to(0x2000), &mut inst, &context)
        .unwrap();
    assert_eq!(inst.category, Category::DirectJump);

    let result = decoder.decode_instruction(0x1005, &[0xC7], &mut inst, &context);
    assert!(matches!(result, Err(Error::Undecodable)));
    assert_eq!(inst.category, Category::Invalid);
    assert_eq!(inst.branch_taken_pc, None);
    assert!(inst.flow.is_none());
    assert!(inst.lifter().is_none());
}

#[test]
fn lifter_is_shared_across_decodes() {
    let mut decoder = decoder();

    let (first, _) = decode(&mut decoder, 0x1000, &[0x00]);
    let (second, _) = decode(&mut decoder, 0x1001, &[0x03]);

    assert!(Arc::ptr_eq(
        first.lifter().unwrap().lifter(),
        second.lifter().unwrap().lifter(),
    ));
    assert!(Arc::ptr_eq(&decoder.lifter(), &decoder.op_lifter()));
    assert_eq!(
        decoder.lifter().user_ops(),
        ["count_leading_zeros".to_string(), "software_interrupt".to_string()]
    );
}

#[test]
#[should_panic(expected = "architecture was not initialized")]
fn lifter_before_intrinsics_panics() {
    let decoder = bare_decoder();
    let _ = decoder.lifter();
}

#[test]
fn decoder_exposes_construction_names() {
    let decoder = decoder();
    assert!(decoder.sla_name().ends_with("toy.sla"));
    assert!(decoder.pspec().ends_with("toy.pspec"));
    assert_eq!(decoder.mappings().engine_link_register(), Some("lr"));
    assert_eq!(decoder.user_op_names().len(), 2);
}

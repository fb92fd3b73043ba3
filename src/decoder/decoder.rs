//! The per-architecture decoder orchestrating one instruction at a time.

use std::sync::{Arc, OnceLock};

use crate::{
    arch::{ArchId, DecodingContext, IntrinsicTable, RegisterMappings},
    decoder::{Category, Instruction},
    engine::{DecodeEngine, EngineHarness},
    flow::{ControlFlowAnalysis, FlowCategory, TakenBranch},
    lifter::{LifterWithState, SemanticLifter},
    pcode::{MnemonicCollector, PcodeCollector},
    Error, Result,
};

/// Decodes raw machine bytes into classified instruction records, one
/// instruction per call.
///
/// Constructed once per architecture variant (spec loading is guarded by the
/// process-wide per-identity construction lock) and driven sequentially: a
/// decoder instance must not be invoked concurrently from multiple threads,
/// since each call resets and mutates the shared engine state. Callers
/// wanting parallel decoding use one decoder per worker.
#[derive(Debug)]
pub struct InstructionDecoder<E: DecodeEngine> {
    harness: EngineHarness<E>,
    sla_name: String,
    pspec_name: String,
    mappings: RegisterMappings,
    user_ops: Vec<String>,
    intrinsics: OnceLock<Arc<IntrinsicTable>>,
    lifter: OnceLock<Arc<SemanticLifter>>,
}

impl<E: DecodeEngine> InstructionDecoder<E> {
    /// Constructs a decoder for one architecture variant.
    ///
    /// Loads the spec files named by `sla_name` and `pspec_name` and
    /// initializes `engine` from them, holding the construction lock for
    /// `arch` throughout.
    ///
    /// # Panics
    ///
    /// Panics when either spec name cannot be resolved to a file (a fatal
    /// deployment error).
    pub fn new(
        arch: ArchId,
        sla_name: &str,
        pspec_name: &str,
        engine: E,
        mappings: RegisterMappings,
    ) -> Result<Self> {
        let harness = EngineHarness::new(arch, sla_name, pspec_name, engine)?;
        let user_ops = harness.user_op_names();

        Ok(Self {
            harness,
            sla_name: sla_name.to_string(),
            pspec_name: pspec_name.to_string(),
            mappings,
            user_ops,
            intrinsics: OnceLock::new(),
            lifter: OnceLock::new(),
        })
    }

    /// Decodes exactly one instruction at `address` from `bytes` into `inst`.
    ///
    /// On success the record holds the truncated byte span, mnemonic,
    /// control-flow tag and category-specific fields, and carries a lifter
    /// handle. On failure the record's category is [`Category::Invalid`] and
    /// its other fields are unspecified; the caller treats the address as
    /// unliftable.
    ///
    /// `context` supplies the architecture submode state for this call; it is
    /// translated through the decoder's context-register mapping before the
    /// engine runs.
    ///
    /// # Errors
    ///
    /// [`Error::Undecodable`] when the engine rejects the bytes or reports a
    /// length outside the byte window; [`Error::UnresolvedControlFlow`] when
    /// the bytes decode but no control-flow category can be derived.
    pub fn decode_instruction(
        &mut self,
        address: u64,
        bytes: &[u8],
        inst: &mut Instruction,
        context: &DecodingContext,
    ) -> Result<()> {
        inst.reset_for(address, bytes);

        self.harness.reset_context()?;
        for (state_name, engine_name) in self.mappings.context_registers() {
            if let Some(value) = context.value(state_name) {
                self.harness.set_context_variable(engine_name, value);
            }
        }

        let mut collector = PcodeCollector::new();
        let Some(length) = self.harness.one_instruction(address, &mut collector, bytes) else {
            inst.category = Category::Invalid;
            return Err(Error::Undecodable);
        };

        // Communicate the consumed size back to the caller.
        inst.bytes = bytes[..length].to_vec();
        let fallthrough = address.wrapping_add(length as u64);
        inst.next_pc = fallthrough;

        // Second pass over the truncated bytes, purely for identification.
        let mut namer = MnemonicCollector::new();
        let truncated = inst.bytes.clone();
        if self
            .harness
            .one_instruction_asm(address, &mut namer, &truncated)
            .is_some()
        {
            if let Some(mnemonic) = namer.into_mnemonic() {
                inst.mnemonic = mnemonic;
            }
        }

        let analysis =
            ControlFlowAnalysis::new(self.harness.engine(), &self.mappings, &self.user_ops);
        let Some(flow) = analysis.compute_category(collector.ops(), fallthrough, context) else {
            log::error!("failed to compute category for inst at {:#x}", address);
            inst.category = Category::Invalid;
            return Err(Error::UnresolvedControlFlow);
        };

        let branch_taken = flow.branch_taken_var().cloned();
        apply_flow(inst, &flow);
        inst.flow = Some(flow);

        inst.set_lifter(Arc::new(LifterWithState::new(branch_taken, self.lifter())));
        log::debug!(
            "decoded {} at {:#x} as {} (fallthrough {:#x})",
            inst.mnemonic,
            address,
            inst.category,
            fallthrough
        );
        Ok(())
    }

    /// Installs the architecture's intrinsic table.
    ///
    /// Supplied by the architecture front-end before the first lifter use;
    /// only the first installation takes effect. Returns whether this call
    /// installed the table.
    pub fn set_intrinsics(&self, table: Arc<IntrinsicTable>) -> bool {
        self.intrinsics.set(table).is_ok()
    }

    /// The shared semantic-lifter handle for this decoder.
    ///
    /// Built lazily on first request and cached for the decoder's lifetime.
    ///
    /// # Panics
    ///
    /// Panics when the intrinsic table has not been installed yet; asking for
    /// a lifter before initialization is a configuration defect, not a
    /// recoverable decode failure.
    pub fn lifter(&self) -> Arc<SemanticLifter> {
        let lifter = self.lifter.get_or_init(|| {
            let Some(table) = self.intrinsics.get() else {
                panic!("architecture was not initialized before asking for a lifter");
            };
            Arc::new(SemanticLifter::new(
                Arc::clone(table),
                self.user_ops.clone(),
            ))
        });
        Arc::clone(lifter)
    }

    /// The shared operand-lifter handle; identical to
    /// [`InstructionDecoder::lifter`].
    pub fn op_lifter(&self) -> Arc<SemanticLifter> {
        self.lifter()
    }

    /// Name of the sla spec this decoder was constructed from.
    pub fn sla_name(&self) -> &str {
        &self.sla_name
    }

    /// Name of the pspec this decoder was constructed from.
    pub fn pspec(&self) -> &str {
        &self.pspec_name
    }

    /// The fixed register-mapping tables of this decoder.
    pub fn mappings(&self) -> &RegisterMappings {
        &self.mappings
    }

    /// The engine's user-defined operation names.
    pub fn user_op_names(&self) -> &[String] {
        &self.user_ops
    }
}

/// Translates a control-flow category into instruction-record fields.
///
/// A total mapping: every category variant maps to exactly one record tag,
/// with the conditional inner variant flattened through a nested match so a
/// newly added variant fails compilation instead of being silently dropped.
fn apply_flow(inst: &mut Instruction, flow: &FlowCategory) {
    match flow {
        FlowCategory::Normal => inst.category = Category::Normal,
        FlowCategory::NoOp => inst.category = Category::NoOp,
        FlowCategory::Invalid => inst.category = Category::Invalid,
        FlowCategory::Error => inst.category = Category::Error,
        FlowCategory::DirectJump { target } => {
            inst.category = Category::DirectJump;
            inst.branch_taken_pc = Some(*target);
        }
        FlowCategory::IndirectJump => inst.category = Category::IndirectJump,
        FlowCategory::DirectFunctionCall { .. } => {
            inst.category = Category::DirectFunctionCall;
            inst.branch_not_taken_pc = Some(inst.next_pc);
        }
        FlowCategory::IndirectFunctionCall => {
            inst.category = Category::IndirectFunctionCall;
            inst.branch_not_taken_pc = Some(inst.next_pc);
        }
        FlowCategory::FunctionReturn => inst.category = Category::FunctionReturn,
        FlowCategory::AsyncHyperCall => inst.category = Category::AsyncHyperCall,
        FlowCategory::Conditional { taken, .. } => {
            inst.branch_not_taken_pc = Some(inst.next_pc);
            match taken {
                TakenBranch::DirectJump { target } => {
                    inst.category = Category::ConditionalDirectJump;
                    inst.branch_taken_pc = Some(*target);
                }
                TakenBranch::IndirectJump => inst.category = Category::ConditionalIndirectJump,
                TakenBranch::DirectFunctionCall { .. } => {
                    inst.category = Category::ConditionalDirectFunctionCall;
                }
                TakenBranch::IndirectFunctionCall => {
                    inst.category = Category::ConditionalIndirectFunctionCall;
                }
                TakenBranch::FunctionReturn => {
                    inst.category = Category::ConditionalFunctionReturn;
                }
                TakenBranch::AsyncHyperCall => {
                    inst.category = Category::ConditionalAsyncHyperCall;
                }
            }
        }
    }
}

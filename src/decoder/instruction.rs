//! The caller-owned instruction record populated by one decode call.

use std::sync::Arc;

use crate::{flow::FlowCategory, lifter::LifterWithState};

/// Flattened control-flow tag of an instruction record.
///
/// The conditional flow category's inner variant is flattened into six
/// dedicated tags so record consumers can match on a single enum. Translation
/// from [`FlowCategory`] is a total, exhaustive mapping.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumCount,
    strum::EnumIter,
)]
pub enum Category {
    /// The engine rejected the bytes; the record carries no semantics.
    #[default]
    Invalid,
    /// Decoded, but control flow could not be determined or the semantics
    /// are an error trap.
    Error,
    /// Falls through after updating state.
    Normal,
    /// Falls through without architectural effect.
    NoOp,
    /// Unconditional transfer to a known constant target.
    DirectJump,
    /// Unconditional transfer to a storage-derived target.
    IndirectJump,
    /// Call to a known constant target.
    DirectFunctionCall,
    /// Call to a storage-derived target.
    IndirectFunctionCall,
    /// Return from the current function.
    FunctionReturn,
    /// Asynchronous hypercall.
    AsyncHyperCall,
    /// Conditional transfer to a known constant target.
    ConditionalDirectJump,
    /// Conditional transfer to a storage-derived target.
    ConditionalIndirectJump,
    /// Conditional call to a known constant target.
    ConditionalDirectFunctionCall,
    /// Conditional call to a storage-derived target.
    ConditionalIndirectFunctionCall,
    /// Conditional return.
    ConditionalFunctionReturn,
    /// Conditional asynchronous hypercall.
    ConditionalAsyncHyperCall,
}

impl Category {
    /// Whether this tag is one of the six conditional variants.
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            Category::ConditionalDirectJump
                | Category::ConditionalIndirectJump
                | Category::ConditionalDirectFunctionCall
                | Category::ConditionalIndirectFunctionCall
                | Category::ConditionalFunctionReturn
                | Category::ConditionalAsyncHyperCall
        )
    }
}

/// One decoded instruction, produced by a single decode call.
///
/// Caller-owned; the decoding pipeline only populates it. All fields other
/// than `pc` are defined only when the decode call succeeded.
#[derive(Debug, Clone, Default)]
pub struct Instruction {
    /// Program counter of the instruction.
    pub pc: u64,
    /// Address of the next sequential instruction (fallthrough).
    pub next_pc: u64,
    /// The raw bytes of the instruction, truncated to the decoded length.
    pub bytes: Vec<u8>,
    /// Mnemonic from the identification pass; empty when unavailable.
    pub mnemonic: String,
    /// Flattened control-flow tag.
    pub category: Category,
    /// Target address when the (possibly conditional) transfer is taken;
    /// set only for known constant targets.
    pub branch_taken_pc: Option<u64>,
    /// Address executed when a conditional transfer is not taken, or after a
    /// call returns.
    pub branch_not_taken_pc: Option<u64>,
    /// The full control-flow category the tag was derived from.
    pub flow: Option<FlowCategory>,
    lifter: Option<Arc<LifterWithState>>,
}

impl Instruction {
    /// Creates an empty record, ready to be passed to a decode call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded length in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// The semantic-lifter handle attached on success.
    pub fn lifter(&self) -> Option<&Arc<LifterWithState>> {
        self.lifter.as_ref()
    }

    /// Clears the record for a fresh decode attempt at `pc` over `bytes`.
    pub(crate) fn reset_for(&mut self, pc: u64, bytes: &[u8]) {
        self.pc = pc;
        self.next_pc = pc;
        self.bytes = bytes.to_vec();
        self.mnemonic.clear();
        self.category = Category::Invalid;
        self.branch_taken_pc = None;
        self.branch_not_taken_pc = None;
        self.flow = None;
        self.lifter = None;
    }

    pub(crate) fn set_lifter(&mut self, lifter: Arc<LifterWithState>) {
        self.lifter = Some(lifter);
    }
}

//! Typed control-flow categories and their derivation.
//!
//! Downstream code generation trusts the control-flow category of a decoded
//! instruction unconditionally, so the taxonomy is a closed sum type and the
//! classifier fails closed: ambiguity resolves to `Error`/`Invalid`, never a
//! guessed category.
//!
//! # Key Types
//! - [`FlowCategory`] - the closed category taxonomy
//! - [`TakenBranch`] - the inner variant of a conditional instruction
//! - [`BranchTakenVar`] - synthesized branch-taken source of a conditional
//! - [`ControlFlowAnalysis`] - derives a category from one micro-op sequence

mod classifier;

pub use classifier::ControlFlowAnalysis;

use crate::pcode::Varnode;

/// Synthesized source of a conditional instruction's branch-taken value.
///
/// Points at the guard operand within the instruction's micro-op sequence.
/// When `negated` is set, the guarded transfer is taken when the guard
/// evaluates false (the guard skips over the transfer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTakenVar {
    /// The guard operand of the conditional micro-op.
    pub condition: Varnode,
    /// Index of the conditional micro-op within the sequence.
    pub op_index: usize,
    /// Whether the transfer is taken on a false guard.
    pub negated: bool,
}

/// The control-flow shape a conditional instruction takes when its guard
/// fires.
///
/// Covers exactly the transfer kinds that can appear under a condition;
/// plain fallthrough categories cannot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakenBranch {
    /// Transfer to a compile-time constant target.
    DirectJump {
        /// The known target address.
        target: u64,
    },
    /// Transfer to a storage-derived target.
    IndirectJump,
    /// Function call to a compile-time constant target.
    DirectFunctionCall {
        /// The known call target address.
        target: u64,
    },
    /// Function call to a storage-derived target.
    IndirectFunctionCall,
    /// Return from the current function.
    FunctionReturn,
    /// Asynchronous hypercall (software interrupt or similar).
    AsyncHyperCall,
}

/// Typed control-flow category of one decoded instruction.
///
/// A closed variant set; translation into instruction-record fields matches
/// exhaustively over it so a newly added category cannot be silently dropped.
/// A conditional category always carries its branch-taken source by
/// construction; there is no representation of a conditional without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowCategory {
    /// Falls through after updating state.
    Normal,
    /// Falls through without any architectural effect.
    NoOp,
    /// The engine rejected the bytes.
    Invalid,
    /// The bytes decoded, but control flow could not be determined (or the
    /// instruction's semantics are an error trap).
    Error,
    /// Unconditional transfer to a known constant target.
    DirectJump {
        /// The known target address.
        target: u64,
    },
    /// Unconditional transfer to a storage-derived target.
    IndirectJump,
    /// Call to a known constant target.
    DirectFunctionCall {
        /// The known call target address.
        target: u64,
    },
    /// Call to a storage-derived target.
    IndirectFunctionCall,
    /// Return from the current function.
    FunctionReturn,
    /// Asynchronous hypercall.
    AsyncHyperCall,
    /// A transfer guarded by a condition, with its synthesized branch-taken
    /// source.
    Conditional {
        /// What happens when the guard fires.
        taken: TakenBranch,
        /// Where the branch-taken value comes from.
        condition: BranchTakenVar,
    },
}

impl FlowCategory {
    /// The branch-taken source, present exactly for conditional categories.
    pub fn branch_taken_var(&self) -> Option<&BranchTakenVar> {
        match self {
            FlowCategory::Conditional { condition, .. } => Some(condition),
            _ => None,
        }
    }
}

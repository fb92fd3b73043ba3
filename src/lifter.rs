//! Lazily constructed semantic-lifter handles.
//!
//! The semantic lifter itself (turning a classified instruction record into
//! portable IR) lives downstream; this module only defines the handles the
//! decoder builds and attaches. One [`SemanticLifter`] is constructed at most
//! once per decoder instance and cached for its lifetime; it is read-only
//! after construction and safely shared across subsequent decode calls.

use std::sync::Arc;

use crate::{arch::IntrinsicTable, flow::BranchTakenVar};

/// Shared, per-decoder lifter handle.
///
/// Carries everything the downstream lifter needs that is fixed per decoder:
/// the architecture's intrinsic table and the engine's user-op names.
#[derive(Debug)]
pub struct SemanticLifter {
    intrinsics: Arc<IntrinsicTable>,
    user_ops: Vec<String>,
}

impl SemanticLifter {
    pub(crate) fn new(intrinsics: Arc<IntrinsicTable>, user_ops: Vec<String>) -> Self {
        Self {
            intrinsics,
            user_ops,
        }
    }

    /// The architecture's intrinsic table.
    pub fn intrinsics(&self) -> &IntrinsicTable {
        &self.intrinsics
    }

    /// The engine's user-defined operation names, indexed by `CallOther`
    /// selector constants.
    pub fn user_ops(&self) -> &[String] {
        &self.user_ops
    }
}

/// Per-instruction lifter handle attached to a decoded record.
///
/// Pairs the shared per-decoder lifter with the branch-taken source of this
/// particular instruction, present exactly when the instruction is
/// conditional.
#[derive(Debug)]
pub struct LifterWithState {
    branch_taken: Option<BranchTakenVar>,
    lifter: Arc<SemanticLifter>,
}

impl LifterWithState {
    pub(crate) fn new(branch_taken: Option<BranchTakenVar>, lifter: Arc<SemanticLifter>) -> Self {
        Self {
            branch_taken,
            lifter,
        }
    }

    /// The branch-taken source of a conditional instruction.
    pub fn branch_taken(&self) -> Option<&BranchTakenVar> {
        self.branch_taken.as_ref()
    }

    /// The shared per-decoder lifter.
    pub fn lifter(&self) -> &Arc<SemanticLifter> {
        &self.lifter
    }
}

//! Control-flow category derivation from one micro-op sequence.
//!
//! The classifier has no architecture-specific mnemonic knowledge: it works
//! purely from the micro-op sequence, the fallthrough address, the per-decoder
//! register mappings and the engine's register naming. The rules, in order:
//!
//! - the transfer target's storage space decides direct (constant code
//!   address) vs. indirect (storage-derived);
//! - a prior write of the fallthrough address into a register or memory is a
//!   return-address save and turns a jump into a call;
//! - an indirect transfer sourced from the designated link register is a
//!   return, as is an explicit return micro-op;
//! - a `CallOther` naming a registered hypercall user-op is an asynchronous
//!   hypercall;
//! - a conditional guard wraps the classified transfer into a conditional
//!   category with a synthesized branch-taken source.
//!
//! Anything the rules do not cover fails closed.

use crate::{
    arch::{DecodingContext, RegisterMappings},
    engine::RegisterNames,
    flow::{BranchTakenVar, FlowCategory, TakenBranch},
    pcode::{AddrSpace, OpCode, PcodeOp, Varnode},
};

/// Derives the typed control-flow category of one decoded instruction.
///
/// Constructed per decode call; borrows the decoder's fixed mapping tables
/// and the engine's register naming.
pub struct ControlFlowAnalysis<'a> {
    registers: &'a dyn RegisterNames,
    mappings: &'a RegisterMappings,
    user_ops: &'a [String],
}

impl<'a> ControlFlowAnalysis<'a> {
    /// Creates an analysis over the given register naming and mappings.
    pub fn new(
        registers: &'a dyn RegisterNames,
        mappings: &'a RegisterMappings,
        user_ops: &'a [String],
    ) -> Self {
        Self {
            registers,
            mappings,
            user_ops,
        }
    }

    /// Computes the control-flow category of the micro-op sequence `ops`.
    ///
    /// `fallthrough` is the address of the next sequential instruction.
    /// Returns `None` when the sequence has a shape the rules do not cover;
    /// the caller marks the instruction invalid and fails the decode.
    pub fn compute_category(
        &self,
        ops: &[PcodeOp],
        fallthrough: u64,
        _context: &DecodingContext,
    ) -> Option<FlowCategory> {
        if ops.is_empty() {
            return Some(FlowCategory::Error);
        }

        let Some(index) = ops.iter().position(|op| self.is_transfer(op)) else {
            return Some(if writes_state(ops) {
                FlowCategory::Normal
            } else {
                FlowCategory::NoOp
            });
        };

        if ops[index].opcode == OpCode::CBranch {
            return self.classify_conditional(ops, index, fallthrough);
        }

        if self.has_transfer(&ops[index + 1..]) {
            log::error!("multiple unguarded control transfers in one instruction");
            return None;
        }

        self.classify_transfer(&ops[index], &ops[..index], fallthrough)
    }

    /// Classifies a single unconditional transfer op, given the micro-ops
    /// emitted before it.
    fn classify_transfer(
        &self,
        op: &PcodeOp,
        prior: &[PcodeOp],
        fallthrough: u64,
    ) -> Option<FlowCategory> {
        match op.opcode {
            OpCode::Branch => {
                let target = op.input(0)?;
                match target.space {
                    AddrSpace::Ram => {
                        if writes_return_address(prior, fallthrough) {
                            Some(FlowCategory::DirectFunctionCall {
                                target: target.offset,
                            })
                        } else {
                            Some(FlowCategory::DirectJump {
                                target: target.offset,
                            })
                        }
                    }
                    _ => {
                        log::error!("branch target in {} space is unresolvable", target.space);
                        Some(FlowCategory::Error)
                    }
                }
            }
            OpCode::BranchInd => {
                let source = op.input(0)?;
                if self.is_link_register(source) {
                    Some(FlowCategory::FunctionReturn)
                } else if writes_return_address(prior, fallthrough) {
                    Some(FlowCategory::IndirectFunctionCall)
                } else {
                    Some(FlowCategory::IndirectJump)
                }
            }
            OpCode::Call => {
                let target = op.input(0)?;
                if target.space == AddrSpace::Ram {
                    Some(FlowCategory::DirectFunctionCall {
                        target: target.offset,
                    })
                } else {
                    log::error!("call target in {} space is unresolvable", target.space);
                    Some(FlowCategory::Error)
                }
            }
            OpCode::CallInd => Some(FlowCategory::IndirectFunctionCall),
            OpCode::Return => Some(FlowCategory::FunctionReturn),
            OpCode::CallOther => Some(FlowCategory::AsyncHyperCall),
            _ => None,
        }
    }

    /// Classifies a sequence whose first transfer is a conditional guard at
    /// `index`.
    ///
    /// Two shapes are recognized: a bare guarded transfer (the guard op's own
    /// target is the taken flow), and a guard that skips over exactly one
    /// real transfer (taken when the guard is false). Everything else fails
    /// closed.
    fn classify_conditional(
        &self,
        ops: &[PcodeOp],
        index: usize,
        fallthrough: u64,
    ) -> Option<FlowCategory> {
        let guard = &ops[index];
        let target = guard.input(0)?;
        let condition = *guard.input(1)?;

        let next_transfer = ops[index + 1..]
            .iter()
            .position(|op| self.is_transfer(op))
            .map(|offset| index + 1 + offset);

        let Some(transfer_index) = next_transfer else {
            // The guarded flow is the conditional op itself.
            return match target.space {
                AddrSpace::Ram => Some(FlowCategory::Conditional {
                    taken: TakenBranch::DirectJump {
                        target: target.offset,
                    },
                    condition: BranchTakenVar {
                        condition,
                        op_index: index,
                        negated: false,
                    },
                }),
                _ => {
                    log::error!(
                        "conditional branch target in {} space is unresolvable",
                        target.space
                    );
                    Some(FlowCategory::Error)
                }
            };
        };

        if self.has_transfer(&ops[transfer_index + 1..]) {
            log::error!("multiple transfers behind one conditional guard");
            return None;
        }

        // The guard must demonstrably skip over the transfer, either by
        // jumping to the fallthrough address or by a micro-op-relative jump
        // landing past it. Relative displacements are signed; a zero or
        // backward hop stays inside the instruction and skips nothing.
        let skips = match target.space {
            AddrSpace::Ram => target.offset == fallthrough,
            AddrSpace::Constant => {
                let displacement = target.offset as i64;
                displacement > 0
                    && usize::try_from(displacement)
                        .ok()
                        .and_then(|hop| index.checked_add(hop))
                        .is_some_and(|landing| landing > transfer_index)
            }
            _ => false,
        };
        if !skips {
            log::error!("unrecognized conditional control flow shape");
            return None;
        }

        let inner =
            self.classify_transfer(&ops[transfer_index], &ops[..transfer_index], fallthrough)?;
        let taken = match inner {
            FlowCategory::DirectJump { target } => TakenBranch::DirectJump { target },
            FlowCategory::IndirectJump => TakenBranch::IndirectJump,
            FlowCategory::DirectFunctionCall { target } => {
                TakenBranch::DirectFunctionCall { target }
            }
            FlowCategory::IndirectFunctionCall => TakenBranch::IndirectFunctionCall,
            FlowCategory::FunctionReturn => TakenBranch::FunctionReturn,
            FlowCategory::AsyncHyperCall => TakenBranch::AsyncHyperCall,
            FlowCategory::Error => return Some(FlowCategory::Error),
            _ => return None,
        };

        Some(FlowCategory::Conditional {
            taken,
            condition: BranchTakenVar {
                condition,
                op_index: index,
                negated: true,
            },
        })
    }

    fn is_transfer(&self, op: &PcodeOp) -> bool {
        match op.opcode {
            OpCode::Branch
            | OpCode::CBranch
            | OpCode::BranchInd
            | OpCode::Call
            | OpCode::CallInd
            | OpCode::Return => true,
            OpCode::CallOther => self.is_hypercall(op),
            _ => false,
        }
    }

    fn has_transfer(&self, ops: &[PcodeOp]) -> bool {
        ops.iter().any(|op| self.is_transfer(op))
    }

    /// Whether a `CallOther` names a registered hypercall user-op.
    fn is_hypercall(&self, op: &PcodeOp) -> bool {
        let Some(selector) = op.input(0) else {
            return false;
        };
        if !selector.is_constant() {
            return false;
        }
        let Ok(index) = usize::try_from(selector.offset) else {
            return false;
        };
        self.user_ops
            .get(index)
            .is_some_and(|name| self.mappings.is_hypercall_op(name))
    }

    fn is_link_register(&self, varnode: &Varnode) -> bool {
        if varnode.space != AddrSpace::Register {
            return false;
        }
        let Some(designated) = self.mappings.engine_link_register() else {
            return false;
        };
        self.registers
            .register_name(varnode)
            .is_some_and(|name| name == designated)
    }
}

/// Whether any micro-op before a transfer saves the fallthrough address,
/// marking the transfer as a function call.
fn writes_return_address(prior: &[PcodeOp], fallthrough: u64) -> bool {
    prior.iter().any(|op| match op.opcode {
        OpCode::Copy => {
            op.output.is_some_and(|out| out.space == AddrSpace::Register)
                && op
                    .input(0)
                    .is_some_and(|value| value.is_constant() && value.offset == fallthrough)
        }
        OpCode::Store => op
            .inputs
            .last()
            .is_some_and(|value| value.is_constant() && value.offset == fallthrough),
        _ => false,
    })
}

/// Whether the sequence writes architectural state (register or memory).
fn writes_state(ops: &[PcodeOp]) -> bool {
    ops.iter().any(|op| {
        matches!(op.opcode, OpCode::Store | OpCode::CallOther)
            || op
                .output
                .is_some_and(|out| matches!(out.space, AddrSpace::Register | AddrSpace::Ram))
    })
}

//! Instruction decoding orchestration and the decoded record.
//!
//! This module drives the whole pipeline for one instruction: reset the
//! engine adapter, collect the micro-op sequence, identify the mnemonic,
//! classify control flow and translate the category into record fields.
//!
//! # Key Types
//! - [`InstructionDecoder`] - the sole public decode entry point
//! - [`Instruction`] - the caller-owned record one decode call populates
//! - [`Category`] - flattened control-flow tag of a record

#[allow(clippy::module_inception)]
mod decoder;
mod instruction;

pub use decoder::InstructionDecoder;
pub use instruction::{Category, Instruction};

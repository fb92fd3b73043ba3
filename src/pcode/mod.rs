//! Micro-operation data model and per-instruction collectors.
//!
//! The decode engine lowers each machine instruction to an ordered sequence of
//! architecture-agnostic micro-operations. This module defines that data model
//! and the sinks that record it during one decode call.
//!
//! # Key Types
//! - [`PcodeOp`] - One elementary micro-operation
//! - [`Varnode`] - An operand: (storage space, offset, size)
//! - [`OpCode`] - The closed micro-operation opcode set
//! - [`PcodeCollector`] - Order-preserving micro-op sink for one decode call
//! - [`MnemonicCollector`] - Assembly sink recording the decoded mnemonic

mod collector;
mod op;

pub use collector::{MnemonicCollector, PcodeCollector};
pub use op::{AddrSpace, OpCode, PcodeOp, Varnode};

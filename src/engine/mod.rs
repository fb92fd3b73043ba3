//! Decode engine abstraction and the single-instruction adapter around it.
//!
//! The generic microcode decode engine is an external, callback-based
//! dependency. This module isolates the rest of the crate from its concrete
//! API shape behind the [`DecodeEngine`] capability trait, and wraps one
//! engine instance in an [`EngineHarness`] that owns the mutable decode state
//! (context variables, loaded spec data, fill-on-demand byte image) for one
//! architecture variant.
//!
//! # Key Types
//! - [`DecodeEngine`] - capability interface a concrete engine binding implements
//! - [`EngineHarness`] - reset-then-decode adapter, one per architecture variant
//! - [`InstructionImage`] - fixed byte window served to the engine on demand
//! - [`SpecStore`] - persisted spec data loaded once at construction
//! - [`EngineError`] - the two distinguished engine-level decode failures

mod harness;
mod image;
mod spec;

pub use harness::{ContextDatabase, EngineHarness};
pub use image::InstructionImage;
pub use spec::{find_spec_file, SpecStore};

use crate::pcode::{OpCode, Varnode};

/// Engine-level decode failure for one instruction.
///
/// Both variants collapse to the same recoverable failure for callers of the
/// adapter; they are kept apart only so the adapter can log them at distinct
/// detail. Whether consumers should eventually distinguish
/// "known-but-unsupported" from "unknown encoding" is an open question, so the
/// collapse is preserved as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine found no encoding matching the supplied bytes.
    #[error("no matching encoding")]
    NoMatchingEncoding,
    /// The engine recognized the encoding but has no micro-op semantics for
    /// it. Classification relies on those semantics, so this is a decode
    /// failure too.
    #[error("encoding recognized but semantics unimplemented")]
    UnimplementedSemantics,
}

/// Result type of one engine invocation; the success value is the decoded
/// instruction length in bytes as reported by the engine.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Callback sink receiving micro-operations while the engine decodes one
/// instruction.
pub trait PcodeSink {
    /// Receives one micro-operation at `address`, with its optional output
    /// operand and input operands in engine order.
    fn dump(&mut self, address: u64, opcode: OpCode, output: Option<Varnode>, inputs: &[Varnode]);
}

/// Callback sink receiving the textual disassembly of one instruction.
pub trait AsmSink {
    /// Receives the mnemonic and operand body decoded at `address`.
    fn dump(&mut self, address: u64, mnemonic: &str, body: &str);
}

/// Resolves operand varnodes to engine register names.
///
/// Split out of [`DecodeEngine`] so the control-flow classifier can take the
/// narrow capability it needs without a full engine in unit tests.
pub trait RegisterNames {
    /// The engine's name for the register a varnode addresses, if it maps
    /// exactly onto one.
    fn register_name(&self, varnode: &Varnode) -> Option<String>;
}

/// Capability interface of the external decode engine.
///
/// A concrete binding implements exactly this set; the rest of the crate
/// never sees the engine's own API shape. Implementations are inherently
/// single-instruction-oriented and stateful: the harness re-initializes them
/// from the spec store before every decode attempt.
pub trait DecodeEngine: RegisterNames {
    /// (Re-)initializes engine state from persisted spec data.
    fn initialize(&mut self, store: &SpecStore) -> crate::Result<()>;

    /// Decodes exactly one instruction at `address`, emitting its micro-ops
    /// into `sink` and returning the consumed length in bytes. Bytes are
    /// obtained by probing `image`; `ctx` supplies context-variable values.
    fn decode(
        &mut self,
        image: &InstructionImage,
        ctx: &ContextDatabase,
        address: u64,
        sink: &mut dyn PcodeSink,
    ) -> EngineResult<u32>;

    /// Decodes exactly one instruction at `address` for identification only,
    /// emitting its textual form into `sink` and returning the consumed
    /// length in bytes.
    fn disassemble(
        &mut self,
        image: &InstructionImage,
        ctx: &ContextDatabase,
        address: u64,
        sink: &mut dyn AsmSink,
    ) -> EngineResult<u32>;

    /// The engine's user-defined operation names, indexed by the constant
    /// carried in a `CallOther` micro-op.
    fn user_op_names(&self) -> Vec<String>;
}

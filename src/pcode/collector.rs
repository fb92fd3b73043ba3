//! Per-decode-call sinks recording what the engine emits.

use crate::{
    engine::{AsmSink, PcodeSink},
    pcode::{OpCode, PcodeOp, Varnode},
};

/// Pure recorder for the micro-operation sequence of one decode call.
///
/// Appends every dumped operation in exact emission order; performs no
/// interpretation and never touches engine state. A fresh collector is used
/// for every decode call.
#[derive(Debug, Default)]
pub struct PcodeCollector {
    ops: Vec<PcodeOp>,
}

impl PcodeCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected micro-operations, in emission order.
    pub fn ops(&self) -> &[PcodeOp] {
        &self.ops
    }

    /// Consumes the collector and returns ownership of the sequence.
    pub fn into_ops(self) -> Vec<PcodeOp> {
        self.ops
    }
}

impl PcodeSink for PcodeCollector {
    fn dump(&mut self, _address: u64, opcode: OpCode, output: Option<Varnode>, inputs: &[Varnode]) {
        self.ops.push(PcodeOp::new(opcode, output, inputs.to_vec()));
    }
}

/// Assembly sink keeping only the mnemonic of the decoded instruction.
///
/// Used for the second, mnemonic-only decode pass; the operand body is
/// discarded since it plays no role in classification.
#[derive(Debug, Default)]
pub struct MnemonicCollector {
    mnemonic: Option<String>,
}

impl MnemonicCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded mnemonic, if a line was dumped.
    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref()
    }

    /// Consumes the collector and returns the mnemonic.
    pub fn into_mnemonic(self) -> Option<String> {
        self.mnemonic
    }
}

impl AsmSink for MnemonicCollector {
    fn dump(&mut self, _address: u64, mnemonic: &str, _body: &str) {
        self.mnemonic = Some(mnemonic.to_string());
    }
}

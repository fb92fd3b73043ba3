//! Single-instruction adapter owning the mutable engine state.

use std::collections::HashMap;

use crate::{
    arch::{construction_lock, ArchId},
    engine::{AsmSink, DecodeEngine, EngineError, EngineResult, InstructionImage, PcodeSink, SpecStore},
    Error, Result,
};

/// Context-variable database the engine consults while decoding.
///
/// Rebuilt from the spec store on every reset; the decoder then overlays the
/// values mapped from the caller's decoding context.
#[derive(Debug, Default)]
pub struct ContextDatabase {
    variables: HashMap<String, u64>,
}

impl ContextDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default value of one context variable.
    pub fn set_variable_default(&mut self, name: &str, value: u64) {
        self.variables.insert(name.to_string(), value);
    }

    /// Current value of a context variable, if set.
    pub fn variable(&self, name: &str) -> Option<u64> {
        self.variables.get(name).copied()
    }
}

/// Owns one decode engine instance together with its byte image, context
/// database and spec store, and drives it one instruction at a time.
///
/// The engine is inherently stateful, so [`EngineHarness::reset_context`] must
/// run before every decode attempt; it is cheap and reinitializes the full
/// state from the persisted spec data. A harness must not be shared across
/// threads mid-decode: reset-then-decode mutates the image and context
/// non-atomically. Callers wanting parallel decoding use one harness per
/// worker.
#[derive(Debug)]
pub struct EngineHarness<E> {
    arch: ArchId,
    engine: E,
    image: InstructionImage,
    ctx: ContextDatabase,
    store: SpecStore,
}

impl<E: DecodeEngine> EngineHarness<E> {
    /// Constructs the harness for one architecture variant.
    ///
    /// Loads the spec store and initializes the engine under the process-wide
    /// construction lock for `arch`, since the underlying spec loading is
    /// unsafe under concurrent initialization across variants. The lock is
    /// held only for the duration of this call.
    pub fn new(arch: ArchId, sla_name: &str, pspec_name: &str, engine: E) -> Result<Self> {
        let lock = construction_lock(arch);
        let _guard = lock.lock().map_err(|_| Error::LockError)?;

        let store = SpecStore::load(sla_name, pspec_name)?;
        let mut harness = Self {
            arch,
            engine,
            image: InstructionImage::new(),
            ctx: ContextDatabase::new(),
            store,
        };
        harness.restore_from_store()?;
        Ok(harness)
    }

    /// Reinitializes the full engine state from the persisted spec data.
    ///
    /// Mandatory before every single-instruction decode attempt.
    pub fn reset_context(&mut self) -> Result<()> {
        self.restore_from_store()
    }

    fn restore_from_store(&mut self) -> Result<()> {
        self.ctx = ContextDatabase::new();
        self.engine.initialize(&self.store)?;
        for (name, value) in self.store.context_defaults() {
            self.ctx.set_variable_default(name, *value);
        }
        Ok(())
    }

    /// Overrides one context variable for the next decode attempt.
    pub fn set_context_variable(&mut self, name: &str, value: u64) {
        self.ctx.set_variable_default(name, value);
    }

    /// Decodes one instruction at `address`, emitting micro-ops into `sink`.
    ///
    /// Returns the decoded length only when the engine reports a length
    /// within `(0, bytes.len()]`; every engine failure and out-of-window
    /// length report collapses to `None`, logged at distinct detail.
    pub fn one_instruction(
        &mut self,
        address: u64,
        sink: &mut dyn PcodeSink,
        bytes: &[u8],
    ) -> Option<usize> {
        self.image.set_instruction(address, bytes);
        let result = self.engine.decode(&self.image, &self.ctx, address, sink);
        Self::check_length(address, bytes, result)
    }

    /// Decodes one instruction at `address` for identification only, emitting
    /// its textual form into `sink`. Same length and failure rules as
    /// [`EngineHarness::one_instruction`].
    pub fn one_instruction_asm(
        &mut self,
        address: u64,
        sink: &mut dyn AsmSink,
        bytes: &[u8],
    ) -> Option<usize> {
        self.image.set_instruction(address, bytes);
        let result = self.engine.disassemble(&self.image, &self.ctx, address, sink);
        Self::check_length(address, bytes, result)
    }

    fn check_length(address: u64, bytes: &[u8], result: EngineResult<u32>) -> Option<usize> {
        match result {
            Ok(length) => {
                let length = length as usize;
                if length == 0 || length > bytes.len() {
                    // Guards against out-of-bounds reads reported as success.
                    log::error!(
                        "engine reported length {} outside the {}-byte window at {:#x}",
                        length,
                        bytes.len(),
                        address
                    );
                    None
                } else {
                    Some(length)
                }
            }
            Err(EngineError::NoMatchingEncoding) => {
                log::debug!("no matching encoding at {:#x}", address);
                None
            }
            Err(EngineError::UnimplementedSemantics) => {
                log::warn!(
                    "recognized encoding without semantics at {:#x}: {}",
                    address,
                    hex_bytes(bytes)
                );
                None
            }
        }
    }

    /// The engine's user-defined operation names.
    pub fn user_op_names(&self) -> Vec<String> {
        self.engine.user_op_names()
    }

    /// Immutable access to the wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The architecture identity this harness was constructed for.
    pub fn arch(&self) -> ArchId {
        self.arch
    }

    /// The persisted spec data backing resets.
    pub fn store(&self) -> &SpecStore {
        &self.store
    }

    /// Current context-variable value, if set.
    pub fn context_variable(&self, name: &str) -> Option<u64> {
        self.ctx.variable(name)
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

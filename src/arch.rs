//! Architecture identity, decoding context, and construction-time locking.
//!
//! This module holds the small amount of architecture-facing state the decoding
//! pipeline needs without knowing anything about a concrete instruction set:
//!
//! - [`ArchId`] - identity of one architecture variant, used to key the
//!   process-wide construction lock registry
//! - [`DecodingContext`] - submode state threaded through one decode call
//! - [`RegisterMappings`] - the fixed per-decoder translation tables between
//!   lifted-state register names and decode-engine names
//! - [`IntrinsicTable`] - the opaque intrinsic handle installed by the
//!   architecture front-end before the first lifter use

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, OnceLock},
};

use dashmap::DashMap;

/// Identity of one architecture variant handled by a decoder instance.
///
/// Spec loading inside the underlying decode engine is not safe under
/// concurrent initialization, so construction of decoders is serialized
/// per identity via [`construction_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumCount, strum::EnumIter)]
pub enum ArchId {
    /// 32-bit x86
    X86,
    /// 64-bit x86
    Amd64,
    /// 32-bit ARM
    AArch32,
    /// Thumb2 submode of 32-bit ARM
    Thumb2,
    /// 64-bit ARM
    AArch64,
    /// 32-bit SPARC
    Sparc32,
    /// 64-bit SPARC
    Sparc64,
    /// 32-bit PowerPC
    PowerPc,
}

/// Process-wide registry of per-identity construction locks.
///
/// Initialized once on first use; entries are created lazily per identity and
/// live for the remainder of the process.
static CONSTRUCTION_LOCKS: OnceLock<DashMap<ArchId, Arc<Mutex<()>>>> = OnceLock::new();

/// Returns the process-wide construction lock for one architecture identity.
///
/// The lock must be held only for the duration of decoder construction (spec
/// file loading and engine initialization); decode calls themselves are never
/// guarded by it.
pub fn construction_lock(arch: ArchId) -> Arc<Mutex<()>> {
    let registry = CONSTRUCTION_LOCKS.get_or_init(DashMap::new);
    registry
        .entry(arch)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Architecture submode state threaded through a single decode call.
///
/// A context carries named context-register values (for example an
/// instruction-width mode bit) that affect how the engine decodes the
/// supplied bytes. It is immutable within one decode call; the
/// architecture front-end evolves it across calls.
///
/// # Example
///
/// ```rust
/// use microlift::DecodingContext;
///
/// let context = DecodingContext::new().with_value("ISAMode", 1);
/// assert_eq!(context.value("ISAMode"), Some(1));
/// assert_eq!(context.value("Other"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodingContext {
    values: HashMap<String, u64>,
}

impl DecodingContext {
    /// Creates an empty context with no submode state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this context with `register` set to `value`.
    #[must_use]
    pub fn with_value(mut self, register: &str, value: u64) -> Self {
        self.values.insert(register.to_string(), value);
        self
    }

    /// Looks up the value of a context register, if present.
    pub fn value(&self, register: &str) -> Option<u64> {
        self.values.get(register).copied()
    }
}

/// Fixed per-decoder translation tables between the lifted state model and the
/// decode engine's naming.
///
/// Built once at decoder construction and never modified afterwards:
///
/// - `context_registers` maps context-register names (as they appear in a
///   [`DecodingContext`]) to engine context-variable names.
/// - `state_registers` maps lifted-state register names to engine register
///   names.
/// - `link_register` designates the lifted-state register holding return
///   addresses; an indirect transfer sourced from it classifies as a function
///   return.
/// - `hypercall_ops` names the engine user-ops that mark asynchronous
///   hypercalls (software interrupts and the like).
#[derive(Debug, Clone, Default)]
pub struct RegisterMappings {
    context_registers: HashMap<String, String>,
    state_registers: HashMap<String, String>,
    link_register: Option<String>,
    hypercall_ops: HashSet<String>,
}

impl RegisterMappings {
    /// Creates an empty mapping set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a context-register name to an engine context-variable name.
    #[must_use]
    pub fn context_register(mut self, state_name: &str, engine_name: &str) -> Self {
        self.context_registers
            .insert(state_name.to_string(), engine_name.to_string());
        self
    }

    /// Maps a lifted-state register name to an engine register name.
    #[must_use]
    pub fn state_register(mut self, state_name: &str, engine_name: &str) -> Self {
        self.state_registers
            .insert(state_name.to_string(), engine_name.to_string());
        self
    }

    /// Designates the lifted-state register that holds return addresses.
    #[must_use]
    pub fn link_register(mut self, state_name: &str) -> Self {
        self.link_register = Some(state_name.to_string());
        self
    }

    /// Registers an engine user-op name as an asynchronous hypercall marker.
    #[must_use]
    pub fn hypercall_op(mut self, user_op: &str) -> Self {
        self.hypercall_ops.insert(user_op.to_string());
        self
    }

    /// The context-register name table.
    pub fn context_registers(&self) -> &HashMap<String, String> {
        &self.context_registers
    }

    /// The state-register name table.
    pub fn state_registers(&self) -> &HashMap<String, String> {
        &self.state_registers
    }

    /// The engine-side name of the designated link register, if any.
    ///
    /// The designation is given as a lifted-state name; this resolves it
    /// through the state-register table, falling back to the name itself when
    /// no remapping exists.
    pub fn engine_link_register(&self) -> Option<&str> {
        let name = self.link_register.as_deref()?;
        Some(
            self.state_registers
                .get(name)
                .map(String::as_str)
                .unwrap_or(name),
        )
    }

    /// Whether `user_op` is a registered hypercall marker.
    pub fn is_hypercall_op(&self, user_op: &str) -> bool {
        self.hypercall_ops.contains(user_op)
    }
}

/// Opaque handle to the architecture's intrinsic table.
///
/// Supplied by the architecture front-end before the first lifter use. The
/// decoding pipeline never interprets it; it is carried into the semantic
/// lifter handle unchanged.
#[derive(Debug, Default)]
pub struct IntrinsicTable {
    names: Vec<String>,
}

impl IntrinsicTable {
    /// Creates a table from the front-end's intrinsic names.
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// The intrinsic names known to the front-end.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether the table knows an intrinsic of the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

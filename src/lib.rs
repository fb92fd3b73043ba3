// Copyright 2025 the microlift developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![allow(dead_code)]

//! # microlift
//!
//! Architecture-neutral machine code decoding and control-flow classification
//! for IR lifting.
//!
//! `microlift` is the front half of a binary-to-IR lifter: it feeds raw
//! machine-code bytes to a generic microcode decode engine, records the
//! micro-operation sequence the engine emits for one instruction, and derives
//! a typed control-flow category (call vs. return vs. indirect jump vs.
//! conditional branch, and so on) that downstream code generation can trust
//! unconditionally. The engine itself is external and callback-based; this
//! crate isolates it behind the [`engine::DecodeEngine`] capability trait and
//! reconciles its low-level register/memory micro-operations with the
//! high-level control-flow semantics a lifter needs.
//!
//! ## Pipeline
//!
//! One call to [`decoder::InstructionDecoder::decode_instruction`] runs, in
//! order:
//!
//! 1. a full engine state reset from the persisted spec data, plus the
//!    translation of the caller's [`DecodingContext`] into engine context
//!    variables;
//! 2. a micro-op decode pass through a [`pcode::PcodeCollector`], with strict
//!    length validation against the supplied byte window;
//! 3. truncation of the record's byte span to the decoded length;
//! 4. a second, mnemonic-only pass over the truncated bytes for
//!    identification;
//! 5. control-flow classification over the micro-op sequence
//!    ([`flow::ControlFlowAnalysis`]);
//! 6. translation of the category into record fields;
//! 7. attachment of the lazily built semantic-lifter handle.
//!
//! ## Error Policy
//!
//! Failures tied to the input bytes (engine rejection, out-of-window length
//! reports, unresolvable control flow) are recoverable [`Err`] values and the
//! record is marked [`decoder::Category::Invalid`]; callers treat them as
//! "cannot lift this address". Configuration defects (missing spec files, a
//! lifter requested before the intrinsic table is installed) panic, since
//! they indicate a broken deployment rather than a property of the input.
//!
//! ## Concurrency
//!
//! A decoder instance is strictly sequential: reset-then-decode mutates the
//! shared engine state non-atomically. Decoding in parallel means one decoder
//! per worker. Construction is serialized per architecture identity through a
//! process-wide lock registry, because spec loading in the engine is unsafe
//! under concurrent initialization.
//!
//! ## Example
//!
//! ```rust
//! use microlift::{DecodingContext, RegisterMappings};
//!
//! // Fixed per-decoder tables, built once at construction.
//! let mappings = RegisterMappings::new()
//!     .context_register("ISAMode", "TMode")
//!     .state_register("LR", "lr")
//!     .link_register("LR")
//!     .hypercall_op("software_interrupt");
//!
//! // Submode state threaded through one decode call.
//! let context = DecodingContext::new().with_value("ISAMode", 1);
//! assert_eq!(context.value("ISAMode"), Some(1));
//! assert_eq!(mappings.engine_link_register(), Some("lr"));
//! ```

#[macro_use]
pub(crate) mod error;

/// Architecture identity, decoding context and construction-time locking.
pub mod arch;

/// Instruction decoding orchestration and the decoded record.
pub mod decoder;

/// Decode engine abstraction and the single-instruction adapter around it.
pub mod engine;

/// Typed control-flow categories and their derivation.
pub mod flow;

/// Lazily constructed semantic-lifter handles.
pub mod lifter;

/// Micro-operation data model and per-instruction collectors.
pub mod pcode;

/// `microlift` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`]. Used consistently throughout the crate for all fallible
/// operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `microlift` Error type
///
/// The main error type for all operations in this crate. Its documentation
/// describes the split between recoverable and fatal failures.
pub use error::Error;

/// The sole public decode entry point.
///
/// See [`decoder::InstructionDecoder`] for the full pipeline description.
pub use decoder::InstructionDecoder;

/// The caller-owned record populated by one decode call.
pub use decoder::{Category, Instruction};

/// Architecture-facing configuration types.
pub use arch::{ArchId, DecodingContext, IntrinsicTable, RegisterMappings};

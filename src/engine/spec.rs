//! Spec-file resolution and persisted spec data.
//!
//! Each architecture variant is described by a pair of declarative spec files:
//! the sla document (encoding and semantics rules, consumed opaquely by the
//! engine) and the pspec document (processor defaults, of which only the
//! `context_data` element matters here). Both are loaded exactly once at
//! decoder construction.

use std::path::{Path, PathBuf};

use quick_xml::{events::Event, Reader};

use crate::Result;

/// Environment variable holding additional spec search directories, in the
/// platform's path-list format.
pub const SPEC_PATH_ENV: &str = "MICROLIFT_SPEC_PATH";

/// Built-in directories searched after the environment paths.
const DEFAULT_SPEC_DIRS: &[&str] = &["specs", "/usr/share/microlift/specs"];

/// Resolves a spec name to a filesystem path.
///
/// A name that is already a path to an existing file resolves to itself;
/// otherwise the directories named by [`SPEC_PATH_ENV`] are searched in
/// order, then the built-in directories. Returns `None` when the name cannot
/// be resolved anywhere.
pub fn find_spec_file(name: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.is_file() {
        return Some(direct.to_path_buf());
    }

    if let Ok(paths) = std::env::var(SPEC_PATH_ENV) {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    for dir in DEFAULT_SPEC_DIRS {
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}

/// Persisted spec data for one architecture variant.
///
/// Holds the raw sla document for engine (re-)initialization and the context
/// defaults extracted from the pspec's `context_data` element. Loaded once at
/// decoder construction; read-only afterwards.
#[derive(Debug)]
pub struct SpecStore {
    sla_path: PathBuf,
    pspec_path: PathBuf,
    sla_data: Vec<u8>,
    context_defaults: Vec<(String, u64)>,
}

impl SpecStore {
    /// Loads both spec documents.
    ///
    /// # Panics
    ///
    /// Panics when either name cannot be resolved to a file. A missing spec
    /// file is a deployment defect, not a property of any input, so it
    /// terminates rather than surfacing as a recoverable error.
    pub fn load(sla_name: &str, pspec_name: &str) -> Result<Self> {
        let Some(sla_path) = find_spec_file(sla_name) else {
            panic!("couldn't find required spec file: {sla_name}");
        };
        log::info!("using spec at: {}", sla_path.display());

        let Some(pspec_path) = find_spec_file(pspec_name) else {
            panic!("couldn't find required spec file: {pspec_name}");
        };
        log::info!("using pspec at: {}", pspec_path.display());

        let sla_data = std::fs::read(&sla_path)?;
        let pspec_text = std::fs::read_to_string(&pspec_path)?;
        let context_defaults = parse_context_data(&pspec_text)?;

        Ok(Self {
            sla_path,
            pspec_path,
            sla_data,
            context_defaults,
        })
    }

    /// Path the sla document was loaded from.
    pub fn sla_path(&self) -> &Path {
        &self.sla_path
    }

    /// Path the pspec document was loaded from.
    pub fn pspec_path(&self) -> &Path {
        &self.pspec_path
    }

    /// The raw sla document, consumed opaquely by the engine.
    pub fn sla_data(&self) -> &[u8] {
        &self.sla_data
    }

    /// Context-variable defaults from the pspec `context_data` element, in
    /// document order.
    pub fn context_defaults(&self) -> &[(String, u64)] {
        &self.context_defaults
    }
}

/// Extracts `(name, value)` pairs from `<context_data>` `<set>` elements.
fn parse_context_data(xml: &str) -> Result<Vec<(String, u64)>> {
    let mut reader = Reader::from_str(xml);
    let mut defaults = Vec::new();
    let mut in_context_data = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed_error!("Invalid pspec document: {}", e))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if e.name().as_ref() == b"context_data" {
                    in_context_data = true;
                } else if in_context_data && e.name().as_ref() == b"set" {
                    let mut name = None;
                    let mut value = None;

                    for attr in e.attributes() {
                        let attr = attr
                            .map_err(|e| malformed_error!("Invalid pspec attribute: {}", e))?;
                        match attr.key.as_ref() {
                            b"name" => {
                                name = Some(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                            b"val" => {
                                let raw = String::from_utf8_lossy(&attr.value);
                                value = Some(parse_number(&raw)?);
                            }
                            _ => {}
                        }
                    }

                    if let (Some(name), Some(value)) = (name, value) {
                        defaults.push((name, value));
                    }
                }
            }
            Event::End(ref e) => {
                if e.name().as_ref() == b"context_data" {
                    in_context_data = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(defaults)
}

fn parse_number(raw: &str) -> Result<u64> {
    let parsed = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        raw.parse()
    };

    parsed.map_err(|_| malformed_error!("Invalid context value in pspec: {}", raw))
}

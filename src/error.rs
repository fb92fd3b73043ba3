use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors are split along the policy described in the crate documentation: failures that are a
/// property of the input bytes are recoverable `Err` values, while configuration and invariant
/// defects (missing spec files, a lifter requested before the intrinsic table is installed) are
/// treated as fatal and panic instead of appearing here.
///
/// # Error Categories
///
/// ## Decode Failures (input-tied, recoverable)
/// - [`Error::Undecodable`] - The decode engine rejected the byte span
/// - [`Error::UnresolvedControlFlow`] - Bytes decoded, but no control-flow category could be derived
///
/// ## Spec Data Errors
/// - [`Error::Malformed`] - Corrupted or invalid spec document content
/// - [`Error::FileError`] - Filesystem I/O errors while loading spec files
///
/// ## Synchronization
/// - [`Error::LockError`] - Construction lock acquisition failure
#[derive(Error, Debug)]
pub enum Error {
    /// The spec data is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while reading spec files
    /// from disk at decoder construction.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The decode engine could not produce an instruction for the given bytes.
    ///
    /// This collapses the two engine-level failure modes (no matching encoding,
    /// and recognized encoding without implemented semantics) as well as
    /// out-of-window length reports into a single recoverable failure. The
    /// distinct causes are logged at the adapter for diagnosis. Callers treat
    /// this as "cannot lift this address".
    #[error("The decode engine rejected the byte span")]
    Undecodable,

    /// The bytes decoded, but the control-flow category could not be determined.
    ///
    /// Downstream code generation trusts the category unconditionally, so any
    /// ambiguity in the micro-op sequence fails the whole decode rather than
    /// guessing. The instruction record is marked `Invalid`.
    #[error("Control flow of the decoded instruction could not be resolved")]
    UnresolvedControlFlow,

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically when the
    /// per-architecture construction lock is poisoned.
    #[error("Failed to lock target")]
    LockError,
}

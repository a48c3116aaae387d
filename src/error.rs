use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

use crate::ir::BlockId;

macro_rules! invariant_error {
    // Single string version
    ($instruction:expr, $msg:expr) => {
        crate::Error::FoldInvariant {
            message: $msg.to_string(),
            instruction: $instruction,
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($instruction:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::FoldInvariant {
            message: format!($fmt, $($arg)*),
            instruction: $instruction,
            file: file!(),
            line: line!(),
        }
    };
}

/// Short, stable classification of a reconstruction failure.
///
/// The textual form of each tag is what batch drivers and reports key on, so it
/// never changes between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum DiagnosticTag {
    /// A fold rule matched its operand shapes but the consumed-register
    /// bookkeeping disagreed with the source operations.
    #[strum(serialize = "fold-invariant-violation")]
    FoldInvariantViolation,
    /// A control region did not have the branch layout its kind requires.
    #[strum(serialize = "unrecognized-branch-shape")]
    UnrecognizedBranchShape,
    /// The function handed over by the lifter is inconsistent.
    #[strum(serialize = "malformed-input")]
    MalformedInput,
    /// A node or block handle did not resolve.
    #[strum(serialize = "invalid-handle")]
    InvalidHandle,
    /// Region nesting exceeded the configured depth.
    #[strum(serialize = "recursion-limit")]
    RecursionLimit,
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::FoldInvariant`] - A fold matched but its register bookkeeping was inconsistent
/// - [`Error::UnrecognizedBranchShape`] - A control region could not be structured
///
/// ## Input Errors
/// - [`Error::MalformedInput`] - Inconsistent function, block or label data
/// - [`Error::InvalidHandle`] - Dangling arena or block handle
/// - [`Error::RecursionLimit`] - Region nesting too deep
///
/// ## Function-Scoped Errors
/// - [`Error::Reconstruction`] - Any of the above, attributed to one function
///
/// Expected non-matches of idiom recognizers are never reported through this type.
///
/// # Examples
///
/// ```rust,no_run
/// use formscope::{DiagnosticTag, Error};
///
/// fn report(err: &Error) {
///     match err {
///         Error::Reconstruction { function, instruction, tag, message } => {
///             eprintln!("{function}@{instruction}: {tag}: {message}");
///         }
///         other => eprintln!("{} ({})", other, other.tag()),
///     }
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A fold rule matched but the consumed-register bookkeeping is inconsistent.
    ///
    /// # Fields
    ///
    /// * `message` - What was inconsistent
    /// * `instruction` - Index of the instruction whose fold failed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Fold invariant violated at instruction {instruction} - {file}:{line}: {message}")]
    FoldInvariant {
        /// The message to be printed for the FoldInvariant error
        message: String,
        /// Instruction index the fold was working on
        instruction: usize,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A control region does not have the branch layout its kind requires.
    #[error("Unrecognized branch shape in block {block}: {message}")]
    UnrecognizedBranchShape {
        /// The block whose terminator did not fit
        block: BlockId,
        /// Index of the offending instruction (the block start if there is none)
        instruction: usize,
        /// Description of the mismatch
        message: String,
    },

    /// The function supplied by the lifter is inconsistent.
    #[error("Malformed input - {0}")]
    MalformedInput(String),

    /// A handle did not resolve to a live arena slot or block.
    #[error("Invalid handle - {0}")]
    InvalidHandle(String),

    /// Region nesting went deeper than the configured limit.
    #[error("Reached the maximum region depth allowed - {0}")]
    RecursionLimit(usize),

    /// A failure attributed to a single function.
    ///
    /// Produced by the reconstruction engine around any of the other variants,
    /// so that a batch driver can tell which function to skip or retry.
    #[error("{function}@{instruction}: {tag} - {message}")]
    Reconstruction {
        /// Name of the function being reconstructed
        function: String,
        /// Index of the failing instruction
        instruction: usize,
        /// Short diagnostic tag
        tag: DiagnosticTag,
        /// Full description of the underlying failure
        message: String,
    },
}

impl Error {
    /// Returns the diagnostic tag classifying this error.
    #[must_use]
    pub fn tag(&self) -> DiagnosticTag {
        match self {
            Error::FoldInvariant { .. } => DiagnosticTag::FoldInvariantViolation,
            Error::UnrecognizedBranchShape { .. } => DiagnosticTag::UnrecognizedBranchShape,
            Error::MalformedInput(_) => DiagnosticTag::MalformedInput,
            Error::InvalidHandle(_) => DiagnosticTag::InvalidHandle,
            Error::RecursionLimit(_) => DiagnosticTag::RecursionLimit,
            Error::Reconstruction { tag, .. } => *tag,
        }
    }

    /// Returns the instruction index the error refers to, if it carries one.
    #[must_use]
    pub fn instruction(&self) -> Option<usize> {
        match self {
            Error::FoldInvariant { instruction, .. }
            | Error::UnrecognizedBranchShape { instruction, .. }
            | Error::Reconstruction { instruction, .. } => Some(*instruction),
            _ => None,
        }
    }

    /// Attributes this error to `function`.
    ///
    /// Errors that are already function-scoped are returned unchanged. Errors
    /// without an instruction index are attributed to instruction 0.
    #[must_use]
    pub fn in_function(self, function: &str) -> Error {
        if let Error::Reconstruction { .. } = self {
            return self;
        }

        Error::Reconstruction {
            function: function.to_string(),
            instruction: self.instruction().unwrap_or(0),
            tag: self.tag(),
            message: self.to_string(),
        }
    }
}

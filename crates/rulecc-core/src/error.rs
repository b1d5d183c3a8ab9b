//! Error types for the rule compiler
//!
//! ARCHITECTURE: Using thiserror for ergonomic error handling, exactly as
//! the reference library's `SkimError`. All library functions return
//! `Result<T, CompileError>`. No panics in non-test code (enforced by
//! clippy lints in Cargo.toml).

use thiserror::Error;

/// Error types for compilation.
///
/// Each variant already carries whatever source context (expression text,
/// tree path) was available at the point the error was raised; callers
/// should not need to layer on additional context.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// A function signature didn't match `name` or `name(params)`.
    #[error("invalid function signature: {0:?}")]
    InvalidSignature(String),

    /// Could not parse an expression as the JS subset.
    #[error("{message} in {expression:?}")]
    Syntax { message: String, expression: String },

    /// An identifier, function, or ref name could not be resolved.
    #[error("{message} in {expression:?}")]
    UnknownReference { message: String, expression: String },

    /// Mutual or direct recursion among user-defined functions.
    #[error("recursion detected among functions: {0}")]
    Recursion(String),

    /// A call's argument count didn't match the callee's parameter count.
    #[error("argument count mismatch for {name}: expected {expected}, got {got} in {expression:?}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
        expression: String,
    },

    /// A structural rule (wildcard count, keyword placement, etc.) was violated.
    #[error("{message} (at {path})")]
    Structure { message: String, path: String },

    /// `env[...]` was indexed with a non-literal key.
    #[error("env[] requires a literal string key in {expression:?}")]
    NonLiteralEnvKey { expression: String },

    /// Rule-tree or expression nesting exceeded the safety limit.
    #[error("{message}")]
    DepthExceeded { message: String },
}

/// Result type alias for compiler operations.
pub type Result<T> = std::result::Result<T, CompileError>;

impl CompileError {
    pub fn structure(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Structure {
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn unknown_reference(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::UnknownReference {
            message: message.into(),
            expression: expression.into(),
        }
    }

    pub fn syntax(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            expression: expression.into(),
        }
    }
}

//! Error types for compiling, formatting and registering definitions.

use thiserror::Error;

/// Errors raised while compiling a definition to text.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A resource was finished with `If` blocks still open
    #[error("{depth} if block(s) left open")]
    UnclosedBlock { depth: usize },

    /// A component has neither a primary output nor a raw template
    #[error("component '{definition}' has no primary output")]
    MissingOutput { definition: String },

    /// The emitted text could not be formatted
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The wrapped manifest could not be written as YAML
    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),
}

/// Errors raised by the text formatter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("line {line}: expected '{expected}' but found '{found}'")]
    Unbalanced {
        line: usize,
        found: char,
        expected: char,
    },

    #[error("line {line}: unexpected '{found}' with no open delimiter")]
    UnexpectedClose { line: usize, found: char },

    #[error("line {line}: unterminated string")]
    UnterminatedString { line: usize },

    #[error("{open} delimiter(s) left open at end of input")]
    UnclosedDelimiter { open: usize },
}

/// A run-on / not-run-on conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PlacementError {
    pub message: String,
    pub run_on: String,
    pub not_run_on: String,
}

/// Errors raised by the definition registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("definition '{name}' has invalid placement: {source}")]
    Placement {
        name: String,
        #[source]
        source: PlacementError,
    },

    #[error("{kind} definition '{name}' is already registered")]
    Duplicate { name: String, kind: String },

    #[error("failed to compile definition '{name}': {source}")]
    Compile {
        name: String,
        #[source]
        source: CompileError,
    },

    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),
}

//! Shared types and errors for the ruleview crates.
//!
//! This crate provides the foundational vocabulary used by the analysis core and the CLI:
//! - `RuleViewError`: unified error taxonomy for recoverable failures
//! - `Label`: the identity of a target (`//pkg:name`)
//! - `PackageSpecification`: one entry of a visibility declaration
//! - `Location`: a position in a build file, used to attribute diagnostics

mod label;

pub use label::{Label, PackageSpecification};

use serde::{Deserialize, Serialize};

/// Unified error type for recoverable ruleview failures.
///
/// Programming-contract violations inside analysis are not represented here;
/// they abort the analysis task instead.
#[derive(Debug, thiserror::Error)]
pub enum RuleViewError {
    // === Label Errors ===
    #[error("invalid label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    #[error("invalid package specification '{spec}': {reason}")]
    InvalidPackageSpec { spec: String, reason: String },

    // === Schema Errors ===
    #[error("invalid schema for rule class '{rule_class}': {message}")]
    Schema { rule_class: String, message: String },

    #[error("invalid file type pattern '{pattern}': {message}")]
    FileTypePattern { pattern: String, message: String },

    #[error("invalid value for attribute '{attribute}' of {rule}: {message}")]
    InvalidAttribute {
        rule: String,
        attribute: String,
        message: String,
    },

    // === Loading Errors ===
    #[error("no such package '{package}'")]
    NoSuchPackage { package: String },

    #[error("no such target '{label}'")]
    NoSuchTarget { label: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RuleViewError {
    /// Returns `true` if the error means a target could not be loaded.
    pub fn is_loading_error(&self) -> bool {
        matches!(
            self,
            RuleViewError::NoSuchPackage { .. }
                | RuleViewError::NoSuchTarget { .. }
                | RuleViewError::InvalidAttribute { .. }
        )
    }

    /// Returns `true` if the error originates in a rule-class or file-type declaration.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            RuleViewError::Schema { .. } | RuleViewError::FileTypePattern { .. }
        )
    }
}

/// A convenience alias for `Result<T, RuleViewError>`.
pub type Result<T> = std::result::Result<T, RuleViewError>;

// ---------------------------------------------------------------------------
// Location: a position in a build file
// ---------------------------------------------------------------------------

/// A position in a build file. Lines and columns are 1-based; `0` means unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// A location covering a whole file.
    pub fn file(file: impl Into<String>) -> Self {
        Self::new(file, 0, 0)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (0, _) => write!(f, "{}", self.file),
            (line, 0) => write!(f, "{}:{}", self.file, line),
            (line, column) => write!(f, "{}:{}:{}", self.file, line, column),
        }
    }
}

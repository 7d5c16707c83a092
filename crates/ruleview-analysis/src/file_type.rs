//! File-type predicates used by attribute schemas.
//!
//! A [`FileType`] is either an extension (`.cc`) or a glob over the file's base
//! name (`BUILD`, `lib*.so`). A [`FileTypeSet`] is what an attribute allows.

use std::fmt;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ruleview_types::{Result, RuleViewError};

use crate::artifact::Artifact;

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn compile(pattern: &str) -> Result<Glob> {
    let glob = if pattern.starts_with('.') {
        format!("*{pattern}")
    } else {
        pattern.to_string()
    };
    Glob::new(&glob).map_err(|e| RuleViewError::FileTypePattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// A single file type: an extension such as `.cc` or a base-name glob.
#[derive(Debug, Clone)]
pub struct FileType {
    pattern: String,
    matcher: globset::GlobMatcher,
}

impl FileType {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let matcher = compile(&pattern)?.compile_matcher();
        Ok(Self { pattern, matcher })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Does the base name of `filename` match this type?
    pub fn matches(&self, filename: &str) -> bool {
        self.matcher.is_match(base_name(filename))
    }
}

impl PartialEq for FileType {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for FileType {}

/// The set of file types an attribute admits.
#[derive(Debug, Clone, Default)]
pub enum FileTypeSet {
    #[default]
    Any,
    None,
    Of {
        patterns: Vec<String>,
        set: GlobSet,
    },
}

impl FileTypeSet {
    /// Build a set from extensions (`.cc`) and base-name globs.
    pub fn of<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        if patterns.is_empty() {
            return Ok(Self::None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            builder.add(compile(pattern)?);
        }
        let set = builder.build().map_err(|e| RuleViewError::FileTypePattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;
        Ok(Self::Of { patterns, set })
    }

    pub fn from_types(types: &[FileType]) -> Result<Self> {
        Self::of(types.iter().map(|t| t.pattern().to_string()))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// True when no file at all is admitted.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn matches(&self, filename: &str) -> bool {
        match self {
            Self::Any => true,
            Self::None => false,
            Self::Of { set, .. } => set.is_match(base_name(filename)),
        }
    }

    /// Artifacts whose file name is admitted, in input order.
    pub fn filter<'a>(&'a self, artifacts: &'a [Artifact]) -> impl Iterator<Item = &'a Artifact> + 'a {
        artifacts.iter().filter(move |a| self.matches(a.filename()))
    }
}

impl PartialEq for FileTypeSet {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, Self::Any) | (Self::None, Self::None) => true,
            (Self::Of { patterns: a, .. }, Self::Of { patterns: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for FileTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any file"),
            Self::None => write!(f, "no files"),
            Self::Of { patterns, .. } => write!(f, "{}", patterns.join(" or ")),
        }
    }
}

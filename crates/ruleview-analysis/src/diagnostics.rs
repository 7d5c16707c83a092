//! Diagnostics: accumulated errors and warnings for one analysis unit.
//!
//! Reporting never aborts analysis. The caller inspects [`Diagnostics::has_errors`]
//! once the rule has been analyzed and discards the result if it is set.

use std::cell::RefCell;
use std::fmt;

use ruleview_types::Location;
use serde::Serialize;

use crate::schema::IMPLICIT_MARKER;
use crate::target::Rule;

/// Shown in place of the name of an implicit attribute.
pub const IMPLICIT_DEPENDENCY: &str = "(an implicit dependency)";

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("ERROR"),
            Severity::Warning => f.write_str("WARNING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.location, self.message)
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Append-only diagnostic sink, owned by a single analysis worker.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => {
                tracing::warn!(location = %diagnostic.location, "{}", diagnostic.message)
            }
            Severity::Warning => {
                tracing::debug!(location = %diagnostic.location, "{}", diagnostic.message)
            }
        }
        self.entries.borrow_mut().push(diagnostic);
    }

    pub fn error(&self, location: &Location, message: impl Into<String>) {
        self.report(Diagnostic {
            severity: Severity::Error,
            location: location.clone(),
            message: message.into(),
        });
    }

    pub fn warn(&self, location: &Location, message: impl Into<String>) {
        self.report(Diagnostic {
            severity: Severity::Warning,
            location: location.clone(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// A copy of everything reported so far, in report order.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries.into_inner()
    }
}

// ---------------------------------------------------------------------------
// Rule-scoped reporting
// ---------------------------------------------------------------------------

pub fn mask_attribute_name(name: &str) -> &str {
    if name.starts_with(IMPLICIT_MARKER) {
        IMPLICIT_DEPENDENCY
    } else {
        name
    }
}

pub fn rule_message(rule: &Rule, message: &str) -> String {
    format!("in {} rule {}: {}", rule.rule_class_name(), rule.label(), message)
}

pub fn attribute_message(rule: &Rule, attribute: &str, message: &str) -> String {
    format!(
        "in {} attribute of {} rule {}: {}",
        mask_attribute_name(attribute),
        rule.rule_class_name(),
        rule.label(),
        message
    )
}

/// Anything that reports diagnostics on behalf of one rule.
pub trait RuleErrorConsumer {
    fn rule(&self) -> &Rule;
    fn diagnostics(&self) -> &Diagnostics;

    fn rule_error(&self, message: &str) {
        let rule = self.rule();
        self.diagnostics()
            .error(rule.location(), rule_message(rule, message));
    }

    fn rule_warning(&self, message: &str) {
        let rule = self.rule();
        self.diagnostics()
            .warn(rule.location(), rule_message(rule, message));
    }

    fn attribute_error(&self, attribute: &str, message: &str) {
        let rule = self.rule();
        self.diagnostics().error(
            rule.attribute_location(attribute),
            attribute_message(rule, attribute, message),
        );
    }

    fn attribute_warning(&self, attribute: &str, message: &str) {
        let rule = self.rule();
        self.diagnostics().warn(
            rule.attribute_location(attribute),
            attribute_message(rule, attribute, message),
        );
    }
}

//! "Make" variable expansion in attribute values.
//!
//! `$$` is a literal dollar, `$(NAME)` and the single-character form `$X` are
//! variable references. Values are substituted as-is, without re-expansion.

use std::collections::{BTreeMap, HashMap};

use crate::configuration::Configuration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpansionError {
    #[error("unterminated variable reference")]
    UnterminatedReference,

    #[error("unterminated $")]
    TrailingDollar,

    #[error("$({0}) not defined")]
    Undefined(String),
}

/// Where variable values come from.
pub trait MakeVariableContext {
    fn lookup(&self, name: &str) -> Result<String, ExpansionError>;
}

impl MakeVariableContext for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Result<String, ExpansionError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| ExpansionError::Undefined(name.to_string()))
    }
}

impl MakeVariableContext for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Result<String, ExpansionError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| ExpansionError::Undefined(name.to_string()))
    }
}

/// Variables of a configuration, plus a few that depend on the rule's package.
pub struct ConfigurationMakeVariableContext<'a> {
    package: &'a str,
    configuration: &'a Configuration,
}

impl<'a> ConfigurationMakeVariableContext<'a> {
    pub fn new(package: &'a str, configuration: &'a Configuration) -> Self {
        Self {
            package,
            configuration,
        }
    }
}

impl MakeVariableContext for ConfigurationMakeVariableContext<'_> {
    fn lookup(&self, name: &str) -> Result<String, ExpansionError> {
        if let Some(value) = self.configuration.make_variable(name) {
            return Ok(value.to_string());
        }
        match name {
            "BINDIR" => Ok(self.configuration.bin_directory().exec_path().to_string()),
            "GENDIR" => Ok(self.configuration.genfiles_directory().exec_path().to_string()),
            "PACKAGE" => Ok(self.package.to_string()),
            _ => Err(ExpansionError::Undefined(name.to_string())),
        }
    }
}

/// Expand every variable reference in `expression`.
pub fn expand(expression: &str, context: &dyn MakeVariableContext) -> Result<String, ExpansionError> {
    let mut result = String::with_capacity(expression.len());
    let mut chars = expression.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.next() {
            None => return Err(ExpansionError::TrailingDollar),
            Some((_, '$')) => result.push('$'),
            Some((start, '(')) => {
                let rest = &expression[start + 1..];
                let end = rest.find(')').ok_or(ExpansionError::UnterminatedReference)?;
                let name = &rest[..end];
                result.push_str(&context.lookup(name)?);
                // Skip the name and the closing parenthesis.
                for _ in 0..name.chars().count() + 1 {
                    chars.next();
                }
            }
            Some((_, name)) => {
                result.push_str(&context.lookup(name.encode_utf8(&mut [0; 4]))?);
            }
        }
    }
    Ok(result)
}

/// If `expression` is exactly one variable reference, its value; otherwise `None`.
pub fn expand_single_variable(
    expression: &str,
    context: &dyn MakeVariableContext,
) -> Result<Option<String>, ExpansionError> {
    let Some(rest) = expression.strip_prefix('$') else {
        return Ok(None);
    };
    if let Some(inner) = rest.strip_prefix('(') {
        return match inner.find(')') {
            Some(end) if end + 1 == inner.len() => context.lookup(&inner[..end]).map(Some),
            Some(_) => Ok(None),
            None => Err(ExpansionError::UnterminatedReference),
        };
    }
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Err(ExpansionError::TrailingDollar),
        (Some('$'), _) | (Some(_), Some(_)) => Ok(None),
        (Some(c), None) => context.lookup(c.encode_utf8(&mut [0; 4])).map(Some),
    }
}

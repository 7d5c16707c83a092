//! Rule classes and their attribute definitions.
//!
//! A [`RuleClass`] is built once, validated in [`RuleClassBuilder::build`], and
//! then shared read-only by every rule of that kind.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ruleview_types::{Result, RuleViewError};
use serde::{Deserialize, Serialize};

use crate::file_type::FileTypeSet;
use crate::target::{AttributeValue, Rule};

/// Attribute names starting with this marker are implicit dependencies.
pub const IMPLICIT_MARKER: char = '$';

// ---------------------------------------------------------------------------
// Types, transitions and modes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Label,
    LabelList,
    /// A label that does not create a dependency edge.
    NodepLabel,
    String,
    StringList,
    Bool,
    FilesetEntryList,
}

impl AttributeType {
    /// Does a value of this type create dependency edges?
    pub fn is_dependency(self) -> bool {
        matches!(self, AttributeType::Label | AttributeType::LabelList)
    }

    fn can_transition(self) -> bool {
        self.is_dependency() || self == AttributeType::FilesetEntryList
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttributeType::Label => "label",
            AttributeType::LabelList => "label_list",
            AttributeType::NodepLabel => "nodep_label",
            AttributeType::String => "string",
            AttributeType::StringList => "string_list",
            AttributeType::Bool => "bool",
            AttributeType::FilesetEntryList => "fileset_entry_list",
        };
        f.write_str(s)
    }
}

/// The configuration an attribute's dependencies are analyzed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Same configuration as the depending rule.
    #[default]
    None,
    Host,
    Data,
}

/// The configuration a rule asks for when querying an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Target,
    Host,
    Data,
}

impl Mode {
    pub fn transition(self) -> Transition {
        match self {
            Mode::Target => Transition::None,
            Mode::Host => Transition::Host,
            Mode::Data => Transition::Data,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Target => "target",
            Mode::Host => "host",
            Mode::Data => "data",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Rule class predicates
// ---------------------------------------------------------------------------

/// Which rule classes an attribute accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuleClassSet {
    #[default]
    Any,
    /// Exactly these classes, in declaration order. Empty means no rule at all.
    Only(Vec<String>),
}

impl RuleClassSet {
    pub fn none() -> Self {
        RuleClassSet::Only(Vec::new())
    }

    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleClassSet::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, RuleClassSet::Any)
    }

    pub fn contains(&self, rule_class: &str) -> bool {
        match self {
            RuleClassSet::Any => true,
            RuleClassSet::Only(names) => names.iter().any(|n| n == rule_class),
        }
    }
}

impl fmt::Display for RuleClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleClassSet::Any => f.write_str("any rule"),
            RuleClassSet::Only(names) if names.is_empty() => f.write_str("no rule"),
            RuleClassSet::Only(names) => f.write_str(&names.join(" or ")),
        }
    }
}

/// A custom check between the depending rule and a rule it depends on.
///
/// Returns the reason the edge is invalid, or `None` if it is fine.
pub trait ValidityPredicate: Send + Sync {
    fn check_valid(&self, from: &Rule, to: &Rule) -> Option<String>;
}

impl<F> ValidityPredicate for F
where
    F: Fn(&Rule, &Rule) -> Option<String> + Send + Sync,
{
    fn check_valid(&self, from: &Rule, to: &Rule) -> Option<String> {
        self(from, to)
    }
}

#[derive(Clone)]
struct Validity(Arc<dyn ValidityPredicate>);

impl fmt::Debug for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValidityPredicate")
    }
}

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    ty: AttributeType,
    transition: Transition,
    executable: bool,
    strict: bool,
    single_artifact: bool,
    non_empty: bool,
    silent_rule_class_filter: bool,
    skip_analysis_time_file_type_check: bool,
    allowed_rule_classes: RuleClassSet,
    allowed_rule_classes_with_warning: RuleClassSet,
    allowed_file_types: FileTypeSet,
    validity: Option<Validity>,
    default_value: Option<AttributeValue>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            transition: Transition::None,
            executable: false,
            strict: false,
            single_artifact: false,
            non_empty: false,
            silent_rule_class_filter: false,
            skip_analysis_time_file_type_check: false,
            allowed_rule_classes: RuleClassSet::Any,
            allowed_rule_classes_with_warning: RuleClassSet::none(),
            allowed_file_types: FileTypeSet::Any,
            validity: None,
            default_value: None,
        }
    }

    pub fn cfg(mut self, transition: Transition) -> Self {
        self.transition = transition;
        self
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    /// Turns on rule-class and file-type checking without narrowing either set.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn single_artifact(mut self) -> Self {
        self.single_artifact = true;
        self
    }

    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    /// Drop dependencies whose rule class is not allowed instead of reporting them.
    pub fn silent_rule_class_filter(mut self) -> Self {
        self.silent_rule_class_filter = true;
        self
    }

    pub fn skip_analysis_time_file_type_check(mut self) -> Self {
        self.skip_analysis_time_file_type_check = true;
        self
    }

    pub fn allowed_rule_classes(mut self, classes: RuleClassSet) -> Self {
        self.allowed_rule_classes = classes;
        self.strict = true;
        self
    }

    pub fn allowed_rule_classes_with_warning(mut self, classes: RuleClassSet) -> Self {
        self.allowed_rule_classes_with_warning = classes;
        self.strict = true;
        self
    }

    pub fn allowed_file_types(mut self, types: FileTypeSet) -> Self {
        self.allowed_file_types = types;
        self.strict = true;
        self
    }

    pub fn validity_predicate(mut self, predicate: impl ValidityPredicate + 'static) -> Self {
        self.validity = Some(Validity(Arc::new(predicate)));
        self
    }

    pub fn default_value(mut self, value: AttributeValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> AttributeType {
        self.ty
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn is_implicit(&self) -> bool {
        self.name.starts_with(IMPLICIT_MARKER)
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_single_artifact(&self) -> bool {
        self.single_artifact
    }

    pub fn is_non_empty(&self) -> bool {
        self.non_empty
    }

    pub fn is_silent_rule_class_filter(&self) -> bool {
        self.silent_rule_class_filter
    }

    pub fn skips_analysis_time_file_type_check(&self) -> bool {
        self.skip_analysis_time_file_type_check
    }

    pub fn allowed_rule_class_set(&self) -> &RuleClassSet {
        &self.allowed_rule_classes
    }

    pub fn allowed_rule_class_warning_set(&self) -> &RuleClassSet {
        &self.allowed_rule_classes_with_warning
    }

    pub fn allowed_file_type_set(&self) -> &FileTypeSet {
        &self.allowed_file_types
    }

    pub fn validity(&self) -> Option<&dyn ValidityPredicate> {
        self.validity.as_ref().map(|v| v.0.as_ref())
    }

    pub fn default(&self) -> Option<&AttributeValue> {
        self.default_value.as_ref()
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() || self.name == "$" {
            return Err("attribute with empty name".into());
        }
        let dependency = self.ty.is_dependency();
        let flags = [
            (self.executable, "executable"),
            (self.single_artifact, "single_artifact"),
            (self.non_empty, "non_empty"),
            (self.silent_rule_class_filter, "silent_rule_class_filter"),
            (self.strict, "allowed rule classes or file types"),
        ];
        for (set, flag) in flags {
            if set && !dependency {
                return Err(format!(
                    "attribute '{}' of type {} cannot be {flag}",
                    self.name, self.ty
                ));
            }
        }
        if self.transition != Transition::None && !self.ty.can_transition() {
            return Err(format!(
                "attribute '{}' of type {} cannot have a configuration transition",
                self.name, self.ty
            ));
        }
        if self.silent_rule_class_filter && self.allowed_rule_classes.is_any() {
            return Err(format!(
                "attribute '{}' filters by rule class but allows any rule",
                self.name
            ));
        }
        if let Some(default) = &self.default_value {
            if !default.has_type(self.ty) {
                return Err(format!(
                    "default value of attribute '{}' is not a {}",
                    self.name, self.ty
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RuleClass
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RuleClass {
    name: String,
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
    binary_output: bool,
    mutually_exclusive: Vec<(String, String)>,
}

impl RuleClass {
    pub fn builder(name: impl Into<String>) -> RuleClassBuilder {
        RuleClassBuilder {
            name: name.into(),
            attributes: Vec::new(),
            binary_output: true,
            mutually_exclusive: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.index.get(name).map(|&i| &self.attributes[i])
    }

    /// Is `name` declared with type `ty`?
    pub fn has_attribute(&self, name: &str, ty: AttributeType) -> bool {
        self.attribute(name).is_some_and(|a| a.ty() == ty)
    }

    /// Outputs go to the bin root when true, the genfiles root otherwise.
    pub fn has_binary_output(&self) -> bool {
        self.binary_output
    }

    /// Pairs of attributes of which at most one may be set.
    pub fn mutually_exclusive_attributes(&self) -> &[(String, String)] {
        &self.mutually_exclusive
    }

    pub fn is_test(&self) -> bool {
        self.name.ends_with("_test")
    }
}

pub struct RuleClassBuilder {
    name: String,
    attributes: Vec<Attribute>,
    binary_output: bool,
    mutually_exclusive: Vec<(String, String)>,
}

impl RuleClassBuilder {
    pub fn attr(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn binary_output(mut self, binary_output: bool) -> Self {
        self.binary_output = binary_output;
        self
    }

    pub fn mutually_exclusive(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.mutually_exclusive.push((first.into(), second.into()));
        self
    }

    /// Validate the declaration and freeze it.
    pub fn build(self) -> Result<Arc<RuleClass>> {
        let error = |message: String| RuleViewError::Schema {
            rule_class: self.name.clone(),
            message,
        };
        if self.name.is_empty() {
            return Err(error("rule class has no name".into()));
        }
        let mut index = HashMap::with_capacity(self.attributes.len());
        for (i, attribute) in self.attributes.iter().enumerate() {
            attribute.check().map_err(error)?;
            if index.insert(attribute.name().to_string(), i).is_some() {
                return Err(error(format!("attribute '{}' declared twice", attribute.name())));
            }
        }
        for (first, second) in &self.mutually_exclusive {
            if first == second {
                return Err(error(format!(
                    "attribute '{first}' cannot be exclusive with itself"
                )));
            }
            for name in [first, second] {
                if !index.contains_key(name.as_str()) {
                    return Err(error(format!(
                        "exclusive group names undeclared attribute '{name}'"
                    )));
                }
            }
        }
        Ok(Arc::new(RuleClass {
            name: self.name.clone(),
            attributes: self.attributes,
            index,
            binary_output: self.binary_output,
            mutually_exclusive: self.mutually_exclusive,
        }))
    }
}

//! Loaded targets: rules, input files and output files.
//!
//! Targets are immutable once loaded. Attribute values are checked against the
//! rule class when they are set, so analysis can rely on declared types.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ruleview_types::{Label, Location, PackageSpecification, Result, RuleViewError};

use crate::schema::{AttributeType, RuleClass};

/// Dependency labels of a rule, keyed by attribute name, in declaration order per attribute.
pub type LabelMap = BTreeMap<String, Vec<Label>>;

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// One entry of a fileset: a source tree or an explicit list of files from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesetEntry {
    src_label: Label,
    files: Option<Vec<Label>>,
    destdir: String,
    excludes: Vec<String>,
}

impl FilesetEntry {
    pub fn new(src_label: Label) -> Self {
        Self {
            src_label,
            files: None,
            destdir: String::new(),
            excludes: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<Label>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_destdir(mut self, destdir: impl Into<String>) -> Self {
        self.destdir = destdir.into();
        self
    }

    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn src_label(&self) -> &Label {
        &self.src_label
    }

    pub fn files(&self) -> Option<&[Label]> {
        self.files.as_deref()
    }

    pub fn destdir(&self) -> &str {
        &self.destdir
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    /// An entry rooted at a package's BUILD file copies that package's sources.
    pub fn is_source_fileset(&self) -> bool {
        self.src_label.name() == "BUILD"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Label(Option<Label>),
    LabelList(Vec<Label>),
    NodepLabel(Option<Label>),
    String(String),
    StringList(Vec<String>),
    Bool(bool),
    FilesetEntries(Vec<FilesetEntry>),
}

impl AttributeValue {
    pub fn has_type(&self, ty: AttributeType) -> bool {
        matches!(
            (self, ty),
            (AttributeValue::Label(_), AttributeType::Label)
                | (AttributeValue::LabelList(_), AttributeType::LabelList)
                | (AttributeValue::NodepLabel(_), AttributeType::NodepLabel)
                | (AttributeValue::String(_), AttributeType::String)
                | (AttributeValue::StringList(_), AttributeType::StringList)
                | (AttributeValue::Bool(_), AttributeType::Bool)
                | (AttributeValue::FilesetEntries(_), AttributeType::FilesetEntryList)
        )
    }

    /// Labels that create dependency edges, in declaration order.
    pub fn dependency_labels(&self) -> Vec<Label> {
        match self {
            AttributeValue::Label(Some(label)) => vec![label.clone()],
            AttributeValue::LabelList(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Rule {
    label: Label,
    rule_class: Arc<RuleClass>,
    location: Location,
    values: HashMap<String, AttributeValue>,
    attribute_locations: HashMap<String, Location>,
    outputs: Vec<Label>,
    visibility: Vec<PackageSpecification>,
}

impl Rule {
    pub fn new(label: Label, rule_class: Arc<RuleClass>, location: Location) -> Self {
        Self {
            label,
            rule_class,
            location,
            values: HashMap::new(),
            attribute_locations: HashMap::new(),
            outputs: Vec::new(),
            visibility: Vec::new(),
        }
    }

    /// Set an explicitly specified attribute value.
    pub fn set_attribute(&mut self, name: &str, value: AttributeValue) -> Result<()> {
        let invalid = |message: String| RuleViewError::InvalidAttribute {
            rule: self.label.to_string(),
            attribute: name.to_string(),
            message,
        };
        let Some(attribute) = self.rule_class.attribute(name) else {
            return Err(invalid(format!(
                "no such attribute in {} rule",
                self.rule_class.name()
            )));
        };
        if !value.has_type(attribute.ty()) {
            return Err(invalid(format!("expected a value of type {}", attribute.ty())));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn with_attribute(mut self, name: &str, value: AttributeValue) -> Result<Self> {
        self.set_attribute(name, value)?;
        Ok(self)
    }

    pub fn set_attribute_location(&mut self, name: &str, location: Location) {
        self.attribute_locations.insert(name.to_string(), location);
    }

    pub fn with_outputs(mut self, outputs: Vec<Label>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_visibility(mut self, visibility: Vec<PackageSpecification>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn package(&self) -> &str {
        self.label.package()
    }

    pub fn rule_class(&self) -> &RuleClass {
        &self.rule_class
    }

    pub fn rule_class_name(&self) -> &str {
        self.rule_class.name()
    }

    /// e.g. `cc_library rule`
    pub fn target_kind(&self) -> String {
        format!("{} rule", self.rule_class.name())
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Where `name` was written, falling back to the rule itself.
    pub fn attribute_location(&self, name: &str) -> &Location {
        self.attribute_locations.get(name).unwrap_or(&self.location)
    }

    /// The explicit value of `name`, or its declared default.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values
            .get(name)
            .or_else(|| self.rule_class.attribute(name).and_then(|a| a.default()))
    }

    pub fn is_attribute_value_explicitly_specified(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn label_attr(&self, name: &str) -> Option<&Label> {
        match self.get(name)? {
            AttributeValue::Label(label) | AttributeValue::NodepLabel(label) => label.as_ref(),
            _ => None,
        }
    }

    pub fn label_list_attr(&self, name: &str) -> &[Label] {
        match self.get(name) {
            Some(AttributeValue::LabelList(labels)) => labels,
            _ => &[],
        }
    }

    pub fn string_attr(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn string_list_attr(&self, name: &str) -> &[String] {
        match self.get(name) {
            Some(AttributeValue::StringList(values)) => values,
            _ => &[],
        }
    }

    pub fn bool_attr(&self, name: &str) -> bool {
        matches!(self.get(name), Some(AttributeValue::Bool(true)))
    }

    pub fn fileset_entries_attr(&self, name: &str) -> &[FilesetEntry] {
        match self.get(name) {
            Some(AttributeValue::FilesetEntries(entries)) => entries,
            _ => &[],
        }
    }

    /// Every dependency label of the rule, grouped by attribute.
    pub fn label_map(&self) -> LabelMap {
        self.rule_class
            .attributes()
            .iter()
            .filter(|a| a.ty().is_dependency())
            .filter_map(|a| {
                let labels = self.get(a.name())?.dependency_labels();
                (!labels.is_empty()).then(|| (a.name().to_string(), labels))
            })
            .collect()
    }

    pub fn outputs(&self) -> &[Label] {
        &self.outputs
    }

    pub fn output_files(&self) -> Vec<OutputFile> {
        self.outputs
            .iter()
            .map(|label| OutputFile::new(label.clone(), self.label.clone(), self.location.clone()))
            .collect()
    }

    pub fn visibility(&self) -> &[PackageSpecification] {
        &self.visibility
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    label: Label,
    location: Location,
    exists: bool,
    visibility: Vec<PackageSpecification>,
}

impl InputFile {
    pub fn new(label: Label, location: Location) -> Self {
        Self {
            label,
            location,
            exists: true,
            visibility: vec![PackageSpecification::Everything],
        }
    }

    /// A reference to a file the loader could not find on disk.
    pub fn missing(label: Label, location: Location) -> Self {
        Self {
            exists: false,
            ..Self::new(label, location)
        }
    }

    pub fn with_visibility(mut self, visibility: Vec<PackageSpecification>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn filename(&self) -> &str {
        self.label.name().rsplit('/').next().unwrap_or(self.label.name())
    }

    pub fn visibility(&self) -> &[PackageSpecification] {
        &self.visibility
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    label: Label,
    generating_rule: Label,
    location: Location,
}

impl OutputFile {
    pub fn new(label: Label, generating_rule: Label, location: Location) -> Self {
        Self {
            label,
            generating_rule,
            location,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn generating_rule(&self) -> &Label {
        &self.generating_rule
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn filename(&self) -> &str {
        self.label.name().rsplit('/').next().unwrap_or(self.label.name())
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Target {
    Rule(Arc<Rule>),
    InputFile(InputFile),
    OutputFile(OutputFile),
}

impl Target {
    pub fn label(&self) -> &Label {
        match self {
            Target::Rule(rule) => rule.label(),
            Target::InputFile(file) => file.label(),
            Target::OutputFile(file) => file.label(),
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Target::Rule(rule) => rule.location(),
            Target::InputFile(file) => file.location(),
            Target::OutputFile(file) => file.location(),
        }
    }

    pub fn target_kind(&self) -> String {
        match self {
            Target::Rule(rule) => rule.target_kind(),
            Target::InputFile(_) => "source file".to_string(),
            Target::OutputFile(_) => "generated file".to_string(),
        }
    }

    pub fn as_rule(&self) -> Option<&Rule> {
        match self {
            Target::Rule(rule) => Some(rule.as_ref()),
            _ => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Target::InputFile(_) | Target::OutputFile(_))
    }

    /// Base name of a file target.
    pub fn filename(&self) -> Option<&str> {
        match self {
            Target::Rule(_) => None,
            Target::InputFile(file) => Some(file.filename()),
            Target::OutputFile(file) => Some(file.filename()),
        }
    }
}

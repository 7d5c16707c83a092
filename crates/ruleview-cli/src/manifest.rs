//! JSON workspace manifest: rule classes, configurations and targets.
//!
//! The manifest stands in for a loading phase. It declares every rule class
//! with its attribute schema, the target/host (and optional data)
//! configurations, and every target together with what its analysis provides.

use std::collections::BTreeMap;
use std::sync::Arc;

use ruleview_analysis::{
    AnalysisOptions, Attribute, AttributeType, AttributeValue, Configuration, FileTypeSet, FilesetEntry, RuleClass,
    RuleClassSet, Transition,
};
use ruleview_types::{Label, PackageSpecification, Result, RuleViewError};
use serde::Deserialize;
use serde_json::Value;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub options: AnalysisOptions,
    pub configurations: Configurations,
    #[serde(default)]
    pub rule_classes: Vec<RuleClassSpec>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

impl Manifest {
    pub fn parse(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configurations {
    pub target: Configuration,
    pub host: Configuration,
    #[serde(default)]
    pub data: Option<Configuration>,
}

// ---------------------------------------------------------------------------
// Rule classes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleClassSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub binary_output: bool,
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    #[serde(default)]
    pub mutually_exclusive: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: AttributeType,
    #[serde(default)]
    pub cfg: Transition,
    #[serde(default)]
    pub executable: bool,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub single_artifact: bool,
    #[serde(default)]
    pub non_empty: bool,
    #[serde(default)]
    pub silent_rule_class_filter: bool,
    #[serde(default)]
    pub skip_analysis_time_file_type_check: bool,
    #[serde(default)]
    pub allowed_rule_classes: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_rule_classes_with_warning: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_file_types: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<Value>,
}

impl RuleClassSpec {
    pub fn build(&self) -> Result<Arc<RuleClass>> {
        let mut builder = RuleClass::builder(&self.name).binary_output(self.binary_output);
        for spec in &self.attributes {
            builder = builder.attr(spec.build(&self.name)?);
        }
        for (first, second) in &self.mutually_exclusive {
            builder = builder.mutually_exclusive(first, second);
        }
        builder.build()
    }
}

impl AttributeSpec {
    fn build(&self, rule_class: &str) -> Result<Attribute> {
        let mut attribute = Attribute::new(&self.name, self.ty).cfg(self.cfg);
        if self.executable {
            attribute = attribute.executable();
        }
        if self.strict {
            attribute = attribute.strict();
        }
        if self.single_artifact {
            attribute = attribute.single_artifact();
        }
        if self.non_empty {
            attribute = attribute.non_empty();
        }
        if self.skip_analysis_time_file_type_check {
            attribute = attribute.skip_analysis_time_file_type_check();
        }
        if let Some(classes) = &self.allowed_rule_classes {
            attribute = attribute.allowed_rule_classes(RuleClassSet::of(classes));
        }
        if let Some(classes) = &self.allowed_rule_classes_with_warning {
            attribute = attribute.allowed_rule_classes_with_warning(RuleClassSet::of(classes));
        }
        if let Some(types) = &self.allowed_file_types {
            attribute = attribute.allowed_file_types(FileTypeSet::of(types)?);
        }
        if self.silent_rule_class_filter {
            attribute = attribute.silent_rule_class_filter();
        }
        if let Some(default) = &self.default {
            let value = attribute_value(self.ty, "", default).map_err(|message| RuleViewError::Schema {
                rule_class: rule_class.to_string(),
                message: format!("default of attribute '{}': {message}", self.name),
            })?;
            attribute = attribute.default_value(value);
        }
        Ok(attribute)
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSpec {
    Rule(RuleSpec),
    InputFile(InputFileSpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub label: String,
    pub class: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Declared outputs, relative to the rule's package.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Omitted means private.
    #[serde(default)]
    pub visibility: Vec<PackageSpecification>,
    #[serde(default)]
    pub provides: Capabilities,
}

/// What the analysis of a rule provides beyond its output files.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capabilities {
    #[serde(default)]
    pub executable: bool,
    #[serde(default)]
    pub fileset: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputFileSpec {
    pub label: String,
    #[serde(default = "default_true")]
    pub exists: bool,
    #[serde(default)]
    pub visibility: Option<Vec<PackageSpecification>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilesetEntrySpec {
    srcdir: String,
    #[serde(default)]
    files: Option<Vec<String>>,
    #[serde(default)]
    destdir: Option<String>,
    #[serde(default)]
    excludes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

fn mismatch(ty: AttributeType, value: &Value) -> String {
    format!("expected a {ty} value, got {value}")
}

fn label_in(package: &str, raw: &str) -> std::result::Result<Label, String> {
    Label::parse_relative(package, raw).map_err(|e| e.to_string())
}

fn label_list_in(package: &str, ty: AttributeType, value: &Value) -> std::result::Result<Vec<Label>, String> {
    let Value::Array(items) = value else {
        return Err(mismatch(ty, value));
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => label_in(package, s),
            other => Err(mismatch(ty, other)),
        })
        .collect()
}

fn optional_label_in(package: &str, ty: AttributeType, value: &Value) -> std::result::Result<Option<Label>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => label_in(package, s).map(Some),
        other => Err(mismatch(ty, other)),
    }
}

/// Convert a JSON attribute value to the attribute's declared type.
///
/// Relative labels (`:name`) are resolved against `package`.
pub fn attribute_value(ty: AttributeType, package: &str, value: &Value) -> std::result::Result<AttributeValue, String> {
    Ok(match ty {
        AttributeType::Label => AttributeValue::Label(optional_label_in(package, ty, value)?),
        AttributeType::NodepLabel => AttributeValue::NodepLabel(optional_label_in(package, ty, value)?),
        AttributeType::LabelList => AttributeValue::LabelList(label_list_in(package, ty, value)?),
        AttributeType::String => match value {
            Value::String(s) => AttributeValue::String(s.clone()),
            other => return Err(mismatch(ty, other)),
        },
        AttributeType::StringList => {
            let strings: Option<Vec<String>> = value
                .as_array()
                .and_then(|items| items.iter().map(|i| i.as_str().map(str::to_string)).collect());
            AttributeValue::StringList(strings.ok_or_else(|| mismatch(ty, value))?)
        }
        AttributeType::Bool => match value {
            Value::Bool(b) => AttributeValue::Bool(*b),
            other => return Err(mismatch(ty, other)),
        },
        AttributeType::FilesetEntryList => {
            let specs: Vec<FilesetEntrySpec> =
                serde_json::from_value(value.clone()).map_err(|e| format!("{}: {e}", mismatch(ty, value)))?;
            let mut entries = Vec::with_capacity(specs.len());
            for spec in specs {
                let mut entry = FilesetEntry::new(label_in(package, &spec.srcdir)?).with_excludes(spec.excludes);
                if let Some(files) = spec.files {
                    let files = files
                        .iter()
                        .map(|f| label_in(package, f))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    entry = entry.with_files(files);
                }
                if let Some(destdir) = spec.destdir {
                    entry = entry.with_destdir(destdir);
                }
                entries.push(entry);
            }
            AttributeValue::FilesetEntries(entries)
        }
    })
}

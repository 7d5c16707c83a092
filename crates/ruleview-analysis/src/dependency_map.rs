//! Building the per-attribute dependency and fileset entry maps of a rule.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::diagnostics::RuleErrorConsumer;
use crate::prerequisite::{Prerequisite, PrerequisiteResolver};
use crate::provider::{ConfiguredTarget, FilesetProvider};
use crate::schema::{Attribute, AttributeType};
use crate::target::{FilesetEntry, LabelMap, Rule, Target};
use crate::validation::{validate_direct_prerequisite, PrerequisiteValidator, ValidationContext};

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

/// Validated prerequisites by attribute name, each list in declaration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyMap {
    entries: BTreeMap<String, Vec<Prerequisite>>,
}

impl DependencyMap {
    /// Prerequisites of `attribute`; empty when it has none.
    pub fn get(&self, attribute: &str) -> &[Prerequisite] {
        self.entries.get(attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Prerequisite])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Total number of prerequisites across all attributes.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fileset entry with its source resolved.
#[derive(Debug, Clone)]
pub enum ConfiguredFilesetEntry {
    /// Everything under the source directory target.
    Subtree {
        entry: FilesetEntry,
        src: Arc<ConfiguredTarget>,
    },
    /// An explicit list of files.
    Files {
        entry: FilesetEntry,
        files: Vec<Arc<ConfiguredTarget>>,
    },
}

impl ConfiguredFilesetEntry {
    pub fn entry(&self) -> &FilesetEntry {
        match self {
            ConfiguredFilesetEntry::Subtree { entry, .. } | ConfiguredFilesetEntry::Files { entry, .. } => entry,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilesetEntryMap {
    entries: BTreeMap<String, Vec<ConfiguredFilesetEntry>>,
}

impl FilesetEntryMap {
    pub fn get(&self, attribute: &str) -> &[ConfiguredFilesetEntry] {
        self.entries.get(attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ConfiguredFilesetEntry])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct DependencyMapBuilder<'a> {
    resolver: PrerequisiteResolver<'a>,
    validation: ValidationContext<'a>,
    policy: &'a dyn PrerequisiteValidator,
}

impl<'a> DependencyMapBuilder<'a> {
    pub fn new(
        resolver: PrerequisiteResolver<'a>,
        validation: ValidationContext<'a>,
        policy: &'a dyn PrerequisiteValidator,
    ) -> Self {
        Self {
            resolver,
            validation,
            policy,
        }
    }

    fn rule(&self) -> &Rule {
        self.validation.rule()
    }

    fn attribute(&self, name: &str) -> &Attribute {
        let rule = self.rule();
        match rule.rule_class().attribute(name) {
            Some(attribute) => attribute,
            None => panic!(
                "{}: {} attribute {} is not defined",
                rule.location(),
                rule.rule_class_name(),
                name
            ),
        }
    }

    /// Resolve and validate every label in `label_map`.
    ///
    /// # Panics
    ///
    /// If `label_map` names an attribute the rule class does not declare.
    pub fn build_dependency_map(&self, label_map: &LabelMap) -> DependencyMap {
        let mut entries = BTreeMap::new();
        for (name, labels) in label_map {
            let attribute = self.attribute(name);
            let mut kept = Vec::with_capacity(labels.len());
            for label in labels {
                let prerequisite = self.resolver.resolve(attribute, label);
                if attribute.is_silent_rule_class_filter() {
                    let admitted = prerequisite
                        .target()
                        .as_rule()
                        .is_some_and(|r| attribute.allowed_rule_class_set().contains(r.rule_class_name()));
                    if !admitted {
                        tracing::debug!(
                            rule = %self.rule().label(),
                            attribute = name.as_str(),
                            label = %label,
                            "Filtered dependency by rule class"
                        );
                        continue;
                    }
                }
                validate_direct_prerequisite(&self.validation, attribute, &prerequisite, self.policy);
                kept.push(prerequisite);
            }
            tracing::debug!(
                rule = %self.rule().label(),
                attribute = name.as_str(),
                declared = labels.len(),
                kept = kept.len(),
                "Built dependencies"
            );
            entries.insert(name.clone(), kept);
        }
        self.check_mutually_exclusive();
        DependencyMap { entries }
    }

    /// Resolve the entries of every fileset-entry-list attribute.
    pub fn build_fileset_entry_map(&self) -> FilesetEntryMap {
        let mut entries = BTreeMap::new();
        let rule = self.rule();
        for attribute in rule.rule_class().attributes() {
            if attribute.ty() != AttributeType::FilesetEntryList {
                continue;
            }
            let mut resolved = Vec::new();
            for entry in rule.fileset_entries_attr(attribute.name()) {
                match entry.files() {
                    None => {
                        let src = self.resolver.resolve(attribute, entry.src_label());
                        if !self.validate_fileset_entry(attribute, entry, &src) {
                            continue;
                        }
                        resolved.push(ConfiguredFilesetEntry::Subtree {
                            entry: entry.clone(),
                            src: Arc::clone(src.configured_target()),
                        });
                    }
                    Some(files) => {
                        let files = files
                            .iter()
                            .map(|file| Arc::clone(self.resolver.resolve(attribute, file).configured_target()))
                            .collect();
                        resolved.push(ConfiguredFilesetEntry::Files {
                            entry: entry.clone(),
                            files,
                        });
                    }
                }
            }
            if !resolved.is_empty() {
                entries.insert(attribute.name().to_string(), resolved);
            }
        }
        FilesetEntryMap { entries }
    }

    fn validate_fileset_entry(&self, attribute: &Attribute, entry: &FilesetEntry, src: &Prerequisite) -> bool {
        if src.provider::<FilesetProvider>().is_some() || entry.is_source_fileset() {
            return true;
        }
        match src.target() {
            Target::Rule(_) => {
                self.validation.attribute_error(
                    attribute.name(),
                    &format!(
                        "invalid 'srcdir' target '{}'. Must be another fileset or package",
                        src.label()
                    ),
                );
                false
            }
            Target::OutputFile(_) => {
                self.validation.attribute_warning(
                    attribute.name(),
                    &format!(
                        "'srcdir' target '{}' is not an input file. This forces the fileset to be \
                         executed unconditionally",
                        src.label()
                    ),
                );
                true
            }
            Target::InputFile(_) => true,
        }
    }

    fn check_mutually_exclusive(&self) {
        let rule = self.rule();
        for (first, second) in rule.rule_class().mutually_exclusive_attributes() {
            if rule.is_attribute_value_explicitly_specified(first)
                && rule.is_attribute_value_explicitly_specified(second)
            {
                self.validation.attribute_error(
                    second,
                    &format!("Only one of {second} and {first} should be provided"),
                );
            }
        }
    }
}

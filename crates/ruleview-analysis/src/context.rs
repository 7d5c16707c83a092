//! The per-rule analysis context.
//!
//! A [`RuleContext`] is built once per (rule, configuration) by
//! [`RuleContextBuilder`]. Building resolves and validates every dependency;
//! afterwards the context is read-only apart from diagnostics and action
//! registration, which go to the [`AnalysisEnvironment`].
//!
//! Two error channels exist. Problems in the user's build files are reported
//! as diagnostics and analysis continues. Misuse of the API, such as querying
//! an undeclared attribute or asking for the wrong configuration mode, panics.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use ruleview_types::Label;

use crate::artifact::{Action, ActionOwner, Artifact, Root};
use crate::configuration::Configuration;
use crate::dependency_map::{DependencyMap, DependencyMapBuilder, FilesetEntryMap};
use crate::diagnostics::{Diagnostics, RuleErrorConsumer};
use crate::environment::AnalysisEnvironment;
use crate::file_type::FileTypeSet;
use crate::make_vars::{self, ConfigurationMakeVariableContext, MakeVariableContext};
use crate::prerequisite::{ConfigurationTransition, Prerequisite, PrerequisiteMap, PrerequisiteResolver, TargetProvider};
use crate::provider::{ConfiguredTarget, FileProvider, FilesToRunProvider, ProviderLike};
use crate::schema::{Attribute, AttributeType, Mode};
use crate::shell;
use crate::target::{AttributeValue, LabelMap, OutputFile, Rule};
use crate::validation::{self, AllowAll, PrerequisiteValidator, ValidationContext};

/// Computes the paths of a rule's implicit outputs, relative to its package.
pub trait ImplicitOutputsFunction {
    fn apply(&self, rule: &Rule) -> Vec<String>;
}

impl<F> ImplicitOutputsFunction for F
where
    F: Fn(&Rule) -> Vec<String>,
{
    fn apply(&self, rule: &Rule) -> Vec<String> {
        self(rule)
    }
}

fn replace_extension(path: &str, extension: &str) -> String {
    let (dir, base) = match path.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, path),
    };
    let stem = match base.rfind('.') {
        Some(i) => &base[..i],
        None => base,
    };
    match dir {
        Some(dir) => format!("{dir}/{stem}{extension}"),
        None => format!("{stem}{extension}"),
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct RuleContextBuilder<'a> {
    env: &'a dyn AnalysisEnvironment,
    targets: &'a dyn TargetProvider,
    rule: Arc<Rule>,
    configuration: Arc<Configuration>,
    validator: &'a dyn PrerequisiteValidator,
    transition: Option<&'a dyn ConfigurationTransition>,
    prerequisites: Option<&'a PrerequisiteMap>,
    label_map: Option<LabelMap>,
}

impl<'a> RuleContextBuilder<'a> {
    pub fn new(
        env: &'a dyn AnalysisEnvironment,
        targets: &'a dyn TargetProvider,
        rule: Arc<Rule>,
        configuration: Arc<Configuration>,
    ) -> Self {
        Self {
            env,
            targets,
            rule,
            configuration,
            validator: &AllowAll,
            transition: None,
            prerequisites: None,
            label_map: None,
        }
    }

    /// The policy run last on every direct prerequisite. Defaults to [`AllowAll`].
    pub fn validator(mut self, validator: &'a dyn PrerequisiteValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn transition(mut self, transition: &'a dyn ConfigurationTransition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn prerequisites(mut self, prerequisites: &'a PrerequisiteMap) -> Self {
        self.prerequisites = Some(prerequisites);
        self
    }

    /// Dependency labels to resolve. Defaults to [`Rule::label_map`].
    pub fn label_map(mut self, label_map: LabelMap) -> Self {
        self.label_map = Some(label_map);
        self
    }

    /// Resolve and validate all dependencies and freeze the result.
    ///
    /// # Panics
    ///
    /// If no transition or prerequisite map was supplied, or if resolution
    /// hits a contract violation (see [`PrerequisiteResolver::resolve`]).
    pub fn build(self) -> RuleContext<'a> {
        let Some(transition) = self.transition else {
            panic!("rule context for {} built without a configuration transition", self.rule.label());
        };
        let Some(prerequisites) = self.prerequisites else {
            panic!("rule context for {} built without a prerequisite map", self.rule.label());
        };
        let label_map = match self.label_map {
            Some(label_map) => label_map,
            None => self.rule.label_map(),
        };

        let (dependencies, fileset_entries) = {
            let resolver = PrerequisiteResolver::new(
                &self.rule,
                &self.configuration,
                self.targets,
                transition,
                prerequisites,
            );
            let validation = ValidationContext::new(&self.rule, &self.configuration, self.env.diagnostics());
            let builder = DependencyMapBuilder::new(resolver, validation, self.validator);
            (
                builder.build_dependency_map(&label_map),
                builder.build_fileset_entry_map(),
            )
        };

        tracing::debug!(
            rule = %self.rule.label(),
            configuration = self.configuration.short_name(),
            dependencies = dependencies.len(),
            has_errors = self.env.has_errors(),
            "Built rule context"
        );

        RuleContext {
            env: self.env,
            rule: self.rule,
            configuration: self.configuration,
            dependencies,
            fileset_entries,
            action_owner: OnceLock::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// RuleContext
// ---------------------------------------------------------------------------

pub struct RuleContext<'a> {
    env: &'a dyn AnalysisEnvironment,
    rule: Arc<Rule>,
    configuration: Arc<Configuration>,
    dependencies: DependencyMap,
    fileset_entries: FilesetEntryMap,
    action_owner: OnceLock<ActionOwner>,
}

impl<'a> RuleContext<'a> {
    pub fn builder(
        env: &'a dyn AnalysisEnvironment,
        targets: &'a dyn TargetProvider,
        rule: Arc<Rule>,
        configuration: Arc<Configuration>,
    ) -> RuleContextBuilder<'a> {
        RuleContextBuilder::new(env, targets, rule, configuration)
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn label(&self) -> &Label {
        self.rule.label()
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn env(&self) -> &dyn AnalysisEnvironment {
        self.env
    }

    pub fn dependency_map(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn fileset_entry_map(&self) -> &FilesetEntryMap {
        &self.fileset_entries
    }

    /// Has any error been reported for this analysis so far?
    pub fn has_errors(&self) -> bool {
        self.env.has_errors()
    }

    pub fn is_visible(&self, prerequisite: &ConfiguredTarget) -> bool {
        validation::is_visible(&self.rule, prerequisite)
    }

    // --- actions -----------------------------------------------------------

    pub fn action_owner(&self) -> &ActionOwner {
        self.action_owner.get_or_init(|| ActionOwner {
            label: self.rule.label().clone(),
            location: self.rule.location().clone(),
            configuration_name: self.configuration.short_name().to_string(),
            configuration_mnemonic: self.configuration.mnemonic().to_string(),
            configuration_short_cache_key: self.configuration.short_cache_key(),
            target_kind: self.rule.target_kind(),
            additional_progress_info: self
                .configuration
                .is_host_configuration()
                .then(|| "host".to_string()),
        })
    }

    pub fn register_action(&self, action: Action) {
        self.env.register_action(action);
    }

    // --- outputs -----------------------------------------------------------

    /// The bin root for rules with binary output, the genfiles root otherwise.
    pub fn bin_or_genfiles_directory(&self) -> Root {
        if self.rule.rule_class().has_binary_output() {
            self.configuration.bin_directory()
        } else {
            self.configuration.genfiles_directory()
        }
    }

    /// The derived artifact named after the rule itself.
    pub fn create_output_artifact(&self) -> Artifact {
        self.env.derived_artifact(
            &self.rule.label().workspace_relative_path(),
            &self.bin_or_genfiles_directory(),
        )
    }

    pub fn create_output_artifact_for(&self, output: &OutputFile) -> Artifact {
        self.env.derived_artifact(
            &output.label().workspace_relative_path(),
            &self.bin_or_genfiles_directory(),
        )
    }

    /// Artifacts for every declared output, in declaration order.
    pub fn output_artifacts(&self) -> Vec<Artifact> {
        self.rule
            .output_files()
            .iter()
            .map(|out| self.create_output_artifact_for(out))
            .collect()
    }

    /// The first declared output; reports an error unless there is exactly one.
    pub fn output_artifact(&self) -> Option<Artifact> {
        let mut outputs = self.output_artifacts();
        if outputs.len() != 1 {
            self.attribute_error("out", "exactly one output file required");
        }
        if outputs.is_empty() {
            None
        } else {
            Some(outputs.swap_remove(0))
        }
    }

    /// # Panics
    ///
    /// If `function` does not produce exactly one path.
    pub fn implicit_output_artifact(&self, function: &dyn ImplicitOutputsFunction) -> Artifact {
        let paths = function.apply(&self.rule);
        let [path] = paths.as_slice() else {
            panic!(
                "{}: implicit outputs of {} must be exactly one path, got {}",
                self.rule.location(),
                self.rule.label(),
                paths.len()
            );
        };
        let package = self.rule.package();
        let path = if package.is_empty() {
            path.clone()
        } else {
            format!("{package}/{path}")
        };
        self.env.derived_artifact(&path, &self.bin_or_genfiles_directory())
    }

    /// `path` with its extension replaced by `extension`, under the bin root.
    pub fn related_artifact(&self, path: &str, extension: &str) -> Artifact {
        self.env.derived_artifact(
            &replace_extension(path, extension),
            &self.configuration.bin_directory(),
        )
    }

    /// `pkg/<fragment>/<rule name>`, for outputs that must not collide across rules.
    pub fn unique_directory(&self, fragment: &str) -> String {
        let label = self.rule.label();
        if label.package().is_empty() {
            format!("{fragment}/{}", label.name())
        } else {
            format!("{}/{fragment}/{}", label.package(), label.name())
        }
    }

    pub fn should_create_runfiles_symlinks(&self) -> bool {
        if self.rule.rule_class().is_test() {
            self.configuration.build_runfiles()
        } else {
            true
        }
    }

    /// `files_to_build` followed by the runfiles middleman, if there is one.
    pub fn files_to_run(runfiles_middleman: Option<&Artifact>, files_to_build: &[Artifact]) -> Vec<Artifact> {
        files_to_build
            .iter()
            .chain(runfiles_middleman)
            .cloned()
            .collect()
    }

    // --- prerequisites -----------------------------------------------------

    fn check_attribute(&self, name: &str, mode: Mode) -> &Attribute {
        let rule = &self.rule;
        let Some(attribute) = rule.rule_class().attribute(name) else {
            panic!(
                "{}: {} attribute {} is not defined",
                rule.location(),
                rule.rule_class_name(),
                name
            );
        };
        if attribute.transition() != mode.transition() {
            panic!(
                "{}: {} attribute {} is not configured for the {} configuration",
                rule.location(),
                rule.rule_class_name(),
                name,
                mode
            );
        }
        attribute
    }

    /// Validated prerequisites of `attribute`, in declaration order.
    ///
    /// # Panics
    ///
    /// If `attribute` is undeclared or not configured for `mode`.
    pub fn prerequisites(&self, attribute: &str, mode: Mode) -> &[Prerequisite] {
        self.check_attribute(attribute, mode);
        self.dependencies.get(attribute)
    }

    /// The only prerequisite of `attribute`, if any.
    ///
    /// # Panics
    ///
    /// If `attribute` is not a label or label list, or has more than one prerequisite.
    pub fn prerequisite(&self, attribute: &str, mode: Mode) -> Option<&Prerequisite> {
        let definition = self.check_attribute(attribute, mode);
        if !matches!(definition.ty(), AttributeType::Label | AttributeType::LabelList) {
            panic!(
                "{} attribute {} is not a label type attribute",
                self.rule.rule_class_name(),
                attribute
            );
        }
        match self.dependencies.get(attribute) {
            [] => None,
            [only] => Some(only),
            _ => panic!(
                "{} attribute {} produces more than one prerequisite",
                self.rule.rule_class_name(),
                attribute
            ),
        }
    }

    pub fn provider<P: ProviderLike>(&self, attribute: &str, mode: Mode) -> Option<&P> {
        self.prerequisite(attribute, mode)?.provider::<P>()
    }

    /// Providers of type `P` among the prerequisites of `attribute`, skipping those without one.
    pub fn providers<P: ProviderLike>(&self, attribute: &str, mode: Mode) -> Vec<&P> {
        self.prerequisites(attribute, mode)
            .iter()
            .filter_map(|p| p.provider::<P>())
            .collect()
    }

    /// The runnable prerequisite of an executable attribute.
    ///
    /// # Panics
    ///
    /// If `attribute` is not declared executable.
    pub fn executable_prerequisite(&self, attribute: &str, mode: Mode) -> Option<&FilesToRunProvider> {
        let definition = self.check_attribute(attribute, mode);
        if !definition.is_executable() {
            panic!(
                "{} attribute {} is not configured to be executable",
                self.rule.rule_class_name(),
                attribute
            );
        }
        let prerequisite = self.prerequisite(attribute, mode)?;
        match prerequisite.provider::<FilesToRunProvider>() {
            Some(files) if files.executable().is_some() => Some(files),
            _ => {
                self.attribute_error(
                    attribute,
                    &format!(
                        "{} does not refer to a valid executable target",
                        prerequisite.label()
                    ),
                );
                None
            }
        }
    }

    /// Files built by the prerequisites of `attribute`, first occurrence wins.
    pub fn prerequisite_artifacts(&self, attribute: &str, mode: Mode) -> Vec<Artifact> {
        let mut seen = HashSet::new();
        let mut artifacts = Vec::new();
        for files in self.providers::<FileProvider>(attribute, mode) {
            for artifact in files.files_to_build() {
                if seen.insert(artifact) {
                    artifacts.push(artifact.clone());
                }
            }
        }
        artifacts
    }

    pub fn prerequisite_artifacts_of_type(
        &self,
        attribute: &str,
        mode: Mode,
        types: &FileTypeSet,
    ) -> Vec<Artifact> {
        let artifacts = self.prerequisite_artifacts(attribute, mode);
        types.filter(&artifacts).cloned().collect()
    }

    /// The single file built by the only prerequisite of `attribute`.
    pub fn prerequisite_artifact(&self, attribute: &str, mode: Mode) -> Option<Artifact> {
        let prerequisite = self.prerequisite(attribute, mode)?;
        let files = prerequisite
            .provider::<FileProvider>()
            .map(FileProvider::files_to_build)
            .unwrap_or_default();
        match files {
            [only] => Some(only.clone()),
            _ => {
                self.attribute_error(
                    attribute,
                    &format!("{} expected a single artifact", prerequisite.label()),
                );
                None
            }
        }
    }

    /// The only file in `srcs`. More than one is an error and yields the first.
    pub fn single_source(&self, kind: Option<&str>) -> Option<Artifact> {
        let mut sources = self.prerequisite_artifacts("srcs", Mode::Target);
        match sources.len() {
            0 => None,
            1 => sources.pop(),
            _ => {
                let kind = kind
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} source file", self.rule.rule_class_name()));
                self.attribute_error("srcs", &format!("only a single {kind} is allowed here"));
                Some(sources.swap_remove(0))
            }
        }
    }

    /// Report every source file in `srcs` that lives in another package.
    pub fn check_srcs_same_package(&self, only_warn: bool) {
        let package = self.rule.package();
        for artifact in self.prerequisite_artifacts("srcs", Mode::Target) {
            if !artifact.is_source_artifact() {
                continue;
            }
            let owner = artifact.owner();
            if owner.package() == package {
                continue;
            }
            let message = format!(
                "please do not import '{owner}' directly. You should either move the file to \
                 this package or depend on an appropriate rule there"
            );
            if only_warn {
                self.attribute_warning("srcs", &message);
            } else {
                self.attribute_error("srcs", &message);
            }
        }
    }

    /// The label of a nodep attribute; warns when it points outside the package.
    ///
    /// # Panics
    ///
    /// If `attribute` is not a declared nodep label.
    pub fn local_nodep_label_attribute(&self, attribute: &str) -> Option<Label> {
        if !self.rule.rule_class().has_attribute(attribute, AttributeType::NodepLabel) {
            panic!(
                "{} attribute {} is not a nodep label attribute",
                self.rule.rule_class_name(),
                attribute
            );
        }
        let label = self.rule.label_attr(attribute)?.clone();
        if label.package() != self.rule.package() {
            self.attribute_warning(attribute, "does not reference a local rule");
        }
        Some(label)
    }

    /// The host-configured executable in the `compiler` attribute.
    pub fn compiler(&self, warn_if_not_default: bool) -> Option<&FilesToRunProvider> {
        if warn_if_not_default {
            let default = self
                .rule
                .rule_class()
                .attribute("compiler")
                .and_then(|a| a.default());
            let default = match default {
                Some(AttributeValue::Label(label)) => label.as_ref(),
                _ => None,
            };
            if self.rule.label_attr("compiler") != default {
                self.attribute_warning("compiler", "setting the compiler is strongly discouraged");
            }
        }
        self.executable_prerequisite("compiler", Mode::Host)
    }

    // --- make variables ----------------------------------------------------

    fn make_variable_context(&self) -> ConfigurationMakeVariableContext<'_> {
        ConfigurationMakeVariableContext::new(self.rule.package(), &self.configuration)
    }

    /// Expand "Make" variables in `expression`. On error, reports it and returns `expression`.
    pub fn expand_make_variables(&self, attribute: &str, expression: &str) -> String {
        self.expand_make_variables_with(attribute, expression, &self.make_variable_context())
    }

    pub fn expand_make_variables_with(
        &self,
        attribute: &str,
        expression: &str,
        context: &dyn MakeVariableContext,
    ) -> String {
        match make_vars::expand(expression, context) {
            Ok(expanded) => expanded,
            Err(e) => {
                self.attribute_error(attribute, &e.to_string());
                expression.to_string()
            }
        }
    }

    /// The value of `expression` if it is a single variable reference.
    ///
    /// Syntax errors are reported and yield `expression` itself.
    pub fn expand_single_make_variable(&self, attribute: &str, expression: &str) -> Option<String> {
        match make_vars::expand_single_variable(expression, &self.make_variable_context()) {
            Ok(value) => value,
            Err(e) => {
                self.attribute_error(attribute, &e.to_string());
                Some(expression.to_string())
            }
        }
    }

    /// Every value of a string list attribute, expanded.
    pub fn expanded_make_variables_list(&self, attribute: &str) -> Vec<String> {
        self.rule
            .string_list_attr(attribute)
            .iter()
            .map(|value| self.expand_make_variables(attribute, value))
            .collect()
    }

    /// Expand `value` and append its shell tokens to `tokens`.
    ///
    /// Tokenization errors are reported; tokens completed before the error are kept.
    pub fn tokenize_and_expand_make_vars(&self, tokens: &mut Vec<String>, attribute: &str, value: &str) {
        let expanded = self.expand_make_variables(attribute, value);
        if let Err(e) = shell::tokenize(tokens, &expanded) {
            self.attribute_error(attribute, &e.to_string());
        }
    }

    /// Expanded and tokenized values of a string list attribute.
    ///
    /// Empty if `attribute` is not a declared string list.
    pub fn tokenized_string_list_attr(&self, attribute: &str) -> Vec<String> {
        if !self.rule.rule_class().has_attribute(attribute, AttributeType::StringList) {
            return Vec::new();
        }
        let mut tokens = Vec::new();
        for value in self.rule.string_list_attr(attribute) {
            self.tokenize_and_expand_make_vars(&mut tokens, attribute, value);
        }
        tokens
    }
}

impl RuleErrorConsumer for RuleContext<'_> {
    fn rule(&self) -> &Rule {
        &self.rule
    }

    fn diagnostics(&self) -> &Diagnostics {
        self.env.diagnostics()
    }
}

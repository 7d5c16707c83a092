//! A loaded workspace: every target plus its analysis in every configuration.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ruleview_analysis::{
    AnalysisOptions, AnalysisOutput, Artifact, AttributeType, CachingAnalysisEnvironment, Configuration,
    ConfiguredTarget, FileProvider, FilesToRunProvider, FilesetProvider, InputFile, OutputFile, PrerequisiteMap,
    ProviderCollection, Rule, RuleClass, RuleContext, StandardTransitions, Target, TargetProvider, Transition,
    VisibilityProvider,
};
use ruleview_types::{Label, Location, Result, RuleViewError};

use crate::manifest::{Capabilities, InputFileSpec, Manifest, RuleSpec, TargetSpec};

pub struct Workspace {
    targets: HashMap<Label, Target>,
    rules: Vec<Arc<Rule>>,
    prerequisites: PrerequisiteMap,
    configuration: Arc<Configuration>,
    transitions: StandardTransitions,
    options: AnalysisOptions,
}

impl TargetProvider for Workspace {
    fn loaded_target(&self, label: &Label) -> Result<Target> {
        self.targets
            .get(label)
            .cloned()
            .ok_or_else(|| RuleViewError::NoSuchTarget {
                label: label.to_string(),
            })
    }
}

impl Workspace {
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_manifest(Manifest::parse(&source)?)
    }

    pub fn from_manifest(manifest: Manifest) -> Result<Self> {
        let mut classes: HashMap<String, Arc<RuleClass>> = HashMap::new();
        for spec in &manifest.rule_classes {
            let class = spec.build()?;
            if classes.insert(spec.name.clone(), class).is_some() {
                return Err(RuleViewError::Manifest(format!("duplicate rule class '{}'", spec.name)));
            }
        }

        let target = Arc::new(manifest.configurations.target);
        let host = Arc::new(manifest.configurations.host);
        let mut transitions = StandardTransitions::new(Arc::clone(&host));
        let mut configurations = vec![Arc::clone(&target), host];
        if let Some(data) = manifest.configurations.data {
            let data = Arc::new(data);
            transitions = transitions.with_data(Arc::clone(&data));
            if !configurations.contains(&data) {
                configurations.push(data);
            }
        }

        let mut loader = Loader {
            classes: &classes,
            configurations: &configurations,
            targets: HashMap::new(),
            rules: Vec::new(),
            prerequisites: PrerequisiteMap::new(),
        };
        for spec in manifest.targets {
            match spec {
                TargetSpec::Rule(spec) => loader.add_rule(spec)?,
                TargetSpec::InputFile(spec) => loader.add_input_file(spec)?,
            }
        }
        tracing::debug!(
            targets = loader.targets.len(),
            rules = loader.rules.len(),
            configured_targets = loader.prerequisites.len(),
            "Loaded workspace"
        );

        Ok(Self {
            targets: loader.targets,
            rules: loader.rules,
            prerequisites: loader.prerequisites,
            configuration: target,
            transitions,
            options: manifest.options,
        })
    }

    /// Every rule, in manifest order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn rule(&self, label: &Label) -> Option<Arc<Rule>> {
        self.rules.iter().find(|r| r.label() == label).cloned()
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut AnalysisOptions {
        &mut self.options
    }

    /// Build the context of `rule` in the target configuration, hand it to `inspect`,
    /// and return what `inspect` produced with everything the analysis recorded.
    ///
    /// # Panics
    ///
    /// On a contract violation while building the context.
    pub fn analyze<T>(&self, rule: Arc<Rule>, inspect: impl FnOnce(&RuleContext<'_>) -> T) -> (T, AnalysisOutput) {
        let env = CachingAnalysisEnvironment::new(rule.label().clone());
        let validator = self.options.validator();
        let inspected = {
            let context = RuleContext::builder(&env, self, rule, Arc::clone(&self.configuration))
                .validator(&validator)
                .transition(&self.transitions)
                .prerequisites(&self.prerequisites)
                .build();
            if let Some(check) = self.options.srcs_same_package {
                let has_target_srcs = context
                    .rule()
                    .rule_class()
                    .attribute("srcs")
                    .is_some_and(|a| a.ty() == AttributeType::LabelList && a.transition() == Transition::None);
                if has_target_srcs {
                    context.check_srcs_same_package(check.only_warn());
                }
            }
            inspect(&context)
        };
        (inspected, env.into_output())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

struct Loader<'a> {
    classes: &'a HashMap<String, Arc<RuleClass>>,
    configurations: &'a [Arc<Configuration>],
    targets: HashMap<Label, Target>,
    rules: Vec<Arc<Rule>>,
    prerequisites: PrerequisiteMap,
}

fn build_file(label: &Label) -> String {
    if label.package().is_empty() {
        "BUILD".to_string()
    } else {
        format!("{}/BUILD", label.package())
    }
}

impl Loader<'_> {
    fn insert(&mut self, target: Target) -> Result<()> {
        let label = target.label().clone();
        if self.targets.insert(label.clone(), target).is_some() {
            return Err(RuleViewError::Manifest(format!("duplicate target '{label}'")));
        }
        Ok(())
    }

    fn add_input_file(&mut self, spec: InputFileSpec) -> Result<()> {
        let label = Label::parse(&spec.label)?;
        let location = Location::file(build_file(&label));
        let mut file = if spec.exists {
            InputFile::new(label.clone(), location)
        } else {
            InputFile::missing(label.clone(), location)
        };
        if let Some(visibility) = spec.visibility {
            file = file.with_visibility(visibility);
        }
        self.prerequisites.insert(ConfiguredTarget::new(
            label.clone(),
            None,
            ProviderCollection::new()
                .with(FileProvider::new(vec![Artifact::source(&label)]))
                .with(VisibilityProvider::new(file.visibility().to_vec())),
        ));
        self.insert(Target::InputFile(file))
    }

    fn add_rule(&mut self, spec: RuleSpec) -> Result<()> {
        let label = Label::parse(&spec.label)?;
        let Some(class) = self.classes.get(&spec.class) else {
            return Err(RuleViewError::Manifest(format!(
                "unknown rule class '{}' for {label}",
                spec.class
            )));
        };
        let location = Location::new(build_file(&label), spec.line.unwrap_or(0), 0);
        let mut rule = Rule::new(label.clone(), Arc::clone(class), location);
        for (name, value) in &spec.attributes {
            let ty = class
                .attribute(name)
                .map(|a| a.ty())
                .ok_or_else(|| RuleViewError::InvalidAttribute {
                    rule: label.to_string(),
                    attribute: name.clone(),
                    message: format!("no such attribute in {} rule", class.name()),
                })?;
            let value = crate::manifest::attribute_value(ty, label.package(), value).map_err(|message| {
                RuleViewError::InvalidAttribute {
                    rule: label.to_string(),
                    attribute: name.clone(),
                    message,
                }
            })?;
            rule.set_attribute(name, value)?;
        }
        let outputs = spec
            .outputs
            .iter()
            .map(|out| Label::parse_relative(label.package(), out))
            .collect::<Result<Vec<_>>>()?;
        let rule = Arc::new(rule.with_outputs(outputs).with_visibility(spec.visibility));

        for output in rule.output_files() {
            self.add_output_file(&rule, output)?;
        }
        self.add_configured_rule(&rule, spec.provides);
        self.rules.push(Arc::clone(&rule));
        self.insert(Target::Rule(rule))
    }

    fn output_root(rule: &Rule, configuration: &Configuration) -> ruleview_analysis::Root {
        if rule.rule_class().has_binary_output() {
            configuration.bin_directory()
        } else {
            configuration.genfiles_directory()
        }
    }

    fn add_output_file(&mut self, rule: &Rule, output: OutputFile) -> Result<()> {
        for configuration in self.configurations {
            let artifact = Artifact::derived(
                Self::output_root(rule, configuration),
                output.label().workspace_relative_path(),
                rule.label().clone(),
            );
            self.prerequisites.insert(ConfiguredTarget::new(
                output.label().clone(),
                Some(Arc::clone(configuration)),
                ProviderCollection::new()
                    .with(FileProvider::new(vec![artifact]))
                    .with(VisibilityProvider::new(rule.visibility().to_vec())),
            ));
        }
        self.insert(Target::OutputFile(output))
    }

    fn add_configured_rule(&mut self, rule: &Rule, provides: Capabilities) {
        let path = rule.label().workspace_relative_path();
        for configuration in self.configurations {
            let root = Self::output_root(rule, configuration);
            let files: Vec<Artifact> = rule
                .outputs()
                .iter()
                .map(|out| Artifact::derived(root.clone(), out.workspace_relative_path(), rule.label().clone()))
                .collect();
            let mut providers = ProviderCollection::new()
                .with(VisibilityProvider::new(rule.visibility().to_vec()))
                .with(FileProvider::new(files.clone()));
            if provides.executable {
                let executable = Artifact::derived(configuration.bin_directory(), path.as_str(), rule.label().clone());
                let middleman = Artifact::derived(
                    configuration.bin_directory(),
                    format!("{path}.runfiles"),
                    rule.label().clone(),
                );
                providers.insert(FilesToRunProvider::new(Some(executable), files).with_runfiles_middleman(middleman));
            }
            if provides.fileset {
                providers.insert(FilesetProvider::new(Artifact::derived(
                    configuration.bin_directory(),
                    path.as_str(),
                    rule.label().clone(),
                )));
            }
            self.prerequisites.insert(ConfiguredTarget::new(
                rule.label().clone(),
                Some(Arc::clone(configuration)),
                providers,
            ));
        }
    }
}

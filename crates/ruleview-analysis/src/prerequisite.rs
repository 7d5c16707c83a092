//! Resolution of dependency labels into analyzed prerequisites.
//!
//! Every label a rule depends on has already been analyzed by the time the
//! rule is. The [`PrerequisiteResolver`] only decides which configuration a
//! label is needed in and looks the result up. A missing target or map entry
//! means the caller scheduled analysis wrongly, so it panics.

use std::collections::HashMap;
use std::sync::Arc;

use ruleview_types::Label;

use crate::configuration::Configuration;
use crate::provider::{ConfiguredTarget, ProviderLike};
use crate::schema::{Attribute, Transition};
use crate::target::{Rule, Target};

// ---------------------------------------------------------------------------
// External collaborators
// ---------------------------------------------------------------------------

/// Source of loaded, unconfigured targets.
pub trait TargetProvider: Send + Sync {
    fn loaded_target(&self, label: &Label) -> ruleview_types::Result<Target>;
}

/// Decides the configuration a dependency is analyzed in.
///
/// `None` means the dependency needs no configuration, which is only
/// meaningful for input files.
pub trait ConfigurationTransition: Send + Sync {
    fn configure(
        &self,
        rule: &Rule,
        configuration: &Arc<Configuration>,
        attribute: &Attribute,
        target: &Target,
    ) -> Option<Arc<Configuration>>;
}

/// Host and data transitions to fixed configurations.
///
/// Input files are unconfigured. Everything reached from a host configuration
/// stays in it.
#[derive(Debug, Clone)]
pub struct StandardTransitions {
    host: Arc<Configuration>,
    data: Option<Arc<Configuration>>,
}

impl StandardTransitions {
    pub fn new(host: Arc<Configuration>) -> Self {
        Self { host, data: None }
    }

    /// Use a dedicated configuration for data dependencies instead of the requester's.
    pub fn with_data(mut self, data: Arc<Configuration>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn host(&self) -> &Arc<Configuration> {
        &self.host
    }
}

impl ConfigurationTransition for StandardTransitions {
    fn configure(
        &self,
        _rule: &Rule,
        configuration: &Arc<Configuration>,
        attribute: &Attribute,
        target: &Target,
    ) -> Option<Arc<Configuration>> {
        if matches!(target, Target::InputFile(_)) {
            return None;
        }
        if configuration.is_host_configuration() {
            return Some(Arc::clone(configuration));
        }
        let next = match attribute.transition() {
            Transition::None => configuration,
            Transition::Host => &self.host,
            Transition::Data => self.data.as_ref().unwrap_or(configuration),
        };
        Some(Arc::clone(next))
    }
}

// ---------------------------------------------------------------------------
// Prerequisite
// ---------------------------------------------------------------------------

/// A dependency as seen by the depending rule: the loaded target plus its analysis.
#[derive(Debug, Clone)]
pub struct Prerequisite {
    target: Target,
    configured: Arc<ConfiguredTarget>,
}

impl Prerequisite {
    pub fn new(target: Target, configured: Arc<ConfiguredTarget>) -> Self {
        Self { target, configured }
    }

    pub fn label(&self) -> &Label {
        self.configured.label()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn configured_target(&self) -> &Arc<ConfiguredTarget> {
        &self.configured
    }

    pub fn configuration(&self) -> Option<&Arc<Configuration>> {
        self.configured.configuration()
    }

    pub fn provider<P: ProviderLike>(&self) -> Option<&P> {
        self.configured.provider::<P>()
    }
}

// ---------------------------------------------------------------------------
// PrerequisiteMap
// ---------------------------------------------------------------------------

type PrerequisiteKey = (Label, Option<Arc<Configuration>>);

/// Already analyzed targets, keyed by label and configuration.
#[derive(Debug, Default, Clone)]
pub struct PrerequisiteMap {
    entries: HashMap<PrerequisiteKey, Arc<ConfiguredTarget>>,
}

impl PrerequisiteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: ConfiguredTarget) {
        let key = (target.label().clone(), target.configuration().cloned());
        self.entries.insert(key, Arc::new(target));
    }

    pub fn get(
        &self,
        label: &Label,
        configuration: Option<&Arc<Configuration>>,
    ) -> Option<&Arc<ConfiguredTarget>> {
        self.entries.get(&(label.clone(), configuration.cloned()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ConfiguredTarget> for PrerequisiteMap {
    fn from_iter<I: IntoIterator<Item = ConfiguredTarget>>(iter: I) -> Self {
        let mut map = Self::new();
        for target in iter {
            map.insert(target);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct PrerequisiteResolver<'a> {
    rule: &'a Rule,
    configuration: &'a Arc<Configuration>,
    targets: &'a dyn TargetProvider,
    transition: &'a dyn ConfigurationTransition,
    prerequisites: &'a PrerequisiteMap,
}

impl<'a> PrerequisiteResolver<'a> {
    pub fn new(
        rule: &'a Rule,
        configuration: &'a Arc<Configuration>,
        targets: &'a dyn TargetProvider,
        transition: &'a dyn ConfigurationTransition,
        prerequisites: &'a PrerequisiteMap,
    ) -> Self {
        Self {
            rule,
            configuration,
            targets,
            transition,
            prerequisites,
        }
    }

    /// Resolve `label`, reached through `attribute`, to its analyzed prerequisite.
    ///
    /// # Panics
    ///
    /// If the target was never loaded, if a rule or generated file has no
    /// configuration, or if the prerequisite map has no entry for it.
    pub fn resolve(&self, attribute: &Attribute, label: &Label) -> Prerequisite {
        let target = match self.targets.loaded_target(label) {
            Ok(target) => target,
            Err(e) => panic!(
                "{}: {} of {} in attribute '{}' was not loaded: {e}",
                self.rule.location(),
                label,
                self.rule.label(),
                attribute.name()
            ),
        };
        let configuration =
            self.transition
                .configure(self.rule, self.configuration, attribute, &target);
        if configuration.is_none() && !matches!(target, Target::InputFile(_)) {
            panic!(
                "{}: no configuration for {} {} in attribute '{}' of {}",
                self.rule.location(),
                target.target_kind(),
                label,
                attribute.name(),
                self.rule.label()
            );
        }
        let Some(configured) = self.prerequisites.get(label, configuration.as_ref()) else {
            panic!(
                "{}: prerequisite {} in configuration {} of attribute '{}' of {} was not analyzed",
                self.rule.location(),
                label,
                configuration
                    .as_ref()
                    .map_or_else(|| "<none>".to_string(), |c| c.to_string()),
                attribute.name(),
                self.rule.label()
            );
        };
        tracing::trace!(
            rule = %self.rule.label(),
            attribute = attribute.name(),
            label = %label,
            configuration = configuration.as_ref().map(|c| c.short_name()).unwrap_or("<none>"),
            "Resolved prerequisite"
        );
        Prerequisite::new(target, Arc::clone(configured))
    }
}

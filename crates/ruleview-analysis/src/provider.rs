//! Providers: the capabilities an analyzed target exposes to its dependents.
//!
//! The set of provider kinds is closed. Typed lookup goes through
//! [`ProviderLike`], so `collection.get::<FileProvider>()` returns
//! `Option<&FileProvider>` without any downcasting.

use std::collections::BTreeMap;
use std::sync::Arc;

use ruleview_types::{Label, PackageSpecification};
use serde::Serialize;

use crate::artifact::Artifact;
use crate::configuration::Configuration;

/// The artifacts a target builds by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileProvider {
    files_to_build: Vec<Artifact>,
}

impl FileProvider {
    pub fn new(files_to_build: Vec<Artifact>) -> Self {
        Self { files_to_build }
    }

    pub fn files_to_build(&self) -> &[Artifact] {
        &self.files_to_build
    }
}

/// An executable together with everything it needs at run time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilesToRunProvider {
    executable: Option<Artifact>,
    runfiles: Vec<Artifact>,
    runfiles_middleman: Option<Artifact>,
}

impl FilesToRunProvider {
    pub fn new(executable: Option<Artifact>, runfiles: Vec<Artifact>) -> Self {
        Self {
            executable,
            runfiles,
            runfiles_middleman: None,
        }
    }

    pub fn with_runfiles_middleman(mut self, middleman: Artifact) -> Self {
        self.runfiles_middleman = Some(middleman);
        self
    }

    pub fn executable(&self) -> Option<&Artifact> {
        self.executable.as_ref()
    }

    pub fn runfiles(&self) -> &[Artifact] {
        &self.runfiles
    }

    pub fn runfiles_middleman(&self) -> Option<&Artifact> {
        self.runfiles_middleman.as_ref()
    }
}

/// The packages allowed to depend on a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisibilityProvider {
    visibility: Vec<PackageSpecification>,
}

impl VisibilityProvider {
    pub fn new(visibility: Vec<PackageSpecification>) -> Self {
        Self { visibility }
    }

    pub fn public() -> Self {
        Self::new(vec![PackageSpecification::Everything])
    }

    pub fn visibility(&self) -> &[PackageSpecification] {
        &self.visibility
    }
}

/// Marks a target whose outputs form a fileset directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesetProvider {
    output_directory: Artifact,
}

impl FilesetProvider {
    pub fn new(output_directory: Artifact) -> Self {
        Self { output_directory }
    }

    pub fn output_directory(&self) -> &Artifact {
        &self.output_directory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Files,
    FilesToRun,
    Visibility,
    Fileset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provider {
    Files(FileProvider),
    FilesToRun(FilesToRunProvider),
    Visibility(VisibilityProvider),
    Fileset(FilesetProvider),
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Files(_) => ProviderKind::Files,
            Provider::FilesToRun(_) => ProviderKind::FilesToRun,
            Provider::Visibility(_) => ProviderKind::Visibility,
            Provider::Fileset(_) => ProviderKind::Fileset,
        }
    }
}

/// A concrete provider type that can be looked up in a [`ProviderCollection`].
pub trait ProviderLike: Sized {
    const KIND: ProviderKind;

    fn from_provider(provider: &Provider) -> Option<&Self>;
    fn into_provider(self) -> Provider;
}

impl ProviderLike for FileProvider {
    const KIND: ProviderKind = ProviderKind::Files;

    fn from_provider(provider: &Provider) -> Option<&Self> {
        match provider {
            Provider::Files(p) => Some(p),
            _ => None,
        }
    }

    fn into_provider(self) -> Provider {
        Provider::Files(self)
    }
}

impl ProviderLike for FilesToRunProvider {
    const KIND: ProviderKind = ProviderKind::FilesToRun;

    fn from_provider(provider: &Provider) -> Option<&Self> {
        match provider {
            Provider::FilesToRun(p) => Some(p),
            _ => None,
        }
    }

    fn into_provider(self) -> Provider {
        Provider::FilesToRun(self)
    }
}

impl ProviderLike for VisibilityProvider {
    const KIND: ProviderKind = ProviderKind::Visibility;

    fn from_provider(provider: &Provider) -> Option<&Self> {
        match provider {
            Provider::Visibility(p) => Some(p),
            _ => None,
        }
    }

    fn into_provider(self) -> Provider {
        Provider::Visibility(self)
    }
}

impl ProviderLike for FilesetProvider {
    const KIND: ProviderKind = ProviderKind::Fileset;

    fn from_provider(provider: &Provider) -> Option<&Self> {
        match provider {
            Provider::Fileset(p) => Some(p),
            _ => None,
        }
    }

    fn into_provider(self) -> Provider {
        Provider::Fileset(self)
    }
}

/// At most one provider per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderCollection {
    providers: BTreeMap<ProviderKind, Provider>,
}

impl ProviderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<P: ProviderLike>(mut self, provider: P) -> Self {
        self.insert(provider);
        self
    }

    /// Adds a provider, replacing any previous provider of the same kind.
    pub fn insert<P: ProviderLike>(&mut self, provider: P) {
        self.providers.insert(P::KIND, provider.into_provider());
    }

    pub fn get<P: ProviderLike>(&self) -> Option<&P> {
        self.providers.get(&P::KIND).and_then(P::from_provider)
    }

    pub fn get_kind(&self, kind: ProviderKind) -> Option<&Provider> {
        self.providers.get(&kind)
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.providers.keys().copied()
    }
}

/// The result of analyzing one target in one configuration.
///
/// Input files are analyzed without a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfiguredTarget {
    label: Label,
    #[serde(skip)]
    configuration: Option<Arc<Configuration>>,
    providers: ProviderCollection,
}

impl ConfiguredTarget {
    pub fn new(
        label: Label,
        configuration: Option<Arc<Configuration>>,
        providers: ProviderCollection,
    ) -> Self {
        Self {
            label,
            configuration,
            providers,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn configuration(&self) -> Option<&Arc<Configuration>> {
        self.configuration.as_ref()
    }

    pub fn provider<P: ProviderLike>(&self) -> Option<&P> {
        self.providers.get::<P>()
    }

    pub fn providers(&self) -> &ProviderCollection {
        &self.providers
    }
}

//! The environment a rule is analyzed in: where diagnostics go, where derived
//! artifacts come from, and where actions are registered.

use std::cell::RefCell;
use std::collections::HashSet;

use ruleview_types::Label;

use crate::artifact::{Action, Artifact, Root};
use crate::diagnostics::{Diagnostic, Diagnostics};

pub trait AnalysisEnvironment {
    fn diagnostics(&self) -> &Diagnostics;

    /// The derived artifact at `root_relative_path` under `root`.
    fn derived_artifact(&self, root_relative_path: &str, root: &Root) -> Artifact;

    fn register_action(&self, action: Action);

    fn has_errors(&self) -> bool {
        self.diagnostics().has_errors()
    }
}

/// Records everything a single rule's analysis produces.
///
/// Asking twice for the same derived artifact returns the same artifact.
#[derive(Debug)]
pub struct CachingAnalysisEnvironment {
    owner: Label,
    diagnostics: Diagnostics,
    artifacts: RefCell<DerivedArtifacts>,
    actions: RefCell<Vec<Action>>,
}

/// Derived artifacts in creation order, indexed by identity.
#[derive(Debug, Default)]
struct DerivedArtifacts {
    ordered: Vec<Artifact>,
    index: HashSet<Artifact>,
}

impl DerivedArtifacts {
    fn intern(&mut self, artifact: Artifact) -> Artifact {
        if let Some(existing) = self.index.get(&artifact) {
            return existing.clone();
        }
        self.index.insert(artifact.clone());
        self.ordered.push(artifact.clone());
        artifact
    }
}

/// What an analysis run left behind once its environment is consumed.
#[derive(Debug, Default)]
pub struct AnalysisOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub artifacts: Vec<Artifact>,
    pub actions: Vec<Action>,
}

impl AnalysisOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == crate::diagnostics::Severity::Error)
    }
}

impl CachingAnalysisEnvironment {
    pub fn new(owner: Label) -> Self {
        Self {
            owner,
            diagnostics: Diagnostics::new(),
            artifacts: RefCell::new(DerivedArtifacts::default()),
            actions: RefCell::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> &Label {
        &self.owner
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.borrow().clone()
    }

    pub fn derived_artifacts(&self) -> Vec<Artifact> {
        self.artifacts.borrow().ordered.clone()
    }

    pub fn into_output(self) -> AnalysisOutput {
        AnalysisOutput {
            diagnostics: self.diagnostics.into_entries(),
            artifacts: self.artifacts.into_inner().ordered,
            actions: self.actions.into_inner(),
        }
    }
}

impl AnalysisEnvironment for CachingAnalysisEnvironment {
    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn derived_artifact(&self, root_relative_path: &str, root: &Root) -> Artifact {
        let artifact = Artifact::derived(root.clone(), root_relative_path, self.owner.clone());
        self.artifacts.borrow_mut().intern(artifact)
    }

    fn register_action(&self, action: Action) {
        tracing::debug!(
            owner = %action.owner.label,
            mnemonic = %action.mnemonic,
            outputs = action.outputs.len(),
            "Registered action"
        );
        self.actions.borrow_mut().push(action);
    }
}

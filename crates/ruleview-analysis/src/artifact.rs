//! Artifacts, their roots, and the actions that produce derived artifacts.

use std::fmt;

use ruleview_types::{Label, Location};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    Source,
    Bin,
    Genfiles,
}

/// The directory an artifact's root-relative path is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Root {
    kind: RootKind,
    exec_path: String,
}

impl Root {
    /// The workspace itself.
    pub fn source() -> Self {
        Self {
            kind: RootKind::Source,
            exec_path: String::new(),
        }
    }

    pub fn bin(exec_path: impl Into<String>) -> Self {
        Self {
            kind: RootKind::Bin,
            exec_path: exec_path.into(),
        }
    }

    pub fn genfiles(exec_path: impl Into<String>) -> Self {
        Self {
            kind: RootKind::Genfiles,
            exec_path: exec_path.into(),
        }
    }

    pub fn kind(&self) -> RootKind {
        self.kind
    }

    pub fn exec_path(&self) -> &str {
        &self.exec_path
    }

    pub fn is_source(&self) -> bool {
        self.kind == RootKind::Source
    }
}

/// A file known to the build: either a source file or the output of an action.
///
/// Two artifacts are the same when their root and root-relative path agree.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    root: Root,
    root_relative_path: String,
    owner: Label,
}

impl Artifact {
    /// The source artifact named by an input-file label.
    pub fn source(label: &Label) -> Self {
        Self {
            root: Root::source(),
            root_relative_path: label.workspace_relative_path(),
            owner: label.clone(),
        }
    }

    pub fn derived(root: Root, root_relative_path: impl Into<String>, owner: Label) -> Self {
        Self {
            root,
            root_relative_path: root_relative_path.into(),
            owner,
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn root_relative_path(&self) -> &str {
        &self.root_relative_path
    }

    /// Path relative to the execution root.
    pub fn exec_path(&self) -> String {
        if self.root.exec_path.is_empty() {
            self.root_relative_path.clone()
        } else {
            format!("{}/{}", self.root.exec_path, self.root_relative_path)
        }
    }

    pub fn filename(&self) -> &str {
        self.root_relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.root_relative_path)
    }

    pub fn owner(&self) -> &Label {
        &self.owner
    }

    pub fn is_source_artifact(&self) -> bool {
        self.root.is_source()
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.root_relative_path == other.root_relative_path
    }
}

impl Eq for Artifact {}

impl std::hash::Hash for Artifact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.root_relative_path.hash(state);
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_source_artifact() {
            write!(f, "{}", self.root_relative_path)
        } else {
            write!(f, "[{}]{}", self.root.exec_path, self.root_relative_path)
        }
    }
}

/// Who an action belongs to, for progress reporting and conflict detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOwner {
    pub label: Label,
    pub location: Location,
    pub configuration_name: String,
    pub configuration_mnemonic: String,
    pub configuration_short_cache_key: String,
    pub target_kind: String,
    /// `Some("host")` for actions analyzed in the host configuration.
    pub additional_progress_info: Option<String>,
}

/// A unit of work registered by a rule's analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub owner: ActionOwner,
    pub mnemonic: String,
    pub inputs: Vec<Artifact>,
    pub outputs: Vec<Artifact>,
    pub arguments: Vec<String>,
}

impl Action {
    pub fn new(owner: ActionOwner, mnemonic: impl Into<String>) -> Self {
        Self {
            owner,
            mnemonic: mnemonic.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            arguments: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = Artifact>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = Artifact>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }
}

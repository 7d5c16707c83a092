//! Per-rule analysis: dependency resolution, validation, and the rule context.
//!
//! For one rule in one configuration this crate resolves every dependency
//! label to an already analyzed target, validates it against the attribute
//! schema and the visibility policy, and exposes the result through
//! [`RuleContext`]. User errors become diagnostics; API misuse panics.

pub mod artifact;
pub mod configuration;
pub mod context;
pub mod dependency_map;
pub mod diagnostics;
pub mod environment;
pub mod file_type;
pub mod make_vars;
pub mod options;
pub mod prerequisite;
pub mod provider;
pub mod schema;
pub mod shell;
pub mod target;
pub mod validation;

pub use artifact::{Action, ActionOwner, Artifact, Root, RootKind};
pub use configuration::Configuration;
pub use context::{ImplicitOutputsFunction, RuleContext, RuleContextBuilder};
pub use dependency_map::{ConfiguredFilesetEntry, DependencyMap, FilesetEntryMap};
pub use diagnostics::{Diagnostic, Diagnostics, RuleErrorConsumer, Severity};
pub use environment::{AnalysisEnvironment, AnalysisOutput, CachingAnalysisEnvironment};
pub use file_type::{FileType, FileTypeSet};
pub use make_vars::{ExpansionError, MakeVariableContext};
pub use options::{AnalysisOptions, SrcsPackageCheck, VisibilityMode};
pub use prerequisite::{
    ConfigurationTransition, Prerequisite, PrerequisiteMap, PrerequisiteResolver, StandardTransitions,
    TargetProvider,
};
pub use provider::{
    ConfiguredTarget, FileProvider, FilesToRunProvider, FilesetProvider, Provider, ProviderCollection,
    ProviderKind, ProviderLike, VisibilityProvider,
};
pub use schema::{Attribute, AttributeType, Mode, RuleClass, RuleClassSet, Transition, ValidityPredicate};
pub use shell::TokenizationError;
pub use target::{AttributeValue, FilesetEntry, InputFile, LabelMap, OutputFile, Rule, Target};
pub use validation::{is_visible, AllowAll, PrerequisiteValidator, ValidationContext, VisibilityValidator};

//! Validation of direct prerequisites.
//!
//! Every dependency that ends up in a [`DependencyMap`](crate::DependencyMap)
//! passes through [`validate_direct_prerequisite`] first. Validation never
//! fails: problems are reported to the rule's diagnostics sink and analysis
//! carries on.

use std::sync::Arc;

use ruleview_types::Label;

use crate::configuration::Configuration;
use crate::diagnostics::{mask_attribute_name, Diagnostics, RuleErrorConsumer};
use crate::options::VisibilityMode;
use crate::prerequisite::Prerequisite;
use crate::provider::{ConfiguredTarget, FileProvider, VisibilityProvider};
use crate::schema::Attribute;
use crate::target::{Rule, Target};

// ---------------------------------------------------------------------------
// Validation context
// ---------------------------------------------------------------------------

/// What a validator can see while the dependency map is being built.
pub struct ValidationContext<'a> {
    rule: &'a Rule,
    configuration: &'a Arc<Configuration>,
    diagnostics: &'a Diagnostics,
}

impl<'a> ValidationContext<'a> {
    pub fn new(
        rule: &'a Rule,
        configuration: &'a Arc<Configuration>,
        diagnostics: &'a Diagnostics,
    ) -> Self {
        Self {
            rule,
            configuration,
            diagnostics,
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        self.configuration
    }

    /// Is `prerequisite` visible from the rule being analyzed?
    pub fn is_visible(&self, prerequisite: &ConfiguredTarget) -> bool {
        is_visible(self.rule, prerequisite)
    }
}

impl RuleErrorConsumer for ValidationContext<'_> {
    fn rule(&self) -> &Rule {
        self.rule
    }

    fn diagnostics(&self) -> &Diagnostics {
        self.diagnostics
    }
}

/// Does any visibility declaration of `prerequisite` admit the package of `rule`?
pub fn is_visible(rule: &Rule, prerequisite: &ConfiguredTarget) -> bool {
    prerequisite
        .provider::<VisibilityProvider>()
        .is_some_and(|v| {
            v.visibility()
                .iter()
                .any(|spec| spec.contains_package(rule.package()))
        })
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// The last check applied to every direct prerequisite.
pub trait PrerequisiteValidator: Send + Sync {
    fn validate(&self, context: &ValidationContext<'_>, prerequisite: &Prerequisite, attribute: &Attribute);
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PrerequisiteValidator for AllowAll {
    fn validate(&self, _: &ValidationContext<'_>, _: &Prerequisite, _: &Attribute) {}
}

/// Reports dependencies on targets that are not visible from the rule's package.
///
/// Dependencies within the same package are always visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityValidator {
    mode: VisibilityMode,
}

impl VisibilityValidator {
    pub fn new(mode: VisibilityMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> VisibilityMode {
        self.mode
    }
}

impl PrerequisiteValidator for VisibilityValidator {
    fn validate(&self, context: &ValidationContext<'_>, prerequisite: &Prerequisite, attribute: &Attribute) {
        if self.mode == VisibilityMode::Off {
            return;
        }
        let rule = context.rule();
        let label = prerequisite.label();
        if label.package() == rule.package() || context.is_visible(prerequisite.configured_target()) {
            return;
        }
        match self.mode {
            VisibilityMode::Error => context.attribute_error(
                attribute.name(),
                &format!(
                    "target '{label}' is not visible from target '{}'. Check the visibility \
                     declaration of the former target if you think the dependency is legitimate",
                    rule.label()
                ),
            ),
            VisibilityMode::Warn => context.attribute_warning(
                attribute.name(),
                &format!(
                    "target '{label}' violates visibility of target '{}'; continuing anyway",
                    rule.label()
                ),
            ),
            VisibilityMode::Off => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Structural checks
// ---------------------------------------------------------------------------

fn report_bad_prerequisite(
    context: &ValidationContext<'_>,
    attribute: &Attribute,
    target_kind: &str,
    label: &Label,
    reason: &str,
    is_warning: bool,
) {
    if is_warning {
        context.attribute_warning(
            attribute.name(),
            &format!("{target_kind} '{label}' is unexpected here ({reason}); continuing anyway"),
        );
    } else {
        context.attribute_error(
            attribute.name(),
            &format!("{target_kind} '{label}' is misplaced here ({reason})."),
        );
    }
}

fn validate_type(context: &ValidationContext<'_>, attribute: &Attribute, prerequisite: &Prerequisite) {
    let target = prerequisite.target();
    let label = target.label();

    if let (Target::Rule(to), Some(predicate)) = (target, attribute.validity()) {
        if let Some(reason) = predicate.check_valid(context.rule(), to) {
            report_bad_prerequisite(context, attribute, &target.target_kind(), label, &reason, false);
        }
    }

    if !attribute.is_strict() {
        return;
    }
    match target {
        Target::Rule(to) => {
            let rule_class = to.rule_class_name();
            if !attribute.allowed_rule_class_set().contains(rule_class) {
                let with_warning = attribute.allowed_rule_class_warning_set().contains(rule_class);
                report_bad_prerequisite(
                    context,
                    attribute,
                    &target.target_kind(),
                    label,
                    &format!("expected {}", attribute.allowed_rule_class_set()),
                    with_warning,
                );
            }
        }
        Target::InputFile(_) | Target::OutputFile(_) => {
            let allowed = attribute.allowed_file_type_set();
            let filename = target.filename().unwrap_or_default();
            if allowed.matches(filename) {
                return;
            }
            match target {
                Target::InputFile(file) if !file.exists() => {
                    if allowed.is_none() && !filename.contains('.') {
                        context.attribute_error(
                            attribute.name(),
                            &format!("rule '{label}' does not exist"),
                        );
                    } else {
                        context.attribute_error(
                            attribute.name(),
                            &format!("target '{label}' does not exist"),
                        );
                    }
                }
                _ => report_bad_prerequisite(
                    context,
                    attribute,
                    "file",
                    label,
                    &format!("expected {allowed}"),
                    false,
                ),
            }
        }
    }
}

fn validate_file_types(context: &ValidationContext<'_>, attribute: &Attribute, prerequisite: &Prerequisite) {
    if attribute.skips_analysis_time_file_type_check() {
        return;
    }
    let allowed = attribute.allowed_file_type_set();
    if allowed.is_any() && !attribute.is_non_empty() && !attribute.is_single_artifact() {
        return;
    }
    if allowed.is_none() {
        return;
    }
    let Some(files) = prerequisite.provider::<FileProvider>() else {
        return;
    };
    let label = prerequisite.label();
    let artifacts = files.files_to_build();
    if attribute.is_single_artifact() && artifacts.len() != 1 {
        context.attribute_error(attribute.name(), &format!("'{label}' must produce a single file"));
        return;
    }
    if artifacts.iter().any(|a| allowed.matches(a.filename())) {
        return;
    }
    context.attribute_error(
        attribute.name(),
        &format!(
            "'{label}' does not produce any {} {} files (expected {allowed})",
            context.rule().rule_class_name(),
            mask_attribute_name(attribute.name())
        ),
    );
}

/// Run every check on one direct prerequisite, then hand it to `policy`.
pub fn validate_direct_prerequisite(
    context: &ValidationContext<'_>,
    attribute: &Attribute,
    prerequisite: &Prerequisite,
    policy: &dyn PrerequisiteValidator,
) {
    validate_type(context, attribute, prerequisite);
    validate_file_types(context, attribute, prerequisite);
    policy.validate(context, prerequisite, attribute);
}

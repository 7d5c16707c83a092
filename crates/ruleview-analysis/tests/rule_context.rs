//! End-to-end tests for rule context construction and its query API.
//!
//! Each test loads a small workspace, builds a `RuleContext` for `//p:lib`
//! and inspects the dependency view and the diagnostics it produced.

use std::collections::HashMap;
use std::sync::Arc;

use ruleview_analysis::{
    Action, AnalysisEnvironment, Artifact, Attribute, AttributeType, AttributeValue,
    CachingAnalysisEnvironment, Configuration, ConfigurationTransition, ConfiguredFilesetEntry,
    ConfiguredTarget, FileProvider, FileTypeSet, FilesToRunProvider, FilesetEntry, FilesetProvider,
    InputFile, Mode, OutputFile, PrerequisiteMap, ProviderCollection, ProviderKind, Root, Rule,
    RuleClass, RuleClassSet, RuleContext, Severity, StandardTransitions, Target, TargetProvider,
    Transition, VisibilityMode, VisibilityProvider, VisibilityValidator,
};
use ruleview_types::{Label, Location, PackageSpecification, RuleViewError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn label(s: &str) -> Label {
    Label::parse(s).expect("test label")
}

fn labels(ls: &[&str]) -> AttributeValue {
    AttributeValue::LabelList(ls.iter().map(|l| label(l)).collect())
}

fn bin_artifact(path: &str, owner: &str) -> Artifact {
    Artifact::derived(Root::bin("ruleview-out/k8-fastbuild/bin"), path, label(owner))
}

fn files(owner: &str, paths: &[&str]) -> FileProvider {
    FileProvider::new(paths.iter().map(|p| bin_artifact(p, owner)).collect())
}

fn plain_class(name: &str) -> Arc<RuleClass> {
    RuleClass::builder(name).build().expect("plain rule class")
}

fn subject_class(name: &str, binary_output: bool) -> Arc<RuleClass> {
    RuleClass::builder(name)
        .attr(Attribute::new("srcs", AttributeType::LabelList))
        .attr(
            Attribute::new("hdrs", AttributeType::LabelList)
                .allowed_file_types(FileTypeSet::of([".h"]).expect("header types")),
        )
        .attr(
            Attribute::new("deps", AttributeType::LabelList)
                .allowed_rule_classes(RuleClassSet::of(["cc_library"]))
                .allowed_rule_classes_with_warning(RuleClassSet::of(["java_library"])),
        )
        .attr(Attribute::new("abi_deps", AttributeType::LabelList))
        .attr(
            Attribute::new("implementation_deps", AttributeType::LabelList)
                .allowed_rule_classes(RuleClassSet::of(["cc_library"]))
                .silent_rule_class_filter(),
        )
        .attr(Attribute::new("src", AttributeType::Label).single_artifact())
        .attr(
            Attribute::new("compiler", AttributeType::Label)
                .cfg(Transition::Host)
                .executable()
                .default_value(AttributeValue::Label(Some(label("//tools:cc")))),
        )
        .attr(Attribute::new("data", AttributeType::LabelList).cfg(Transition::Data))
        .attr(Attribute::new("copts", AttributeType::StringList))
        .attr(Attribute::new("owner", AttributeType::NodepLabel))
        .attr(Attribute::new("entries", AttributeType::FilesetEntryList))
        .mutually_exclusive("abi_deps", "deps")
        .binary_output(binary_output)
        .build()
        .expect("subject rule class")
}

fn subject(attrs: Vec<(&str, AttributeValue)>) -> Arc<Rule> {
    subject_of(subject_class("cc_library", true), attrs)
}

fn subject_of(class: Arc<RuleClass>, attrs: Vec<(&str, AttributeValue)>) -> Arc<Rule> {
    let mut rule = Rule::new(label("//p:lib"), class, Location::new("p/BUILD", 1, 1));
    for (name, value) in attrs {
        rule.set_attribute(name, value).expect("valid attribute");
        rule.set_attribute_location(name, Location::new("p/BUILD", 2, 5));
    }
    Arc::new(rule)
}

fn messages(env: &CachingAnalysisEnvironment, severity: Severity) -> Vec<String> {
    env.diagnostics()
        .entries()
        .into_iter()
        .filter(|d| d.severity == severity)
        .map(|d| d.message)
        .collect()
}

fn errors(env: &CachingAnalysisEnvironment) -> Vec<String> {
    messages(env, Severity::Error)
}

fn warnings(env: &CachingAnalysisEnvironment) -> Vec<String> {
    messages(env, Severity::Warning)
}

fn dependency_labels(ctx: &RuleContext<'_>, attribute: &str, mode: Mode) -> Vec<String> {
    ctx.prerequisites(attribute, mode)
        .iter()
        .map(|p| p.label().to_string())
        .collect()
}

/// Loaded targets and their analyses in a target and a host configuration.
struct Workspace {
    targets: HashMap<Label, Target>,
    prerequisites: PrerequisiteMap,
    target: Arc<Configuration>,
    host: Arc<Configuration>,
    transitions: StandardTransitions,
}

impl TargetProvider for Workspace {
    fn loaded_target(&self, label: &Label) -> ruleview_types::Result<Target> {
        self.targets
            .get(label)
            .cloned()
            .ok_or_else(|| RuleViewError::NoSuchTarget {
                label: label.to_string(),
            })
    }
}

impl Workspace {
    fn new() -> Self {
        let target = Arc::new(
            Configuration::new("target", "k8-fastbuild").with_make_variable("CC", "gcc"),
        );
        let host = Arc::new(Configuration::host("host", "host"));
        let mut ws = Self {
            targets: HashMap::new(),
            prerequisites: PrerequisiteMap::new(),
            transitions: StandardTransitions::new(Arc::clone(&host)),
            target,
            host,
        };
        ws.analyzed_rule(
            "cc_toolchain",
            "//tools:cc",
            ProviderCollection::new().with(FilesToRunProvider::new(
                Some(bin_artifact("tools/cc", "//tools:cc")),
                vec![],
            )),
        );
        ws
    }

    fn source(&mut self, l: &str) -> Label {
        self.input_file(InputFile::new(label(l), Location::file("BUILD")))
    }

    fn input_file(&mut self, file: InputFile) -> Label {
        let l = file.label().clone();
        self.prerequisites.insert(ConfiguredTarget::new(
            l.clone(),
            None,
            ProviderCollection::new()
                .with(FileProvider::new(vec![Artifact::source(&l)]))
                .with(VisibilityProvider::public()),
        ));
        self.targets.insert(l.clone(), Target::InputFile(file));
        l
    }

    /// A rule of class `class`, analyzed in both configurations with `providers`.
    fn analyzed_rule(&mut self, class: &str, l: &str, mut providers: ProviderCollection) -> Label {
        let l = label(l);
        if !providers.contains(ProviderKind::Visibility) {
            providers.insert(VisibilityProvider::public());
        }
        let rule = Rule::new(l.clone(), plain_class(class), Location::file("BUILD"));
        self.targets.insert(l.clone(), Target::Rule(Arc::new(rule)));
        for config in [&self.target, &self.host] {
            self.prerequisites.insert(ConfiguredTarget::new(
                l.clone(),
                Some(Arc::clone(config)),
                providers.clone(),
            ));
        }
        l
    }

    fn output_file(&mut self, l: &str, generating_rule: &str) -> Label {
        let l = label(l);
        let file = OutputFile::new(l.clone(), label(generating_rule), Location::file("BUILD"));
        let path = l.workspace_relative_path();
        self.targets.insert(l.clone(), Target::OutputFile(file));
        self.prerequisites.insert(ConfiguredTarget::new(
            l.clone(),
            Some(Arc::clone(&self.target)),
            ProviderCollection::new()
                .with(files(generating_rule, &[path.as_str()]))
                .with(VisibilityProvider::public()),
        ));
        l
    }

    fn analyze<'a>(&'a self, env: &'a CachingAnalysisEnvironment, rule: Arc<Rule>) -> RuleContext<'a> {
        self.analyze_in(env, rule, Arc::clone(&self.target))
    }

    fn analyze_in<'a>(
        &'a self,
        env: &'a CachingAnalysisEnvironment,
        rule: Arc<Rule>,
        configuration: Arc<Configuration>,
    ) -> RuleContext<'a> {
        RuleContext::builder(env, self, rule, configuration)
            .transition(&self.transitions)
            .prerequisites(&self.prerequisites)
            .build()
    }
}

fn env() -> CachingAnalysisEnvironment {
    CachingAnalysisEnvironment::new(label("//p:lib"))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn srcs_from_another_package_are_reported_once() {
    let mut ws = Workspace::new();
    ws.source("//p:a.txt");
    ws.source("//q:b.txt");
    let rule = subject(vec![("srcs", labels(&["//p:a.txt", "//q:b.txt"]))]);
    let env = env();
    let ctx = ws.analyze(&env, rule);
    assert!(!ctx.has_errors());

    ctx.check_srcs_same_package(false);

    let errors = errors(&env);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("//q:b.txt"));
    assert!(errors[0].starts_with("in srcs attribute of cc_library rule //p:lib: please do not import"));
}

#[test]
fn srcs_from_another_package_can_be_warnings() {
    let mut ws = Workspace::new();
    ws.source("//q:b.txt");
    let rule = subject(vec![("srcs", labels(&["//q:b.txt"]))]);
    let env = env();
    let ctx = ws.analyze(&env, rule);
    ctx.check_srcs_same_package(true);
    assert!(errors(&env).is_empty());
    assert_eq!(warnings(&env).len(), 1);
}

#[test]
fn single_artifact_attribute_rejects_two_files() {
    let mut ws = Workspace::new();
    ws.analyzed_rule(
        "genrule",
        "//q:gen",
        ProviderCollection::new().with(files("//q:gen", &["q/one", "q/two"])),
    );
    let rule = subject(vec![("src", AttributeValue::Label(Some(label("//q:gen"))))]);
    let env = env();
    let _ctx = ws.analyze(&env, rule);

    let errors = errors(&env);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("//q:gen"));
    assert!(errors[0].contains("must produce a single file"));
}

#[test]
fn skipped_file_type_check_keeps_multi_file_dependency() {
    let mut ws = Workspace::new();
    ws.analyzed_rule(
        "genrule",
        "//q:gen",
        ProviderCollection::new().with(files("//q:gen", &["q/one", "q/two"])),
    );
    let class = RuleClass::builder("cc_library")
        .attr(
            Attribute::new("generated", AttributeType::Label)
                .single_artifact()
                .skip_analysis_time_file_type_check(),
        )
        .build()
        .expect("rule class with unchecked attribute");
    let rule = subject_of(class, vec![("generated", AttributeValue::Label(Some(label("//q:gen"))))]);
    let env = env();
    let ctx = ws.analyze(&env, rule);

    assert!(env.diagnostics().is_empty());
    assert_eq!(dependency_labels(&ctx, "generated", Mode::Target), ["//q:gen"]);
    assert_eq!(ctx.prerequisite_artifacts("generated", Mode::Target).len(), 2);
}

struct NoConfiguration;

impl ConfigurationTransition for NoConfiguration {
    fn configure(
        &self,
        _: &Rule,
        _: &Arc<Configuration>,
        _: &Attribute,
        _: &Target,
    ) -> Option<Arc<Configuration>> {
        None
    }
}

#[test]
#[should_panic(expected = "no configuration for")]
fn rule_dependency_without_configuration_panics() {
    let mut ws = Workspace::new();
    ws.analyzed_rule("cc_library", "//q:dep", ProviderCollection::new());
    let rule = subject(vec![("deps", labels(&["//q:dep"]))]);
    let env = env();
    RuleContext::builder(&env, &ws, rule, Arc::clone(&ws.target))
        .transition(&NoConfiguration)
        .prerequisites(&ws.prerequisites)
        .build();
}

#[test]
fn input_file_without_configuration_is_fine() {
    let mut ws = Workspace::new();
    ws.source("//p:a.txt");
    let rule = subject_of(
        RuleClass::builder("filegroup")
            .attr(Attribute::new("srcs", AttributeType::LabelList))
            .build()
            .unwrap(),
        vec![("srcs", labels(&["//p:a.txt"]))],
    );
    let env = env();
    let ctx = RuleContext::builder(&env, &ws, rule, Arc::clone(&ws.target))
        .transition(&NoConfiguration)
        .prerequisites(&ws.prerequisites)
        .build();
    assert_eq!(dependency_labels(&ctx, "srcs", Mode::Target), ["//p:a.txt"]);
}

// ---------------------------------------------------------------------------
// Modes and ordering
// ---------------------------------------------------------------------------

#[test]
#[should_panic(expected = "cc_library attribute srcs is not configured for the host configuration")]
fn mode_mismatch_panics() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    ctx.prerequisites("srcs", Mode::Host);
}

#[test]
#[should_panic(expected = "cc_library attribute compiler is not configured for the target configuration")]
fn host_attribute_queried_as_target_panics() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    ctx.prerequisite("compiler", Mode::Target);
}

#[test]
#[should_panic(expected = "attribute nope is not defined")]
fn undeclared_attribute_panics() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    ctx.prerequisites("nope", Mode::Target);
}

#[test]
fn matching_modes_are_accepted() {
    let mut ws = Workspace::new();
    ws.source("//p:data.txt");
    let rule = subject(vec![("data", labels(&["//p:data.txt"]))]);
    let env = env();
    let ctx = ws.analyze(&env, rule);
    assert!(ctx.prerequisites("srcs", Mode::Target).is_empty());
    assert_eq!(dependency_labels(&ctx, "data", Mode::Data), ["//p:data.txt"]);
    let compiler = ctx.prerequisite("compiler", Mode::Host).expect("default compiler");
    assert_eq!(compiler.configuration().map(|c| c.short_name()), Some("host"));
}

#[test]
fn dependencies_keep_declaration_order() {
    let mut ws = Workspace::new();
    for l in ["//p:c.cc", "//p:a.cc", "//p:b.cc"] {
        ws.source(l);
    }
    let rule = subject(vec![("srcs", labels(&["//p:c.cc", "//p:a.cc", "//p:b.cc"]))]);
    let env = env();
    let ctx = ws.analyze(&env, rule);
    assert_eq!(
        dependency_labels(&ctx, "srcs", Mode::Target),
        ["//p:c.cc", "//p:a.cc", "//p:b.cc"]
    );
    let attributes: Vec<_> = ctx.dependency_map().attributes().collect();
    assert_eq!(attributes, ["compiler", "srcs"]);
}

#[test]
fn silent_rule_class_filter_drops_without_diagnostics() {
    let mut ws = Workspace::new();
    ws.analyzed_rule("java_library", "//q:java", ProviderCollection::new());
    ws.analyzed_rule("cc_library", "//q:cc2", ProviderCollection::new());
    ws.analyzed_rule("cc_library", "//q:cc1", ProviderCollection::new());
    ws.source("//q:file.cc");
    let rule = subject(vec![(
        "implementation_deps",
        labels(&["//q:cc2", "//q:java", "//q:file.cc", "//q:cc1"]),
    )]);
    let env = env();
    let ctx = ws.analyze(&env, rule);
    assert_eq!(
        dependency_labels(&ctx, "implementation_deps", Mode::Target),
        ["//q:cc2", "//q:cc1"]
    );
    assert!(env.diagnostics().is_empty());
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn disallowed_rule_classes_report_once_per_dependency() {
    let mut ws = Workspace::new();
    ws.analyzed_rule("java_library", "//q:java", ProviderCollection::new());
    ws.analyzed_rule("py_library", "//q:py", ProviderCollection::new());
    ws.analyzed_rule("sh_library", "//q:sh", ProviderCollection::new());
    ws.analyzed_rule("cc_library", "//q:cc", ProviderCollection::new());
    let rule = subject(vec![("deps", labels(&["//q:java", "//q:py", "//q:sh", "//q:cc"]))]);
    let env = env();
    let ctx = ws.analyze(&env, rule);

    let errors = errors(&env);
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors[0].contains("py_library rule '//q:py' is misplaced here (expected cc_library)."));
    assert!(errors[1].contains("sh_library rule '//q:sh' is misplaced here"));
    let warnings = warnings(&env);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("java_library rule '//q:java' is unexpected here"));
    // Reported dependencies stay in the map.
    assert_eq!(ctx.prerequisites("deps", Mode::Target).len(), 4);
}

#[test]
fn header_with_wrong_extension_is_misplaced() {
    let mut ws = Workspace::new();
    ws.source("//p:notes.txt");
    ws.input_file(InputFile::missing(label("//p:gone.txt"), Location::file("p/BUILD")));
    let rule = subject(vec![("hdrs", labels(&["//p:notes.txt", "//p:gone.txt"]))]);
    let env = env();
    let _ctx = ws.analyze(&env, rule);
    let errors = errors(&env);
    assert!(errors.iter().any(|e| e.contains("file '//p:notes.txt' is misplaced here (expected .h).")));
    assert!(errors.iter().any(|e| e.ends_with("target '//p:gone.txt' does not exist")));
}

#[test]
fn exclusive_attributes_report_a_single_error() {
    let mut ws = Workspace::new();
    ws.analyzed_rule("cc_library", "//q:cc", ProviderCollection::new());
    let rule = subject(vec![
        ("deps", labels(&["//q:cc"])),
        ("abi_deps", labels(&["//q:cc"])),
    ]);
    let env = env();
    let _ctx = ws.analyze(&env, rule);
    assert_eq!(
        errors(&env),
        ["in deps attribute of cc_library rule //p:lib: Only one of deps and abi_deps should be provided"]
    );
}

#[test]
fn visibility_policy_runs_last() {
    let mut ws = Workspace::new();
    ws.analyzed_rule(
        "cc_library",
        "//q:secret",
        ProviderCollection::new().with(VisibilityProvider::new(vec![PackageSpecification::Nothing])),
    );
    ws.analyzed_rule(
        "cc_library",
        "//q:friendly",
        ProviderCollection::new().with(VisibilityProvider::new(vec![PackageSpecification::Package(
            "p".into(),
        )])),
    );
    let rule = subject(vec![("deps", labels(&["//q:secret", "//q:friendly"]))]);
    let env = env();
    let validator = VisibilityValidator::new(VisibilityMode::Error);
    let ctx = RuleContext::builder(&env, &ws, rule, Arc::clone(&ws.target))
        .validator(&validator)
        .transition(&ws.transitions)
        .prerequisites(&ws.prerequisites)
        .build();
    let errors = errors(&env);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("target '//q:secret' is not visible from target '//p:lib'"));
    let friendly = &ctx.prerequisites("deps", Mode::Target)[1];
    assert!(ctx.is_visible(friendly.configured_target()));
}

// ---------------------------------------------------------------------------
// Query API
// ---------------------------------------------------------------------------

#[test]
fn prerequisite_artifacts_are_deduplicated_in_first_seen_order() {
    let mut ws = Workspace::new();
    ws.analyzed_rule(
        "genrule",
        "//q:g1",
        ProviderCollection::new().with(files("//q:g1", &["q/a", "q/b"])),
    );
    ws.analyzed_rule(
        "genrule",
        "//q:g2",
        ProviderCollection::new().with(files("//q:g2", &["q/b", "q/c"])),
    );
    let rule = subject(vec![("srcs", labels(&["//q:g1", "//q:g2"]))]);
    let env = env();
    let ctx = ws.analyze(&env, rule);
    let paths: Vec<_> = ctx
        .prerequisite_artifacts("srcs", Mode::Target)
        .iter()
        .map(|a| a.root_relative_path().to_string())
        .collect();
    assert_eq!(paths, ["q/a", "q/b", "q/c"]);

    let only_c = ctx.prerequisite_artifacts_of_type("srcs", Mode::Target, &FileTypeSet::of(["c"]).unwrap());
    assert_eq!(only_c.len(), 1);
    assert_eq!(ctx.providers::<FileProvider>("srcs", Mode::Target).len(), 2);
}

#[test]
fn single_source() {
    let mut ws = Workspace::new();
    ws.source("//p:a.cc");
    ws.source("//p:b.cc");

    let env_empty = env();
    let ctx = ws.analyze(&env_empty, subject(vec![]));
    assert!(ctx.single_source(None).is_none());
    assert!(env_empty.diagnostics().is_empty());

    let env_two = env();
    let ctx = ws.analyze(&env_two, subject(vec![("srcs", labels(&["//p:a.cc", "//p:b.cc"]))]));
    let first = ctx.single_source(None).expect("first source");
    assert_eq!(first.exec_path(), "p/a.cc");
    assert_eq!(
        errors(&env_two),
        ["in srcs attribute of cc_library rule //p:lib: only a single cc_library source file is allowed here"]
    );

    let env_kind = env();
    let ctx = ws.analyze(&env_kind, subject(vec![("srcs", labels(&["//p:a.cc", "//p:b.cc"]))]));
    ctx.single_source(Some("C++ file"));
    assert!(errors(&env_kind)[0].ends_with("only a single C++ file is allowed here"));
}

#[test]
fn prerequisite_artifact_requires_a_single_file() {
    let mut ws = Workspace::new();
    ws.analyzed_rule("genrule", "//q:one", ProviderCollection::new().with(files("//q:one", &["q/x"])));
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![("src", AttributeValue::Label(Some(label("//q:one"))))]));
    assert_eq!(
        ctx.prerequisite_artifact("src", Mode::Target).map(|a| a.root_relative_path().to_string()),
        Some("q/x".to_string())
    );
    assert!(!ctx.has_errors());
}

#[test]
fn executable_prerequisite_must_be_runnable() {
    let mut ws = Workspace::new();
    ws.analyzed_rule(
        "genrule",
        "//q:notexe",
        ProviderCollection::new().with(files("//q:notexe", &["q/data"])),
    );
    let rule = subject(vec![("compiler", AttributeValue::Label(Some(label("//q:notexe"))))]);
    let env = env();
    let ctx = ws.analyze(&env, rule);
    assert!(ctx.executable_prerequisite("compiler", Mode::Host).is_none());
    assert_eq!(
        errors(&env),
        ["in compiler attribute of cc_library rule //p:lib: //q:notexe does not refer to a valid executable target"]
    );
}

#[test]
fn compiler_warns_when_overridden() {
    let mut ws = Workspace::new();
    ws.analyzed_rule(
        "cc_toolchain",
        "//q:mycc",
        ProviderCollection::new().with(FilesToRunProvider::new(Some(bin_artifact("q/mycc", "//q:mycc")), vec![])),
    );

    let env_default = env();
    let ctx = ws.analyze(&env_default, subject(vec![]));
    let compiler = ctx.compiler(true).expect("default compiler");
    assert_eq!(compiler.executable().map(Artifact::filename), Some("cc"));
    assert!(env_default.diagnostics().is_empty());

    let env_custom = env();
    let ctx = ws.analyze(
        &env_custom,
        subject(vec![("compiler", AttributeValue::Label(Some(label("//q:mycc"))))]),
    );
    assert!(ctx.compiler(true).is_some());
    assert_eq!(
        warnings(&env_custom),
        ["in compiler attribute of cc_library rule //p:lib: setting the compiler is strongly discouraged"]
    );
    assert!(ctx.compiler(false).is_some());
    assert_eq!(warnings(&env_custom).len(), 1);
}

#[test]
fn local_nodep_label_warns_for_foreign_package() {
    let ws = Workspace::new();
    let env_local = env();
    let ctx = ws.analyze(
        &env_local,
        subject(vec![("owner", AttributeValue::NodepLabel(Some(label("//p:other"))))]),
    );
    assert_eq!(ctx.local_nodep_label_attribute("owner"), Some(label("//p:other")));
    assert!(env_local.diagnostics().is_empty());

    let env_foreign = env();
    let ctx = ws.analyze(
        &env_foreign,
        subject(vec![("owner", AttributeValue::NodepLabel(Some(label("//q:other"))))]),
    );
    assert_eq!(ctx.local_nodep_label_attribute("owner"), Some(label("//q:other")));
    assert_eq!(
        warnings(&env_foreign),
        ["in owner attribute of cc_library rule //p:lib: does not reference a local rule"]
    );
}

// ---------------------------------------------------------------------------
// Make variables and tokenization
// ---------------------------------------------------------------------------

#[test]
fn failed_expansion_returns_original_and_reports_once() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    assert_eq!(ctx.expand_make_variables("copts", "$(CC) -O2"), "gcc -O2");
    assert!(env.diagnostics().is_empty());

    assert_eq!(ctx.expand_make_variables("copts", "$(NOPE) -O2"), "$(NOPE) -O2");
    assert_eq!(
        errors(&env),
        ["in copts attribute of cc_library rule //p:lib: $(NOPE) not defined"]
    );
}

#[test]
fn custom_variable_lookup() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    let custom = std::collections::BTreeMap::from([("OUT".to_string(), "x.o".to_string())]);
    assert_eq!(ctx.expand_make_variables_with("copts", "-o $(OUT)", &custom), "-o x.o");
}

#[test]
fn single_make_variable() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    assert_eq!(ctx.expand_single_make_variable("copts", "$(CC)"), Some("gcc".to_string()));
    assert_eq!(ctx.expand_single_make_variable("copts", "-O2"), None);
    assert!(env.diagnostics().is_empty());
    assert_eq!(ctx.expand_single_make_variable("copts", "$(CC"), Some("$(CC".to_string()));
    assert_eq!(errors(&env).len(), 1);
}

#[test]
fn tokenized_string_list_keeps_partial_tokens() {
    let ws = Workspace::new();
    let env = env();
    let copts = AttributeValue::StringList(vec![
        "-DA='x y' -O$(CC)".to_string(),
        "-g 'unterminated".to_string(),
    ]);
    let ctx = ws.analyze(&env, subject(vec![("copts", copts)]));
    assert_eq!(ctx.tokenized_string_list_attr("copts"), ["-DA=x y", "-Ogcc", "-g"]);
    assert_eq!(
        errors(&env),
        ["in copts attribute of cc_library rule //p:lib: unterminated quotation"]
    );
    assert!(ctx.tokenized_string_list_attr("srcs").is_empty());
    assert_eq!(
        ctx.expanded_make_variables_list("copts"),
        ["-DA='x y' -Ogcc", "-g 'unterminated"]
    );
}

// ---------------------------------------------------------------------------
// Outputs and actions
// ---------------------------------------------------------------------------

#[test]
fn outputs_live_under_bin_or_genfiles() {
    let ws = Workspace::new();
    let env = env();
    let rule = Arc::new(
        Rule::new(label("//p:lib"), subject_class("cc_library", true), Location::file("p/BUILD"))
            .with_outputs(vec![label("//p:lib.a")]),
    );
    let ctx = ws.analyze(&env, rule);
    assert_eq!(
        ctx.output_artifact().map(|a| a.exec_path()),
        Some("ruleview-out/k8-fastbuild/bin/p/lib.a".to_string())
    );
    assert_eq!(ctx.create_output_artifact().exec_path(), "ruleview-out/k8-fastbuild/bin/p/lib");
    assert!(!ctx.has_errors());

    let env_gen = self::env();
    let ctx = ws.analyze(&env_gen, subject_of(subject_class("proto_gen", false), vec![]));
    assert_eq!(ctx.bin_or_genfiles_directory().exec_path(), "ruleview-out/k8-fastbuild/genfiles");
    assert!(ctx.output_artifact().is_none());
    assert_eq!(
        errors(&env_gen),
        ["in out attribute of proto_gen rule //p:lib: exactly one output file required"]
    );
}

#[test]
fn derived_paths() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    assert_eq!(ctx.unique_directory("_objs"), "p/_objs/lib");
    assert_eq!(
        ctx.related_artifact("p/a.cc", ".o").exec_path(),
        "ruleview-out/k8-fastbuild/bin/p/a.o"
    );
    let archive = ctx.implicit_output_artifact(&|r: &Rule| vec![format!("lib{}.a", r.label().name())]);
    assert_eq!(archive.root_relative_path(), "p/liblib.a");
    assert_eq!(env.derived_artifacts().len(), 2);
}

#[test]
#[should_panic(expected = "must be exactly one path")]
fn implicit_output_with_two_paths_panics() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    ctx.implicit_output_artifact(&|_: &Rule| vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn action_owner_describes_host_configuration() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze_in(&env, subject(vec![]), Arc::clone(&ws.host));
    let owner = ctx.action_owner();
    assert!(std::ptr::eq(owner, ctx.action_owner()));
    assert_eq!(owner.additional_progress_info.as_deref(), Some("host"));
    assert_eq!(owner.configuration_short_cache_key, ws.host.short_cache_key());
    assert_eq!(owner.target_kind, "cc_library rule");

    let output = ctx.create_output_artifact();
    ctx.register_action(Action::new(owner.clone(), "CppArchive").with_outputs([output]));
    assert_eq!(env.actions().len(), 1);
    assert_eq!(env.actions()[0].outputs[0].root().exec_path(), "ruleview-out/host/bin");
}

#[test]
fn target_configuration_owner_has_no_progress_info() {
    let ws = Workspace::new();
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![]));
    assert!(ctx.action_owner().additional_progress_info.is_none());
    assert_eq!(ctx.action_owner().configuration_mnemonic, "k8-fastbuild");
}

#[test]
fn runfiles_symlinks_follow_configuration_only_for_tests() {
    let ws = Workspace::new();
    let no_runfiles = Arc::new(Configuration::new("target", "k8-fastbuild").with_build_runfiles(false));

    let env_test = env();
    let ctx = ws.analyze_in(&env_test, subject_of(subject_class("cc_test", true), vec![]), Arc::clone(&no_runfiles));
    assert!(!ctx.should_create_runfiles_symlinks());

    let env_lib = env();
    let ctx = ws.analyze_in(&env_lib, subject(vec![]), no_runfiles);
    assert!(ctx.should_create_runfiles_symlinks());
}

// ---------------------------------------------------------------------------
// Filesets
// ---------------------------------------------------------------------------

#[test]
fn fileset_entries_are_resolved_and_checked() {
    let mut ws = Workspace::new();
    ws.analyzed_rule(
        "fileset",
        "//q:tree",
        ProviderCollection::new().with(FilesetProvider::new(bin_artifact("q/tree", "//q:tree"))),
    );
    ws.analyzed_rule("genrule", "//q:gen", ProviderCollection::new().with(files("//q:gen", &["q/g"])));
    ws.source("//q:BUILD");
    ws.source("//q:a.txt");
    ws.output_file("//q:out.txt", "//q:gen");

    let entries = AttributeValue::FilesetEntries(vec![
        FilesetEntry::new(label("//q:tree")),
        FilesetEntry::new(label("//q:gen")),
        FilesetEntry::new(label("//q:BUILD")).with_destdir("src"),
        FilesetEntry::new(label("//q:out.txt")),
        FilesetEntry::new(label("//q:tree")).with_files(vec![label("//q:a.txt")]),
    ]);
    let env = env();
    let ctx = ws.analyze(&env, subject(vec![("entries", entries)]));

    let resolved = ctx.fileset_entry_map().get("entries");
    assert_eq!(resolved.len(), 4);
    assert!(matches!(&resolved[0], ConfiguredFilesetEntry::Subtree { src, .. } if src.label() == &label("//q:tree")));
    assert_eq!(resolved[1].entry().destdir(), "src");
    match &resolved[3] {
        ConfiguredFilesetEntry::Files { files, .. } => {
            assert_eq!(files.len(), 1);
            assert_eq!(files[0].label(), &label("//q:a.txt"));
        }
        other => panic!("expected explicit files, got {other:?}"),
    }

    assert_eq!(
        errors(&env),
        ["in entries attribute of cc_library rule //p:lib: invalid 'srcdir' target '//q:gen'. Must be another fileset or package"]
    );
    let warnings = warnings(&env);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("'srcdir' target '//q:out.txt' is not an input file"));
}

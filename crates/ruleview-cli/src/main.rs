//! CLI binary for checking rule dependencies in a workspace manifest.

mod manifest;
mod workspace;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ruleview_analysis::{
    ConfiguredFilesetEntry, Diagnostic, RuleContext, Severity, SrcsPackageCheck, VisibilityMode,
};
use ruleview_types::Label;
use tracing_subscriber::EnvFilter;

use crate::workspace::Workspace;

#[derive(Parser)]
#[command(name = "ruleview", version, about = "Check rule dependencies against their attribute schemas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every rule in a workspace manifest
    Check {
        /// Path to the workspace manifest (.json)
        manifest: PathBuf,

        /// How visibility violations are reported: error, warn or off
        #[arg(long)]
        visibility: Option<VisibilityMode>,

        /// Report sources from other packages: error or warn
        #[arg(long)]
        srcs_package: Option<SrcsPackageCheck>,
    },

    /// Show the resolved dependencies of one rule
    Deps {
        /// Path to the workspace manifest (.json)
        manifest: PathBuf,

        /// Label of the rule, e.g. //pkg:name
        label: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let clean = match cli.command {
        Commands::Check {
            manifest,
            visibility,
            srcs_package,
        } => cmd_check(&manifest, visibility, srcs_package).await?,
        Commands::Deps { manifest, label } => cmd_deps(&manifest, &label)?,
    };

    if !clean {
        std::process::exit(1);
    }
    Ok(())
}

fn load_workspace(
    path: &Path,
    visibility: Option<VisibilityMode>,
    srcs_package: Option<SrcsPackageCheck>,
) -> anyhow::Result<Workspace> {
    let mut workspace = Workspace::load(path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?;
    let options = workspace.options_mut();
    if let Some(visibility) = visibility {
        options.visibility = visibility;
    }
    if srcs_package.is_some() {
        options.srcs_same_package = srcs_package;
    }
    tracing::debug!(
        visibility = %workspace.options().visibility,
        srcs_same_package = ?workspace.options().srcs_same_package,
        rules = workspace.rules().len(),
        "Loaded {}",
        path.display()
    );
    Ok(workspace)
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

/// Outcome of analyzing every rule of a workspace.
#[derive(Debug, Default)]
struct CheckReport {
    rules: usize,
    diagnostics: Vec<(Label, Vec<Diagnostic>)>,
    aborted: Vec<anyhow::Error>,
}

impl CheckReport {
    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .flat_map(|(_, ds)| ds)
            .filter(|d| d.severity == severity)
            .count()
    }

    fn is_clean(&self) -> bool {
        self.aborted.is_empty() && self.count(Severity::Error) == 0
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    }
}

/// Analyze every rule on the blocking pool, one task per rule.
async fn check_workspace(workspace: Arc<Workspace>) -> CheckReport {
    let handles: Vec<_> = workspace
        .rules()
        .iter()
        .map(|rule| {
            let label = rule.label().clone();
            let rule = Arc::clone(rule);
            let workspace = Arc::clone(&workspace);
            let handle = tokio::task::spawn_blocking(move || workspace.analyze(rule, |_| ()).1);
            (label, handle)
        })
        .collect();

    let mut report = CheckReport {
        rules: handles.len(),
        ..Default::default()
    };
    for (label, handle) in handles {
        match handle.await {
            Ok(output) => {
                tracing::debug!(
                    rule = %label,
                    diagnostics = output.diagnostics.len(),
                    actions = output.actions.len(),
                    "Analyzed rule"
                );
                if !output.diagnostics.is_empty() {
                    report.diagnostics.push((label, output.diagnostics));
                }
            }
            Err(e) => {
                let error = anyhow::anyhow!(panic_message(e)).context(format!("analysis of {label} aborted"));
                tracing::warn!(rule = %label, "Analysis aborted");
                report.aborted.push(error);
            }
        }
    }
    report
}

async fn cmd_check(
    path: &Path,
    visibility: Option<VisibilityMode>,
    srcs_package: Option<SrcsPackageCheck>,
) -> anyhow::Result<bool> {
    let workspace = Arc::new(load_workspace(path, visibility, srcs_package)?);
    let report = check_workspace(workspace).await;

    for (_, diagnostics) in &report.diagnostics {
        for diagnostic in diagnostics {
            println!("{diagnostic}");
        }
    }
    for error in &report.aborted {
        println!("ERROR {error:#}");
    }
    println!(
        "Analyzed {} rules: {} errors, {} warnings, {} aborted",
        report.rules,
        report.count(Severity::Error),
        report.count(Severity::Warning),
        report.aborted.len()
    );
    Ok(report.is_clean())
}

// ---------------------------------------------------------------------------
// deps
// ---------------------------------------------------------------------------

fn render_dependencies(context: &RuleContext<'_>) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "{} ({}) in {}",
        context.label(),
        context.rule().target_kind(),
        context.configuration()
    )?;

    writeln!(out, "\nDependencies:")?;
    for (attribute, prerequisites) in context.dependency_map().iter() {
        writeln!(out, "  {attribute}:")?;
        for prerequisite in prerequisites {
            let configuration = prerequisite
                .configuration()
                .map(|c| c.short_name().to_string())
                .unwrap_or_else(|| "no configuration".to_string());
            writeln!(
                out,
                "    {} [{}] {}",
                prerequisite.label(),
                configuration,
                prerequisite.target().target_kind()
            )?;
        }
    }

    if !context.fileset_entry_map().is_empty() {
        writeln!(out, "\nFileset entries:")?;
        for (attribute, entries) in context.fileset_entry_map().iter() {
            writeln!(out, "  {attribute}:")?;
            for entry in entries {
                let destdir = entry.entry().destdir();
                match entry {
                    ConfiguredFilesetEntry::Subtree { src, .. } => {
                        writeln!(out, "    {} -> '{destdir}'", src.label())?;
                    }
                    ConfiguredFilesetEntry::Files { files, .. } => {
                        let files: Vec<String> = files.iter().map(|f| f.label().to_string()).collect();
                        writeln!(out, "    [{}] -> '{destdir}'", files.join(", "))?;
                    }
                }
            }
        }
    }
    Ok(out)
}

fn cmd_deps(path: &Path, label: &str) -> anyhow::Result<bool> {
    let workspace = load_workspace(path, None, None)?;
    let label = Label::parse(label)?;
    let rule = workspace
        .rule(&label)
        .ok_or_else(|| anyhow::anyhow!("{label} is not a rule in {}", path.display()))?;

    let (rendered, output) = workspace.analyze(rule, render_dependencies);
    print!("{}", rendered?);
    if !output.diagnostics.is_empty() {
        println!("\nDiagnostics:");
        for diagnostic in &output.diagnostics {
            println!("  {diagnostic}");
        }
    }
    Ok(!output.has_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"{
        "options": {"srcs_same_package": "error"},
        "configurations": {
            "target": {"name": "target", "mnemonic": "k8-fastbuild"},
            "host": {"name": "host", "mnemonic": "host", "host": true}
        },
        "rule_classes": [
            {"name": "filegroup", "attributes": [{"name": "srcs", "type": "label_list"}]},
            {"name": "fileset", "attributes": [
                {"name": "entries", "type": "fileset_entry_list"}
            ]}
        ],
        "targets": [
            {"kind": "input_file", "label": "//p:a.txt"},
            {"kind": "input_file", "label": "//q:b.txt"},
            {"kind": "rule", "label": "//p:files", "class": "filegroup",
             "attributes": {"srcs": [":a.txt", "//q:b.txt"]}},
            {"kind": "rule", "label": "//p:tree", "class": "fileset",
             "provides": {"fileset": true},
             "attributes": {"entries": [{"srcdir": ":files", "destdir": "out"}]}}
        ]
    }"#;

    fn write_manifest(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn check_reports_foreign_sources() {
        let file = write_manifest(MANIFEST);
        let workspace = Arc::new(load_workspace(file.path(), None, None).unwrap());
        let report = check_workspace(workspace).await;
        assert_eq!(report.rules, 2);
        assert!(report.aborted.is_empty());
        assert_eq!(report.count(Severity::Error), 2);
        let messages: Vec<_> = report
            .diagnostics
            .iter()
            .flat_map(|(_, ds)| ds.iter().map(|d| d.message.as_str()))
            .collect();
        assert!(messages.iter().any(|m| m.contains("please do not import '//q:b.txt' directly")));
        assert!(messages
            .iter()
            .any(|m| m.contains("invalid 'srcdir' target '//p:files'. Must be another fileset or package")));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn flags_override_manifest_options() {
        let file = write_manifest(MANIFEST);
        let workspace = load_workspace(file.path(), Some(VisibilityMode::Off), Some(SrcsPackageCheck::Warn)).unwrap();
        assert_eq!(workspace.options().visibility, VisibilityMode::Off);
        let report = check_workspace(Arc::new(workspace)).await;
        assert_eq!(report.count(Severity::Warning), 1);
        assert_eq!(report.count(Severity::Error), 1);
    }

    #[tokio::test]
    async fn contract_violations_abort_only_that_rule() {
        // //p:broken depends on a label that was never loaded.
        let manifest = MANIFEST.replace(
            r#"{"kind": "input_file", "label": "//p:a.txt"},"#,
            r#"{"kind": "input_file", "label": "//p:a.txt"},
               {"kind": "rule", "label": "//p:broken", "class": "filegroup",
                "attributes": {"srcs": [":ghost.txt"]}},"#,
        );
        let file = write_manifest(&manifest);
        let workspace = Arc::new(load_workspace(file.path(), None, None).unwrap());
        let report = check_workspace(workspace).await;
        assert_eq!(report.rules, 3);
        assert_eq!(report.aborted.len(), 1);
        let message = format!("{:#}", report.aborted[0]);
        assert!(message.starts_with("analysis of //p:broken aborted: "), "{message}");
        assert!(message.contains("//p:ghost.txt"));
    }

    #[test]
    fn deps_renders_both_maps() {
        let file = write_manifest(MANIFEST);
        let workspace = load_workspace(file.path(), None, None).unwrap();
        let rule = workspace.rule(&Label::parse("//p:files").unwrap()).unwrap();
        let (rendered, _) = workspace.analyze(rule, render_dependencies);
        let rendered = rendered.unwrap();
        assert!(rendered.starts_with("//p:files (filegroup rule) in target (k8-fastbuild)"));
        assert!(rendered.contains("  srcs:\n    //p:a.txt [no configuration] source file\n"));

        let tree = workspace.rule(&Label::parse("//p:tree").unwrap()).unwrap();
        let (rendered, output) = workspace.analyze(tree, render_dependencies);
        let rendered = rendered.unwrap();
        assert!(output.has_errors());
        assert!(!rendered.contains("Fileset entries:"));
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let err = load_workspace(Path::new("/nonexistent/ruleview.json"), None, None).err().unwrap();
        assert!(err.to_string().starts_with("failed to load /nonexistent/ruleview.json"));
    }
}

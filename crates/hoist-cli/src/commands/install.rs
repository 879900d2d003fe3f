//! `hoist install` command implementation.

use hoist_core::pkg::{
    plan_install, ActionSummary, InstallOptions, InstallPlan, PkgError, PkgWarning, ProjectLock,
    RegistryClient, RegistryProvider, SemverPredicate,
};
use hoist_core::Config;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Install command action.
#[derive(Debug, Clone)]
pub struct InstallAction {
    pub project_root: PathBuf,
    pub specs: Vec<String>,
    pub options: InstallOptions,
}

/// Install result for JSON output (locked format: { ok, install }).
#[derive(Serialize)]
struct InstallJsonResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    install: Option<InstallOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

#[derive(Serialize)]
struct InstallOutput {
    actions: Vec<ActionSummary>,
    warnings: Vec<PkgWarning>,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    required_by: Vec<String>,
}

impl From<&PkgError> for ErrorInfo {
    fn from(e: &PkgError) -> Self {
        Self {
            code: e.code(),
            message: e.message().to_string(),
            required_by: e.required_by().to_vec(),
        }
    }
}

/// Run the install command.
///
/// Exits the process with status 1 when planning fails.
pub fn run(action: InstallAction, config: &Config) -> Result<()> {
    info!(
        root = %action.project_root.display(),
        specs = action.specs.len(),
        "planning install"
    );

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(plan(&action, config));

    match result {
        Ok(plan) => {
            report(&plan);
            if config.json_logs {
                print_json(&InstallJsonResult {
                    ok: true,
                    install: Some(InstallOutput {
                        actions: plan.action_summaries(),
                        warnings: plan.warnings.clone(),
                    }),
                    error: None,
                })
            } else {
                print_human(&plan, &action.project_root);
                Ok(())
            }
        }
        Err(e) => {
            if config.json_logs {
                print_json(&InstallJsonResult {
                    ok: false,
                    install: None,
                    error: Some(ErrorInfo::from(&e)),
                })?;
            } else {
                eprintln!("error: {e}");
            }
            std::process::exit(1);
        }
    }
}

async fn plan(action: &InstallAction, config: &Config) -> Result<InstallPlan, PkgError> {
    let _lock = ProjectLock::acquire(&action.project_root)?;

    let client = match &config.registry {
        Some(url) => RegistryClient::new(url)?,
        None => RegistryClient::from_env()?,
    };
    debug!(registry = %client.base_url(), "using registry");
    let provider = RegistryProvider::new(client);

    let mut plan = plan_install(
        &action.project_root,
        &action.specs,
        &provider,
        &SemverPredicate,
        &action.options,
    )
    .await?;
    plan.save(&action.options);
    Ok(plan)
}

/// Log what the plan found.
fn report(plan: &InstallPlan) {
    for warning in &plan.warnings {
        warn!(code = warning.code, subject = %warning.subject, "{}", warning.message);
    }
    trace!("ideal tree:\n{}", plan.ideal.render());
    for action in plan.actions() {
        let node = action.node();
        debug!(
            action = action.verb(),
            package = %node.package.id(),
            path = %node.path.display(),
            "planned"
        );
    }
}

fn print_json(result: &InstallJsonResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn print_human(plan: &InstallPlan, project_root: &Path) {
    let actions = plan.action_summaries();
    if actions.is_empty() {
        println!("up to date");
        return;
    }
    for action in &actions {
        println!(
            "{} {}@{} {}",
            action.action,
            action.name,
            action.version,
            display_path(&action.path, project_root).display()
        );
    }
}

/// Install paths relative to the project when possible.
fn display_path<'a>(path: &'a Path, project_root: &Path) -> &'a Path {
    dunce::canonicalize(project_root)
        .ok()
        .and_then(|root| path.strip_prefix(root).ok())
        .or_else(|| path.strip_prefix(project_root).ok())
        .unwrap_or(path)
}

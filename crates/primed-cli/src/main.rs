//! CLI binary for compiling and invoking primed projects.

mod functions;
mod project;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use primed_catalog::ValueMap;
use primed_session::Invocation;

use crate::project::Project;

#[derive(Parser)]
#[command(name = "primed", version, about = "Pre-compiled dataset catalogs for repeated pipeline invocation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a project and print the per-namespace catalog report
    Compile {
        /// Path to the project .json file
        project: PathBuf,
    },

    /// Compile a project and run one invocation
    Run {
        /// Path to the project .json file
        project: PathBuf,

        /// Namespace to invoke (default namespace when omitted)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Inputs as a JSON object, e.g. '{"A": 3}'
        #[arg(long)]
        inputs: Option<String>,

        /// Parameters as a JSON object, e.g. '{"B": 2}'
        #[arg(long)]
        params: Option<String>,

        /// Template variables as a JSON object, e.g. '{"date_param": "2024_01_01"}'
        #[arg(long)]
        vars: Option<String>,

        /// Run id (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compile { project } => {
            cmd_compile(&project)?;
        }
        Commands::Run {
            project,
            namespace,
            inputs,
            params,
            vars,
            run_id,
        } => {
            let invocation = Invocation {
                namespace,
                inputs: parse_map("--inputs", inputs.as_deref())?,
                parameters: parse_map("--params", params.as_deref())?,
                template_variables: parse_map("--vars", vars.as_deref())?,
                run_id,
            };
            cmd_run(&project, invocation).await?;
        }
    }

    Ok(())
}

fn parse_map(flag: &str, raw: Option<&str>) -> anyhow::Result<ValueMap> {
    match raw {
        None => Ok(ValueMap::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("{flag} must be a JSON object: {e}")),
    }
}

fn cmd_compile(path: &Path) -> anyhow::Result<()> {
    let project = Project::load(path)?;
    let (mut session, specs) = project.into_session()?;
    let registry = session.compile(specs)?;

    println!("Compiled {} namespace(s)", registry.len());
    for report in registry.reports() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    for advisory in registry.advisories() {
        println!("[WARN] {advisory}");
    }
    Ok(())
}

async fn cmd_run(path: &Path, invocation: Invocation) -> anyhow::Result<()> {
    let project = Project::load(path)?;
    let (mut session, specs) = project.into_session()?;
    session.compile(specs)?;

    let outcome = session.run(invocation).await?;
    tracing::info!(
        run_id = %outcome.run_id,
        duration_ms = outcome.record.duration_ms,
        advisories = outcome.advisories.len(),
        "invocation finished"
    );
    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "primed", "run", "project.json", "--namespace", "n1", "--inputs", r#"{"A": 3}"#,
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                project,
                namespace,
                inputs,
                ..
            } => {
                assert_eq!(project, PathBuf::from("project.json"));
                assert_eq!(namespace.as_deref(), Some("n1"));
                assert_eq!(parse_map("--inputs", inputs.as_deref()).unwrap()["A"], json!(3));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn rejects_non_object_maps() {
        let err = parse_map("--params", Some("[1, 2]")).unwrap_err();
        assert!(err.to_string().contains("--params must be a JSON object"));
        assert!(parse_map("--vars", None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn demo_project_runs() {
        let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/project.json");
        let project = Project::load(&demo).unwrap();
        let (mut session, specs) = project.into_session().unwrap();
        session.compile(specs).unwrap();

        let outcome = session
            .run(Invocation::for_namespace("n1").with_input("A", json!(3)))
            .await
            .unwrap();
        assert_eq!(outcome.output, json!(729));
    }
}

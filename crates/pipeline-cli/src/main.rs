//! Pipeline CLI
//!
//! Runs a graph definition file against the echo LLM (prompts come back as
//! responses, no provider is contacted), or prints its wave plan.

mod error;
mod graph_store;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pipeline_engine::{
    EchoLlm, EngineConfig, FunctionRegistry, GraphExecutor, LogEventSink, Services,
};
use serde_json::{json, Map, Value};

use crate::error::{CliError, Result};
use crate::graph_store::{read_graph, DirectoryGraphRegistry};

#[derive(Parser, Debug)]
#[command(name = "pipeline", version, about = "Run declarative generation pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a graph and print its outputs as JSON
    Run {
        /// Path to the graph definition JSON file
        graph: PathBuf,
        /// JSON object of input-node id to value
        #[arg(long)]
        inputs: Option<PathBuf>,
        /// Directory of stored graphs for sub-pipeline calls
        #[arg(long)]
        graphs: Option<PathBuf>,
        /// Engine config file (missing file means defaults)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the wave plan instead of executing
        #[arg(long)]
        plan: bool,
    },
    /// List the registered built-in functions
    Functions,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Referencing the crate links its inventory submissions
    log::debug!(
        "{} built-in functions linked",
        pipeline_functions::BUILTIN_FUNCTIONS.len()
    );

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            graph,
            inputs,
            graphs,
            config,
            plan,
        } => run(&graph, inputs.as_deref(), graphs.as_deref(), config.as_deref(), plan).await,
        Commands::Functions => {
            list_functions();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            println!("{}", pretty(&err.report()));
            ExitCode::FAILURE
        }
    }
}

async fn run(
    graph_path: &Path,
    inputs_path: Option<&Path>,
    graphs_dir: Option<&Path>,
    config_path: Option<&Path>,
    plan_only: bool,
) -> Result<()> {
    let graph = read_graph(graph_path).await?;
    let config = match config_path {
        Some(path) => EngineConfig::load(path).await?,
        None => EngineConfig::default(),
    };

    let mut services = Services::new().with_llm(Arc::new(EchoLlm));
    if let Some(dir) = graphs_dir {
        services = services.with_graphs(Arc::new(DirectoryGraphRegistry::load(dir).await?));
    }

    let executor = GraphExecutor::new(FunctionRegistry::with_builtins(), services)
        .with_config(config)
        .with_event_sink(Arc::new(LogEventSink));

    if plan_only {
        let waves = executor.plan(&graph)?;
        println!("{}", pretty(&json!({ "graphId": graph.id, "waves": waves })));
        return Ok(());
    }

    let inputs = match inputs_path {
        Some(path) => load_inputs(path).await?,
        None => Map::new(),
    };

    log::info!("Running graph '{}' ({} nodes)", graph.id, graph.nodes.len());
    let result = executor.execute(&graph, inputs).await?;
    println!(
        "{}",
        pretty(&json!({
            "executionId": result.execution_id,
            "outputs": result.outputs,
            "finalOutput": result.final_output,
            "skipped": result.skipped,
            "waves": result.waves,
        }))
    );
    Ok(())
}

async fn load_inputs(path: &Path) -> Result<Map<String, Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(inputs) => Ok(inputs),
        other => Err(CliError::InvalidInputs(other.to_string())),
    }
}

fn list_functions() {
    let registry = FunctionRegistry::with_builtins();
    for name in registry.names() {
        println!("{:<20} {}", name, registry.description(name).unwrap_or(""));
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::parse_from([
            "pipeline", "run", "story.json", "--inputs", "in.json", "--plan",
        ]);
        match cli.command {
            Commands::Run {
                graph, inputs, plan, graphs, ..
            } => {
                assert_eq!(graph, PathBuf::from("story.json"));
                assert_eq!(inputs, Some(PathBuf::from("in.json")));
                assert!(plan);
                assert!(graphs.is_none());
            }
            Commands::Functions => panic!("expected run"),
        }
    }

    #[tokio::test]
    async fn test_inputs_must_be_an_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inputs.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            load_inputs(&path).await,
            Err(CliError::InvalidInputs(_))
        ));

        std::fs::write(&path, r#"{"topic": "dragons"}"#).unwrap();
        let inputs = load_inputs(&path).await.unwrap();
        assert_eq!(inputs["topic"], json!("dragons"));
    }

    #[tokio::test]
    async fn test_run_reports_cycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop.json");
        std::fs::write(
            &path,
            r#"{
                "id": "loop",
                "nodes": [
                    {"id": "a", "type": "output", "bindings": {"x": "{{outputs.b.output}}"}},
                    {"id": "b", "type": "output", "bindings": {"x": "{{outputs.a.output}}"}}
                ]
            }"#,
        )
        .unwrap();

        let err = run(&path, None, None, None, true).await.unwrap_err();
        assert_eq!(err.report()["kind"], json!("cycleDetected"));
    }
}

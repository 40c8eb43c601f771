use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use forcelayout::{GraphInput, Layout, LayoutConfig};

mod cli;

use cli::{Cli, Commands, RunArgs};

/// Final layout as written by `run`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LayoutOutput {
    positions: Vec<[f32; 2]>,
    global_speed: f32,
    steps: u64,
}

fn load_config(args: &RunArgs) -> anyhow::Result<LayoutConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => LayoutConfig::default(),
    };

    if let Some(steps) = args.steps {
        config.max_steps = steps;
    }
    if args.gpu {
        config.gpu = true;
    }
    if let Some(toggle) = args.barnes_hut {
        config.barnes_hut_optimize = Some(toggle.into());
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

fn load_graph(path: &Path) -> anyhow::Result<GraphInput> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading graph {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing graph {}", path.display()))
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let graph = load_graph(&args.input)?;

    let mut layout = Layout::from_config(&config).context("starting layout backend")?;
    layout
        .init_data(&graph, &config)
        .await
        .context("loading graph into layout")?;
    info!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        backend = ?layout.backend(),
        max_steps = config.max_steps,
        "running layout"
    );

    let report = layout.run_until_finished().await?;
    let flat = layout.node_positions()?;
    layout.dispose();

    let output = LayoutOutput {
        positions: flat.chunks_exact(2).map(|p| [p[0], p[1]]).collect(),
        global_speed: report.global_speed,
        steps: report.steps,
    };
    let json = serde_json::to_string_pretty(&output)?;

    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(steps = output.steps, "wrote positions to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("forcelayout=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
    }
}

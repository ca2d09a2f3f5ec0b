use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use force_layout::config::LayoutConfig;
use force_layout::host::SimulationHost;
use force_layout::protocol::Message;
use force_layout::worker;

mod cli;

use cli::{Cli, Commands, LayoutInput};

fn load_config(path: Option<&Path>, seed: Option<u64>) -> anyhow::Result<LayoutConfig> {
    let config = match path {
        Some(path) => LayoutConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LayoutConfig::default(),
    };
    Ok(match seed {
        Some(seed) => config.with_seed(seed),
        None => config,
    })
}

/// Lay out one graph file to completion and write the final snapshot
fn layout(input: &Path, output: Option<&Path>, config: LayoutConfig) -> anyhow::Result<()> {
    let text =
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let parsed: LayoutInput =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", input.display()))?;
    let (nodes, links) = parsed.into_parts();

    let graph_id = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "graph".to_string());

    let mut host = SimulationHost::new(config);
    host.handle(Message::update(graph_id.clone(), nodes, links));
    let snapshot = host
        .settle(&graph_id)
        .ok_or_else(|| anyhow::anyhow!("simulation for '{graph_id}' was not created"))?;

    let json = serde_json::to_string_pretty(&snapshot)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(
                nodes = snapshot.nodes.len(),
                ticks = snapshot.tick,
                "wrote layout to {}",
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Relay JSON-lines messages from stdin to a worker and snapshots back to stdout
async fn serve_worker(config: LayoutConfig) -> anyhow::Result<()> {
    let (handle, mut stream) = worker::spawn(config)?;

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(snapshot) = stream.next().await {
            let mut line = snapshot.to_json()?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        handle.post_json(&line)?;
    }

    // Input closed: let running graphs finish, then drain their snapshots
    handle.finish()?;
    printer.await??;
    tokio::task::spawn_blocking(move || handle.wait()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.seed)?;

    match cli.command {
        Commands::Layout { input, output } => {
            layout(&input, output.as_deref(), config)?;
        }
        Commands::Worker => {
            serve_worker(config).await?;
        }
    }

    Ok(())
}

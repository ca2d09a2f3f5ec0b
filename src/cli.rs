use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use force_layout::graph_types::{RawLink, RawNode};

/// Force-directed graph layout: one-shot or as a streaming worker.
#[derive(Parser, Debug)]
#[command(name = "force-layout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Layout configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Seed for initial positions (overrides the config file)
    #[arg(long, global = true)]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lay out a graph file and write the final positions
    Layout {
        /// Input graph (JSON: `{"nodes": [...], "links": [...]}` or a bare node array)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Speak the worker protocol over stdin/stdout, one JSON message per line
    Worker,
}

/// Contents of a `layout` input file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LayoutInput {
    Graph {
        nodes: Vec<RawNode>,
        #[serde(default)]
        links: Vec<RawLink>,
    },
    Nodes(Vec<RawNode>),
}

impl LayoutInput {
    pub fn into_parts(self) -> (Vec<RawNode>, Vec<RawLink>) {
        match self {
            LayoutInput::Graph { nodes, links } => (nodes, links),
            LayoutInput::Nodes(nodes) => (nodes, Vec::new()),
        }
    }
}

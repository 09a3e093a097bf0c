//! Command-line front end for RepoGraph.
//!
//! Commands:
//! - Index: build, update, clean, stale
//! - Query: stats, symbol, file, related
//! - Context: egograph

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::RepoGraphConfig;
use crate::graph::{
    build_file_repo_graph, extract_egograph, index_repository, load_or_build, render_report,
    Direction, EdgeType, EgographRequest, Node, RelatedOptions,
};
use crate::storage;

#[derive(Parser)]
#[command(name = "repograph")]
#[command(about = "Line-level dependency graph of a source tree")]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // ─── Index ──────────────────────────────────────────────────
    /// Build the index from scratch and save it
    Build,

    /// Re-index a single changed file
    Update {
        /// File path, relative to the root or absolute
        file: PathBuf,
    },

    /// Delete the saved index
    Clean,

    /// Report whether the saved index is stale
    Stale {
        /// Source subdirectory whose mtime is compared with the index
        subpath: Option<PathBuf>,
    },

    // ─── Query ──────────────────────────────────────────────────
    /// Show graph statistics
    Stats,

    /// Find nodes by exact symbol name
    Symbol { name: String },

    /// List the nodes of one file
    File { path: String },

    /// Show the one-hop neighbours of a node
    Related {
        /// Node id, e.g. `src/app.ts:12`
        id: String,

        /// incoming, outgoing or both
        #[arg(short, long, default_value = "both")]
        direction: String,

        /// Edge types to follow (comma separated)
        #[arg(short = 't', long = "types", value_delimiter = ',')]
        edge_types: Vec<String>,

        /// Max results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Include neighbours whose id has no node
        #[arg(long)]
        dangling: bool,
    },

    // ─── Context ────────────────────────────────────────────────
    /// Extract the egograph around keyword matches
    Egograph {
        /// Keywords matched against symbol names and line text
        #[arg(required = true)]
        keywords: Vec<String>,

        /// BFS depth
        #[arg(short, long, allow_negative_numbers = true)]
        k: Option<i64>,

        #[arg(long, allow_negative_numbers = true)]
        max_nodes: Option<i64>,

        #[arg(long, allow_negative_numbers = true)]
        max_edges: Option<i64>,

        /// Edge types to follow (comma separated)
        #[arg(short = 't', long = "types", value_delimiter = ',')]
        edge_types: Vec<String>,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    let root = cli.root.canonicalize().unwrap_or(cli.root);
    let json = cli.json;

    match cli.command {
        Commands::Build => {
            let (index, path) = index_repository(&root)?;
            let m = &index.metadata;
            if json {
                return print_json(m);
            }
            println!(
                "Indexed {} files ({}): {} nodes, {} edges",
                m.file_count, m.language, m.node_count, m.edge_count
            );
            println!("Saved to {}", path.display());
        }

        Commands::Update { file } => {
            let previous = load_or_build(&root)?;
            let index = build_file_repo_graph(&previous, &root, &file)?;
            storage::save_index(&index, &root)?;
            if json {
                return print_json(&index.metadata);
            }
            println!(
                "Updated {}: {} nodes, {} edges",
                file.display(),
                index.metadata.node_count,
                index.metadata.edge_count
            );
        }

        Commands::Clean => {
            storage::delete_index(&root)?;
            if !json {
                println!("Removed {}", storage::index_path(&root).display());
            }
        }

        Commands::Stale { subpath } => {
            let config = RepoGraphConfig::load_for_root(&root);
            let stale = storage::is_stale_with_max_age(&root, subpath.as_deref(), config.max_age());
            if json {
                return print_json(&serde_json::json!({ "stale": stale }));
            }
            println!("{}", if stale { "stale" } else { "fresh" });
        }

        Commands::Stats => {
            let index = load_or_build(&root)?;
            let stats = index.get_graph_stats();
            if json {
                return print_json(&stats);
            }
            println!("Files:    {}", stats.file_count);
            println!("Nodes:    {}", stats.node_count);
            for (node_type, count) in &stats.nodes_by_type {
                println!("  {:<9} {}", node_type, count);
            }
            println!("Edges:    {}", stats.edge_count);
            for (edge_type, count) in &stats.edges_by_type {
                println!("  {:<9} {}", edge_type, count);
            }
            println!("Dangling: {}", stats.dangling_edges);
            println!("Language: {}", index.metadata.language);
        }

        Commands::Symbol { name } => {
            let index = load_or_build(&root)?;
            print_nodes(&index.find_nodes_by_symbol(&name), json)?;
        }

        Commands::File { path } => {
            let index = load_or_build(&root)?;
            print_nodes(&index.find_nodes_by_file(&path), json)?;
        }

        Commands::Related {
            id,
            direction,
            edge_types,
            limit,
            dangling,
        } => {
            let index = load_or_build(&root)?;
            let Some(direction) = Direction::from_name(&direction) else {
                bail!("unknown direction '{direction}' (expected incoming, outgoing or both)");
            };
            let options = RelatedOptions {
                direction,
                edge_types: parse_edge_types(&edge_types)?,
                limit,
                include_dangling: dangling,
            };
            let related = index.find_related_nodes(&id, &options);
            if json {
                return print_json(&related);
            }
            if related.is_empty() {
                println!("No related nodes for {id}");
            }
            for r in related {
                let arrow = match r.direction {
                    Direction::Incoming => "<-",
                    _ => "->",
                };
                let text = r.node.map(|n| n.text.trim()).unwrap_or("(dangling)");
                println!(
                    "{arrow} {:<9} {:.2}  {}  {}",
                    r.edge.edge_type, r.edge.confidence, r.id, text
                );
            }
        }

        Commands::Egograph {
            keywords,
            k,
            max_nodes,
            max_edges,
            edge_types,
        } => {
            let index = load_or_build(&root)?;
            let request = egograph_request(&root, keywords, k, max_nodes, max_edges, &edge_types)?;
            let result = extract_egograph(&index, &request);
            if json {
                return print_json(&result);
            }
            print!("{}", render_report(&result));
        }
    }

    Ok(())
}

fn egograph_request(
    root: &Path,
    keywords: Vec<String>,
    k: Option<i64>,
    max_nodes: Option<i64>,
    max_edges: Option<i64>,
    edge_types: &[String],
) -> Result<EgographRequest> {
    let config = RepoGraphConfig::load_for_root(root);
    let defaults = EgographRequest::with_defaults(keywords, &config.egograph);
    Ok(EgographRequest {
        k: k.unwrap_or(defaults.k),
        max_nodes: max_nodes.unwrap_or(defaults.max_nodes),
        max_edges: max_edges.unwrap_or(defaults.max_edges),
        edge_types: parse_edge_types(edge_types)?,
        flatten: true,
        summarize: true,
        ..defaults
    })
}

fn parse_edge_types(names: &[String]) -> Result<Option<Vec<EdgeType>>> {
    if names.is_empty() {
        return Ok(None);
    }
    names
        .iter()
        .map(|name| {
            EdgeType::from_name(name).with_context(|| {
                format!("unknown edge type '{name}' (expected invoke, contain, define, reference or next)")
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn print_nodes(nodes: &[&Node], json: bool) -> Result<()> {
    if json {
        return print_json(&nodes);
    }
    if nodes.is_empty() {
        println!("No matching nodes");
    }
    for node in nodes {
        println!(
            "{:<40} {:<6} {:<9} {}",
            node.id,
            node.node_type,
            node.symbol_kind,
            node.text.trim()
        );
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! # doclink CLI
//!
//! ## Usage
//!
//! ```bash
//! doclink --config ./config/doclink.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `doclink tree <category>` | Print a category's doc tree |
//! | `doclink keywords` | List indexed keywords |
//! | `doclink resolve <keyword>` | Resolve one keyword to a page |
//! | `doclink link <file>` | Rewrite `[[keyword]]` links in a markdown file |
//! | `doclink search "<query>"` | Search the content |
//! | `doclink suggest "<query>"` | Title suggestions |
//! | `doclink index build` | Rebuild the search snapshot |
//! | `doclink index status` | Show search snapshot status |
//! | `doclink export <dir>` | Write doc tree snapshots |
//! | `doclink serve` | Start the HTTP server |
//!
//! Logs go to stderr, filtered by `DOCLINK_LOG` or `-v`; command output
//! goes to stdout.

use clap::{Parser, Subcommand};
use doclink::config::{self, Config};
use doclink::services::Services;
use doclink::{doc_tree, keywords, search, server, snapshot};
use doclink_core::models::DocCategory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// doclink: doc trees, keyword links and search for a markdown content
/// directory.
#[derive(Parser)]
#[command(
    name = "doclink",
    about = "doclink: doc trees, keyword links and search for markdown content",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/doclink.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the doc tree of a category.
    Tree {
        /// `documents`, `wiki` or `journals`.
        category: DocCategory,
        /// Only the subtree under this directory.
        #[arg(long)]
        sub_dir: Option<String>,
        /// Print JSON instead of an indented list.
        #[arg(long)]
        json: bool,
    },

    /// List indexed keywords and the pages they link to.
    Keywords {
        /// Only keywords that map to more than one page.
        #[arg(long)]
        duplicates: bool,
    },

    /// Resolve a keyword to its target page.
    Resolve {
        keyword: String,
        /// Prefer pages of this doc type when the keyword is ambiguous.
        #[arg(long)]
        doc_type: Option<String>,
    },

    /// Rewrite `[[keyword]]` links in a markdown file and print the result.
    Link {
        file: PathBuf,
        #[arg(long)]
        doc_type: Option<String>,
    },

    /// Search the content.
    Search {
        query: String,
        /// Maximum number of results (default: `search.max_results`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Suggest page titles for a partial query.
    Suggest { query: String },

    /// Manage the search snapshot.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Write `{category}-tree.json` snapshots into a directory.
    Export { dir: PathBuf },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Rebuild the search snapshot from the content directory.
    Build,
    /// Show where the snapshot is and whether it is current.
    Status,
}

fn init_tracing(verbose: u8) {
    let filter = if let Ok(env) = std::env::var("DOCLINK_LOG") {
        EnvFilter::new(env)
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg: Config = config::load_config(&cli.config)?;

    if let Commands::Export { dir } = &cli.command {
        return snapshot::run_export(&cfg, dir);
    }
    if let Commands::Serve = &cli.command {
        return server::run_server(&cfg).await;
    }

    let services = Services::new(Arc::new(cfg))?;

    match cli.command {
        Commands::Tree {
            category,
            sub_dir,
            json,
        } => {
            doc_tree::run_tree(&services.trees, category, sub_dir.as_deref(), json)?;
        }
        Commands::Keywords { duplicates } => {
            keywords::run_keywords(&services.keywords, duplicates).await?;
        }
        Commands::Resolve { keyword, doc_type } => {
            keywords::run_resolve(&services.keywords, &keyword, doc_type.as_deref()).await?;
        }
        Commands::Link { file, doc_type } => {
            keywords::run_link(&services.keywords, &file, doc_type.as_deref()).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&services.search, &query, limit).await?;
        }
        Commands::Suggest { query } => {
            search::run_suggest(&services.search, &query).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build => search::run_index_build(&services.search).await?,
            IndexAction::Status => search::run_index_status(&services.search).await?,
        },
        Commands::Export { .. } | Commands::Serve => {}
    }

    Ok(())
}

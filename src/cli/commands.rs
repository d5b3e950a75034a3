//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: run the HTTP API
//! - bundle: plan and store a bundle
//! - exec: run a request against a bundle
//! - bundles / routes: inspect stored state
//! - source: manage tool-source registrations

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Routebook - plan, store, and replay tool routes over MCP servers
#[derive(Parser, Debug)]
#[command(name = "routebook")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Plan a bundle from a description and store it
    Bundle {
        /// Project the bundle belongs to
        #[arg(short, long)]
        project: String,

        /// Tool source id (repeatable)
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,

        /// What the bundle should be able to do
        description: String,
    },

    /// Execute a request against a bundle
    Exec {
        /// Bundle ID
        #[arg(short, long)]
        bundle: String,

        /// Request text
        request: String,
    },

    /// List the bundles of a project
    Bundles {
        /// Project ID
        project: String,
    },

    /// List the routes of a bundle
    Routes {
        /// Bundle ID
        bundle: String,

        /// Print every step with its arguments
        #[arg(short, long)]
        detailed: bool,
    },

    /// Tool-source registry
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },
}

/// Tool-source subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SourceCommands {
    /// Register or replace a tool source
    Add {
        /// Source ID referenced by bundles
        id: String,

        /// MCP endpoint URL
        url: String,

        /// Display name (defaults to the id)
        #[arg(short, long)]
        name: Option<String>,

        /// Extra header as NAME=VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundle() {
        let cli = Cli::try_parse_from([
            "routebook",
            "bundle",
            "-p",
            "p1",
            "-s",
            "web-search",
            "--source",
            "files",
            "search for X and summarize it",
        ])
        .unwrap();

        match cli.command {
            Commands::Bundle {
                project,
                sources,
                description,
            } => {
                assert_eq!(project, "p1");
                assert_eq!(sources, vec!["web-search", "files"]);
                assert_eq!(description, "search for X and summarize it");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_bundle_requires_source() {
        assert!(Cli::try_parse_from(["routebook", "bundle", "-p", "p1", "desc"]).is_err());
    }

    #[test]
    fn test_parse_source_add_with_headers() {
        let cli = Cli::try_parse_from([
            "routebook",
            "-v",
            "source",
            "add",
            "web-search",
            "https://search.example/mcp",
            "-H",
            "Authorization=Bearer abc",
        ])
        .unwrap();

        assert!(cli.is_verbose());
        let Commands::Source {
            command: SourceCommands::Add { id, url, name, headers },
        } = cli.command
        else {
            panic!("expected source add");
        };
        assert_eq!(id, "web-search");
        assert_eq!(url, "https://search.example/mcp");
        assert_eq!(name, None);
        assert_eq!(headers, vec!["Authorization=Bearer abc"]);
    }

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from(["routebook", "exec", "-b", "bnd-1", "search for X"]).unwrap();
        assert!(matches!(cli.command, Commands::Exec { ref bundle, .. } if bundle == "bnd-1"));
    }
}

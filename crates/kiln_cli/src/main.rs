//! Kiln CLI: inspect and manage the rebuild cache, and build targets ahead of import.
//!
//! Provides `kiln cache` for the cache administration surface, `kiln build`
//! for bringing a project or standalone file up to date without loading it,
//! and `kiln version` for reporting the detected toolchain.

#![warn(missing_docs)]

mod build;
mod cache;
mod version;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use kiln_config::{load_config, load_config_from_str, HookConfig};
use tracing_subscriber::EnvFilter;

/// Kiln: rebuild native extension modules when they are loaded.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln rebuild-on-load toolchain")]
pub struct Cli {
    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a `kiln.toml` file. Defaults to the one in the current directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or clear the build cache.
    Cache {
        /// What to do with the cache.
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Build a project directory or `.rs` file if it is out of date.
    Build(BuildArgs),
    /// Print the versions of kiln and the build tools it uses.
    Version,
}

/// Cache administration actions.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheAction {
    /// Print the cache location, size and number of entries.
    Info,
    /// List every cached target.
    List,
    /// Print the cache record of a target as JSON.
    Inspect {
        /// Project directory or source file.
        target: PathBuf,
    },
    /// Remove cache records so the next load rebuilds.
    Clear {
        /// Project directory or source file to clear.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        target: Option<PathBuf>,

        /// Remove the whole cache.
        #[arg(long)]
        all: bool,
    },
}

/// Arguments for the `kiln build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Project directory or standalone `.rs` file.
    pub path: PathBuf,

    /// Build in release mode.
    #[arg(long)]
    pub release: bool,

    /// Rebuild even if the cache is up to date.
    #[arg(long)]
    pub force: bool,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from the terminal.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    /// Loads the hook configuration named by `--config`, or `./kiln.toml`.
    pub fn load_config(&self) -> Result<HookConfig, Box<dyn std::error::Error>> {
        let config = match &self.config {
            Some(path) => load_config_from_str(&std::fs::read_to_string(path)?)?,
            None => load_config(Path::new("."))?,
        };
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Cache { ref action } => cache::run(action, &global),
        Command::Build(ref args) => build::run(args, &global),
        Command::Version => version::run(),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Logs to stderr. `RUST_LOG` overrides the level chosen by `-q`/`-v`.
fn init_logging(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(global)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(global.color)
        .with_target(false)
        .init();
}

fn default_log_filter(global: &GlobalArgs) -> &'static str {
    if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        "info"
    }
}

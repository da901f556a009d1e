//! Inspect directories through the dirmodel attribute engine.
use std::io::IsTerminal as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dirmodel::AttributeSet;
use tracing::error;

mod app_config;
mod commands;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(version, about = "Resolve file attributes of a directory incrementally.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to a dirmodel config TOML."
    )]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory once the requested attributes are resolved.
    List {
        /// The directory to list.
        dir: PathBuf,

        /// Comma separated attribute names, e.g. `item-count,preview-text`.
        #[arg(short, long, value_delimiter = ',')]
        attrs: Option<Vec<String>>,
    },

    /// Count everything below a directory.
    Count {
        /// The directory to count.
        dir: PathBuf,
    },

    /// Print changes to a directory until interrupted.
    Watch {
        /// The directory to watch.
        dir: PathBuf,

        /// Comma separated attribute names to keep resolved.
        #[arg(short, long, value_delimiter = ',')]
        attrs: Option<Vec<String>>,
    },
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let config = Config::load_or_default(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    let trc = if std::io::stderr().is_terminal() {
        Trc::default()
    } else {
        Trc::default().ugly()
    };
    if let Err(e) = trc.init() {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let attrs_or_default = |attrs: Option<Vec<String>>| {
        AttributeSet::from_names(attrs.unwrap_or_else(|| config.default_attributes.clone()))
    };

    let result = match args.command {
        Command::List { dir, attrs } => {
            let attrs = attrs_or_default(attrs);
            commands::block_on(commands::list(config, dir, attrs))
        }
        Command::Count { dir } => commands::block_on(commands::count(config, dir)),
        Command::Watch { dir, attrs } => {
            let attrs = attrs_or_default(attrs);
            commands::block_on(commands::watch(config, dir, attrs))
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

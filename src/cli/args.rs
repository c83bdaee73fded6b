// src/cli/args.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
#[command(arg_required_else_help = true, disable_help_subcommand = true)]
pub struct Args {
    /// Verbosity level (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute (build, guid, or init)
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build an .apkg package from a TOML definition
    Build {
        /// Path to the package definition
        #[arg(value_name = "DEFINITION")]
        definition: PathBuf,

        /// Where to write the package
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        /// Directory media references are resolved against
        /// (defaults to the definition's directory)
        #[arg(long, value_name = "DIR")]
        media_dir: Option<PathBuf>,
    },

    /// Print the dedup key Anki would use for these field values
    Guid {
        #[arg(value_name = "FIELD", required = true)]
        fields: Vec<String>,
    },

    /// Write a starter package definition
    Init {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

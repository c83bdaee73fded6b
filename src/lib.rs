// src/lib.rs
pub mod application;
pub mod cli;
pub mod constants;
pub mod domain;
pub mod infrastructure;
pub mod util;

use crate::application::PackageBuilder;
use crate::cli::args::{Args, Command};
use crate::infrastructure::{derive_dedup_key, DirectoryResolver, PackageDefinition};
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub async fn run(args: Args) -> Result<()> {
    debug!(?args, "Starting apkgstream with arguments");

    match args.command {
        Command::Build {
            definition,
            output,
            media_dir,
        } => handle_build_command(definition, output, media_dir).await,
        Command::Guid { fields } => handle_guid_command(fields),
        Command::Init { path, force } => handle_init_command(path, force),
    }
}

async fn handle_build_command(
    definition_path: PathBuf,
    output: PathBuf,
    media_dir: Option<PathBuf>,
) -> Result<()> {
    let definition = PackageDefinition::load(&definition_path)?;
    let media_dir = media_dir.unwrap_or_else(|| default_media_dir(&definition_path));
    debug!(?media_dir, "Resolving media against directory");

    let file = File::create(&output)
        .with_context(|| format!("Failed to create output file {}", output.display()))?;

    info!(
        notes = definition.notes.len(),
        deck = %definition.deck.name,
        "Building package"
    );
    let builder = PackageBuilder::new(DirectoryResolver::new(media_dir));
    let result = builder.build(&definition, BufWriter::new(file)).await;

    let mut sink = match result {
        Ok(sink) => sink,
        Err(e) => {
            // a failed build leaves a truncated archive behind
            if let Err(remove_err) = std::fs::remove_file(&output) {
                debug!(error = %remove_err, "Could not remove partial output");
            }
            return Err(e).with_context(|| format!("Failed to build {}", output.display()));
        }
    };
    sink.flush().context("Failed to flush package")?;

    println!(
        "Wrote {} ({} notes)",
        output.display(),
        definition.notes.len()
    );
    Ok(())
}

fn handle_guid_command(fields: Vec<String>) -> Result<()> {
    println!("{}", derive_dedup_key(fields.as_slice()));
    Ok(())
}

fn handle_init_command(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    PackageDefinition::create_example(&path)?;
    println!("Created {}", path.display());
    Ok(())
}

fn default_media_dir(definition_path: &Path) -> PathBuf {
    definition_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

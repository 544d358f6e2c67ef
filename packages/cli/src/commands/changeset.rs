use super::load::{load_config, load_session, SessionArgs};
use anyhow::{Context, Result};
use atlas_graph::{Difference, Entity, EntityId};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ChangesetArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Write the changeset here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Upload payload: final values of created and modified entities
#[derive(Debug, Serialize)]
pub struct Changeset {
    pub created: Vec<Arc<Entity>>,
    pub modified: Vec<Arc<Entity>>,
    pub deleted: Vec<EntityId>,
}

impl From<&Difference> for Changeset {
    fn from(diff: &Difference) -> Self {
        Self {
            created: diff.created().to_vec(),
            modified: diff.modified().iter().map(|c| Arc::clone(&c.to)).collect(),
            deleted: diff.deleted().iter().map(|e| e.id()).collect(),
        }
    }
}

pub fn changeset(args: ChangesetArgs, cwd: &str) -> Result<()> {
    let config = load_config(cwd)?;
    let history = load_session(&args.session, config)?;
    let upload = history.upload_changes().context("Cannot prepare upload")?;
    let json = serde_json::to_string_pretty(&Changeset::from(&upload))?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} {} ({})",
                "✓".green(),
                path.display(),
                upload.summary()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

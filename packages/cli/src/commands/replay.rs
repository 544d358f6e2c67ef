use super::load::{load_base, load_config};
use anyhow::{anyhow, Context, Result};
use atlas_editor::{Action, History, RecoveryLog};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON array of base entities
    pub base: PathBuf,

    /// JSON array of `{ "annotation": ..., "actions": [...] }` steps
    pub script: PathBuf,

    /// Recovery log to write (defaults to the configured recovery path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep going when a step is rejected
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub annotation: Option<String>,
    pub actions: Vec<Action>,
}

pub fn replay(args: ReplayArgs, cwd: &str) -> Result<()> {
    let config = load_config(cwd)?;
    let output = args
        .output
        .clone()
        .or_else(|| config.get_recovery_path(cwd))
        .ok_or_else(|| anyhow!("No --output given and no recoveryPath configured"))?;

    let base = load_base(&args.base, &config)?;
    let content = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read {}", args.script.display()))?;
    let steps: Vec<Step> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid action script", args.script.display()))?;

    let mut history = History::with_config(base, config);
    let mut rejected = 0;

    for (i, step) in steps.iter().enumerate() {
        match history.perform(&step.actions, step.annotation.as_deref()) {
            Ok(diff) => println!(
                "   {} step {:>3} {} ({})",
                "✓".green(),
                i + 1,
                step.annotation.as_deref().unwrap_or(""),
                diff.summary()
            ),
            Err(err) if args.keep_going => {
                warn!(step = i + 1, error = %err, "Skipping rejected step");
                println!("   {} step {:>3} {}", "✗".red(), i + 1, err);
                rejected += 1;
            }
            Err(err) => return Err(err).with_context(|| format!("Step {} rejected", i + 1)),
        }
    }

    RecoveryLog::capture(&history).write(&output)?;
    println!();
    println!(
        "✨ {} {} steps, {} rejected → {}",
        "Replayed".green().bold(),
        steps.len(),
        rejected,
        output.display()
    );
    Ok(())
}

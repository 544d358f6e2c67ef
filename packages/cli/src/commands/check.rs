use super::load::{load_config, load_session, SessionArgs};
use anyhow::{bail, Result};
use atlas_editor::{History, IntegrityEngine, Violation};
use clap::Args;
use colored::Colorize;
use tracing::info;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

pub fn check(args: CheckArgs, cwd: &str) -> Result<()> {
    let config = load_config(cwd)?;
    let history = load_session(&args.session, config)?;

    println!("🔍 {} graph integrity", "Checking".green().bold());
    let findings = check_history(&history);

    let mut total = 0;
    for (index, violations) in &findings {
        for violation in violations {
            println!(
                "   {} edit {:>3} [{}] {}",
                "✗".red(),
                index,
                violation.check.yellow(),
                violation
            );
        }
        total += violations.len();
    }

    info!(edits = history.len() - 1, violations = total, "Integrity check finished");
    if total > 0 {
        bail!("{total} integrity violations in {} edits", findings.len());
    }

    println!("   {} {} edits verified", "✓".green(), history.len() - 1);
    Ok(())
}

/// Violations per stack index, skipping clean edits
pub fn check_history(history: &History) -> Vec<(usize, Vec<Violation>)> {
    let engine = IntegrityEngine::new();
    history
        .edits()
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, edit)| (i, engine.check_graph(&edit.graph)))
        .filter(|(_, violations)| !violations.is_empty())
        .collect()
}

use super::load::{load_config, load_session, SessionArgs};
use anyhow::Result;
use atlas_editor::History;
use atlas_graph::Counts;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn summary(args: SummaryArgs, cwd: &str) -> Result<()> {
    let config = load_config(cwd)?;
    let history = load_session(&args.session, config)?;
    let summary = history.difference().summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", "📋 Edit session".bright_blue().bold());
    print_stack(&history);
    println!();

    let rows = [
        ("nodes", summary.nodes),
        ("ways", summary.ways),
        ("relations", summary.relations),
    ];
    for (label, counts) in rows {
        println!("   {:<10} {}", label, format_counts(counts));
    }
    println!("   {:<10} {}", "total".bold(), format_counts(summary.totals()));

    Ok(())
}

fn print_stack(history: &History) {
    for (i, edit) in history.edits().iter().enumerate().skip(1) {
        let marker = if i == history.index() { "▶" } else { " " };
        let label = edit.annotation.as_deref().unwrap_or("(transient)");
        let line = format!("  {marker} {i:>3}  {label}");
        if i > history.index() {
            println!("{}", line.dimmed());
        } else {
            println!("{line}");
        }
    }
}

fn format_counts(counts: Counts) -> String {
    format!(
        "{} {} {}",
        format!("+{}", counts.created).green(),
        format!("~{}", counts.modified).yellow(),
        format!("-{}", counts.deleted).red()
    )
}

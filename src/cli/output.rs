//! Terminal report for a finished search
//!
//! `colored` already honours `NO_COLOR` and `CLICOLOR`.

use crate::search::SearchSummary;
use colored::*;

/// Report body: counts, pairing mode, then one line per written MSA
pub fn summary_lines(summary: &SearchSummary) -> Vec<String> {
    let pairing = if summary.paired {
        "paired across chains"
    } else {
        "unpaired only, no complexes"
    };
    let mut lines = vec![
        format!(
            "{} jobs, {} distinct sequences",
            summary.jobs, summary.sequences
        ),
        format!("MSAs {}", pairing),
    ];
    lines.extend(summary.outputs.iter().map(|p| p.display().to_string()));
    lines
}

pub fn print_summary(summary: &SearchSummary) {
    println!(
        "\n{} {} MSA files written",
        "✓".green().bold(),
        summary.outputs.len()
    );
    for line in summary_lines(summary) {
        println!("  {} {}", "•".dimmed(), line);
    }

    // Leftover intermediates never fail the run
    for warning in &summary.cleanup.warnings {
        println!("  {} {}", "⚠".yellow(), warning.to_string().yellow());
    }
}

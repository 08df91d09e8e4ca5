//! Output formatters for scrub reports

use anyhow::Result;
use colored::*;
use macroscrub_core::ScrubReport;
use std::path::Path;

/// Print a report in human-readable format with colors
pub fn print_human(input: &Path, report: &ScrubReport) {
    println!("{}", format!("Processing: {}", input.display()).bold());
    println!();

    print_check("Workbook part present", report.structure.has_workbook_part);
    print_check("VBA project present", report.structure.has_vba_project);
    println!();

    let changed = report.clean.parts_changed.len();
    if changed > 0 {
        println!(
            "{} {}",
            "Protection removed from".green(),
            format!("{changed} XML part(s)").green().bold()
        );
        for part in &report.clean.parts_changed {
            println!("  - {part}");
        }
    } else {
        println!("{}", "No protection elements found".dimmed());
    }
    for (part, reason) in &report.clean.parts_failed {
        println!("  {} {part}: {reason}", "skipped".yellow());
    }

    if report.vba_password_patched {
        println!("{}", "VBA project password neutralized".green());
    }
    if report.wrapper_traces_removed {
        println!("{}", "Wrapper-tool traces removed".green());
    }
    println!();

    if report.modules.is_empty() {
        println!("{}", "No macro modules found".dimmed());
    } else {
        println!("{}", format!("Macro modules: {}", report.modules.len()).bold());
        for module in &report.modules {
            match &module.export_path {
                Some(path) => println!(
                    "  - {} ({}) -> {}",
                    module.module_name.cyan(),
                    module.kind,
                    path.display()
                ),
                None => println!("  - {} ({})", module.module_name.cyan(), module.kind),
            }
        }
    }

    if !report.renames.is_empty() {
        println!();
        println!(
            "{}",
            format!("Identifiers renamed: {}", report.renames.len()).bold()
        );
        for entry in &report.renames {
            println!("  {} -> {}", entry.original.dimmed(), entry.replacement.green());
        }
    }
    if report.annotated_lines > 0 {
        println!("Lines flagged for review: {}", report.annotated_lines);
    }
    if report.relabeled_routines > 0 {
        println!("Routines relabeled: {}", report.relabeled_routines);
    }

    if !report.warnings.is_empty() {
        println!();
        println!("{}", "Warnings:".yellow().bold());
        for warning in &report.warnings {
            println!("  {} {warning}", "!".yellow());
        }
    }

    println!();
    match &report.output {
        Some(output) => {
            println!("{}", "✓ Container rebuilt".green().bold());
            println!("Output: {}", output.display());
        }
        None => println!("{}", "Rebuild skipped (manual mode)".dimmed()),
    }
}

/// Print a report as JSON
pub fn print_json(report: &ScrubReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn print_check(label: &str, value: bool) {
    if value {
        println!("{} {label}", "✓".green());
    } else {
        println!("{} {label}", "✗".dimmed());
    }
}

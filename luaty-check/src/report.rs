use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::inspections::{Diagnostic, Severity};

/// Inferred type of one declaration, for `--types`
#[derive(Debug, Clone)]
pub struct TypeEntry {
    pub path: String,
    pub line: usize,
    pub name: String,
    pub ty: String,
}

pub fn display_pretty(files: usize, diagnostics: &[Diagnostic], types: &[TypeEntry], verbose: bool) {
    println!("\n{}", "Analyzing Lua code...".bold().cyan());
    println!("{}", "=".repeat(60).cyan());

    if !types.is_empty() {
        println!("\n{}", "Types:".bold().cyan());
        for entry in types {
            println!(
                "  {}:{} {}: {}",
                entry.path.bright_white(),
                format!("{}", entry.line + 1).yellow(),
                entry.name.cyan(),
                entry.ty.green()
            );
        }
    }

    if diagnostics.is_empty() {
        println!("\n{}", "✓ No problems found!".green().bold());
    } else {
        let errors = count(diagnostics, Severity::Error);
        let warnings = count(diagnostics, Severity::Warning);
        println!(
            "\n{} {} error(s), {} warning(s):\n",
            "✗".red().bold(),
            errors.to_string().red(),
            warnings.to_string().yellow()
        );
        for diagnostic in diagnostics {
            display_diagnostic(diagnostic);
        }
    }

    if verbose {
        println!("{}", "-".repeat(60).cyan());
        println!("  {} {}", "Files:".bold(), files);
        println!("  {} {}", "Declarations:".bold(), types.len());
    }
}

fn display_diagnostic(diagnostic: &Diagnostic) {
    let marker = match diagnostic.severity {
        Severity::Error => "error:".red().bold(),
        Severity::Warning => "warning:".yellow().bold(),
    };
    println!(
        "{} {}:{}:{} {}",
        marker,
        diagnostic.path.bright_white(),
        format!("{}", diagnostic.line + 1).yellow(),
        format!("{}", diagnostic.column + 1).yellow(),
        format!("[{}]", diagnostic.code).dimmed()
    );
    println!("  {}\n", diagnostic.message.white());
}

pub fn display_json(files: usize, diagnostics: &[Diagnostic], types: &[TypeEntry]) -> Result<()> {
    let problems: Vec<_> = diagnostics
        .iter()
        .map(|d| {
            json!({
                "file": d.path,
                "line": d.line + 1,
                "column": d.column + 1,
                "severity": d.severity.as_str(),
                "code": d.code,
                "message": d.message,
            })
        })
        .collect();
    let mut result = json!({
        "files": files,
        "diagnostics": problems,
        "error_count": count(diagnostics, Severity::Error),
        "warning_count": count(diagnostics, Severity::Warning),
    });
    if !types.is_empty() {
        result["types"] = types
            .iter()
            .map(|t| json!({ "file": t.path, "line": t.line + 1, "name": t.name, "type": t.ty }))
            .collect();
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn count(diagnostics: &[Diagnostic], severity: Severity) -> usize {
    diagnostics.iter().filter(|d| d.severity == severity).count()
}

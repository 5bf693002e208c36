mod inspections;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use luaty::{Project, ResolveOptions, declaration_type};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use crate::inspections::Severity;
use crate::report::TypeEntry;

#[derive(Parser)]
#[command(name = "luaty-check", about = "Type inference and inspections for Lua files")]
struct Cli {
    /// Lua files or directories to analyze
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format: pretty (default), json
    #[arg(short, long, default_value = "pretty")]
    format: String,

    /// Print the inferred type of every local declaration
    #[arg(long)]
    types: bool,

    /// Do not infer parameter types from call sites
    #[arg(long)]
    no_call_sites: bool,

    /// Do not widen locals with later assignments
    #[arg(long)]
    no_assignment_unions: bool,

    /// Call sites inspected per parameter
    #[arg(long, default_value_t = 64)]
    max_call_sites: usize,
}

impl Cli {
    fn options(&self) -> ResolveOptions {
        ResolveOptions {
            call_site_inference: !self.no_call_sites,
            assignment_unions: !self.no_assignment_unions,
            max_call_sites: self.max_call_sites,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut project = Project::new(cli.options());
    for path in collect_files(&cli.paths) {
        project
            .load_file(&path)
            .with_context(|| format!("Failed to load file: {}", path.display()))?;
    }
    tracing::debug!(files = project.len(), "loaded project");

    let diagnostics = inspections::run(&project);
    let types = if cli.types { collect_types(&project) } else { Vec::new() };

    match cli.format.as_str() {
        "json" => report::display_json(project.len(), &diagnostics, &types)?,
        _ => report::display_pretty(project.len(), &diagnostics, &types, cli.verbose),
    }

    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        std::process::exit(1);
    }

    Ok(())
}

/// Files named directly plus every `.lua` file under the named directories
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && is_lua(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn is_lua(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "lua")
}

fn collect_types(project: &Project) -> Vec<TypeEntry> {
    let ctx = project.search_context();
    let mut entries = Vec::new();
    for file in project.files() {
        let Some(tree) = project.scope_tree(file.id()) else {
            continue;
        };
        let mut locals: Vec<_> = tree.locals().map(|local| &local.decl).filter(|d| d.name != "self").collect();
        locals.sort_by_key(|decl| decl.location.start);
        for decl in locals {
            entries.push(TypeEntry {
                path: file.path().to_string(),
                line: file.line_col(decl.location.start).0,
                name: decl.name.clone(),
                ty: declaration_type(&ctx, decl).to_string(),
            });
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.lua"), "local a = 1").unwrap();
        std::fs::write(dir.path().join("nested/b.lua"), "local b = 2").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = collect_files(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_lua(f)));
    }

    #[test]
    fn test_collect_types_lists_locals() {
        let mut project = Project::default();
        project.set_file("a.lua", "local n = 1\nlocal s = 'x'\nprint(n, s)\n").unwrap();
        let types = collect_types(&project);
        let pairs: Vec<(&str, &str)> = types.iter().map(|t| (t.name.as_str(), t.ty.as_str())).collect();
        assert_eq!(pairs, vec![("n", "number"), ("s", "string")]);
        assert_eq!(types[1].line, 1);
    }

    #[test]
    fn test_flags_map_to_options() {
        let cli = Cli::parse_from(["luaty-check", "--no-call-sites", "--max-call-sites", "8", "src"]);
        let options = cli.options();
        assert!(!options.call_site_inference);
        assert!(options.assignment_unions);
        assert_eq!(options.max_call_sites, 8);
    }
}

//! `prevu build` command: compile a project directory into a bundle script.
//!
//! The emitted script expects the sandbox environment (`__prevu_host`); it
//! is the same artifact `run` mounts, written out for inspection.

use miette::{IntoDiagnostic, Result};
use prevu_core::bundle::compile_project;
use prevu_core::compiler::SwcBackend;
use prevu_core::files::ProjectFiles;
use std::path::Path;

pub fn run(dir: &Path, entry: &str, out: Option<&Path>) -> Result<()> {
    let files = ProjectFiles::load_dir(dir).into_diagnostic()?;
    let bundle = compile_project(&files, entry, &SwcBackend::new())
        .map_err(|e| miette::miette!("{e}"))?;

    tracing::info!(
        modules = bundle.modules.len(),
        entry = %bundle.entry_point,
        "bundle assembled"
    );

    match out {
        Some(path) => std::fs::write(path, &bundle.code).into_diagnostic()?,
        None => print!("{}", bundle.code),
    }
    Ok(())
}

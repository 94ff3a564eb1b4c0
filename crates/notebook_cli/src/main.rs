//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `notebook_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use clap::Parser;
use notebook_core::{
    init_logging_from_config, DocumentModel, KernelSpec, ModelResult, NotebookConfig,
    NotebookModel, OutputRecord,
};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "notebook_cli")]
#[command(about = "Builds a small notebook and prints a deterministic summary")]
struct Cli {
    /// Absolute directory for rotating log files; logging stays off when unset
    #[arg(long)]
    log_dir: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = NotebookConfig::default();
    if let Some(dir) = cli.log_dir.as_deref() {
        if let Err(err) = init_logging_from_config(&config, dir) {
            eprintln!("logging init failed: {err}");
            return ExitCode::FAILURE;
        }
    }

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("notebook_core error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: NotebookConfig) -> ModelResult<()> {
    let mut notebook = NotebookModel::with_config(config);
    notebook.set_kernelspec(Some(KernelSpec {
        name: "python3".to_string(),
        display_name: "Python 3".to_string(),
    }));

    let title = notebook.create_markdown_cell(None)?;
    title.set_source("# Overview");
    notebook.push_cell(title)?;

    let code = notebook.create_code_cell(None)?;
    code.set_source("print(6 * 7)");
    if let Some(view) = code.as_code() {
        view.set_execution_count(Some(1));
        view.outputs().add(OutputRecord::stream("stdout", "42\n"))?;
    }
    notebook.push_cell(code)?;

    println!("notebook_core version={}", notebook_core::core_version());
    println!(
        "cells={} kernel={} language={} dirty={}",
        notebook.len(),
        notebook.default_kernel_name(),
        notebook.default_kernel_language(),
        notebook.dirty()
    );
    for cell in notebook.cells() {
        let prompt = cell.as_code().map(|code| code.prompt()).unwrap_or_default();
        println!("{} {} {:?}", cell.cell_type().as_str(), prompt, cell.source());
    }
    println!("{}", serde_json::to_string_pretty(&notebook.to_json()?)?);
    Ok(())
}

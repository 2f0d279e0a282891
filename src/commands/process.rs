//! Process command implementation

use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, ProcessingOutcome};
use crate::progress::start_progress_bar;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Outcome for one file
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    pub path: String,
    #[serde(flatten)]
    pub outcome: ProcessingOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessReport {
    pub files: Vec<ProcessedFile>,
    /// Files that could not be read at all
    pub unreadable: Vec<String>,
}

impl ProcessReport {
    /// Number of files per outcome status
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for file in &self.files {
            *counts.entry(file.outcome.status()).or_insert(0) += 1;
        }
        counts
    }

    pub fn has_errors(&self) -> bool {
        !self.unreadable.is_empty() || self.files.iter().any(|f| f.outcome.is_error())
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Expand the given paths into PDF files. Directories are walked
/// recursively; explicit files are taken as given.
pub fn collect_pdfs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
                match entry {
                    Ok(e) if e.file_type().is_file() && is_pdf(e.path()) => {
                        files.push(e.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable entry: {}", e),
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(Error::InvalidPath(path.display().to_string()));
        }
    }

    Ok(files)
}

/// Process PDF files with at most `concurrency` documents in flight
pub async fn cmd_process(
    pipeline: &Pipeline,
    paths: &[PathBuf],
    concurrency: usize,
) -> Result<ProcessReport> {
    let files = collect_pdfs(paths)?;
    info!("Found {} PDF files to process", files.len());

    let progress = start_progress_bar(files.len(), "Processing documents");
    let mut report = ProcessReport::default();

    let mut results = stream::iter(files)
        .map(|path| async move {
            let outcome = process_file(pipeline, &path).await;
            (path, outcome)
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((path, outcome)) = results.next().await {
        let shown = path.display().to_string();
        match outcome {
            Ok(outcome) => {
                info!(path = %shown, status = outcome.status(), "Finished document");
                report.files.push(ProcessedFile {
                    path: shown,
                    outcome,
                });
            }
            Err(e) => {
                warn!(path = %shown, "Could not read file: {}", e);
                report.unreadable.push(format!("{}: {}", shown, e));
            }
        }
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message("Documents processed");
    }

    report.files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(report)
}

async fn process_file(pipeline: &Pipeline, path: &Path) -> Result<ProcessingOutcome> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(pipeline.process_document(&filename, bytes).await)
}

/// Print a processing report to console
pub fn print_process_report(report: &ProcessReport) {
    for file in &report.files {
        match &file.outcome {
            ProcessingOutcome::Completed {
                source,
                date,
                results,
                ..
            } => {
                println!("✓ {} [{} {}]", file.path, source, date);
                for task in results.keys() {
                    println!("    {}", task);
                }
            }
            ProcessingOutcome::IndexedOther { date, .. } => {
                println!("• {} [Other {}] indexed, no tasks", file.path, date);
            }
            ProcessingOutcome::Duplicate { document_id } => {
                println!("= {} already processed (document {})", file.path, document_id);
            }
            other => {
                println!(
                    "✗ {} {}: {}",
                    file.path,
                    other.status(),
                    other.detail().unwrap_or_default()
                );
            }
        }
    }

    for entry in &report.unreadable {
        println!("✗ {}", entry);
    }

    println!();
    for (status, count) in report.counts() {
        println!("  {}: {}", status, count);
    }
}

//! JSON export of parsed documents.
//!
//! Each document that parses is written to its own file named by id:
//! ```text
//! output_dir/
//! ├── 0.json
//! ├── 1.json
//! └── 2.json
//! ```
//!
//! Uncached documents are fetched (rate limited) on the way. Documents that
//! are unavailable or fail to parse are skipped.

use crate::corpus::Corpus;
use crate::fetcher::PageSource;
use crate::models::Document;
use crate::parser::ArticleExtractor;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Counts from one [`export_documents`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub written: usize,
    pub skipped: usize,
}

/// Path of the export file for document `id`.
pub fn document_path(output_dir: &Path, id: usize) -> PathBuf {
    output_dir.join(format!("{id}.json"))
}

/// Write one document as pretty-printed JSON.
pub async fn write_document(
    document: &Document,
    output_dir: &Path,
    id: usize,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(document)?;
    let path = document_path(output_dir, id);
    fs::write(&path, json).await?;
    Ok(path)
}

/// Export up to `limit` documents (all when `None`) in id order.
///
/// # Errors
///
/// Fails only if the output directory cannot be created. Per-document
/// problems are logged and counted as skipped.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn export_documents<S: PageSource, P: ArticleExtractor>(
    corpus: &mut Corpus<S, P>,
    output_dir: &Path,
    limit: Option<usize>,
) -> Result<ExportReport, Box<dyn Error>> {
    info!("Ensuring export directory exists");
    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(error = %e, "Failed to create export dir");
        return Err(e.into());
    }

    let total = limit.map_or(corpus.total_documents(), |n| n.min(corpus.total_documents()));
    let mut report = ExportReport::default();
    for id in 0..total {
        let Some(document) = corpus.get_document(id).await else {
            warn!(id, "Document unavailable; not exported");
            report.skipped += 1;
            continue;
        };
        match write_document(&document, output_dir, id).await {
            Ok(_) => report.written += 1,
            Err(e) => {
                error!(id, error = %e, "Failed writing document JSON");
                report.skipped += 1;
            }
        }
    }

    info!(written = report.written, skipped = report.skipped, "Export complete");
    Ok(report)
}

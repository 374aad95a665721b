//! # News Corpus
//!
//! Command-line front end for the corpus crawler.
//!
//! ## Usage
//!
//! ```sh
//! news_corpus --corpus-root ./corpus update --verbose
//! news_corpus --corpus-root ./corpus stats
//! news_corpus --corpus-root ./corpus show 3
//! news_corpus --corpus-root ./corpus export -o ./json
//! ```

use clap::Parser;
use news_corpus::outputs::json;
use news_corpus::{Corpus, DocumentRef, UpdateOptions};
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();

    let args = Cli::parse();
    debug!(?args.corpus_root, ?args.command, "Parsed CLI arguments");

    let config = match args.corpus_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "No usable corpus configuration");
            return Err(e);
        }
    };
    let mut corpus = Corpus::open(config).await?;
    info!(
        root = %corpus.config().root().display(),
        documents = corpus.total_documents(),
        "news_corpus starting up"
    );

    match args.command {
        Command::Update {
            verbose,
            testing,
            urls,
        } => {
            let urls = (!urls.is_empty()).then(|| urls.into_iter().map(String::from).collect());
            let report = corpus
                .update(UpdateOptions {
                    verbose,
                    testing,
                    urls,
                })
                .await;
            println!(
                "discovered {} | added {} | total {} | fetched {} | failed {}",
                report.discovered,
                report.added,
                report.total,
                report.prime.fetched,
                report.prime.failed
            );
        }
        Command::Show { document } => {
            let doc: DocumentRef = document.parse()?;
            match corpus.get_document(doc.clone()).await {
                Some(parsed) => println!("{}", serde_json::to_string_pretty(&parsed)?),
                None => {
                    error!(%doc, "Document unavailable");
                    return Err(format!("document {doc} is unavailable").into());
                }
            }
        }
        Command::Stats => {
            let total = corpus.total_documents();
            let mut cached = 0;
            for id in 0..total {
                if corpus.is_cached(id).await {
                    cached += 1;
                }
            }
            println!("documents: {total}");
            println!("cached:    {cached}");
        }
        Command::Uris => {
            for (id, uri) in corpus.all_uris().iter().enumerate() {
                println!("{id}\t{uri}");
            }
        }
        Command::Export { output_dir, limit } => {
            let report = json::export_documents(&mut corpus, &output_dir, limit).await?;
            println!(
                "exported {} | skipped {} | to {}",
                report.written,
                report.skipped,
                output_dir.display()
            );
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        fetches = corpus.fetches_issued(),
        "Execution complete"
    );
    Ok(())
}

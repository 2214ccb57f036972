use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::db;
use crate::error::{RunError, StoreError};
use crate::fetch::{Fetch, FetchedPage};
use crate::parser;
use crate::parser::extract::{CardSelectors, EventRecord};

/// Counters and errors of one fetch → extract → store run.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub extracted: usize,
    pub inserted: usize,
    /// Events that were not in the store before this run.
    pub new_events: usize,
    pub skipped: usize,
    #[serde(serialize_with = "errors_as_strings")]
    pub errors: Vec<RunError>,
}

fn errors_as_strings<S: Serializer>(errors: &[RunError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(ToString::to_string))
}

/// A failed fetch ends the run early with an empty summary carrying the error.
/// Per-card and per-record failures are collected and never stop the run.
pub async fn extract_and_store<F: Fetch>(
    conn: &Connection,
    fetcher: &F,
    url: &str,
    selectors: &CardSelectors,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    let body = match fetcher.fetch(url).await.and_then(FetchedPage::into_body) {
        Ok(body) => body,
        Err(e) => {
            warn!("Fetch failed, nothing extracted: {}", e);
            summary.errors.push(e.into());
            return Ok(summary);
        }
    };

    let extraction = parser::process_page(&body, selectors);
    summary.skipped = extraction.skipped;
    let (records, extraction_errors) = extraction.into_parts();
    summary.extracted = records.len();
    summary
        .errors
        .extend(extraction_errors.into_iter().map(RunError::from));

    let before = db::counts(conn)?.events;
    let (stored, store_errors) = store_records(conn, &records)?;
    summary.inserted = stored;
    summary.new_events = db::counts(conn)?.events.saturating_sub(before);
    summary
        .errors
        .extend(store_errors.into_iter().map(RunError::from));

    Ok(summary)
}

/// Upsert every record inside one run-level transaction, committed at the end.
pub fn store_records(
    conn: &Connection,
    records: &[EventRecord],
) -> Result<(usize, Vec<StoreError>)> {
    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin run transaction")?;
    let mut stored = 0usize;
    let mut errors = Vec::new();

    for record in records {
        match db::upsert(&tx, record) {
            Ok(id) => {
                debug!("Stored {:?} as event {}", record.name, id);
                stored += 1;
            }
            Err(e) => {
                warn!("{}", e);
                errors.push(e);
            }
        }
        pb.inc(1);
    }

    tx.commit().context("Failed to commit run transaction")?;
    pb.finish_and_clear();
    info!("Stored {} events ({} errors)", stored, errors.len());

    Ok((stored, errors))
}

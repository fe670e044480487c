use crate::broker::Broker;
use crate::config::CHANNEL_CAPACITY;
use crate::dump::RevisionReader;
use crate::entity::deserialize;
use crate::error::{DeserializeError, DumpError};
use crate::models::RawRevision;
use crate::stats::RunStats;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Stop after this many processed revisions.
    pub limit: Option<u64>,
    /// Treat recoverable revision errors as fatal.
    pub strict: bool,
}

/// Runs the full dump-to-facts pipeline over one history dump.
///
/// A dedicated thread reads and parses the XML; revisions cross a bounded
/// channel so that a slow sink applies backpressure to the parser instead of
/// letting decoded revisions pile up. Dispatch happens on the calling thread,
/// which keeps per-page revision order intact.
pub fn run(
    input: &Path,
    options: PipelineOptions,
    broker: &mut Broker,
    stats: &Arc<RunStats>,
) -> Result<()> {
    let reader = RevisionReader::open(input)
        .with_context(|| format!("Failed to open dump at: {}", input.display()))?;

    info!("Reading revisions from: {}", input.display());

    let cancel = Arc::new(AtomicBool::new(false));
    let reader_cancel = Arc::clone(&cancel);
    let (tx, rx) = sync_channel::<Result<RawRevision, DumpError>>(CHANNEL_CAPACITY);

    let handle = thread::spawn(move || {
        for item in reader {
            if reader_cancel.load(Ordering::Relaxed) {
                break;
            }
            if tx.send(item).is_err() {
                break;
            }
        }
    });

    let outcome = consume(&rx, options, broker, stats);

    cancel.store(true, Ordering::Relaxed);
    drop(rx);
    if handle.join().is_err() {
        bail!("Dump reader thread panicked");
    }

    outcome?;
    broker.finish().context("Failed to finalize observers")?;
    Ok(())
}

fn consume(
    rx: &Receiver<Result<RawRevision, DumpError>>,
    options: PipelineOptions,
    broker: &mut Broker,
    stats: &Arc<RunStats>,
) -> Result<()> {
    let mut current_page: Option<u64> = None;
    let mut last_revision_id: Option<u64> = None;

    for item in rx {
        let revision = match item {
            Ok(revision) => revision,
            Err(DumpError::MalformedRevision {
                page_id,
                page_title,
                revision_id,
                reason,
            }) => {
                stats.inc_malformed();
                warn!(
                    page_id,
                    page = %page_title,
                    revision = ?revision_id,
                    reason = %reason,
                    "Skipping malformed revision"
                );
                if options.strict {
                    bail!(
                        "Malformed revision in page {} ({}): {}",
                        page_id,
                        page_title,
                        reason
                    );
                }
                continue;
            }
            Err(DumpError::TruncatedDump { page_id, page_title }) => {
                stats.inc_truncated();
                warn!(page_id, page = %page_title, "Dump ends mid-page");
                if options.strict {
                    bail!("Truncated dump in page {} ({})", page_id, page_title);
                }
                break;
            }
            Err(e) => return Err(e).context("Fatal error while reading dump"),
        };

        stats.inc_revisions_read();

        if current_page != Some(revision.page_id) {
            current_page = Some(revision.page_id);
            last_revision_id = None;
            stats.inc_pages();
        }

        // Within a page the dump chains revisions through parent ids. A gap
        // is worth a warning but the revision itself is still good data.
        if let (Some(parent), Some(previous)) =
            (revision.parent_revision_id, last_revision_id)
        {
            if parent != previous {
                stats.inc_consistency_warnings();
                warn!(
                    page_id = revision.page_id,
                    revision = revision.revision_id,
                    parent,
                    previous,
                    "Parent revision id does not match preceding revision"
                );
            }
        }
        last_revision_id = Some(revision.revision_id);

        let document = match deserialize(
            &revision.content_model,
            revision.text.as_deref().unwrap_or(""),
        ) {
            Ok(document) => document,
            Err(DeserializeError::UnsupportedModel(model)) => {
                stats.inc_unsupported_models();
                debug!(
                    revision = revision.revision_id,
                    model = %model,
                    "Skipping non-entity content model"
                );
                continue;
            }
            Err(DeserializeError::Redirect(target)) => {
                stats.inc_redirects();
                debug!(
                    revision = revision.revision_id,
                    target = %target,
                    "Skipping redirect revision"
                );
                continue;
            }
            Err(e) => {
                stats.inc_deserialize_failures();
                warn!(
                    page_id = revision.page_id,
                    revision = revision.revision_id,
                    error = %e,
                    "Skipping undeserializable revision"
                );
                if options.strict {
                    bail!(
                        "Failed to deserialize revision {} of page {}: {}",
                        revision.revision_id,
                        revision.page_id,
                        e
                    );
                }
                continue;
            }
        };

        broker
            .dispatch(&document, &revision.provenance())
            .with_context(|| {
                format!(
                    "Observer failed on revision {} of {}",
                    revision.revision_id, document.entity_id
                )
            })?;
        stats.inc_revisions_processed();

        if let Some(limit) = options.limit {
            if stats.processed() >= limit {
                info!(limit, "Revision limit reached");
                break;
            }
        }
    }

    Ok(())
}

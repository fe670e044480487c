use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the dump markup reader.
///
/// `Io` and `Markup` are fatal. `MalformedRevision` is recoverable per
/// revision: the reader resynchronises to the enclosing element and the
/// caller may skip and continue. `TruncatedDump` means the stream ended
/// mid-page; it is treated as end-of-input with a warning because partial
/// dump files do occur in the wild.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("I/O error reading dump")]
    Io(#[from] std::io::Error),

    #[error("unrecognised compression container: {path}")]
    UnknownContainer { path: PathBuf },

    #[error("invalid dump markup: {0}")]
    Markup(quick_xml::Error),

    #[error("malformed revision (page {page_id} \"{page_title}\", revision {revision_id:?}): {reason}")]
    MalformedRevision {
        page_id: u64,
        page_title: String,
        revision_id: Option<u64>,
        reason: String,
    },

    #[error("dump truncated mid-page (page {page_id} \"{page_title}\")")]
    TruncatedDump { page_id: u64, page_title: String },
}

/// Errors from deserializing one revision's entity content.
///
/// All variants are recoverable per revision; the skip is logged with full
/// provenance so the run stays auditable.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("revision has no content text")]
    EmptyContent,

    #[error("content model '{0}' is not fact-serializable")]
    UnsupportedModel(String),

    #[error("entity snapshot is a redirect to {0}")]
    Redirect(String),

    #[error("entity snapshot has no entity id")]
    MissingEntityId,

    #[error("entity JSON does not parse")]
    Json(#[from] serde_json::Error),
}

/// A sink write failure. Fatal: partial unflushable output cannot be trusted.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write fact to sink")]
    Io(#[from] std::io::Error),
}

/// Registry construction failures (loading the auxiliary dumps).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse property registry CSV")]
    Csv(#[from] csv::Error),

    #[error("sites dump contains no INSERT statement for the sites table")]
    MissingSitesInsert,
}

//! Clio: temporal fact extraction from Wikibase full-history dumps
//!
//! This crate streams a MediaWiki pages-meta-history XML dump of a Wikibase
//! repository (such as Wikidata) and converts every entity revision into
//! timestamped, provenance-tagged facts:
//!
//! 1. **Dump Reading** -- Decompress and parse the XML stream one revision at
//!    a time; the dump is never loaded into memory and revisions surface in
//!    exact stream order
//! 2. **Entity Deserialization** -- Decode each revision's Wikibase entity
//!    JSON, tolerating every historical format variant back to the earliest
//!    dumps
//! 3. **Fact Emission** -- Derive facts (labels, descriptions, aliases,
//!    statements, sitelinks) from each entity snapshot, each fact stamped
//!    with its revision id, timestamp, and contributor
//!
//! # Architecture
//!
//! - **Streaming XML parsing** -- Event-based parsing over a decompressing
//!   reader; bounded memory regardless of dump size
//! - **Two-stage pipeline** -- A reader thread feeds revisions over a bounded
//!   channel, so a slow sink backpressures the parser
//! - **Observer fan-out** -- A broker dispatches every revision to registered
//!   observers in order; adding a consumer never touches the parse path
//! - **Error containment** -- A malformed revision is skipped and counted; IO
//!   and sink failures abort the run
//!
//! # Key Modules
//!
//! - [`dump`] -- Streaming revision reader with container autodetection
//! - [`entity`] -- Wikibase entity JSON deserialization across format eras
//! - [`emit`] -- Fact derivation, prefix compaction, emission policies
//! - [`registry`] -- Property and site lookup tables loaded from dumps
//! - [`broker`] -- Observer registration and ordered dispatch
//! - [`pipeline`] -- Reader thread, channel, and the dispatch loop
//! - [`models`] -- Core data types (RawRevision, Fact, Provenance)
//! - [`stats`] -- Thread-safe atomic counters for run metrics
//! - [`config`] -- Pipeline constants
//!
//! # Example Usage
//!
//! ```bash
//! # Extract facts from a full-history dump
//! clio extract -i wikidatawiki-pages-meta-history.xml.bz2 -o facts.tsv \
//!     --properties properties.csv --sites wikidatawiki-sites.sql.gz
//!
//! # Validate a dump without writing facts
//! clio check -i wikidatawiki-pages-meta-history.xml.bz2
//! ```

pub mod broker;
pub mod config;
pub mod decompress;
pub mod dump;
pub mod emit;
pub mod entity;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod stats;

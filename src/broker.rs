use crate::emit::{emit_facts, EmitterPolicy, FactSink};
use crate::entity::EntityDocument;
use crate::error::EmitError;
use crate::models::Provenance;
use crate::registry::{PropertyRegistry, SiteRegistry};
use crate::stats::RunStats;
use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::info;

/// Receives every successfully deserialized revision, in dump order.
pub trait RevisionObserver: Send {
    fn observe(
        &mut self,
        document: &EntityDocument,
        provenance: &Provenance,
    ) -> Result<(), EmitError>;

    /// Called once after the last revision, before the pipeline returns.
    fn finish(&mut self) -> Result<(), EmitError> {
        Ok(())
    }
}

/// Fans one revision stream out to several observers. Observers run in
/// registration order; the first failure aborts the dispatch.
#[derive(Default)]
pub struct Broker {
    observers: Vec<Box<dyn RevisionObserver>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Box<dyn RevisionObserver>) {
        self.observers.push(observer);
    }

    pub fn dispatch(
        &mut self,
        document: &EntityDocument,
        provenance: &Provenance,
    ) -> Result<(), EmitError> {
        for observer in &mut self.observers {
            observer.observe(document, provenance)?;
        }
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), EmitError> {
        for observer in &mut self.observers {
            observer.finish()?;
        }
        Ok(())
    }
}

/// Spinner plus a periodic throughput line on the revision stream.
pub struct ProgressObserver {
    bar: ProgressBar,
    interval: u64,
    seen: u64,
}

impl ProgressObserver {
    pub fn new(interval: u64) -> Self {
        Self {
            bar: ProgressBar::new_spinner(),
            // An interval of zero would divide by zero below.
            interval: interval.max(1),
            seen: 0,
        }
    }
}

impl RevisionObserver for ProgressObserver {
    fn observe(
        &mut self,
        _document: &EntityDocument,
        _provenance: &Provenance,
    ) -> Result<(), EmitError> {
        self.seen += 1;
        if self.seen % self.interval == 0 {
            self.bar.tick();
            info!(revisions = self.seen, "Processing");
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EmitError> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

/// Runs the fact emitter for every revision and appends to one sink.
pub struct FactWriter {
    policy: EmitterPolicy,
    properties: Arc<PropertyRegistry>,
    sites: Arc<SiteRegistry>,
    sink: Box<dyn FactSink>,
    stats: Arc<RunStats>,
}

impl FactWriter {
    pub fn new(
        policy: EmitterPolicy,
        properties: Arc<PropertyRegistry>,
        sites: Arc<SiteRegistry>,
        sink: Box<dyn FactSink>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            policy,
            properties,
            sites,
            sink,
            stats,
        }
    }
}

impl RevisionObserver for FactWriter {
    fn observe(
        &mut self,
        document: &EntityDocument,
        provenance: &Provenance,
    ) -> Result<(), EmitError> {
        let outcome = emit_facts(
            document,
            provenance,
            &self.policy,
            &self.properties,
            &self.sites,
            self.sink.as_mut(),
        )?;
        self.stats.add_facts(outcome.facts);
        self.stats.add_registry_misses(outcome.registry_misses);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EmitError> {
        self.sink.flush()
    }
}

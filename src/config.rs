/// Bounded channel window between the dump reader thread and the dispatch loop
pub const CHANNEL_CAPACITY: usize = 256;

/// Progress update interval (tick every N revisions)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Content model tag for Wikibase item snapshots
pub const MODEL_WIKIBASE_ITEM: &str = "wikibase-item";

/// Content model tag for Wikibase property snapshots
pub const MODEL_WIKIBASE_PROPERTY: &str = "wikibase-property";

/// Base URI for entity subjects (wd:)
pub const ENTITY_BASE_URI: &str = "http://www.wikidata.org/entity/";

/// Datatype tag attached to objects that could not be resolved against a registry
pub const UNRESOLVED_DATATYPE: &str = "clio:unresolved";

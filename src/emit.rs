use crate::config::{ENTITY_BASE_URI, UNRESOLVED_DATATYPE};
use crate::entity::{EntityDocument, Rank, SnakValue};
use crate::error::EmitError;
use crate::models::{Fact, FactObject, Provenance};
use crate::registry::{PropertyRegistry, SiteRegistry};
use rustc_hash::FxHashMap;
use std::io::Write;

// Prefixes taken from the Wikibase RDF dump format documentation, sorted so
// that the longer URLs come first to enable one-pass prefixing.
pub const PREFIXES: &[(&str, &str)] = &[
    ("cc", "http://creativecommons.org/ns#"),
    ("dct", "http://purl.org/dc/terms/"),
    ("schema", "http://schema.org/"),
    ("wikibase", "http://wikiba.se/ontology#"),
    ("hint", "http://www.bigdata.com/queryHints#"),
    ("bd", "http://www.bigdata.com/rdf#"),
    ("geo", "http://www.opengis.net/ont/geosparql#"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("skos", "http://www.w3.org/2004/02/skos/core#"),
    ("ontolex", "http://www.w3.org/ns/lemon/ontolex#"),
    ("prov", "http://www.w3.org/ns/prov#"),
    ("wds", "http://www.wikidata.org/entity/statement/"),
    ("wd", "http://www.wikidata.org/entity/"),
    ("wdtn", "http://www.wikidata.org/prop/direct-normalized/"),
    ("wdt", "http://www.wikidata.org/prop/direct/"),
    ("wdno", "http://www.wikidata.org/prop/novalue/"),
    ("pqn", "http://www.wikidata.org/prop/qualifier/value-normalized/"),
    ("pqv", "http://www.wikidata.org/prop/qualifier/value/"),
    ("pq", "http://www.wikidata.org/prop/qualifier/"),
    ("prn", "http://www.wikidata.org/prop/reference/value-normalized/"),
    ("prv", "http://www.wikidata.org/prop/reference/value/"),
    ("pr", "http://www.wikidata.org/prop/reference/"),
    ("psn", "http://www.wikidata.org/prop/statement/value-normalized/"),
    ("psv", "http://www.wikidata.org/prop/statement/value/"),
    ("ps", "http://www.wikidata.org/prop/statement/"),
    ("p", "http://www.wikidata.org/prop/"),
    ("wdref", "http://www.wikidata.org/reference/"),
    ("wdv", "http://www.wikidata.org/value/"),
    ("wdata", "http://www.wikidata.org/wiki/Special:EntityData/"),
];

const RDFS_LABEL: &str = "rdfs:label";
const SCHEMA_DESCRIPTION: &str = "schema:description";
const SKOS_ALT_LABEL: &str = "skos:altLabel";
const SCHEMA_ABOUT: &str = "schema:about";
const XSD_DATE_TIME: &str = "xsd:dateTime";
const XSD_DECIMAL: &str = "xsd:decimal";
const GEO_WKT: &str = "geo:wktLiteral";

/// Compacts a full URI against the prefix table; unknown bases pass through.
pub fn compact_uri(uri: &str) -> String {
    for (prefix, base) in PREFIXES {
        if let Some(rest) = uri.strip_prefix(base) {
            return format!("{}:{}", prefix, rest);
        }
    }
    uri.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankFilter {
    #[default]
    All,
    BestRankOnly,
}

/// What to do when a property or site key is absent from its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// Emit the fact with the value as an unresolved-literal object.
    #[default]
    EmitLiteral,
    /// Drop the statement (still counted as a miss).
    SkipStatement,
}

/// Recognized emission policies. The default is "all entities, all exact
/// data": no filtering.
#[derive(Debug, Clone, Copy)]
pub struct EmitterPolicy {
    pub include_labels: bool,
    pub include_descriptions: bool,
    pub include_aliases: bool,
    pub include_sitelinks: bool,
    pub rank_filter: RankFilter,
    pub unresolved: UnresolvedPolicy,
}

impl Default for EmitterPolicy {
    fn default() -> Self {
        Self {
            include_labels: true,
            include_descriptions: true,
            include_aliases: true,
            include_sitelinks: true,
            rank_filter: RankFilter::default(),
            unresolved: UnresolvedPolicy::default(),
        }
    }
}

/// Append-only fact consumer. The emitter writes in derivation order and
/// never reorders or deduplicates across revisions.
pub trait FactSink: Send {
    fn write_fact(&mut self, fact: &Fact) -> Result<(), EmitError>;
    fn flush(&mut self) -> Result<(), EmitError> {
        Ok(())
    }
}

/// Line-oriented sink: one fact per line in the stable `Fact` encoding.
pub struct LineSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> FactSink for LineSink<W> {
    fn write_fact(&mut self, fact: &Fact) -> Result<(), EmitError> {
        self.writer.write_all(fact.to_line().as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EmitError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitOutcome {
    pub facts: u64,
    pub registry_misses: u64,
}

fn entity_uri(entity_id: &str) -> String {
    compact_uri(&format!("{}{}", ENTITY_BASE_URI, entity_id))
}

/// Lexical form used when a value must degrade to an unresolved literal.
fn value_lexical(value: &SnakValue) -> Option<String> {
    match value {
        SnakValue::EntityId(id) => Some(id.clone()),
        SnakValue::String(s) => Some(s.clone()),
        SnakValue::Time(t) => Some(t.clone()),
        SnakValue::Quantity(q) => Some(q.clone()),
        SnakValue::Coordinate {
            latitude,
            longitude,
        } => Some(format!("Point({} {})", longitude, latitude)),
        SnakValue::Monolingual { text, .. } => Some(text.clone()),
        SnakValue::Untyped(raw) => Some(raw.clone()),
        SnakValue::NoValue | SnakValue::SomeValue => None,
    }
}

/// Maps a resolved statement value to its object term. `datatype` is the
/// property's declared datatype from the registry, when known.
fn value_object(value: &SnakValue, datatype: Option<&str>) -> Option<FactObject> {
    match value {
        SnakValue::EntityId(id) => Some(FactObject::Uri(entity_uri(id))),
        SnakValue::String(s) => match datatype {
            Some("url") => Some(FactObject::Uri(s.clone())),
            _ => Some(FactObject::plain(s.clone())),
        },
        SnakValue::Time(t) => Some(FactObject::typed(t.clone(), XSD_DATE_TIME)),
        SnakValue::Quantity(q) => Some(FactObject::typed(q.clone(), XSD_DECIMAL)),
        SnakValue::Coordinate {
            latitude,
            longitude,
        } => Some(FactObject::typed(
            format!("Point({} {})", longitude, latitude),
            GEO_WKT,
        )),
        SnakValue::Monolingual { language, text } => {
            Some(FactObject::lang(text.clone(), language.clone()))
        }
        SnakValue::Untyped(raw) => Some(FactObject::plain(raw.clone())),
        SnakValue::NoValue | SnakValue::SomeValue => None,
    }
}

/// Converts one entity document plus its revision provenance into facts and
/// writes them to the sink in derivation order: labels, descriptions,
/// aliases, statements, sitelinks.
pub fn emit_facts(
    document: &EntityDocument,
    provenance: &Provenance,
    policy: &EmitterPolicy,
    properties: &PropertyRegistry,
    sites: &SiteRegistry,
    sink: &mut dyn FactSink,
) -> Result<EmitOutcome, EmitError> {
    let subject = entity_uri(&document.entity_id);
    let mut outcome = EmitOutcome::default();

    let mut write = |predicate: String, object: FactObject, sink: &mut dyn FactSink| {
        let fact = Fact {
            subject: subject.clone(),
            predicate,
            object,
            provenance: provenance.clone(),
        };
        sink.write_fact(&fact).map(|()| ())
    };

    if policy.include_labels {
        for (language, value) in &document.labels {
            write(
                RDFS_LABEL.to_string(),
                FactObject::lang(value.clone(), language.clone()),
                sink,
            )?;
            outcome.facts += 1;
        }
    }

    if policy.include_descriptions {
        for (language, value) in &document.descriptions {
            write(
                SCHEMA_DESCRIPTION.to_string(),
                FactObject::lang(value.clone(), language.clone()),
                sink,
            )?;
            outcome.facts += 1;
        }
    }

    if policy.include_aliases {
        for (language, values) in &document.aliases {
            for value in values {
                write(
                    SKOS_ALT_LABEL.to_string(),
                    FactObject::lang(value.clone(), language.clone()),
                    sink,
                )?;
                outcome.facts += 1;
            }
        }
    }

    let best_rank: Option<FxHashMap<&str, Rank>> = match policy.rank_filter {
        RankFilter::All => None,
        RankFilter::BestRankOnly => {
            let mut best: FxHashMap<&str, Rank> = FxHashMap::default();
            for statement in &document.statements {
                if statement.rank == Rank::Deprecated {
                    continue;
                }
                let entry = best
                    .entry(statement.property_id.as_str())
                    .or_insert(Rank::Normal);
                if statement.rank == Rank::Preferred {
                    *entry = Rank::Preferred;
                }
            }
            Some(best)
        }
    };

    for statement in &document.statements {
        if let Some(best) = &best_rank {
            match best.get(statement.property_id.as_str()) {
                Some(best_rank) if statement.rank == *best_rank => {}
                _ => continue,
            }
        }
        match properties.resolve(&statement.property_id) {
            Some(entry) => {
                let Some(object) = value_object(&statement.value, Some(entry.datatype.as_str()))
                else {
                    continue;
                };
                write(compact_uri(&entry.predicate_uri), object, sink)?;
                outcome.facts += 1;
            }
            None => {
                outcome.registry_misses += 1;
                if policy.unresolved == UnresolvedPolicy::SkipStatement {
                    continue;
                }
                let Some(lexical) = value_lexical(&statement.value) else {
                    continue;
                };
                write(
                    statement.property_id.clone(),
                    FactObject::typed(lexical, UNRESOLVED_DATATYPE),
                    sink,
                )?;
                outcome.facts += 1;
            }
        }
    }

    if policy.include_sitelinks {
        for (site_key, title) in &document.sitelinks {
            match sites.page_url(site_key, title) {
                Some(url) => {
                    write(SCHEMA_ABOUT.to_string(), FactObject::Uri(url), sink)?;
                    outcome.facts += 1;
                }
                None => {
                    outcome.registry_misses += 1;
                    if policy.unresolved == UnresolvedPolicy::SkipStatement {
                        continue;
                    }
                    write(
                        SCHEMA_ABOUT.to_string(),
                        FactObject::typed(
                            format!("{}:{}", site_key, title),
                            UNRESOLVED_DATATYPE,
                        ),
                        sink,
                    )?;
                    outcome.facts += 1;
                }
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{deserialize, EntityKind, Statement};
    use crate::registry::{PropertyEntry, SiteEntry};
    use std::collections::BTreeMap;

    struct MemorySink(Vec<Fact>);

    impl FactSink for MemorySink {
        fn write_fact(&mut self, fact: &Fact) -> Result<(), EmitError> {
            self.0.push(fact.clone());
            Ok(())
        }
    }

    fn prov() -> Provenance {
        Provenance {
            revision_id: 555,
            timestamp: "2021-04-01T00:00:00Z".to_string(),
            contributor: Some("Someone".to_string()),
        }
    }

    fn registries() -> (PropertyRegistry, SiteRegistry) {
        let properties = PropertyRegistry::from_entries([(
            "P31".to_string(),
            PropertyEntry {
                predicate_uri: "http://www.wikidata.org/prop/direct/P31".to_string(),
                datatype: "wikibase-item".to_string(),
            },
        )]);
        let sites = SiteRegistry::from_entries([(
            "enwiki".to_string(),
            SiteEntry {
                site_type: "mediawiki".to_string(),
                group: "wikipedia".to_string(),
                language: "en".to_string(),
                page_path: "https://en.wikipedia.org/wiki/$1".to_string(),
                file_path: "https://en.wikipedia.org/w/$1".to_string(),
            },
        )]);
        (properties, sites)
    }

    fn sample_document() -> EntityDocument {
        deserialize(
            "wikibase-item",
            r#"{
                "id": "Q42",
                "type": "item",
                "labels": {"en": {"language": "en", "value": "Douglas Adams"}},
                "descriptions": {"en": {"language": "en", "value": "writer"}},
                "aliases": {"en": [{"language": "en", "value": "DNA"}]},
                "claims": {
                    "P31": [{
                        "mainsnak": {
                            "snaktype": "value",
                            "property": "P31",
                            "datavalue": {"type": "wikibase-entityid", "value": {"id": "Q5"}}
                        },
                        "rank": "normal"
                    }]
                },
                "sitelinks": {"enwiki": {"site": "enwiki", "title": "Douglas Adams"}}
            }"#,
        )
        .unwrap()
    }

    fn empty_document() -> EntityDocument {
        EntityDocument {
            entity_id: "Q999".to_string(),
            kind: EntityKind::Item,
            datatype: None,
            labels: BTreeMap::new(),
            descriptions: BTreeMap::new(),
            aliases: BTreeMap::new(),
            statements: Vec::new(),
            sitelinks: BTreeMap::new(),
        }
    }

    #[test]
    fn compact_uri_uses_longest_base() {
        assert_eq!(
            compact_uri("http://www.wikidata.org/prop/direct/P31"),
            "wdt:P31"
        );
        assert_eq!(compact_uri("http://www.wikidata.org/entity/Q42"), "wd:Q42");
        assert_eq!(
            compact_uri("http://www.wikidata.org/prop/statement/P31"),
            "ps:P31"
        );
        assert_eq!(compact_uri("http://example.org/x"), "http://example.org/x");
    }

    #[test]
    fn emits_all_sections_in_order() {
        let (properties, sites) = registries();
        let mut sink = MemorySink(Vec::new());
        let outcome = emit_facts(
            &sample_document(),
            &prov(),
            &EmitterPolicy::default(),
            &properties,
            &sites,
            &mut sink,
        )
        .unwrap();

        assert_eq!(outcome.facts, 5);
        assert_eq!(outcome.registry_misses, 0);
        let predicates: Vec<&str> = sink.0.iter().map(|f| f.predicate.as_str()).collect();
        assert_eq!(
            predicates,
            vec![
                "rdfs:label",
                "schema:description",
                "skos:altLabel",
                "wdt:P31",
                "schema:about"
            ]
        );
        assert_eq!(sink.0[3].object, FactObject::Uri("wd:Q5".to_string()));
        assert_eq!(
            sink.0[4].object,
            FactObject::Uri("https://en.wikipedia.org/wiki/Douglas_Adams".to_string())
        );
        assert!(sink.0.iter().all(|f| f.subject == "wd:Q42"));
        assert!(sink.0.iter().all(|f| f.provenance == prov()));
    }

    #[test]
    fn empty_entity_emits_zero_facts() {
        let (properties, sites) = registries();
        let mut sink = MemorySink(Vec::new());
        let outcome = emit_facts(
            &empty_document(),
            &prov(),
            &EmitterPolicy::default(),
            &properties,
            &sites,
            &mut sink,
        )
        .unwrap();
        assert_eq!(outcome.facts, 0);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn unresolved_property_emits_literal_by_default() {
        let (_, sites) = registries();
        let properties = PropertyRegistry::empty();
        let mut doc = empty_document();
        doc.statements.push(Statement {
            property_id: "P999".to_string(),
            value: SnakValue::EntityId("Q5".to_string()),
            qualifiers: Vec::new(),
            rank: Rank::Normal,
        });

        let mut sink = MemorySink(Vec::new());
        let outcome = emit_facts(
            &doc,
            &prov(),
            &EmitterPolicy::default(),
            &properties,
            &sites,
            &mut sink,
        )
        .unwrap();

        assert_eq!(outcome.facts, 1);
        assert_eq!(outcome.registry_misses, 1);
        assert_eq!(sink.0[0].predicate, "P999");
        assert_eq!(
            sink.0[0].object,
            FactObject::typed("Q5", UNRESOLVED_DATATYPE)
        );
    }

    #[test]
    fn unresolved_property_skip_policy() {
        let (_, sites) = registries();
        let properties = PropertyRegistry::empty();
        let mut doc = empty_document();
        doc.statements.push(Statement {
            property_id: "P999".to_string(),
            value: SnakValue::String("x".to_string()),
            qualifiers: Vec::new(),
            rank: Rank::Normal,
        });

        let policy = EmitterPolicy {
            unresolved: UnresolvedPolicy::SkipStatement,
            ..Default::default()
        };
        let mut sink = MemorySink(Vec::new());
        let outcome = emit_facts(&doc, &prov(), &policy, &properties, &sites, &mut sink).unwrap();
        assert_eq!(outcome.facts, 0);
        assert_eq!(outcome.registry_misses, 1);
    }

    #[test]
    fn best_rank_only_keeps_preferred_over_normal() {
        let (properties, sites) = registries();
        let mut doc = empty_document();
        for (value, rank) in [
            ("Q1", Rank::Normal),
            ("Q2", Rank::Preferred),
            ("Q3", Rank::Deprecated),
        ] {
            doc.statements.push(Statement {
                property_id: "P31".to_string(),
                value: SnakValue::EntityId(value.to_string()),
                qualifiers: Vec::new(),
                rank,
            });
        }

        let policy = EmitterPolicy {
            rank_filter: RankFilter::BestRankOnly,
            ..Default::default()
        };
        let mut sink = MemorySink(Vec::new());
        let outcome = emit_facts(&doc, &prov(), &policy, &properties, &sites, &mut sink).unwrap();
        assert_eq!(outcome.facts, 1);
        assert_eq!(sink.0[0].object, FactObject::Uri("wd:Q2".to_string()));
    }

    #[test]
    fn best_rank_only_falls_back_to_normal() {
        let (properties, sites) = registries();
        let mut doc = empty_document();
        for (value, rank) in [("Q1", Rank::Normal), ("Q3", Rank::Deprecated)] {
            doc.statements.push(Statement {
                property_id: "P31".to_string(),
                value: SnakValue::EntityId(value.to_string()),
                qualifiers: Vec::new(),
                rank,
            });
        }

        let policy = EmitterPolicy {
            rank_filter: RankFilter::BestRankOnly,
            ..Default::default()
        };
        let mut sink = MemorySink(Vec::new());
        let outcome = emit_facts(&doc, &prov(), &policy, &properties, &sites, &mut sink).unwrap();
        assert_eq!(outcome.facts, 1);
        assert_eq!(sink.0[0].object, FactObject::Uri("wd:Q1".to_string()));
    }

    #[test]
    fn url_datatype_becomes_uri_object() {
        let sites = SiteRegistry::empty();
        let properties = PropertyRegistry::from_entries([(
            "P856".to_string(),
            PropertyEntry {
                predicate_uri: "http://www.wikidata.org/prop/direct/P856".to_string(),
                datatype: "url".to_string(),
            },
        )]);
        let mut doc = empty_document();
        doc.statements.push(Statement {
            property_id: "P856".to_string(),
            value: SnakValue::String("https://douglasadams.com/".to_string()),
            qualifiers: Vec::new(),
            rank: Rank::Normal,
        });

        let mut sink = MemorySink(Vec::new());
        emit_facts(
            &doc,
            &prov(),
            &EmitterPolicy::default(),
            &properties,
            &sites,
            &mut sink,
        )
        .unwrap();
        assert_eq!(
            sink.0[0].object,
            FactObject::Uri("https://douglasadams.com/".to_string())
        );
    }

    #[test]
    fn label_and_alias_policies_filter_sections() {
        let (properties, sites) = registries();
        let policy = EmitterPolicy {
            include_labels: false,
            include_aliases: false,
            ..Default::default()
        };
        let mut sink = MemorySink(Vec::new());
        emit_facts(
            &sample_document(),
            &prov(),
            &policy,
            &properties,
            &sites,
            &mut sink,
        )
        .unwrap();
        let predicates: Vec<&str> = sink.0.iter().map(|f| f.predicate.as_str()).collect();
        assert_eq!(predicates, vec!["schema:description", "wdt:P31", "schema:about"]);
    }

    #[test]
    fn line_sink_output_reparses() {
        let (properties, sites) = registries();
        let mut sink = LineSink::new(Vec::new());
        emit_facts(
            &sample_document(),
            &prov(),
            &EmitterPolicy::default(),
            &properties,
            &sites,
            &mut sink,
        )
        .unwrap();
        let bytes = sink.into_inner();
        let text = String::from_utf8(bytes).unwrap();
        let parsed: Vec<Fact> = text
            .lines()
            .map(|line| Fact::parse_line(line).unwrap())
            .collect();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0].predicate, "rdfs:label");
        assert_eq!(parsed[0].provenance.revision_id, 555);
    }
}

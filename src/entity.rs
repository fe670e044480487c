use crate::config::{MODEL_WIKIBASE_ITEM, MODEL_WIKIBASE_PROPERTY};
use crate::error::DeserializeError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Statement rank. Unknown rank strings degrade to `Normal` rather than
/// failing the whole revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    Preferred,
    Normal,
    Deprecated,
}

impl Rank {
    fn from_json(raw: &str) -> Self {
        match raw {
            "preferred" => Rank::Preferred,
            "deprecated" => Rank::Deprecated,
            _ => Rank::Normal,
        }
    }
}

/// The value of one snak, reduced to what the fact emitter can express.
#[derive(Debug, Clone, PartialEq)]
pub enum SnakValue {
    /// Reference to another entity (Q or P id).
    EntityId(String),
    /// Plain string (also external ids, commons media, URLs).
    String(String),
    /// Wikibase time lexical form, e.g. `+1952-03-11T00:00:00Z`.
    Time(String),
    /// Quantity amount lexical form, e.g. `+42`.
    Quantity(String),
    Coordinate {
        latitude: f64,
        longitude: f64,
    },
    Monolingual {
        language: String,
        text: String,
    },
    /// `snaktype` was `novalue` or `somevalue`; there is no object to emit.
    NoValue,
    SomeValue,
    /// Unknown datavalue type, retained verbatim for forward compatibility.
    Untyped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub property_id: String,
    pub value: SnakValue,
    pub qualifiers: Vec<(String, SnakValue)>,
    pub rank: Rank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Item,
    Property,
}

/// Deserialized structured snapshot of an entity at one revision.
///
/// Produced fresh per revision, never mutated after construction, and
/// discarded once the fact emitter has consumed it. All maps are ordered so
/// that re-running a dump produces byte-identical output.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDocument {
    pub entity_id: String,
    pub kind: EntityKind,
    /// Declared datatype, property documents only.
    pub datatype: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub descriptions: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, Vec<String>>,
    pub statements: Vec<Statement>,
    pub sitelinks: BTreeMap<String, String>,
}

// -- raw JSON shapes -------------------------------------------------------
//
// Unknown fields are ignored throughout; old snapshots use plain strings
// where current ones use {language, value} objects, so every term position
// accepts both.

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTerm {
    Full { value: String },
    Plain(String),
}

impl RawTerm {
    fn into_value(self) -> String {
        match self {
            RawTerm::Full { value } => value,
            RawTerm::Plain(value) => value,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAliasGroup {
    Many(Vec<RawTerm>),
    One(RawTerm),
}

#[derive(Deserialize)]
struct RawSnak {
    snaktype: String,
    property: String,
    datavalue: Option<RawDataValue>,
}

#[derive(Deserialize)]
struct RawDataValue {
    #[serde(rename = "type")]
    value_type: String,
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct RawClaim {
    mainsnak: Option<RawSnak>,
    #[serde(default)]
    qualifiers: BTreeMap<String, Vec<RawSnak>>,
    #[serde(rename = "qualifiers-order", default)]
    qualifiers_order: Vec<String>,
    /// A string in the current format; old snapshots used an integer.
    rank: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSitelink {
    Full { title: String },
    Plain(String),
}

impl RawSitelink {
    fn into_title(self) -> String {
        match self {
            RawSitelink::Full { title } => title,
            RawSitelink::Plain(title) => title,
        }
    }
}

#[derive(Deserialize)]
struct RawEntity {
    id: Option<String>,
    /// Very old snapshots carry `"entity": "q42"` or `"entity": ["item", 42]`.
    entity: Option<serde_json::Value>,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    datatype: Option<String>,
    redirect: Option<String>,
    #[serde(default, alias = "label")]
    labels: BTreeMap<String, RawTerm>,
    #[serde(default, alias = "description")]
    descriptions: BTreeMap<String, RawTerm>,
    #[serde(default)]
    aliases: BTreeMap<String, RawAliasGroup>,
    #[serde(default, alias = "statements")]
    claims: BTreeMap<String, Vec<RawClaim>>,
    #[serde(default, alias = "links")]
    sitelinks: BTreeMap<String, RawSitelink>,
}

fn snak_value(snak: RawSnak) -> SnakValue {
    match snak.snaktype.as_str() {
        "novalue" => return SnakValue::NoValue,
        "somevalue" => return SnakValue::SomeValue,
        _ => {}
    }
    let Some(datavalue) = snak.datavalue else {
        return SnakValue::NoValue;
    };
    let value = datavalue.value;
    match datavalue.value_type.as_str() {
        "wikibase-entityid" => {
            if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
                return SnakValue::EntityId(id.to_string());
            }
            // Pre-2015 snapshots only carry entity-type plus numeric id.
            let numeric = value.get("numeric-id").and_then(|v| v.as_u64());
            let kind = value.get("entity-type").and_then(|v| v.as_str());
            if let (Some(numeric), Some(kind)) = (numeric, kind) {
                let letter = match kind {
                    "item" => "Q",
                    "property" => "P",
                    _ => return SnakValue::Untyped(value.to_string()),
                };
                return SnakValue::EntityId(format!("{}{}", letter, numeric));
            }
            SnakValue::Untyped(value.to_string())
        }
        "string" => match value.as_str() {
            Some(s) => SnakValue::String(s.to_string()),
            None => SnakValue::Untyped(value.to_string()),
        },
        "time" => match value.get("time").and_then(|v| v.as_str()) {
            Some(t) => SnakValue::Time(t.to_string()),
            None => SnakValue::Untyped(value.to_string()),
        },
        "quantity" => match value.get("amount").and_then(|v| v.as_str()) {
            Some(a) => SnakValue::Quantity(a.to_string()),
            None => SnakValue::Untyped(value.to_string()),
        },
        "globecoordinate" => {
            let latitude = value.get("latitude").and_then(|v| v.as_f64());
            let longitude = value.get("longitude").and_then(|v| v.as_f64());
            match (latitude, longitude) {
                (Some(latitude), Some(longitude)) => SnakValue::Coordinate {
                    latitude,
                    longitude,
                },
                _ => SnakValue::Untyped(value.to_string()),
            }
        }
        "monolingualtext" => {
            let language = value.get("language").and_then(|v| v.as_str());
            let text = value.get("text").and_then(|v| v.as_str());
            match (language, text) {
                (Some(language), Some(text)) => SnakValue::Monolingual {
                    language: language.to_string(),
                    text: text.to_string(),
                },
                _ => SnakValue::Untyped(value.to_string()),
            }
        }
        _ => SnakValue::Untyped(value.to_string()),
    }
}

fn entity_id_from_legacy(value: &serde_json::Value) -> Option<String> {
    if let Some(s) = value.as_str() {
        // "q42" -> "Q42"
        let mut chars = s.chars();
        let first = chars.next()?;
        return Some(format!("{}{}", first.to_ascii_uppercase(), chars.as_str()));
    }
    let array = value.as_array()?;
    let kind = array.first()?.as_str()?;
    let numeric = array.get(1)?.as_u64()?;
    let letter = match kind {
        "item" => "Q",
        "property" => "P",
        _ => return None,
    };
    Some(format!("{}{}", letter, numeric))
}

/// Parses one revision's content into an `EntityDocument`.
///
/// Tolerates unknown and legacy fields but fails clearly on structurally
/// invalid content; redirect snapshots and non-entity content models are
/// distinct recoverable conditions.
pub fn deserialize(content_model: &str, text: &str) -> Result<EntityDocument, DeserializeError> {
    let kind = match content_model {
        MODEL_WIKIBASE_ITEM => EntityKind::Item,
        MODEL_WIKIBASE_PROPERTY => EntityKind::Property,
        other => return Err(DeserializeError::UnsupportedModel(other.to_string())),
    };
    if text.trim().is_empty() {
        return Err(DeserializeError::EmptyContent);
    }

    let raw: RawEntity = serde_json::from_str(text)?;

    if let Some(target) = raw.redirect {
        return Err(DeserializeError::Redirect(target));
    }

    let entity_id = raw
        .id
        .or_else(|| raw.entity.as_ref().and_then(entity_id_from_legacy))
        .ok_or(DeserializeError::MissingEntityId)?;

    // The declared type, when present, wins over the content model tag.
    let kind = match raw.entity_type.as_deref() {
        Some("item") => EntityKind::Item,
        Some("property") => EntityKind::Property,
        Some(other) => return Err(DeserializeError::UnsupportedModel(other.to_string())),
        None => kind,
    };

    let labels = raw
        .labels
        .into_iter()
        .map(|(lang, term)| (lang, term.into_value()))
        .collect();
    let descriptions = raw
        .descriptions
        .into_iter()
        .map(|(lang, term)| (lang, term.into_value()))
        .collect();
    let aliases = raw
        .aliases
        .into_iter()
        .map(|(lang, group)| {
            let values = match group {
                RawAliasGroup::Many(terms) => {
                    terms.into_iter().map(RawTerm::into_value).collect()
                }
                RawAliasGroup::One(term) => vec![term.into_value()],
            };
            (lang, values)
        })
        .collect();

    let mut statements = Vec::new();
    for (property_id, claims) in raw.claims {
        for claim in claims {
            let Some(mainsnak) = claim.mainsnak else { continue };
            let rank = Rank::from_json(
                claim
                    .rank
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or("normal"),
            );
            let mut qualifiers = Vec::new();
            // qualifiers-order preserves the on-wiki ordering; fall back to
            // map order when absent.
            let order: Vec<String> = if claim.qualifiers_order.is_empty() {
                claim.qualifiers.keys().cloned().collect()
            } else {
                claim.qualifiers_order.clone()
            };
            let mut groups = claim.qualifiers;
            for qualifier_property in order {
                if let Some(snaks) = groups.remove(&qualifier_property) {
                    for snak in snaks {
                        qualifiers.push((snak.property.clone(), snak_value(snak)));
                    }
                }
            }
            statements.push(Statement {
                property_id: mainsnak.property.clone(),
                value: snak_value(mainsnak),
                qualifiers,
                rank,
            });
        }
    }

    let sitelinks = raw
        .sitelinks
        .into_iter()
        .map(|(site, link)| (site, link.into_title()))
        .collect();

    Ok(EntityDocument {
        entity_id,
        kind,
        datatype: raw.datatype,
        labels,
        descriptions,
        aliases,
        statements,
        sitelinks,
    })
}

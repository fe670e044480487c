use crate::decompress::Decompressor;
use crate::error::RegistryError;
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// MediaWiki article-path encoding: spaces become underscores first, then
/// everything but unreserved characters, ':' and '/' is percent-encoded.
const MEDIAWIKI_TITLE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/')
    .remove(b':');

const GENERIC_TITLE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    pub predicate_uri: String,
    pub datatype: String,
}

/// Property id -> predicate URI + datatype. Immutable after load; a lookup
/// miss is a recoverable condition handled by the emitter's policy.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    entries: FxHashMap<String, PropertyEntry>,
}

impl PropertyRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads from a CSV with a `property,predicate,datatype` header row.
    pub fn from_csv(path: &Path) -> Result<Self, RegistryError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut entries = FxHashMap::default();
        for record in reader.records() {
            let record = record?;
            let (Some(property), Some(predicate), Some(datatype)) =
                (record.get(0), record.get(1), record.get(2))
            else {
                continue;
            };
            entries.insert(
                property.to_string(),
                PropertyEntry {
                    predicate_uri: predicate.to_string(),
                    datatype: datatype.to_string(),
                },
            );
        }
        info!(properties = entries.len(), "Property registry loaded");
        Ok(Self { entries })
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, PropertyEntry)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn resolve(&self, property_id: &str) -> Option<&PropertyEntry> {
        self.entries.get(property_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEntry {
    pub site_type: String,
    pub group: String,
    pub language: String,
    /// URL template with `$1` standing in for the encoded page title.
    pub page_path: String,
    pub file_path: String,
}

/// Site key -> URL template and classification, built from the wiki's
/// `sites` SQL dump. Immutable after load, shared read-only by every stage.
#[derive(Debug, Default)]
pub struct SiteRegistry {
    sites: FxHashMap<String, SiteEntry>,
}

static SITES_TUPLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]*)\)").unwrap());

// PHP-serialized paths blob inside the site_data column:
// a:1:{s:5:"paths";a:2:{s:9:"file_path";s:NN:"...";s:9:"page_path";s:NN:"...";}}
static SITE_DATA_PATHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^a:1:\{s:5:"paths";a:2:\{s:9:"file_path";s:\d+:"([^"]*)";s:9:"page_path";s:\d+:"([^"]*)";\}\}$"#,
    )
    .unwrap()
});

impl SiteRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads from a (typically gzip-compressed) MediaWiki `sites` table dump
    /// by scanning for the `INSERT INTO \`sites\`` statement.
    pub fn from_sql_dump(path: &Path) -> Result<Self, RegistryError> {
        let stream = Decompressor::open(path).map_err(|e| match e {
            crate::error::DumpError::Io(io) => RegistryError::Io(io),
            other => RegistryError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                other.to_string(),
            )),
        })?;
        let reader = BufReader::new(stream);

        let mut insert_line = None;
        for line in reader.lines() {
            let line = line?;
            if line.starts_with("INSERT INTO `sites` VALUES") {
                insert_line = Some(line);
                break;
            }
        }
        let insert_line = insert_line.ok_or(RegistryError::MissingSitesInsert)?;

        let mut sites = FxHashMap::default();
        for tuple in SITES_TUPLE.captures_iter(&insert_line) {
            let fields = parse_sql_tuple(&tuple[1]);
            // site_id, global_key, type, group, source, language, protocol,
            // domain, data, forward, config
            if fields.len() < 9 {
                debug!(fields = fields.len(), "Skipping short sites tuple");
                continue;
            }
            let global_key = fields[1].clone();
            let Some(paths) = SITE_DATA_PATHS.captures(&fields[8]) else {
                warn!(site = %global_key, "Unrecognised site_data paths blob");
                continue;
            };
            sites.insert(
                global_key,
                SiteEntry {
                    site_type: fields[2].clone(),
                    group: fields[3].clone(),
                    language: fields[5].clone(),
                    file_path: paths[1].to_string(),
                    page_path: paths[2].to_string(),
                },
            );
        }
        info!(sites = sites.len(), "Site registry loaded");
        Ok(Self { sites })
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, SiteEntry)>,
    {
        Self {
            sites: entries.into_iter().collect(),
        }
    }

    pub fn resolve(&self, site_key: &str) -> Option<&SiteEntry> {
        self.sites.get(site_key)
    }

    /// Resolves a page title against a site's URL template, encoded per the
    /// site's conventions. `None` on a registry miss.
    pub fn page_url(&self, site_key: &str, title: &str) -> Option<String> {
        let site = self.sites.get(site_key)?;
        let encoded = if site.site_type == "mediawiki" {
            let underscored = title.replace(' ', "_");
            utf8_percent_encode(&underscored, MEDIAWIKI_TITLE).to_string()
        } else {
            utf8_percent_encode(title, GENERIC_TITLE).to_string()
        };
        Some(site.page_path.replace("$1", &encoded))
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Splits one SQL `VALUES` tuple body into fields, honouring single-quoted
/// strings with `\'`, `\\` and `''` escapes. Unquoted fields come back
/// verbatim (numbers, NULL).
fn parse_sql_tuple(body: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                '\'' => {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        current.push('\'');
                    } else {
                        in_string = false;
                    }
                }
                _ => current.push(c),
            }
        } else {
            match c {
                '\'' => in_string = true,
                ',' => {
                    fields.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            }
        }
    }
    fields.push(current);
    fields
}

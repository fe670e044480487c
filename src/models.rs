use thiserror::Error;

/// One historical version of one page, exactly as it appears in the dump.
///
/// The text is the full entity snapshot at that revision, never a diff.
#[derive(Debug, Clone)]
pub struct RawRevision {
    pub page_id: u64,
    pub page_title: String,
    pub page_namespace: i64,
    /// Page-level redirect target, if the page itself is a redirect.
    pub redirect_title: Option<String>,
    pub revision_id: u64,
    /// Absent for the first revision of a page.
    pub parent_revision_id: Option<u64>,
    pub timestamp: String,
    /// User name or IP. `None` when the contributor was deleted.
    pub contributor: Option<String>,
    pub contributor_id: Option<u64>,
    pub is_minor: bool,
    pub comment: Option<String>,
    pub content_model: String,
    pub content_format: Option<String>,
    pub text: Option<String>,
    pub sha1: Option<String>,
}

impl RawRevision {
    pub fn provenance(&self) -> Provenance {
        Provenance {
            revision_id: self.revision_id,
            timestamp: self.timestamp.clone(),
            contributor: self.contributor.clone(),
        }
    }
}

/// Provenance carried on every emitted fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub revision_id: u64,
    pub timestamp: String,
    pub contributor: Option<String>,
}

/// Object position of a fact: a URI (full or prefix-compacted) or a literal
/// with an optional language tag or datatype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactObject {
    Uri(String),
    Literal {
        lexical: String,
        language: Option<String>,
        datatype: Option<String>,
    },
}

impl FactObject {
    pub fn plain(lexical: impl Into<String>) -> Self {
        FactObject::Literal {
            lexical: lexical.into(),
            language: None,
            datatype: None,
        }
    }

    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        FactObject::Literal {
            lexical: lexical.into(),
            language: Some(language.into()),
            datatype: None,
        }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        FactObject::Literal {
            lexical: lexical.into(),
            language: None,
            datatype: Some(datatype.into()),
        }
    }
}

/// One emitted triple-like record. Constructed per revision and serialized
/// immediately; never buffered beyond the current revision's fact set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub subject: String,
    pub predicate: String,
    pub object: FactObject,
    pub provenance: Provenance,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactParseError {
    #[error("fact line does not have six tab-separated fields")]
    FieldCount,
    #[error("invalid revision id in fact line")]
    RevisionId,
    #[error("invalid object term in fact line")]
    Object,
}

/// Renders a URI term: full URIs are bracketed, prefixed names stay bare.
fn render_uri(uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        format!("<{}>", uri)
    } else {
        uri.to_string()
    }
}

fn parse_uri(term: &str) -> String {
    if let Some(inner) = term.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        inner.to_string()
    } else {
        term.to_string()
    }
}

fn escape_lexical(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_lexical(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

impl FactObject {
    fn render(&self) -> String {
        match self {
            FactObject::Uri(uri) => render_uri(uri),
            FactObject::Literal {
                lexical,
                language,
                datatype,
            } => {
                let mut out = format!("\"{}\"", escape_lexical(lexical));
                if let Some(lang) = language {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(dt) = datatype {
                    out.push_str("^^");
                    out.push_str(&render_uri(dt));
                }
                out
            }
        }
    }

    fn parse(term: &str) -> Result<Self, FactParseError> {
        if let Some(rest) = term.strip_prefix('"') {
            // Find the closing quote, skipping escape pairs.
            let bytes = rest.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => i += 2,
                    b'"' => break,
                    _ => i += 1,
                }
            }
            if i >= bytes.len() {
                return Err(FactParseError::Object);
            }
            let lexical = unescape_lexical(&rest[..i]).ok_or(FactParseError::Object)?;
            let tail = &rest[i + 1..];
            if tail.is_empty() {
                Ok(FactObject::plain(lexical))
            } else if let Some(lang) = tail.strip_prefix('@') {
                Ok(FactObject::lang(lexical, lang))
            } else if let Some(dt) = tail.strip_prefix("^^") {
                Ok(FactObject::typed(lexical, parse_uri(dt)))
            } else {
                Err(FactParseError::Object)
            }
        } else if term.is_empty() {
            Err(FactParseError::Object)
        } else {
            Ok(FactObject::Uri(parse_uri(term)))
        }
    }
}

impl Fact {
    /// Stable line encoding: six tab-separated fields, object last.
    /// `parse_line` is the exact inverse on every emitted fact.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.provenance.revision_id,
            self.provenance.timestamp,
            self.provenance.contributor.as_deref().unwrap_or(""),
            render_uri(&self.subject),
            render_uri(&self.predicate),
            self.object.render(),
        )
    }

    pub fn parse_line(line: &str) -> Result<Self, FactParseError> {
        let mut fields = line.splitn(6, '\t');
        let revision_id = fields
            .next()
            .ok_or(FactParseError::FieldCount)?
            .parse::<u64>()
            .map_err(|_| FactParseError::RevisionId)?;
        let timestamp = fields.next().ok_or(FactParseError::FieldCount)?.to_string();
        let contributor = match fields.next().ok_or(FactParseError::FieldCount)? {
            "" => None,
            name => Some(name.to_string()),
        };
        let subject = parse_uri(fields.next().ok_or(FactParseError::FieldCount)?);
        let predicate = parse_uri(fields.next().ok_or(FactParseError::FieldCount)?);
        let object = FactObject::parse(fields.next().ok_or(FactParseError::FieldCount)?)?;
        Ok(Fact {
            subject,
            predicate,
            object,
            provenance: Provenance {
                revision_id,
                timestamp,
                contributor,
            },
        })
    }
}

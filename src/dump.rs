use crate::decompress::Decompressor;
use crate::error::DumpError;
use crate::models::RawRevision;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::{BufRead, BufReader};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Which leaf element's character data is currently being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    PageTitle,
    PageNs,
    PageId,
    RevisionId,
    ParentId,
    Timestamp,
    Username,
    Ip,
    ContributorId,
    Comment,
    Model,
    Format,
    Text,
    Sha1,
}

#[derive(Default)]
struct PagePending {
    title: Option<String>,
    ns: Option<String>,
    id: Option<String>,
    redirect: Option<String>,
}

impl PagePending {
    fn identity(&self) -> Result<(u64, String, i64), String> {
        let id = self
            .id
            .as_deref()
            .ok_or("page has no <id>")?
            .parse::<u64>()
            .map_err(|_| "page <id> is not an integer".to_string())?;
        let title = self.title.clone().ok_or("page has no <title>")?;
        let ns = self
            .ns
            .as_deref()
            .ok_or("page has no <ns>")?
            .parse::<i64>()
            .map_err(|_| "page <ns> is not an integer".to_string())?;
        Ok((id, title, ns))
    }
}

#[derive(Default)]
struct RevisionPending {
    id: Option<String>,
    parent_id: Option<String>,
    timestamp: Option<String>,
    contributor: Option<String>,
    contributor_id: Option<String>,
    is_minor: bool,
    comment: Option<String>,
    model: Option<String>,
    format: Option<String>,
    text: Option<String>,
    sha1: Option<String>,
}

/// Streaming reader over a pages-meta-history dump.
///
/// Yields one `RawRevision` at a time in exact stream order, holding at most
/// one revision's fields in memory. Pages without revisions are skipped
/// silently. A malformed revision is surfaced as a recoverable error and the
/// reader continues with the next one; end-of-stream inside an open page is
/// a `TruncatedDump`.
pub struct RevisionReader<R: BufRead> {
    xml: Reader<R>,
    buf: Vec<u8>,
    page: Option<PagePending>,
    revision: Option<RevisionPending>,
    capture: Option<Capture>,
    in_contributor: bool,
    consecutive_errors: u32,
    finished: bool,
}

impl RevisionReader<BufReader<Decompressor>> {
    /// Opens a dump file, dispatching on the compression container.
    pub fn open(path: &Path) -> Result<Self, DumpError> {
        let stream = Decompressor::open(path)?;
        Ok(Self::new(BufReader::with_capacity(READ_BUFFER_SIZE, stream)))
    }
}

impl<R: BufRead> RevisionReader<R> {
    pub fn new(reader: R) -> Self {
        let mut xml = Reader::from_reader(reader);
        xml.trim_text(true);
        // The dump is machine-generated; strict checking only costs time.
        xml.check_end_names(false);
        Self {
            xml,
            buf: Vec::with_capacity(16 * 1024),
            page: None,
            revision: None,
            capture: None,
            in_contributor: false,
            consecutive_errors: 0,
            finished: false,
        }
    }

    fn start_capture(&mut self, name: &[u8]) {
        let in_revision = self.revision.is_some();
        self.capture = match name {
            b"id" if self.in_contributor => Some(Capture::ContributorId),
            b"id" if in_revision => Some(Capture::RevisionId),
            b"id" if self.page.is_some() => Some(Capture::PageId),
            b"title" if self.page.is_some() && !in_revision => Some(Capture::PageTitle),
            b"ns" if self.page.is_some() && !in_revision => Some(Capture::PageNs),
            b"parentid" if in_revision => Some(Capture::ParentId),
            b"timestamp" if in_revision => Some(Capture::Timestamp),
            b"username" if self.in_contributor => Some(Capture::Username),
            b"ip" if self.in_contributor => Some(Capture::Ip),
            b"comment" if in_revision => Some(Capture::Comment),
            b"model" if in_revision => Some(Capture::Model),
            b"format" if in_revision => Some(Capture::Format),
            b"text" if in_revision => Some(Capture::Text),
            b"sha1" if in_revision => Some(Capture::Sha1),
            _ => None,
        };
    }

    fn store_text(&mut self, value: &str) {
        let Some(capture) = self.capture else { return };
        match capture {
            Capture::PageTitle | Capture::PageNs | Capture::PageId => {
                if let Some(page) = self.page.as_mut() {
                    let slot = match capture {
                        Capture::PageTitle => &mut page.title,
                        Capture::PageNs => &mut page.ns,
                        _ => &mut page.id,
                    };
                    append(slot, value);
                }
            }
            _ => {
                if let Some(rev) = self.revision.as_mut() {
                    let slot = match capture {
                        Capture::RevisionId => &mut rev.id,
                        Capture::ParentId => &mut rev.parent_id,
                        Capture::Timestamp => &mut rev.timestamp,
                        Capture::Username | Capture::Ip => &mut rev.contributor,
                        Capture::ContributorId => &mut rev.contributor_id,
                        Capture::Comment => &mut rev.comment,
                        Capture::Model => &mut rev.model,
                        Capture::Format => &mut rev.format,
                        Capture::Text => &mut rev.text,
                        Capture::Sha1 => &mut rev.sha1,
                        _ => unreachable!(),
                    };
                    append(slot, value);
                }
            }
        }
    }

    fn handle_start(&mut self, element: &BytesStart<'_>) {
        match element.name().as_ref() {
            b"page" => {
                self.page = Some(PagePending::default());
                self.revision = None;
                self.in_contributor = false;
            }
            b"revision" if self.page.is_some() => {
                self.revision = Some(RevisionPending::default());
                self.in_contributor = false;
            }
            b"contributor" if self.revision.is_some() => {
                self.in_contributor = true;
            }
            b"minor" if self.revision.is_some() => {
                if let Some(rev) = self.revision.as_mut() {
                    rev.is_minor = true;
                }
            }
            b"redirect" => self.handle_redirect(element),
            b"text" if self.revision.is_some() => {
                // Distinguish <text></text> (empty string) from <text /> (absent).
                if let Some(rev) = self.revision.as_mut() {
                    rev.text = Some(String::new());
                }
                self.capture = Some(Capture::Text);
            }
            b"comment" if self.revision.is_some() => {
                if let Some(rev) = self.revision.as_mut() {
                    rev.comment = Some(String::new());
                }
                self.capture = Some(Capture::Comment);
            }
            name => self.start_capture(name),
        }
    }

    fn handle_redirect(&mut self, element: &BytesStart<'_>) {
        if let Some(page) = self.page.as_mut() {
            if let Ok(Some(attr)) = element.try_get_attribute("title") {
                if let Ok(value) = attr.unescape_value() {
                    page.redirect = Some(value.into_owned());
                }
            }
        }
    }

    fn handle_empty(&mut self, element: &BytesStart<'_>) {
        match element.name().as_ref() {
            b"redirect" => self.handle_redirect(element),
            b"minor" => {
                if let Some(rev) = self.revision.as_mut() {
                    rev.is_minor = true;
                }
            }
            // <text deleted="deleted" />, <comment deleted="deleted" />,
            // <contributor deleted="deleted" />, <sha1 /> all mean "absent".
            _ => {}
        }
    }

    fn finish_revision(&mut self) -> Result<RawRevision, DumpError> {
        let rev = self.revision.take().unwrap_or_default();
        self.in_contributor = false;
        self.capture = None;

        let Some(page) = self.page.as_ref() else {
            return Err(DumpError::MalformedRevision {
                page_id: 0,
                page_title: String::new(),
                revision_id: None,
                reason: "revision closed outside a page".to_string(),
            });
        };
        let malformed = |revision_id: Option<u64>, reason: &str| {
            let (page_id, page_title) = match page.identity() {
                Ok((id, title, _)) => (id, title),
                Err(_) => (0, page.title.clone().unwrap_or_default()),
            };
            DumpError::MalformedRevision {
                page_id,
                page_title,
                revision_id,
                reason: reason.to_string(),
            }
        };

        let (page_id, page_title, page_namespace) = page
            .identity()
            .map_err(|reason| malformed(None, &reason))?;
        let revision_id = rev
            .id
            .as_deref()
            .ok_or_else(|| malformed(None, "revision has no <id>"))?
            .parse::<u64>()
            .map_err(|_| malformed(None, "revision <id> is not an integer"))?;
        let parent_revision_id = match rev.parent_id.as_deref() {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                malformed(Some(revision_id), "revision <parentid> is not an integer")
            })?),
            None => None,
        };
        let timestamp = rev
            .timestamp
            .ok_or_else(|| malformed(Some(revision_id), "revision has no <timestamp>"))?;
        let content_model = rev
            .model
            .ok_or_else(|| malformed(Some(revision_id), "revision has no <model>"))?;
        let contributor_id = match rev.contributor_id.as_deref() {
            Some(raw) => raw.parse::<u64>().ok(),
            None => None,
        };

        Ok(RawRevision {
            page_id,
            page_title,
            page_namespace,
            redirect_title: page.redirect.clone(),
            revision_id,
            parent_revision_id,
            timestamp,
            contributor: rev.contributor,
            contributor_id,
            is_minor: rev.is_minor,
            comment: rev.comment,
            content_model,
            content_format: rev.format,
            text: rev.text,
            sha1: rev.sha1,
        })
    }

    fn truncated(&mut self) -> Option<Result<RawRevision, DumpError>> {
        self.finished = true;
        let page = self.page.take()?;
        let (page_id, page_title) = match page.identity() {
            Ok((id, title, _)) => (id, title),
            Err(_) => (0, page.title.unwrap_or_default()),
        };
        Some(Err(DumpError::TruncatedDump {
            page_id,
            page_title,
        }))
    }
}

fn append(slot: &mut Option<String>, value: &str) {
    match slot {
        Some(existing) => existing.push_str(value),
        None => *slot = Some(value.to_string()),
    }
}

impl<R: BufRead> Iterator for RevisionReader<R> {
    type Item = Result<RawRevision, DumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            self.buf.clear();
            let event = match self.xml.read_event_into(&mut self.buf) {
                Ok(event) => {
                    self.consecutive_errors = 0;
                    event.into_owned()
                }
                Err(quick_xml::Error::Io(e)) => {
                    self.finished = true;
                    return Some(Err(DumpError::Io(std::io::Error::new(
                        e.kind(),
                        e.to_string(),
                    ))));
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    if self.consecutive_errors > 1 {
                        // The tokenizer cannot make progress; give up on the stream.
                        if let Some(item) = self.truncated() {
                            return Some(item);
                        }
                        self.finished = true;
                        return Some(Err(DumpError::Markup(e)));
                    }
                    if self.page.is_some() {
                        let err = DumpError::MalformedRevision {
                            page_id: self
                                .page
                                .as_ref()
                                .and_then(|p| p.id.as_deref())
                                .and_then(|id| id.parse().ok())
                                .unwrap_or(0),
                            page_title: self
                                .page
                                .as_ref()
                                .and_then(|p| p.title.clone())
                                .unwrap_or_default(),
                            revision_id: None,
                            reason: format!("invalid markup: {}", e),
                        };
                        self.revision = None;
                        self.capture = None;
                        return Some(Err(err));
                    }
                    self.finished = true;
                    return Some(Err(DumpError::Markup(e)));
                }
            };

            match event {
                Event::Start(e) => self.handle_start(&e),
                Event::Empty(e) => self.handle_empty(&e),
                Event::Text(t) => match t.unescape() {
                    Ok(text) => self.store_text(&text),
                    Err(_) => self.store_text(&String::from_utf8_lossy(&t)),
                },
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    self.store_text(&text);
                }
                Event::End(e) => match e.name().as_ref() {
                    b"revision" => {
                        if self.revision.is_some() && self.page.is_some() {
                            return Some(self.finish_revision());
                        }
                    }
                    b"page" => {
                        self.page = None;
                        self.revision = None;
                        self.in_contributor = false;
                        self.capture = None;
                    }
                    b"contributor" => self.in_contributor = false,
                    name => {
                        if self.capture.is_some() && capture_matches(self.capture, name) {
                            self.capture = None;
                        }
                    }
                },
                Event::Eof => {
                    if self.revision.is_some() || self.page.is_some() {
                        return self.truncated();
                    }
                    self.finished = true;
                    return None;
                }
                _ => {}
            }
        }
    }
}

fn capture_matches(capture: Option<Capture>, name: &[u8]) -> bool {
    let Some(capture) = capture else { return false };
    matches!(
        (capture, name),
        (Capture::PageTitle, b"title")
            | (Capture::PageNs, b"ns")
            | (Capture::PageId | Capture::RevisionId | Capture::ContributorId, b"id")
            | (Capture::ParentId, b"parentid")
            | (Capture::Timestamp, b"timestamp")
            | (Capture::Username, b"username")
            | (Capture::Ip, b"ip")
            | (Capture::Comment, b"comment")
            | (Capture::Model, b"model")
            | (Capture::Format, b"format")
            | (Capture::Text, b"text")
            | (Capture::Sha1, b"sha1")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(xml: &str) -> Vec<Result<RawRevision, DumpError>> {
        RevisionReader::new(xml.as_bytes()).collect()
    }

    fn sample_page(revisions: &str) -> String {
        format!(
            r#"<mediawiki>
  <siteinfo>
    <sitename>Wikidata</sitename>
    <namespaces>
      <namespace key="0" />
      <namespace key="120">Property</namespace>
    </namespaces>
  </siteinfo>
  <page>
    <title>Q42</title>
    <ns>0</ns>
    <id>142</id>
{revisions}
  </page>
</mediawiki>"#
        )
    }

    const REV_ONE: &str = r#"    <revision>
      <id>1001</id>
      <timestamp>2013-01-01T00:00:00Z</timestamp>
      <contributor>
        <username>ExampleUser</username>
        <id>7</id>
      </contributor>
      <comment>created item</comment>
      <model>wikibase-item</model>
      <format>application/json</format>
      <text>{"id":"Q42","type":"item"}</text>
      <sha1>abcdef</sha1>
    </revision>"#;

    #[test]
    fn reads_single_revision() {
        let results = read_all(&sample_page(REV_ONE));
        assert_eq!(results.len(), 1);
        let rev = results.into_iter().next().unwrap().unwrap();
        assert_eq!(rev.page_id, 142);
        assert_eq!(rev.page_title, "Q42");
        assert_eq!(rev.page_namespace, 0);
        assert_eq!(rev.revision_id, 1001);
        assert_eq!(rev.parent_revision_id, None);
        assert_eq!(rev.timestamp, "2013-01-01T00:00:00Z");
        assert_eq!(rev.contributor.as_deref(), Some("ExampleUser"));
        assert_eq!(rev.contributor_id, Some(7));
        assert_eq!(rev.content_model, "wikibase-item");
        assert_eq!(rev.text.as_deref(), Some(r#"{"id":"Q42","type":"item"}"#));
        assert!(!rev.is_minor);
    }

    #[test]
    fn reads_revisions_in_stream_order() {
        let revisions = r#"    <revision>
      <id>10</id>
      <timestamp>2013-01-01T00:00:00Z</timestamp>
      <contributor><ip>192.0.2.1</ip></contributor>
      <model>wikibase-item</model>
      <format>application/json</format>
      <text>{"id":"Q42"}</text>
    </revision>
    <revision>
      <id>20</id>
      <parentid>10</parentid>
      <timestamp>2013-01-02T00:00:00Z</timestamp>
      <contributor><username>U</username><id>1</id></contributor>
      <minor />
      <model>wikibase-item</model>
      <format>application/json</format>
      <text>{"id":"Q42"}</text>
    </revision>"#;
        let results = read_all(&sample_page(revisions));
        let ids: Vec<u64> = results.iter().map(|r| r.as_ref().unwrap().revision_id).collect();
        assert_eq!(ids, vec![10, 20]);
        let second = results[1].as_ref().unwrap();
        assert_eq!(second.parent_revision_id, Some(10));
        assert!(second.is_minor);
        assert_eq!(results[0].as_ref().unwrap().contributor.as_deref(), Some("192.0.2.1"));
    }

    #[test]
    fn deleted_contributor_is_none() {
        let revisions = r#"    <revision>
      <id>10</id>
      <timestamp>2013-01-01T00:00:00Z</timestamp>
      <contributor deleted="deleted" />
      <model>wikibase-item</model>
      <format>application/json</format>
      <text>{"id":"Q42"}</text>
    </revision>"#;
        let results = read_all(&sample_page(revisions));
        let rev = results.into_iter().next().unwrap().unwrap();
        assert_eq!(rev.contributor, None);
        assert_eq!(rev.contributor_id, None);
    }

    #[test]
    fn empty_text_element_is_absent() {
        let revisions = r#"    <revision>
      <id>10</id>
      <timestamp>2013-01-01T00:00:00Z</timestamp>
      <contributor><ip>192.0.2.1</ip></contributor>
      <model>wikibase-item</model>
      <format>application/json</format>
      <text bytes="0" />
    </revision>"#;
        let results = read_all(&sample_page(revisions));
        assert_eq!(results.into_iter().next().unwrap().unwrap().text, None);
    }

    #[test]
    fn page_redirect_attribute_is_carried() {
        let xml = r#"<mediawiki>
  <page>
    <title>Q5678</title>
    <ns>0</ns>
    <id>99</id>
    <redirect title="Q42" />
    <revision>
      <id>10</id>
      <timestamp>2013-01-01T00:00:00Z</timestamp>
      <contributor><ip>192.0.2.1</ip></contributor>
      <model>wikibase-item</model>
      <format>application/json</format>
      <text>{"entity":"Q5678","redirect":"Q42"}</text>
    </revision>
  </page>
</mediawiki>"#;
        let results = read_all(xml);
        assert_eq!(
            results[0].as_ref().unwrap().redirect_title.as_deref(),
            Some("Q42")
        );
    }

    #[test]
    fn page_without_revisions_is_skipped() {
        let xml = r#"<mediawiki>
  <page>
    <title>Q1</title>
    <ns>0</ns>
    <id>1</id>
  </page>
</mediawiki>"#;
        assert!(read_all(xml).is_empty());
    }

    #[test]
    fn revision_without_id_is_malformed_and_reader_continues() {
        let revisions = r#"    <revision>
      <timestamp>2013-01-01T00:00:00Z</timestamp>
      <contributor><ip>192.0.2.1</ip></contributor>
      <model>wikibase-item</model>
      <format>application/json</format>
      <text>{"id":"Q42"}</text>
    </revision>
    <revision>
      <id>20</id>
      <timestamp>2013-01-02T00:00:00Z</timestamp>
      <contributor><ip>192.0.2.1</ip></contributor>
      <model>wikibase-item</model>
      <format>application/json</format>
      <text>{"id":"Q42"}</text>
    </revision>"#;
        let results = read_all(&sample_page(revisions));
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(DumpError::MalformedRevision { page_id: 142, .. })
        ));
        assert_eq!(results[1].as_ref().unwrap().revision_id, 20);
    }

    #[test]
    fn truncated_dump_surfaces_distinct_error() {
        let xml = r#"<mediawiki>
  <page>
    <title>Q42</title>
    <ns>0</ns>
    <id>142</id>
    <revision>
      <id>10</id>
      <timestamp>2013-01-01T00:00:00Z</timestamp>"#;
        let results = read_all(xml);
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(DumpError::TruncatedDump { page_id: 142, .. })
        ));
    }

    #[test]
    fn xml_entities_are_unescaped() {
        let revisions = r#"    <revision>
      <id>10</id>
      <timestamp>2013-01-01T00:00:00Z</timestamp>
      <contributor><username>A &amp; B</username><id>1</id></contributor>
      <model>wikibase-item</model>
      <format>application/json</format>
      <text>{"labels":{"en":{"language":"en","value":"T&quot;x&quot;"}}}</text>
    </revision>"#;
        let results = read_all(&sample_page(revisions));
        let rev = results.into_iter().next().unwrap().unwrap();
        assert_eq!(rev.contributor.as_deref(), Some("A & B"));
        assert!(rev.text.unwrap().contains(r#"T"x""#));
    }

    #[test]
    fn siteinfo_does_not_leak_into_pages() {
        let results = read_all(&sample_page(REV_ONE));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().page_title, "Q42");
    }
}

//! Scraped bug and attachment records.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::DateTime;
use chrono_tz::Tz;
use std::io::{self, Write};
use url::Url;

/// One scraped Redmine issue, constructed once by the extractor and
/// consumed immediately by the serializer.
///
/// "Absent" is always an explicit `None`, produced by the extractor from
/// the page's placeholder conventions (a lone `-`, empty or
/// whitespace-only cells). Downstream code never sees sentinel strings.
#[derive(Debug, Clone)]
pub struct BugRecord {
    /// Original numeric identifier, kept in string form.
    pub id: String,
    /// Canonical issue page URL, cross-referenced in the output.
    pub url: Url,
    /// Project name, lowercased.
    pub project: Option<String>,
    /// Issue title, verbatim.
    pub title: Option<String>,
    /// Reporting user's display name, verbatim.
    pub author: Option<String>,
    /// Assigned user's display name, verbatim.
    pub assignee: Option<String>,
    /// Creation instant; always present.
    pub created: DateTime<Tz>,
    /// Last-update instant; absent when the bug was never edited.
    pub updated: Option<DateTime<Tz>>,
    /// Status name, lowercased.
    pub status: Option<String>,
    /// Priority name, lowercased.
    pub priority: Option<String>,
    /// Category name, lowercased.
    pub category: Option<String>,
    /// Fix-version name, lowercased.
    pub version: Option<String>,
    /// Normalized description text.
    pub description: Option<String>,
    /// Normalized change-log text.
    pub history: Option<String>,
    /// Attachments in page order.
    pub attachments: Vec<AttachmentRecord>,
}

/// One file attached to a bug, payload held in memory until serialized.
#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    /// Identifier parsed out of the attachment's page link.
    pub id: String,
    /// Rewritten direct-download URL.
    pub url: Url,
    /// Display file name.
    pub filename: String,
    /// Media type reported when the attachment was fetched.
    pub content_type: String,
    /// Free-text description, leading separator glyphs stripped.
    pub description: Option<String>,
    /// Attaching user's display name.
    pub author: String,
    /// Attachment instant.
    pub created: DateTime<Tz>,
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

const DUMP_PREVIEW_CHARS: usize = 48;

impl BugRecord {
    /// Writes a field-per-line debug dump of the record, attachments
    /// included, for the scrape-only CLI mode.
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        dump_field(out, "", "id", &self.id)?;
        dump_field(out, "", "url", self.url.as_str())?;
        dump_opt(out, "", "project", &self.project)?;
        dump_opt(out, "", "title", &self.title)?;
        dump_opt(out, "", "author", &self.author)?;
        dump_opt(out, "", "assignee", &self.assignee)?;
        dump_field(out, "", "created", &self.created.to_rfc3339())?;
        dump_opt(
            out,
            "",
            "updated",
            &self.updated.map(|instant| instant.to_rfc3339()),
        )?;
        dump_opt(out, "", "status", &self.status)?;
        dump_opt(out, "", "priority", &self.priority)?;
        dump_opt(out, "", "category", &self.category)?;
        dump_opt(out, "", "version", &self.version)?;
        dump_opt(out, "", "description", &self.description)?;
        dump_opt(out, "", "history", &self.history)?;
        for attachment in &self.attachments {
            attachment.dump(out)?;
        }
        Ok(())
    }
}

impl AttachmentRecord {
    /// Writes the attachment's fields in the same dump format, prefixed so
    /// they read as members of the owning bug's attachment list.
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        let pre = "attachments[]/";
        dump_field(out, pre, "id", &self.id)?;
        dump_field(out, pre, "url", self.url.as_str())?;
        dump_field(out, pre, "filename", &self.filename)?;
        dump_field(out, pre, "type", &self.content_type)?;
        dump_opt(out, pre, "description", &self.description)?;
        dump_field(out, pre, "author", &self.author)?;
        dump_field(out, pre, "created", &self.created.to_rfc3339())?;
        dump_field(out, pre, "data", &data_preview(&self.data))?;
        Ok(())
    }
}

fn dump_field(out: &mut dyn Write, pre: &str, name: &str, value: &str) -> io::Result<()> {
    writeln!(out, "{pre}{name:<12}: {value}")
}

fn dump_opt(out: &mut dyn Write, pre: &str, name: &str, value: &Option<String>) -> io::Result<()> {
    dump_field(out, pre, name, value.as_deref().unwrap_or("(none)"))
}

/// Truncated base64 preview so payloads do not flood the terminal.
fn data_preview(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    if encoded.len() <= DUMP_PREVIEW_CHARS {
        encoded
    } else {
        format!("{}...", &encoded[..DUMP_PREVIEW_CHARS])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> BugRecord {
        BugRecord {
            id: "1001".to_string(),
            url: Url::parse("http://redmine.example.com/issues/1001").expect("url"),
            project: Some("widgets".to_string()),
            title: Some("Crash on save".to_string()),
            author: Some("Jane".to_string()),
            assignee: None,
            created: Tz::UTC.with_ymd_and_hms(2014, 3, 14, 21, 26, 0).unwrap(),
            updated: None,
            status: Some("fixed".to_string()),
            priority: Some("normal".to_string()),
            category: None,
            version: None,
            description: Some("Saving crashes.".to_string()),
            history: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn dump_renders_every_field_once() {
        let mut buf = Vec::new();
        sample_record().dump(&mut buf).expect("dump");
        let text = String::from_utf8(buf).expect("utf8 dump");

        assert!(text.contains("id          : 1001"));
        assert!(text.contains("title       : Crash on save"));
        assert!(text.contains("assignee    : (none)"));
        assert_eq!(text.lines().count(), 14);
    }

    #[test]
    fn attachment_data_preview_is_truncated() {
        let preview = data_preview(&[0xAB; 256]);
        assert_eq!(preview.len(), DUMP_PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));

        let short = data_preview(b"hi");
        assert!(!short.ends_with("..."));
    }
}

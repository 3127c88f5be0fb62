//! Streaming Bugzilla import-XML serialization.

use crate::config::{ExportConfig, BUGZILLA_TIMESTAMP_FORMAT};
use crate::mapping::Mapper;
use crate::record::{AttachmentRecord, BugRecord};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use std::io::{self, Write};

/// Media type Bugzilla treats as a source-code patch.
pub const PATCH_CONTENT_TYPE: &str = "text/x-patch";

const BASE64_LINE_WIDTH: usize = 76;

/// Append-only writer producing one well-formed `<bugzilla>` document.
///
/// Bugs are written one at a time from complete in-memory records, so an
/// aborted run never leaves a half-written `<bug>` element behind; the
/// envelope is closed by [`finish`](Self::finish).
pub struct XmlExporter<'a, W: Write> {
    out: W,
    config: &'a ExportConfig,
    mapper: Mapper<'a>,
}

impl<'a, W: Write> XmlExporter<'a, W> {
    /// Wraps a byte sink in an exporter over the given configuration.
    pub fn new(out: W, config: &'a ExportConfig) -> Self {
        Self {
            out,
            config,
            mapper: Mapper::new(config),
        }
    }

    /// Writes the XML declaration and the envelope's opening tag.
    pub fn begin(&mut self) -> io::Result<()> {
        writeln!(
            self.out,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>"#
        )?;
        writeln!(
            self.out,
            r#"<bugzilla version="{}" urlbase="{}" exporter="{}" maintainer="{}">"#,
            escape_attr(&self.config.bugzilla_version),
            escape_attr(self.config.redmine_base.as_str()),
            escape_attr(&self.config.default_user),
            escape_attr(&self.config.default_user),
        )
    }

    /// Serializes one scraped bug as a `<bug>` element.
    pub fn write_bug(&mut self, record: &BugRecord) -> io::Result<()> {
        let (author, author_name) = self.mapper.user(record.author.as_deref());
        let (assignee, assignee_name) = self.mapper.user(record.assignee.as_deref());
        let created = format_timestamp(&record.created);
        let delta = format_timestamp(&record.updated.unwrap_or(record.created));

        writeln!(self.out, "  <bug>")?;
        self.text_element("bug_id", &record.id)?;
        self.opt_element("product", &record.project)?;
        self.opt_element("short_desc", &record.title)?;
        self.named_element("reporter", author_name, author)?;
        self.named_element("assigned_to", assignee_name, assignee)?;
        self.text_element("creation_ts", &created)?;
        self.text_element("delta_ts", &delta)?;
        self.text_element("bug_status", self.mapper.status(record.status.as_deref()))?;
        self.text_element(
            "resolution",
            self.mapper.resolution(record.status.as_deref()),
        )?;
        self.opt_element("priority", &record.priority)?;
        self.text_element("bug_severity", "normal")?;
        self.opt_element("component", &record.category)?;
        self.opt_element("version", &record.version)?;
        self.text_element("rep_platform", "All")?;
        self.text_element("op_sys", "All")?;
        self.text_element("actual_time", "0")?;

        self.write_long_desc(author_name, author, &created, &self.description_text(record))?;

        if let Some(history) = &record.history {
            let (no_author, no_author_name) = self.mapper.user(None);
            let history_when = format_timestamp(&(record.created + Duration::seconds(1)));
            self.write_long_desc(no_author_name, no_author, &history_when, history)?;
        }

        for attachment in &record.attachments {
            self.write_attachment(attachment)?;
        }

        writeln!(self.out, "  </bug>")
    }

    /// Closes the envelope, flushes, and hands the sink back.
    pub fn finish(mut self) -> io::Result<W> {
        writeln!(self.out, "</bugzilla>")?;
        self.out.flush()?;
        Ok(self.out)
    }

    /// Provenance block cross-referencing the original bug, prefixed to the
    /// normalized description.
    fn description_text(&self, record: &BugRecord) -> String {
        let mut text = format!(
            "Original Redmine bug id: {}\nOriginal URL: {}\nOriginal author: {}\nSearchable id: {}",
            record.id,
            record.url,
            record.author.as_deref().unwrap_or(""),
            self.config.searchable_id(&record.id),
        );
        if let Some(description) = &record.description {
            text.push_str("\n\n");
            text.push_str(description);
        }
        text
    }

    fn write_long_desc(
        &mut self,
        who_name: &str,
        who: &str,
        when: &str,
        text: &str,
    ) -> io::Result<()> {
        writeln!(self.out, "    <long_desc>")?;
        writeln!(
            self.out,
            r#"      <who name="{}">{}</who>"#,
            escape_attr(who_name),
            escape_text(who)
        )?;
        writeln!(self.out, "      <bug_when>{}</bug_when>", escape_text(when))?;
        writeln!(self.out, "      <thetext>{}</thetext>", escape_text(text))?;
        writeln!(self.out, "    </long_desc>")
    }

    fn write_attachment(&mut self, attachment: &AttachmentRecord) -> io::Result<()> {
        let is_patch = attachment.content_type == PATCH_CONTENT_TYPE;
        let (attacher, _) = self.mapper.user(Some(&attachment.author));
        let description = attachment
            .description
            .as_deref()
            .unwrap_or(&attachment.filename);

        writeln!(
            self.out,
            r#"    <attachment ispatch="{}">"#,
            if is_patch { "1" } else { "0" }
        )?;
        writeln!(
            self.out,
            "      <attachid>{}</attachid>",
            escape_text(&attachment.id)
        )?;
        writeln!(
            self.out,
            "      <filename>{}</filename>",
            escape_text(&attachment.filename)
        )?;
        writeln!(
            self.out,
            "      <type>{}</type>",
            escape_text(&attachment.content_type)
        )?;
        writeln!(self.out, "      <desc>{}</desc>", escape_text(description))?;
        writeln!(
            self.out,
            "      <attacher>{}</attacher>",
            escape_text(attacher)
        )?;
        writeln!(
            self.out,
            "      <date>{}</date>",
            escape_text(&format_timestamp(&attachment.created))
        )?;
        writeln!(
            self.out,
            r#"      <data encoding="base64">{}</data>"#,
            base64_wrapped(&attachment.data)
        )?;
        writeln!(self.out, "    </attachment>")
    }

    fn text_element(&mut self, tag: &str, value: &str) -> io::Result<()> {
        writeln!(self.out, "    <{tag}>{}</{tag}>", escape_text(value))
    }

    /// Absent values serialize as empty elements.
    fn opt_element(&mut self, tag: &str, value: &Option<String>) -> io::Result<()> {
        self.text_element(tag, value.as_deref().unwrap_or(""))
    }

    fn named_element(&mut self, tag: &str, name: &str, value: &str) -> io::Result<()> {
        writeln!(
            self.out,
            r#"    <{tag} name="{}">{}</{tag}>"#,
            escape_attr(name),
            escape_text(value)
        )
    }
}

fn format_timestamp(instant: &DateTime<Tz>) -> String {
    instant.format(BUGZILLA_TIMESTAMP_FORMAT).to_string()
}

/// Entity-escapes character data.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes a double-quoted attribute value.
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Base64 payload wrapped at a fixed column width.
fn base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH + 1);
    for (index, chunk) in encoded.as_bytes().chunks(BASE64_LINE_WIDTH).enumerate() {
        if index > 0 {
            out.push('\n');
        }
        // Base64 output is pure ASCII, so the chunk boundary is safe.
        out.push_str(std::str::from_utf8(chunk).unwrap_or(""));
    }
    out
}

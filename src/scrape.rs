//! Issue-page extraction: one Redmine HTML page into one [`BugRecord`].

use crate::config::{ExportConfig, REDMINE_TIMESTAMP_FORMAT};
use crate::fetch::{Fetch, FetchError};
use crate::record::{AttachmentRecord, BugRecord};
use crate::text::normalize_element;
use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use std::fmt;

const TIMESTAMP_PATTERN: &str = r"\d\d/\d\d/\d\d\d\d \d\d:\d\d [ap]m";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Fetches the issue page for `bug_id` and extracts its record.
pub fn scrape_bug(
    bug_id: &str,
    config: &ExportConfig,
    fetcher: &dyn Fetch,
) -> Result<BugRecord, ScrapeError> {
    let url = config.issue_url(bug_id).map_err(ScrapeError::Url)?;
    let page = fetcher.fetch(&url)?;
    let html = String::from_utf8_lossy(&page.body);
    scrape_issue(&html, bug_id, config, fetcher)
}

/// Extracts a [`BugRecord`] from an already-fetched issue page.
///
/// The author line and its first timestamp are mandatory; a page without
/// them cannot be exported. A missing description, history section, or
/// attributes cell is simply absent. Attachments are fetched eagerly, one
/// extra round-trip each, to capture both payload and content type.
pub fn scrape_issue(
    html: &str,
    bug_id: &str,
    config: &ExportConfig,
    fetcher: &dyn Fetch,
) -> Result<BugRecord, ScrapeError> {
    let selectors = Selectors::new();
    let document = Html::parse_document(html);

    let issue = document
        .select(&selectors.issue)
        .next()
        .ok_or(ParseError::MissingIssue)?;
    let author_line = issue
        .select(&selectors.author_line)
        .next()
        .ok_or(ParseError::MissingAuthorLine)?;

    let mut times = author_line
        .select(&selectors.titled_link)
        .filter_map(|link| link.value().attr("title"))
        .filter(|title| selectors.timestamp.is_match(title));
    let created_title = times.next().ok_or(ParseError::MissingCreationTimestamp)?;
    let created = parse_timestamp(created_title, config.timezone)?;
    let updated = times
        .next()
        .map(|title| parse_timestamp(title, config.timezone))
        .transpose()?;

    let author = author_line
        .select(&selectors.link)
        .next()
        .and_then(|link| cell_text(link, false));

    let assignee = issue
        .select(&selectors.assigned_to)
        .next()
        .and_then(|cell| linked_cell_text(cell, &selectors, false));

    let status = attribute_cell(issue, &selectors.status);
    let priority = attribute_cell(issue, &selectors.priority);
    let category = attribute_cell(issue, &selectors.category);
    let version = issue
        .select(&selectors.fixed_version)
        .next()
        .and_then(|cell| linked_cell_text(cell, &selectors, true));

    let project = document
        .select(&selectors.project)
        .next()
        .and_then(|heading| cell_text(heading, true));
    let title = issue
        .select(&selectors.subject)
        .next()
        .and_then(|heading| cell_text(heading, false));

    let description = issue
        .select(&selectors.description)
        .next()
        .map(normalize_element)
        .filter(|text| !text.is_empty());
    let history = document
        .select(&selectors.history)
        .next()
        .map(normalize_element)
        .filter(|text| !text.is_empty());

    let mut attachments = Vec::new();
    if let Some(container) = issue.select(&selectors.attachments).next() {
        for paragraph in container.select(&selectors.paragraph) {
            if let Some(attachment) =
                scrape_attachment(paragraph, &selectors, config, fetcher)?
            {
                attachments.push(attachment);
            }
        }
    }

    Ok(BugRecord {
        id: bug_id.to_string(),
        url: config.issue_url(bug_id).map_err(ScrapeError::Url)?,
        project,
        title,
        author,
        assignee,
        created,
        updated,
        status,
        priority,
        category,
        version,
        description,
        history,
        attachments,
    })
}

/// Parses one attachment paragraph, fetches its payload, and builds the
/// record. Paragraphs without a link are decoration and yield `None`.
fn scrape_attachment(
    paragraph: ElementRef<'_>,
    selectors: &Selectors,
    config: &ExportConfig,
    fetcher: &dyn Fetch,
) -> Result<Option<AttachmentRecord>, ScrapeError> {
    let Some(link) = paragraph.select(&selectors.link).next() else {
        return Ok(None);
    };
    let href = match link.value().attr("href") {
        Some(href) => href,
        None => return Ok(None),
    };

    let (id, name) = split_attachment_href(href).ok_or_else(|| ParseError::AttachmentLink {
        href: href.to_string(),
    })?;
    let url = config
        .attachment_download_url(id, name)
        .map_err(ScrapeError::Url)?;

    let filename = cell_text(link, false).unwrap_or_else(|| name.to_string());

    let description = link
        .next_siblings()
        .find_map(|sibling| sibling.value().as_text().map(|text| text.to_string()))
        .map(|text| text.trim().trim_start_matches(['-', ' ']).to_string())
        .filter(|text| !text.is_empty());

    let attribution = paragraph
        .select(&selectors.attachment_author)
        .next()
        .and_then(|span| cell_text(span, false))
        .ok_or_else(|| ParseError::AttachmentAuthor {
            detail: "author span missing".to_string(),
        })?;
    let captures = selectors
        .attachment_attribution
        .captures(&attribution)
        .ok_or_else(|| ParseError::AttachmentAuthor {
            detail: attribution.clone(),
        })?;
    let author = captures[1].to_string();
    let created = parse_timestamp(&captures[2], config.timezone)?;

    let resource = fetcher.fetch(&url)?;
    let content_type = resource
        .content_type
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

    Ok(Some(AttachmentRecord {
        id: id.to_string(),
        url,
        filename,
        content_type,
        description,
        author,
        created,
        data: resource.body,
    }))
}

/// Splits a page-relative attachment href of the shape
/// `/attachments/<id>/<name>` into its id and file name.
fn split_attachment_href(href: &str) -> Option<(&str, &str)> {
    let rest = href.strip_prefix("/attachments/")?;
    let (id, name) = rest.split_once('/')?;
    if id.is_empty() || name.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((id, name))
}

/// Collapsed text of an element, with the page's placeholder conventions
/// (a lone `-`, empty or whitespace-only) mapped to `None`. Lowercasing is
/// reserved for controlled-vocabulary cells.
fn cell_text(element: ElementRef<'_>, lower: bool) -> Option<String> {
    let mut raw = String::new();
    for piece in element.text() {
        raw.push_str(piece);
    }
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() || text == "-" {
        return None;
    }
    Some(if lower { text.to_lowercase() } else { text })
}

/// Cell text with an inner link, when present, taking precedence over the
/// cell's raw text.
fn linked_cell_text(
    cell: ElementRef<'_>,
    selectors: &Selectors,
    lower: bool,
) -> Option<String> {
    match cell.select(&selectors.link).next() {
        Some(link) => cell_text(link, lower),
        None => cell_text(cell, lower),
    }
}

fn attribute_cell(issue: ElementRef<'_>, selector: &Selector) -> Option<String> {
    issue
        .select(selector)
        .next()
        .and_then(|cell| cell_text(cell, true))
}

/// Parses a Redmine timestamp in the configured source timezone.
fn parse_timestamp(value: &str, timezone: Tz) -> Result<DateTime<Tz>, ParseError> {
    let naive = NaiveDateTime::parse_from_str(value, REDMINE_TIMESTAMP_FORMAT).map_err(|_| {
        ParseError::Timestamp {
            value: value.to_string(),
        }
    })?;
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ParseError::Timestamp {
            value: value.to_string(),
        })
}

/// Pre-parsed selectors and patterns for the issue page structure.
struct Selectors {
    issue: Selector,
    author_line: Selector,
    link: Selector,
    titled_link: Selector,
    assigned_to: Selector,
    status: Selector,
    priority: Selector,
    category: Selector,
    fixed_version: Selector,
    project: Selector,
    subject: Selector,
    description: Selector,
    history: Selector,
    attachments: Selector,
    paragraph: Selector,
    attachment_author: Selector,
    timestamp: Regex,
    attachment_attribution: Regex,
}

impl Selectors {
    fn new() -> Self {
        Self {
            issue: Selector::parse("div.issue").expect("issue selector"),
            author_line: Selector::parse("p.author").expect("author selector"),
            link: Selector::parse("a").expect("link selector"),
            titled_link: Selector::parse("a[title]").expect("titled link selector"),
            assigned_to: Selector::parse("td.assigned-to").expect("assignee selector"),
            status: Selector::parse("td.status").expect("status selector"),
            priority: Selector::parse("td.priority").expect("priority selector"),
            category: Selector::parse("td.category").expect("category selector"),
            fixed_version: Selector::parse("td.fixed-version").expect("version selector"),
            project: Selector::parse("h1").expect("project selector"),
            subject: Selector::parse("div.subject h3").expect("subject selector"),
            description: Selector::parse("div.wiki").expect("description selector"),
            history: Selector::parse("div#history").expect("history selector"),
            attachments: Selector::parse("div.attachments").expect("attachments selector"),
            paragraph: Selector::parse("p").expect("paragraph selector"),
            attachment_author: Selector::parse("span.author").expect("attachment author selector"),
            timestamp: Regex::new(&format!("^{TIMESTAMP_PATTERN}$")).expect("timestamp pattern"),
            attachment_attribution: Regex::new(&format!("^(.*?), ({TIMESTAMP_PATTERN})$"))
                .expect("attribution pattern"),
        }
    }
}

/// Expected HTML structure absent or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The page has no issue container at all.
    MissingIssue,
    /// The issue has no author line.
    MissingAuthorLine,
    /// The author line carries no recognizable creation timestamp.
    MissingCreationTimestamp,
    /// A timestamp string did not parse in the source timezone.
    Timestamp {
        /// Offending string.
        value: String,
    },
    /// An attachment link did not have the `/attachments/<id>/<name>` shape.
    AttachmentLink {
        /// Offending href.
        href: String,
    },
    /// An attachment's author/timestamp span was missing or unrecognizable.
    AttachmentAuthor {
        /// Span text, or a note that it was absent.
        detail: String,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIssue => write!(f, "page has no issue container"),
            Self::MissingAuthorLine => write!(f, "issue has no author line"),
            Self::MissingCreationTimestamp => {
                write!(f, "author line has no creation timestamp")
            }
            Self::Timestamp { value } => write!(f, "unparseable timestamp '{value}'"),
            Self::AttachmentLink { href } => {
                write!(f, "attachment link '{href}' is not an attachment path")
            }
            Self::AttachmentAuthor { detail } => {
                write!(f, "attachment attribution not recognized: {detail}")
            }
        }
    }
}

impl Error for ParseError {}

/// Any failure while turning one bug id into a record.
#[derive(Debug)]
pub enum ScrapeError {
    /// The page structure was not as expected.
    Parse(ParseError),
    /// The page or an attachment could not be fetched.
    Fetch(FetchError),
    /// A URL built from the configuration did not parse.
    Url(url::ParseError),
}

impl From<ParseError> for ScrapeError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<FetchError> for ScrapeError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err)
    }
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "parse error: {err}"),
            Self::Fetch(err) => write!(f, "fetch error: {err}"),
            Self::Url(err) => write!(f, "bad url: {err}"),
        }
    }
}

impl Error for ScrapeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Fetch(err) => Some(err),
            Self::Url(err) => Some(err),
        }
    }
}

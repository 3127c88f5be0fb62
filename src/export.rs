//! Batch export driver: many bug ids, one document, per-bug failure
//! isolation.

use crate::config::ExportConfig;
use crate::fetch::Fetch;
use crate::scrape::scrape_bug;
use crate::xml::XmlExporter;
use std::io::{self, Write};

/// One bug id that could not be exported, with the reason.
#[derive(Debug, Clone)]
pub struct BugFailure {
    /// The id as given by the caller.
    pub bug_id: String,
    /// Human-readable failure description.
    pub reason: String,
}

/// What an export run accomplished.
#[derive(Debug, Clone, Default)]
pub struct ExportOutcome {
    /// Ids exported into the document, in output order.
    pub exported: Vec<String>,
    /// Ids skipped because fetching or parsing failed.
    pub failures: Vec<BugFailure>,
}

/// Exports `bug_ids` as one Bugzilla XML document into `out`.
///
/// Fetch and parse failures are per-bug: the failing id is reported on the
/// `progress` side channel and recorded in the outcome, and the run moves
/// on, so a partial export still produces a well-formed document. Only I/O
/// errors on `out` abort the run.
pub fn export_bugs<W: Write>(
    bug_ids: &[String],
    config: &ExportConfig,
    fetcher: &dyn Fetch,
    out: W,
    mut progress: Option<&mut dyn Write>,
) -> io::Result<ExportOutcome> {
    let mut exporter = XmlExporter::new(out, config);
    let mut outcome = ExportOutcome::default();

    exporter.begin()?;
    for bug_id in bug_ids {
        if let Some(sink) = progress.as_deref_mut() {
            writeln!(sink, "Bug {bug_id}...")?;
        }
        match scrape_bug(bug_id, config, fetcher) {
            Ok(record) => {
                exporter.write_bug(&record)?;
                outcome.exported.push(bug_id.clone());
            }
            Err(err) => {
                if let Some(sink) = progress.as_deref_mut() {
                    writeln!(sink, "Bug {bug_id} skipped: {err}")?;
                }
                outcome.failures.push(BugFailure {
                    bug_id: bug_id.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    exporter.finish()?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchedResource};
    use std::collections::HashMap;
    use url::Url;

    struct CannedFetcher {
        responses: HashMap<String, Vec<u8>>,
    }

    impl Fetch for CannedFetcher {
        fn fetch(&self, url: &Url) -> Result<FetchedResource, FetchError> {
            match self.responses.get(url.as_str()) {
                Some(body) => Ok(FetchedResource {
                    body: body.clone(),
                    content_type: Some("text/html".to_string()),
                }),
                None => Err(FetchError::Status {
                    url: url.clone(),
                    status: 404,
                }),
            }
        }
    }

    const ISSUE_PAGE: &str = r#"<html><body>
        <h1>Widgets</h1>
        <div class="issue">
          <div class="subject"><h3>Crash on save</h3></div>
          <p class="author">Added by <a href="/users/1">Jane</a>
            <a title="03/14/2014 09:26 pm" href="/activity">10 days ago</a></p>
          <table class="attributes"><tr><td class="status">Fixed</td></tr></table>
          <div class="wiki"><p>Saving crashes.</p></div>
        </div>
        </body></html>"#;

    #[test]
    fn missing_bug_is_skipped_and_reported() {
        let fetcher = CannedFetcher {
            responses: HashMap::from([(
                "http://redmine.example.com/issues/1001".to_string(),
                ISSUE_PAGE.as_bytes().to_vec(),
            )]),
        };
        let config = ExportConfig::default();
        let ids = vec!["1001".to_string(), "9999".to_string()];

        let mut document = Vec::new();
        let mut progress = Vec::new();
        let outcome = export_bugs(
            &ids,
            &config,
            &fetcher,
            &mut document,
            Some(&mut progress),
        )
        .expect("export");

        assert_eq!(outcome.exported, vec!["1001".to_string()]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].bug_id, "9999");
        assert!(outcome.failures[0].reason.contains("404"));

        let document = String::from_utf8(document).expect("utf8 document");
        assert_eq!(document.matches("<bug>").count(), 1);
        assert!(document.trim_end().ends_with("</bugzilla>"));

        let progress = String::from_utf8(progress).expect("utf8 progress");
        assert!(progress.contains("Bug 1001..."));
        assert!(progress.contains("Bug 9999 skipped:"));
    }

    #[test]
    fn quiet_run_writes_no_progress() {
        let fetcher = CannedFetcher {
            responses: HashMap::new(),
        };
        let config = ExportConfig::default();
        let ids = vec!["1001".to_string()];

        let mut document = Vec::new();
        let outcome =
            export_bugs(&ids, &config, &fetcher, &mut document, None).expect("export");

        assert!(outcome.exported.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        // The document is still a complete, well-formed envelope.
        let document = String::from_utf8(document).expect("utf8 document");
        assert!(document.contains("<bugzilla"));
        assert!(document.trim_end().ends_with("</bugzilla>"));
    }
}

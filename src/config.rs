//! Immutable export configuration shared across the pipeline.

use chrono_tz::Tz;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use url::Url;

/// Timestamp grammar used on Redmine pages (`03/14/2014 09:26 pm`).
pub const REDMINE_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M %p";

/// Timestamp grammar expected by the Bugzilla importer.
pub const BUGZILLA_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Configuration for one export run, read once at startup and immutable
/// thereafter.
///
/// The lookup tables replace the process-wide mutable maps a quick script
/// would use; everything downstream borrows this value instead.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Base URL of the Redmine instance, without a trailing slash.
    pub redmine_base: Url,
    /// Timezone the Redmine server renders timestamps in.
    pub timezone: Tz,
    /// Template for the searchable cross-reference string; `{}` is replaced
    /// by the original bug id.
    pub searchable_id_formula: String,
    /// Bugzilla version advertised in the document envelope.
    pub bugzilla_version: String,
    /// Bugzilla identity used when a Redmine name has no mapping.
    pub default_user: String,
    /// Display name paired with [`default_user`](Self::default_user).
    pub default_user_name: String,
    /// Redmine display name to Bugzilla identity.
    pub users: HashMap<String, String>,
    /// Bugzilla status used when a Redmine status has no mapping.
    pub default_status: String,
    /// Redmine status name to Bugzilla status code.
    pub statuses: HashMap<String, String>,
    /// Resolution used when a Redmine status has no resolution mapping.
    pub default_resolution: String,
    /// Redmine status name to Bugzilla resolution code. Independent of
    /// [`statuses`](Self::statuses): a key may appear in either table alone.
    pub resolutions: HashMap<String, String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let users = HashMap::from([(
            "John Doe".to_string(),
            "john.doe@example.com".to_string(),
        )]);
        let statuses = HashMap::from([
            ("need information".to_string(), "NEEDINFO".to_string()),
            ("review".to_string(), "ASSIGNED".to_string()),
            ("blocked".to_string(), "VERIFIED".to_string()),
            ("fixed".to_string(), "RESOLVED".to_string()),
            ("duplicate".to_string(), "RESOLVED".to_string()),
            ("invalid".to_string(), "RESOLVED".to_string()),
        ]);
        let resolutions = HashMap::from([
            ("fixed".to_string(), "FIXED".to_string()),
            ("duplicate".to_string(), "DUPLICATE".to_string()),
            ("invalid".to_string(), "INVALID".to_string()),
        ]);

        Self {
            redmine_base: Url::parse("http://redmine.example.com").expect("default base url"),
            timezone: Tz::UTC,
            searchable_id_formula: "example-bug-{}".to_string(),
            bugzilla_version: "4.4".to_string(),
            default_user: "bugs@example.com".to_string(),
            default_user_name: "Maintainers".to_string(),
            users,
            default_status: "NEW".to_string(),
            statuses,
            default_resolution: String::new(),
            resolutions,
        }
    }
}

impl ExportConfig {
    /// Parses a Redmine base URL, rejecting anything `url` cannot represent.
    pub fn parse_base(value: &str) -> Result<Url, ConfigError> {
        Url::parse(value.trim_end_matches('/')).map_err(|source| ConfigError::BaseUrl {
            value: value.to_string(),
            source,
        })
    }

    /// Parses an IANA timezone name such as `Europe/Berlin`.
    pub fn parse_timezone(value: &str) -> Result<Tz, ConfigError> {
        value.parse().map_err(|_| ConfigError::Timezone {
            value: value.to_string(),
        })
    }

    /// URL of the issue page for `bug_id`.
    pub fn issue_url(&self, bug_id: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/issues/{}",
            self.redmine_base.as_str().trim_end_matches('/'),
            bug_id
        ))
    }

    /// Direct-download URL for an attachment, given the id and file name
    /// parsed out of its page link.
    pub fn attachment_download_url(&self, id: &str, name: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/attachments/download/{}/{}",
            self.redmine_base.as_str().trim_end_matches('/'),
            id,
            name
        ))
    }

    /// Builds the searchable cross-reference string for `bug_id`.
    pub fn searchable_id(&self, bug_id: &str) -> String {
        self.searchable_id_formula.replace("{}", bug_id)
    }
}

/// Invalid user-supplied configuration; fatal before any fetching begins.
#[derive(Debug)]
pub enum ConfigError {
    /// The Redmine base URL did not parse.
    BaseUrl {
        /// Offending input.
        value: String,
        /// Parser failure.
        source: url::ParseError,
    },
    /// The timezone name is not a known IANA zone.
    Timezone {
        /// Offending input.
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BaseUrl { value, source } => {
                write!(f, "invalid Redmine base URL '{value}': {source}")
            }
            Self::Timezone { value } => write!(f, "unknown timezone '{value}'"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BaseUrl { source, .. } => Some(source),
            Self::Timezone { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_cover_resolved_statuses() {
        let config = ExportConfig::default();
        assert_eq!(config.statuses.get("fixed").map(String::as_str), Some("RESOLVED"));
        assert_eq!(config.resolutions.get("fixed").map(String::as_str), Some("FIXED"));
        // Mapped to a status but deliberately absent from resolutions.
        assert!(config.resolutions.get("review").is_none());
    }

    #[test]
    fn searchable_id_substitutes_bug_id() {
        let config = ExportConfig::default();
        assert_eq!(config.searchable_id("1001"), "example-bug-1001");
    }

    #[test]
    fn issue_and_attachment_urls() {
        let config = ExportConfig::default();
        let issue = config.issue_url("42").expect("issue url");
        assert_eq!(issue.as_str(), "http://redmine.example.com/issues/42");

        let download = config
            .attachment_download_url("42", "patch.diff")
            .expect("download url");
        assert_eq!(
            download.as_str(),
            "http://redmine.example.com/attachments/download/42/patch.diff"
        );
    }

    #[test]
    fn rejects_unknown_timezone() {
        let err = ExportConfig::parse_timezone("Mars/Olympus").expect_err("bad zone");
        assert!(matches!(err, ConfigError::Timezone { .. }));
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let base = ExportConfig::parse_base("http://bugs.example.org/").expect("base");
        assert_eq!(base.as_str(), "http://bugs.example.org/");
        // Url re-adds the root slash; what matters is that issue_url does not double it.
        let config = ExportConfig {
            redmine_base: base,
            ..ExportConfig::default()
        };
        assert_eq!(
            config.issue_url("7").expect("issue url").as_str(),
            "http://bugs.example.org/issues/7"
        );
    }
}

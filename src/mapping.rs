//! Redmine-to-Bugzilla vocabulary mapping.

use crate::config::ExportConfig;

/// Maps Redmine display names and status names into Bugzilla identities and
/// codes, with the configured fallbacks on any miss.
#[derive(Debug, Clone, Copy)]
pub struct Mapper<'a> {
    config: &'a ExportConfig,
}

impl<'a> Mapper<'a> {
    /// Builds a mapper over the given configuration tables.
    pub fn new(config: &'a ExportConfig) -> Self {
        Self { config }
    }

    /// Resolves a Redmine display name to `(identity, display name)`.
    ///
    /// Unknown names and `None` both resolve to the configured default
    /// identity; `None` is how callers obtain the canonical "no author"
    /// identity for system-authored entries.
    pub fn user<'n>(&self, name: Option<&'n str>) -> (&'n str, &'n str)
    where
        'a: 'n,
    {
        match name.and_then(|name| self.config.users.get(name).map(|email| (email, name))) {
            Some((email, name)) => (email.as_str(), name),
            None => (
                self.config.default_user.as_str(),
                self.config.default_user_name.as_str(),
            ),
        }
    }

    /// Resolves a Redmine status name to a Bugzilla status code.
    pub fn status(&self, name: Option<&str>) -> &'a str {
        name.and_then(|name| self.config.statuses.get(name))
            .map(String::as_str)
            .unwrap_or(self.config.default_status.as_str())
    }

    /// Resolves a Redmine status name to a Bugzilla resolution code.
    ///
    /// Independent of [`status`](Self::status): the two tables may disagree
    /// about which keys they carry.
    pub fn resolution(&self, name: Option<&str>) -> &'a str {
        name.and_then(|name| self.config.resolutions.get(name))
            .map(String::as_str)
            .unwrap_or(self.config.default_resolution.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_user_keeps_their_name() {
        let config = ExportConfig::default();
        let mapper = Mapper::new(&config);
        let (email, name) = mapper.user(Some("John Doe"));
        assert_eq!(email, "john.doe@example.com");
        assert_eq!(name, "John Doe");
    }

    #[test]
    fn unknown_user_falls_back_to_default_identity() {
        let config = ExportConfig::default();
        let mapper = Mapper::new(&config);
        let (email, name) = mapper.user(Some("Nobody Inparticular"));
        assert_eq!(email, "bugs@example.com");
        assert_eq!(name, "Maintainers");
    }

    #[test]
    fn no_author_is_the_default_identity() {
        let config = ExportConfig::default();
        let mapper = Mapper::new(&config);
        assert_eq!(mapper.user(None), ("bugs@example.com", "Maintainers"));
    }

    #[test]
    fn status_and_resolution_tables_are_independent() {
        let config = ExportConfig::default();
        let mapper = Mapper::new(&config);

        // Present in both tables.
        assert_eq!(mapper.status(Some("fixed")), "RESOLVED");
        assert_eq!(mapper.resolution(Some("fixed")), "FIXED");

        // Present only in the status table.
        assert_eq!(mapper.status(Some("review")), "ASSIGNED");
        assert_eq!(mapper.resolution(Some("review")), "");

        // Absent from both: configured defaults.
        assert_eq!(mapper.status(Some("wontfix")), "NEW");
        assert_eq!(mapper.resolution(Some("wontfix")), "");
        assert_eq!(mapper.status(None), "NEW");
    }
}

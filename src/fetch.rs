//! Blocking page retrieval for issue pages and attachment downloads.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("redmine2bugzilla/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw bytes plus the media type reported by the server.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Response body.
    pub body: Vec<u8>,
    /// `Content-Type` media type, parameters stripped and lowercased.
    pub content_type: Option<String>,
}

/// Abstraction over page retrieval so the extractor and the batch driver
/// can be exercised offline against canned responses.
pub trait Fetch {
    /// Retrieves `url`, failing on any non-2xx status or transport error.
    fn fetch(&self, url: &Url) -> Result<FetchedResource, FetchError>;
}

/// HTTP fetcher backed by a blocking reqwest client.
///
/// No retries: a failed fetch fails the bug it belongs to and the batch
/// driver moves on to the next id.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher with the crate's user agent, bounded redirects, and
    /// a request timeout.
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(5))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(FetchError::Http)?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedResource, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(FetchError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(media_type)
            .filter(|value| !value.is_empty());

        let body = response.bytes().map_err(FetchError::Http)?.to_vec();
        Ok(FetchedResource { body, content_type })
    }
}

/// Strips parameters (`; charset=...`) from a `Content-Type` header value.
fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or(header)
        .trim()
        .to_ascii_lowercase()
}

/// Transport or HTTP failure while reaching a page or attachment.
#[derive(Debug)]
pub enum FetchError {
    /// DNS, connect, timeout, or protocol error from the transport.
    Http(reqwest::Error),
    /// The server answered with a non-2xx status.
    Status {
        /// Requested URL.
        url: Url,
        /// HTTP status code returned.
        status: u16,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(err) => write!(f, "http error: {err}"),
            Self::Status { url, status } => write!(f, "{url} returned HTTP {status}"),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Status { .. } => None,
        }
    }
}

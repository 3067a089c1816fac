//! The error type shared by every layer of the client.

/// The result type for wiki operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that may occur when talking to a wiki.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server reported an API error which has no more specific variant.
    #[error("API error {code}: {info}")]
    Api {
        /// The MediaWiki error code.
        code: String,
        /// The human-readable error message.
        info: String,
    },

    /// A timestamp in a server response failed to parse.
    #[error("bad timestamp: {0}")]
    Date(#[from] time::error::Parse),

    /// Somebody changed the page since it was last loaded.
    #[error("edit conflict on {0}")]
    EditConflict(String),

    /// The HTTP client failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A generator option was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A title failed to parse.
    #[error("invalid title: {0}")]
    InvalidTitle(String),

    /// I/O failed while reading or writing local state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page is a redirect and the redirect was not asked for.
    #[error("{0} is a redirect page")]
    IsRedirectPage(String),

    /// A redirect target was asked for on a page which is not a redirect.
    #[error("{0} is not a redirect page")]
    IsNotRedirectPage(String),

    /// The server response was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The page is protected against this kind of change.
    #[error("{title} is locked: {info}")]
    LockedPage {
        /// The page title.
        title: String,
        /// The server message.
        info: String,
    },

    /// The server kept asking us to back off and we ran out of patience.
    #[error("gave up after {0} retries")]
    MaxRetries(u32),

    /// The page does not exist.
    #[error("page {0} does not exist")]
    NoPage(String),

    /// A write was requested on a site with no configured account.
    #[error("no username configured for {0}")]
    NoUsername(String),

    /// The account lacks a right needed for the operation.
    #[error("permission denied ({code}): {info}")]
    PermissionDenied {
        /// The MediaWiki error code.
        code: String,
        /// The human-readable error message.
        info: String,
    },

    /// The server response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The edit was rejected by the spam filter.
    #[error("edit rejected by spam filter because of {0}")]
    SpamFilter(String),

    /// The HTTP transport was shut down before the request finished.
    #[error("HTTP transport is shut down")]
    TransportClosed,

    /// No family with this name is registered.
    #[error("family '{0}' is not supported")]
    UnknownFamily(String),

    /// The family exists but does not know the requested language.
    #[error("language '{code}' does not exist in family {family}")]
    UnknownSite {
        /// The requested language code.
        code: String,
        /// The family name.
        family: String,
    },
}

impl Error {
    /// Returns true if the error is about the state of a single page, and a
    /// bot working through a generator should skip that page and go on.
    pub fn is_page_error(&self) -> bool {
        matches!(
            self,
            Self::EditConflict(_)
                | Self::IsNotRedirectPage(_)
                | Self::IsRedirectPage(_)
                | Self::LockedPage { .. }
                | Self::NoPage(_)
                | Self::SpamFilter(_)
        )
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Self::Http(err.to_string())
    }
}

use thiserror::Error;

/// Errors surfaced by the GitLab token source.
///
/// None of these are fatal past startup: the scraper counts them in
/// `scrape_errors_total` and moves on to the next scope.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gitlab returned {status}: {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },
}

/// Error types that can be returned by the [`HttpRunner`](crate::runner::HttpRunner) and its helpers.
///
/// Configuration errors (`Url*`, `InvalidHeader`, `InvalidTimeout`) are raised before any network I/O.
/// Transport failures are wrapped verbatim in `RequestError`. A `4xx`/`5xx` response is never an error.
#[derive(Debug, thiserror::Error)]
pub enum ErrorType {
  /// The request URL couldn't be parsed.
  #[error("failed to parse URL `{url}`: {source}")]
  UrlParsingError {
    url: String,
    #[source]
    source: url::ParseError,
  },
  /// The URL is missing the hostname.
  #[error("URL `{0}` has no host")]
  UrlMissingHostnameError(String),
  /// The URL uses an unsupported protocol.
  #[error("unsupported protocol `{0}`, expected http or https")]
  UrlProtocolError(String),
  /// A header name or value can't be sent over the wire.
  #[error("invalid header `{0}`")]
  InvalidHeader(String),
  /// The per-request timeout was set to zero.
  #[error("request timeout must be greater than zero")]
  InvalidTimeout,
  /// The request URL couldn't be parsed while matching cookies against it.
  #[error("cannot scope cookies to `{url}`: {source}")]
  CookieScopeError {
    url: String,
    #[source]
    source: url::ParseError,
  },
  /// The underlying transport couldn't be constructed.
  #[error("failed to build the HTTP client: {0}")]
  ClientBuildError(#[source] reqwest::Error),
  /// `reqwest::Error` variant. See the nested error for more details.
  #[error(transparent)]
  RequestError(#[from] reqwest::Error),
  /// Reading an attachment or writing a download failed.
  #[error(transparent)]
  FileError(#[from] std::io::Error),
}

impl ErrorType {
  /// Returns `true` for transport failures that happened before a response arrived.
  ///
  /// Only these are retried, up to the resolved retry count.
  pub fn is_retryable(&self) -> bool {
    match self {
      ErrorType::RequestError(err) => err.is_connect() || err.is_timeout() || err.is_request(),
      _ => false,
    }
  }
}

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use log::debug;
use reqwest::{header::HeaderMap, redirect::Policy, Method, Response, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio_retry::{strategy::ExponentialBackoff, RetryIf};
use url::Url;

use crate::{
  cookies::{cookie_header, scope_cookies, Cookie, PublicSuffixes, SuffixList},
  dialer::{Dialer, DirectDialer, ProxyDialer, TransportMode},
  http_headers::{default_headers, to_header_map, HttpHeaders},
  request::{FileRequestOptions, FormRequestOptions, HtmlRequestOptions, JsonRequestOptions, Payload, RequestOptions},
  ErrorType,
};

/// HttpRunner is the main struct used to send requests.
///
/// It owns the connection pool of one transport mode (direct or proxied) and the defaults every
/// request falls back to. The runner is cheap to clone and all methods take `&self`, so one instance
/// can serve any number of concurrent requests. Per-request options are resolved into a
/// [`CallOptions`] value for that request only and never change the runner's defaults.
///
/// To create a new [`HttpRunner`] instance, use [`HttpRunner::direct`], [`HttpRunner::proxied`]
/// or the [`HttpRunner::builder()`](HttpRunnerBuilder) method.
#[derive(Clone)]
pub struct HttpRunner {
  follow_client: reqwest::Client,
  manual_client: reqwest::Client,
  defaults: Arc<Defaults>,
  suffix_list: Arc<dyn SuffixList>,
  mode: TransportMode,
}

struct Defaults {
  headers: HeaderMap,
  retry_count: u32,
  timeout: Duration,
}

/// The effective settings of one request, merged from the runner defaults and the request options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
  pub retry_count: u32,
  pub timeout: Duration,
  pub follow_redirects: bool,
}

/// The result of [`HttpRunner::get_file`]. The body has been written to `path`.
#[derive(Debug, Clone)]
pub struct DownloadResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub url: Url,
  pub path: PathBuf,
  pub bytes_written: u64,
}

/// A builder struct used to create a new [`HttpRunner`] instance.
///
/// ### Example
/// ```rust,no_run
/// # use std::time::Duration;
/// # use courier::{dialer::DirectDialer, runner::HttpRunner};
/// let runner = HttpRunner::builder(DirectDialer::new())
///   .with_retry_count(1)
///   .with_default_timeout(Duration::from_secs(10))
///   .build()
///   .unwrap();
/// ```
#[derive(Clone)]
pub struct HttpRunnerBuilder {
  dialer: Arc<dyn Dialer>,
  retry_count: u32,
  request_timeout: Duration,
  default_headers: HashMap<String, String>,
  max_redirects: usize,
  ignore_tls_errors: bool,
  suffix_list: Option<Arc<dyn SuffixList>>,
}

impl HttpRunnerBuilder {
  /// Starts from the preset of the dialer's transport mode: 2 retries and a 15 second timeout for
  /// direct connections, 3 retries and 30 seconds through a proxy. Both use the built-in default headers.
  pub fn new(dialer: Arc<dyn Dialer>) -> Self {
    let (retry_count, request_timeout) = match dialer.mode() {
      TransportMode::Direct => (2, Duration::from_secs(15)),
      TransportMode::Proxied => (3, Duration::from_secs(30)),
    };

    HttpRunnerBuilder {
      dialer,
      retry_count,
      request_timeout,
      default_headers: default_headers(),
      max_redirects: 10,
      ignore_tls_errors: false,
      suffix_list: None,
    }
  }

  /// Sets how many times a request is retried after a transport failure.
  ///
  /// This setting can be overridden per request with `set_retry_option`.
  pub fn with_retry_count(mut self, retry_count: u32) -> Self {
    self.retry_count = retry_count;
    self
  }

  /// Sets the default timeout for requests, covering connect, write and read.
  ///
  /// This setting can be overridden per request with `set_timeout_option`.
  pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }

  /// Replaces the default headers sent with every request.
  pub fn with_default_headers(mut self, headers: HashMap<String, String>) -> Self {
    self.default_headers = headers;
    self
  }

  /// Sets how many redirects a request that follows redirects may take before failing.
  pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
    self.max_redirects = max_redirects;
    self
  }

  /// If set to true, the client will ignore TLS-related errors.
  pub fn with_ignore_tls_errors(mut self, ignore_tls_errors: bool) -> Self {
    self.ignore_tls_errors = ignore_tls_errors;
    self
  }

  /// Replaces the public suffix list used to scope cookies.
  pub fn with_suffix_list(mut self, suffix_list: Arc<dyn SuffixList>) -> Self {
    self.suffix_list = Some(suffix_list);
    self
  }

  /// Builds the [`HttpRunner`] instance.
  pub fn build(self) -> Result<HttpRunner, ErrorType> {
    HttpRunner::new(self)
  }
}

impl HttpRunner {
  pub fn builder(dialer: impl Dialer + 'static) -> HttpRunnerBuilder {
    HttpRunnerBuilder::new(Arc::new(dialer))
  }

  /// A runner connecting directly, with the direct preset.
  pub fn direct(dialer: DirectDialer) -> Result<HttpRunner, ErrorType> {
    Self::builder(dialer).build()
  }

  /// A runner connecting through a proxy, with the proxied preset.
  pub fn proxied(dialer: ProxyDialer) -> Result<HttpRunner, ErrorType> {
    Self::builder(dialer).build()
  }

  fn new_reqwest_client(config: &HttpRunnerBuilder, redirect: Policy) -> Result<reqwest::Client, ErrorType> {
    let client = reqwest::Client::builder()
      .danger_accept_invalid_certs(config.ignore_tls_errors)
      .timeout(config.request_timeout)
      .redirect(redirect);

    config.dialer
      .configure(client)?
      .build()
      .map_err(ErrorType::ClientBuildError)
  }

  /// Creates a new [`HttpRunner`] instance based on the options stored in the [`HttpRunnerBuilder`] instance.
  ///
  /// Redirect handling is fixed per `reqwest::Client`, so two transports are built from the same
  /// configuration and each request picks one.
  fn new(config: HttpRunnerBuilder) -> Result<Self, ErrorType> {
    let follow_client = Self::new_reqwest_client(&config, Policy::limited(config.max_redirects))?;
    let manual_client = Self::new_reqwest_client(&config, Policy::none())?;

    let suffix_list: Arc<dyn SuffixList> = match &config.suffix_list {
      Some(suffix_list) => suffix_list.clone(),
      None => Arc::new(PublicSuffixes::new()),
    };

    Ok(HttpRunner {
      follow_client,
      manual_client,
      defaults: Arc::new(Defaults {
        headers: to_header_map(&config.default_headers)?,
        retry_count: config.retry_count,
        timeout: config.request_timeout,
      }),
      suffix_list,
      mode: config.dialer.mode(),
    })
  }

  pub fn mode(&self) -> TransportMode {
    self.mode
  }

  pub fn default_retry_count(&self) -> u32 {
    self.defaults.retry_count
  }

  pub fn default_timeout(&self) -> Duration {
    self.defaults.timeout
  }

  pub fn default_headers(&self) -> &HeaderMap {
    &self.defaults.headers
  }

  /// Resolves the settings a request will be sent with.
  ///
  /// Options set on the request win over the runner's defaults. Negative retry counts are treated
  /// as zero, a zero timeout is rejected.
  pub fn call_options<P: Payload>(&self, options: &RequestOptions<P>) -> Result<CallOptions, ErrorType> {
    let retry_count = match options.retry_option() {
      Some(retry) => u32::try_from(retry).unwrap_or(0),
      None => self.defaults.retry_count,
    };

    let timeout = match options.timeout_option() {
      Some(timeout) if timeout.is_zero() => return Err(ErrorType::InvalidTimeout),
      Some(timeout) => timeout,
      None => self.defaults.timeout,
    };

    Ok(CallOptions {
      retry_count,
      timeout,
      follow_redirects: options.follow_redirect_option().unwrap_or(P::FOLLOWS_REDIRECTS_BY_DEFAULT),
    })
  }

  fn parse_url(url: &str) -> Result<Url, ErrorType> {
    let parsed = Url::parse(url).map_err(|source| ErrorType::UrlParsingError {
      url: url.to_string(),
      source,
    })?;

    if parsed.host_str().is_none() {
      return Err(ErrorType::UrlMissingHostnameError(url.to_string()));
    }

    match parsed.scheme() {
      "http" | "https" => Ok(parsed),
      protocol => Err(ErrorType::UrlProtocolError(protocol.to_string())),
    }
  }

  async fn make_request<P: Payload>(&self, method: Method, options: &RequestOptions<P>, cookies: &[Cookie]) -> Result<Response, ErrorType> {
    let url = Self::parse_url(options.url())?;
    let call = self.call_options(options)?;
    let payload = options.payload();
    let with_body = method == Method::POST || method == Method::PUT;

    let scoped = scope_cookies(options.url(), cookies, self.suffix_list.as_ref())?;

    let headers = HeaderMap::try_from(
      HttpHeaders::get_builder()
        .with_defaults(&self.defaults.headers)
        .with_custom_headers(options.headers())
        .with_content_type(payload.content_type())
        .without_content_type(with_body && payload.encodes_content_type())
        .with_cookie(cookie_header(&scoped))
        .build(),
    )?;

    let client = if call.follow_redirects {
      &self.follow_client
    } else {
      &self.manual_client
    };

    debug!(
      "{} {} (retries: {}, timeout: {:?}, follow redirects: {}, cookies: {})",
      method, url, call.retry_count, call.timeout, call.follow_redirects, scoped.len()
    );

    let strategy = retry_strategy().take(call.retry_count as usize);

    RetryIf::start(
      strategy,
      || {
        let request = client
          .request(method.clone(), url.clone())
          .headers(headers.clone())
          .timeout(call.timeout);
        let request = if with_body { payload.attach(request) } else { Ok(request) };

        async move {
          let response = request?.send().await?;
          Ok::<_, ErrorType>(response)
        }
      },
      |err: &ErrorType| {
        let retry = err.is_retryable();
        if retry {
          debug!("{} {} failed, retrying: {}", method, url, err);
        }
        retry
      },
    )
    .await
  }

  /// Makes a `GET` request expecting a JSON response.
  ///
  /// Sends `content-type: application/json` unless the headers already carry a content type.
  /// **Redirects are not followed unless `follow_redirect_option` is set to `true`**: a `3xx`
  /// response is returned as-is.
  pub async fn get_json(&self, options: &JsonRequestOptions, cookies: &[Cookie]) -> Result<Response, ErrorType> {
    self.make_request(Method::GET, options, cookies).await
  }

  /// Makes a `GET` request for a document.
  ///
  /// Redirects are followed unless `follow_redirect_option` is set to `false`.
  pub async fn get_html(&self, options: &HtmlRequestOptions, cookies: &[Cookie]) -> Result<Response, ErrorType> {
    self.make_request(Method::GET, options, cookies).await
  }

  /// Makes a `GET` request and streams the response body into the options' file path.
  ///
  /// The body is written whatever the status code. Redirects are followed unless
  /// `follow_redirect_option` is set to `false`.
  pub async fn get_file(&self, options: &FileRequestOptions, cookies: &[Cookie]) -> Result<DownloadResponse, ErrorType> {
    let mut response = self.make_request(Method::GET, options, cookies).await?;

    let mut file = tokio::fs::File::create(options.file_path()).await?;
    let mut bytes_written = 0u64;

    while let Some(chunk) = response.chunk().await? {
      file.write_all(&chunk).await?;
      bytes_written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!("{} bytes from {} written to {}", bytes_written, response.url(), options.file_path().display());

    Ok(DownloadResponse {
      status: response.status(),
      headers: response.headers().clone(),
      url: response.url().clone(),
      path: options.file_path().to_path_buf(),
      bytes_written,
    })
  }

  /// Makes a `POST` request with the options' value as the raw body.
  ///
  /// **Redirects are not followed unless `follow_redirect_option` is set to `true`.**
  pub async fn post_json(&self, options: &JsonRequestOptions, cookies: &[Cookie]) -> Result<Response, ErrorType> {
    self.make_request(Method::POST, options, cookies).await
  }

  /// Makes a `PUT` request with the options' value as the raw body.
  ///
  /// **Redirects are not followed unless `follow_redirect_option` is set to `true`.**
  pub async fn put_json(&self, options: &JsonRequestOptions, cookies: &[Cookie]) -> Result<Response, ErrorType> {
    self.make_request(Method::PUT, options, cookies).await
  }

  /// Makes a `POST` request with a form body.
  ///
  /// Fields are sent `application/x-www-form-urlencoded`; with file attachments the body becomes
  /// `multipart/form-data` and carries the fields as text parts.
  /// **Redirects are not followed unless `follow_redirect_option` is set to `true`.**
  pub async fn post_form(&self, options: &FormRequestOptions, cookies: &[Cookie]) -> Result<Response, ErrorType> {
    self.make_request(Method::POST, options, cookies).await
  }
}

/// 100 ms, doubling up to 2 s.
fn retry_strategy() -> ExponentialBackoff {
  ExponentialBackoff::from_millis(2)
    .factor(50)
    .max_delay(Duration::from_secs(2))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn runner() -> HttpRunner {
    HttpRunner::builder(DirectDialer::new())
      .with_retry_count(2)
      .with_default_timeout(Duration::from_secs(15))
      .build()
      .unwrap()
  }

  #[test]
  fn presets_follow_transport_mode() {
    let direct = HttpRunner::direct(DirectDialer::new()).unwrap();
    assert_eq!(direct.mode(), TransportMode::Direct);
    assert_eq!(direct.default_retry_count(), 2);
    assert_eq!(direct.default_timeout(), Duration::from_secs(15));
    assert_eq!(direct.default_headers()["cache-control"], "max-age=0");

    let proxied = HttpRunner::proxied(ProxyDialer::new("http://127.0.0.1:3128")).unwrap();
    assert_eq!(proxied.mode(), TransportMode::Proxied);
    assert_eq!(proxied.default_retry_count(), 3);
    assert_eq!(proxied.default_timeout(), Duration::from_secs(30));
  }

  #[test]
  fn invalid_default_headers_fail_the_build() {
    let result = HttpRunner::builder(DirectDialer::new())
      .with_default_headers(HashMap::from([("bad header".to_string(), "x".to_string())]))
      .build();

    assert!(matches!(result, Err(ErrorType::InvalidHeader(_))));
  }

  #[test]
  fn unset_options_use_runner_defaults() {
    let runner = runner();

    let call = runner.call_options(&HtmlRequestOptions::new("https://example.com")).unwrap();
    assert_eq!(call, CallOptions {
      retry_count: 2,
      timeout: Duration::from_secs(15),
      follow_redirects: true,
    });
  }

  #[test]
  fn request_options_override_defaults() {
    let runner = runner();
    let mut options = JsonRequestOptions::new("https://example.com");
    options
      .set_retry_option(0)
      .set_timeout_option(Duration::from_millis(250))
      .set_follow_redirect_option(true);

    let call = runner.call_options(&options).unwrap();
    assert_eq!(call, CallOptions {
      retry_count: 0,
      timeout: Duration::from_millis(250),
      follow_redirects: true,
    });
  }

  #[test]
  fn redirect_default_depends_on_kind() {
    let runner = runner();

    assert!(!runner.call_options(&JsonRequestOptions::new("https://example.com")).unwrap().follow_redirects);
    assert!(!runner.call_options(&FormRequestOptions::new("https://example.com")).unwrap().follow_redirects);
    assert!(runner.call_options(&HtmlRequestOptions::new("https://example.com")).unwrap().follow_redirects);
    assert!(runner.call_options(&FileRequestOptions::new("https://example.com", "out.bin")).unwrap().follow_redirects);

    let mut html = HtmlRequestOptions::new("https://example.com");
    html.set_follow_redirect_option(false);
    assert!(!runner.call_options(&html).unwrap().follow_redirects);
  }

  #[test]
  fn negative_retry_is_clamped_and_zero_timeout_rejected() {
    let runner = runner();
    let mut options = JsonRequestOptions::new("https://example.com");
    options.set_retry_option(-3);
    assert_eq!(runner.call_options(&options).unwrap().retry_count, 0);

    options.set_timeout_option(Duration::ZERO);
    assert!(matches!(runner.call_options(&options), Err(ErrorType::InvalidTimeout)));
  }

  #[test]
  fn concurrent_resolution_does_not_leak_between_requests() {
    let runner = runner();

    let handles: Vec<_> = (0..16)
      .map(|i| {
        let runner = runner.clone();
        std::thread::spawn(move || {
          let mut options = JsonRequestOptions::new("https://example.com");
          if i % 2 == 0 {
            options.set_retry_option(i).set_timeout_option(Duration::from_millis(100 + i as u64));
          }
          (i, runner.call_options(&options).unwrap())
        })
      })
      .collect();

    for handle in handles {
      let (i, call) = handle.join().unwrap();
      if i % 2 == 0 {
        assert_eq!(call.retry_count, i as u32);
        assert_eq!(call.timeout, Duration::from_millis(100 + i as u64));
      } else {
        assert_eq!(call.retry_count, 2);
        assert_eq!(call.timeout, Duration::from_secs(15));
      }
    }

    assert_eq!(runner.default_retry_count(), 2);
    assert_eq!(runner.default_timeout(), Duration::from_secs(15));
  }

  #[test]
  fn urls_are_validated() {
    assert!(matches!(HttpRunner::parse_url("not a url"), Err(ErrorType::UrlParsingError { .. })));
    assert!(matches!(HttpRunner::parse_url("ftp://example.com/file"), Err(ErrorType::UrlProtocolError(p)) if p == "ftp"));
    assert!(matches!(HttpRunner::parse_url("mailto:someone@example.com"), Err(ErrorType::UrlMissingHostnameError(_))));
    assert!(HttpRunner::parse_url("https://example.com/x").is_ok());
  }

  #[tokio::test]
  async fn malformed_url_fails_before_any_io() {
    let runner = runner();

    let result = runner.get_json(&JsonRequestOptions::new("https//missing-colon"), &[]).await;
    assert!(matches!(result, Err(ErrorType::UrlParsingError { .. })));
  }

  #[test]
  fn retry_delays_grow_and_cap() {
    let delays: Vec<_> = retry_strategy().take(7).collect();

    assert_eq!(delays[0], Duration::from_millis(100));
    assert_eq!(delays[1], Duration::from_millis(200));
    assert_eq!(delays[4], Duration::from_millis(1600));
    assert_eq!(delays[6], Duration::from_secs(2));
  }
}

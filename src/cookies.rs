//! Selecting the cookies of an external jar that apply to a request.
//!
//! Matching follows the usual domain-matching rules: a cookie applies when the request host equals
//! its domain attribute, or when the host is a subdomain of it on a full label boundary.
//! Cookie domains that are bare public suffixes (`com`, `co.uk`) never match by suffix, so a
//! misconfigured jar can't leak cookies across registrable domains.

use std::{collections::HashMap, time::SystemTime};
use log::trace;
use reqwest::header::HeaderValue;
use tldextract::{TldExtractor, TldOption};
use url::{Host, Url};

use crate::ErrorType;

/// A cookie supplied by the caller for a single request.
///
/// Only `domain`, `name` and `path` are interpreted (for matching and de-duplication), the other
/// attributes are carried as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
  pub name: String,
  pub value: String,
  pub domain: String,
  pub path: String,
  pub expires: Option<SystemTime>,
  pub secure: bool,
  pub http_only: bool,
}

impl Cookie {
  pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
    Cookie {
      name: name.into(),
      value: value.into(),
      domain: domain.into(),
      path: String::from("/"),
      expires: None,
      secure: false,
      http_only: false,
    }
  }

  pub fn with_path(mut self, path: impl Into<String>) -> Self {
    self.path = path.into();
    self
  }
}

/// Computes the registrable domain ("effective TLD + 1") of a host name.
pub trait SuffixList: Send + Sync {
  /// Returns `None` when the host is itself a public suffix or can't be resolved.
  fn registrable_domain(&self, host: &str) -> Option<String>;
}

impl SuffixList for TldExtractor {
  fn registrable_domain(&self, host: &str) -> Option<String> {
    let result = self.extract(&format!("http://{host}/")).ok()?;

    match (result.domain, result.suffix) {
      (Some(domain), Some(suffix)) => Some(format!("{domain}.{suffix}")),
      _ => None,
    }
  }
}

/// Suffixes from the private section of the public suffix list that the bundled tldextract
/// snapshot lacks. Each one is a registry where unrelated parties own the subdomains.
static PRIVATE_SUFFIXES: &[&str] = &[
  "appspot.com",
  "azurewebsites.net",
  "bitbucket.io",
  "blogspot.com",
  "cloudfront.net",
  "duckdns.org",
  "dyndns.org",
  "firebaseapp.com",
  "fly.dev",
  "github.io",
  "gitlab.io",
  "glitch.me",
  "herokuapp.com",
  "netlify.app",
  "ngrok.io",
  "onrender.com",
  "pages.dev",
  "pythonanywhere.com",
  "readthedocs.io",
  "s3.amazonaws.com",
  "surge.sh",
  "vercel.app",
  "web.app",
  "workers.dev",
];

/// The default [`SuffixList`]: tldextract with private domains enabled, plus the common
/// private-section suffixes its bundled snapshot doesn't carry.
#[derive(Debug)]
pub struct PublicSuffixes {
  extractor: TldExtractor,
}

impl PublicSuffixes {
  pub fn new() -> Self {
    Self::from_extractor(TldExtractor::new(TldOption::default().private_domains(true)))
  }

  pub fn from_extractor(extractor: TldExtractor) -> Self {
    PublicSuffixes { extractor }
  }

  fn private_suffix_of(host: &str) -> Option<&'static str> {
    PRIVATE_SUFFIXES
      .iter()
      .copied()
      .filter(|&suffix| host == suffix || host.strip_suffix(suffix).is_some_and(|rest| rest.ends_with('.')))
      .max_by_key(|suffix| suffix.len())
  }
}

impl Default for PublicSuffixes {
  fn default() -> Self {
    Self::new()
  }
}

impl SuffixList for PublicSuffixes {
  fn registrable_domain(&self, host: &str) -> Option<String> {
    let Some(suffix) = Self::private_suffix_of(host) else {
      return self.extractor.registrable_domain(host);
    };

    let rest = host.strip_suffix(suffix)?.strip_suffix('.')?;
    let label = rest.rsplit('.').next()?;
    Some(format!("{label}.{suffix}"))
  }
}

/// Returns the cookies of `cookies` that should be sent to `url`.
///
/// Exactly one cookie survives per `(domain, name, path)`: the last one seen, kept at the position
/// of the first. Cookies with a malformed domain, or a name or value that can't be sent in a
/// `Cookie` header, are skipped. Fails only when `url` can't be parsed.
pub fn scope_cookies(url: &str, cookies: &[Cookie], suffixes: &dyn SuffixList) -> Result<Vec<Cookie>, ErrorType> {
  if cookies.is_empty() {
    return Ok(Vec::new());
  }

  let parsed = Url::parse(url).map_err(|source| ErrorType::CookieScopeError {
    url: url.to_string(),
    source,
  })?;
  let Some(host) = parsed.host() else {
    return Ok(Vec::new());
  };
  let host_name = host.to_string().to_ascii_lowercase();
  let is_domain_name = matches!(host, Host::Domain(_));

  let mut scoped: Vec<Cookie> = Vec::new();
  let mut positions: HashMap<(String, &str, &str), usize> = HashMap::new();

  for cookie in cookies {
    if !is_sendable(cookie) {
      trace!("skipping cookie {:?} with a name or value that can't be sent", cookie.name);
      continue;
    }

    let Some(domain) = normalize_domain(&cookie.domain) else {
      trace!("skipping cookie {} with malformed domain {:?}", cookie.name, cookie.domain);
      continue;
    };

    if !domain_matches(&host_name, is_domain_name, &domain, suffixes) {
      continue;
    }

    match positions.get(&(domain.clone(), cookie.name.as_str(), cookie.path.as_str())) {
      Some(&index) => scoped[index] = cookie.clone(),
      None => {
        positions.insert((domain, cookie.name.as_str(), cookie.path.as_str()), scoped.len());
        scoped.push(cookie.clone());
      }
    }
  }

  Ok(scoped)
}

/// Renders cookies as a `Cookie` header value, `None` for an empty list.
pub fn cookie_header(cookies: &[Cookie]) -> Option<String> {
  if cookies.is_empty() {
    return None;
  }

  Some(
    cookies
      .iter()
      .map(|cookie| format!("{}={}", cookie.name, cookie.value))
      .collect::<Vec<_>>()
      .join("; "),
  )
}

fn is_sendable(cookie: &Cookie) -> bool {
  !cookie.name.is_empty()
    && !cookie.name.contains(|c| c == '=' || c == ';')
    && !cookie.value.contains(';')
    && HeaderValue::from_str(&cookie.name).is_ok()
    && HeaderValue::from_str(&cookie.value).is_ok()
}

fn normalize_domain(domain: &str) -> Option<String> {
  let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
  if domain.is_empty() {
    return None;
  }

  Host::parse(&domain).ok().map(|host| host.to_string())
}

fn domain_matches(host: &str, is_domain_name: bool, domain: &str, suffixes: &dyn SuffixList) -> bool {
  if host == domain {
    return true;
  }

  if !is_domain_name || !host.ends_with(domain) {
    return false;
  }

  let boundary = host.len() - domain.len();
  if boundary == 0 || host.as_bytes()[boundary - 1] != b'.' {
    return false;
  }

  match suffixes.registrable_domain(domain) {
    Some(_) => true,
    None => {
      trace!("cookie domain {domain} has no registrable domain");
      false
    }
  }
}

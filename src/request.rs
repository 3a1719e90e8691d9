use std::{collections::HashMap, path::{Path, PathBuf}, time::Duration};
use reqwest::{multipart::{Form, Part}, RequestBuilder};

use crate::ErrorType;

/// A struct that holds the options of a single request.
///
/// Unlike the [`HttpRunnerBuilder`](crate::runner::HttpRunnerBuilder) settings, these options are specific to one call.
/// Every tunable is an `Option`: `None` means "not configured, use the runner's default" and is distinct
/// from an explicitly set zero value (e.g. an empty header map).
///
/// The payload type `P` decides which body the request can carry, see [`JsonBody`], [`HtmlBody`],
/// [`FormBody`] and [`FileDestination`].
#[derive(Debug, Clone)]
pub struct RequestOptions<P> {
  url: String,
  headers: Option<HashMap<String, String>>,
  retry: Option<i32>,
  timeout: Option<Duration>,
  follow_redirect: Option<bool>,
  payload: P,
}

pub type JsonRequestOptions = RequestOptions<JsonBody>;
pub type HtmlRequestOptions = RequestOptions<HtmlBody>;
pub type FormRequestOptions = RequestOptions<FormBody>;
pub type FileRequestOptions = RequestOptions<FileDestination>;

impl<P: Payload> RequestOptions<P> {
  fn with_payload(url: impl Into<String>, payload: P) -> Self {
    RequestOptions {
      url: url.into(),
      headers: None,
      retry: None,
      timeout: None,
      follow_redirect: None,
      payload,
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Request-scoped headers. They are added on top of the runner's default headers and replace
  /// defaults with the same (case-insensitive) name.
  pub fn set_headers(&mut self, headers: HashMap<String, String>) -> &mut Self {
    self.headers = Some(headers);
    self
  }

  pub fn headers(&self) -> Option<&HashMap<String, String>> {
    self.headers.as_ref()
  }

  /// Number of extra attempts after a transport failure. Negative values are accepted here
  /// and treated as zero when the request is sent.
  pub fn set_retry_option(&mut self, retry: i32) -> &mut Self {
    self.retry = Some(retry);
    self
  }

  pub fn retry_option(&self) -> Option<i32> {
    self.retry
  }

  /// Overrides the runner's default timeout for this request only.
  pub fn set_timeout_option(&mut self, timeout: Duration) -> &mut Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn timeout_option(&self) -> Option<Duration> {
    self.timeout
  }

  /// Whether redirects are followed for this request.
  ///
  /// When left unset the default depends on the request kind: JSON and form requests stop at the
  /// first redirect and return the `3xx` response, HTML and file requests follow redirects.
  pub fn set_follow_redirect_option(&mut self, follow: bool) -> &mut Self {
    self.follow_redirect = Some(follow);
    self
  }

  pub fn follow_redirect_option(&self) -> Option<bool> {
    self.follow_redirect
  }

  pub fn payload(&self) -> &P {
    &self.payload
  }
}

impl RequestOptions<JsonBody> {
  pub fn new(url: impl Into<String>) -> Self {
    Self::with_payload(url, JsonBody::default())
  }

  /// Raw request body, sent as-is by `POST` and `PUT` requests.
  pub fn set_value(&mut self, value: impl Into<Vec<u8>>) -> &mut Self {
    self.payload.value = Some(value.into());
    self
  }

  pub fn value(&self) -> Option<&[u8]> {
    self.payload.value.as_deref()
  }
}

impl RequestOptions<HtmlBody> {
  pub fn new(url: impl Into<String>) -> Self {
    Self::with_payload(url, HtmlBody::default())
  }

  /// Kept with the options for the caller's use. HTML requests are `GET`s and never send it.
  pub fn set_value(&mut self, value: impl Into<Vec<u8>>) -> &mut Self {
    self.payload.value = Some(value.into());
    self
  }

  pub fn value(&self) -> Option<&[u8]> {
    self.payload.value.as_deref()
  }
}

impl RequestOptions<FormBody> {
  pub fn new(url: impl Into<String>) -> Self {
    Self::with_payload(url, FormBody::default())
  }

  /// Form fields. Sent `application/x-www-form-urlencoded`, or as text parts when files are attached.
  pub fn set_values(&mut self, values: HashMap<String, String>) -> &mut Self {
    self.payload.values = Some(values);
    self
  }

  pub fn values(&self) -> Option<&HashMap<String, String>> {
    self.payload.values.as_ref()
  }

  /// File attachments keyed by form field name. A non-empty map switches the body to `multipart/form-data`.
  pub fn set_files(&mut self, files: HashMap<String, FileAttachment>) -> &mut Self {
    self.payload.files = Some(files);
    self
  }

  pub fn files(&self) -> Option<&HashMap<String, FileAttachment>> {
    self.payload.files.as_ref()
  }
}

impl RequestOptions<FileDestination> {
  /// `file_path` is where the response body is streamed to. An existing file is truncated.
  pub fn new(url: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
    Self::with_payload(url, FileDestination { file_path: file_path.into() })
  }

  pub fn file_path(&self) -> &Path {
    &self.payload.file_path
  }
}

mod private {
  pub trait Sealed {}
}

/// Kind-specific part of a [`RequestOptions`].
///
/// This trait is sealed, the four payload kinds of this crate are the only implementors.
pub trait Payload: private::Sealed {
  /// Redirect behavior used when `follow_redirect_option` is unset.
  const FOLLOWS_REDIRECTS_BY_DEFAULT: bool;

  /// Content type added when neither the default nor the request headers set one.
  fn content_type(&self) -> Option<&'static str>;

  /// `true` when the body encoder writes its own `content-type` (multipart boundaries).
  fn encodes_content_type(&self) -> bool {
    false
  }

  /// Attaches the body to an outgoing request. Only called for `POST` and `PUT`.
  fn attach(&self, request: RequestBuilder) -> Result<RequestBuilder, ErrorType>;
}

#[derive(Debug, Clone, Default)]
pub struct JsonBody {
  value: Option<Vec<u8>>,
}

impl private::Sealed for JsonBody {}

impl Payload for JsonBody {
  const FOLLOWS_REDIRECTS_BY_DEFAULT: bool = false;

  fn content_type(&self) -> Option<&'static str> {
    Some("application/json")
  }

  fn attach(&self, request: RequestBuilder) -> Result<RequestBuilder, ErrorType> {
    Ok(match &self.value {
      Some(value) => request.body(value.clone()),
      None => request,
    })
  }
}

#[derive(Debug, Clone, Default)]
pub struct HtmlBody {
  value: Option<Vec<u8>>,
}

impl private::Sealed for HtmlBody {}

impl Payload for HtmlBody {
  const FOLLOWS_REDIRECTS_BY_DEFAULT: bool = true;

  fn content_type(&self) -> Option<&'static str> {
    None
  }

  fn attach(&self, request: RequestBuilder) -> Result<RequestBuilder, ErrorType> {
    Ok(request)
  }
}

#[derive(Debug, Clone, Default)]
pub struct FormBody {
  values: Option<HashMap<String, String>>,
  files: Option<HashMap<String, FileAttachment>>,
}

impl FormBody {
  fn is_multipart(&self) -> bool {
    self.files.as_ref().is_some_and(|files| !files.is_empty())
  }
}

impl private::Sealed for FormBody {}

impl Payload for FormBody {
  const FOLLOWS_REDIRECTS_BY_DEFAULT: bool = false;

  fn content_type(&self) -> Option<&'static str> {
    if self.is_multipart() {
      None
    } else {
      Some("application/x-www-form-urlencoded")
    }
  }

  fn encodes_content_type(&self) -> bool {
    self.is_multipart()
  }

  fn attach(&self, request: RequestBuilder) -> Result<RequestBuilder, ErrorType> {
    if let (true, Some(files)) = (self.is_multipart(), &self.files) {
      let mut form = Form::new();

      for (name, value) in self.values.iter().flatten() {
        form = form.text(name.clone(), value.clone());
      }
      for (field, attachment) in files {
        form = form.part(field.clone(), attachment.to_part()?);
      }

      return Ok(request.multipart(form));
    }

    Ok(match &self.values {
      Some(values) => request.form(values),
      None => request,
    })
  }
}

#[derive(Debug, Clone)]
pub struct FileDestination {
  file_path: PathBuf,
}

impl private::Sealed for FileDestination {}

impl Payload for FileDestination {
  const FOLLOWS_REDIRECTS_BY_DEFAULT: bool = true;

  fn content_type(&self) -> Option<&'static str> {
    None
  }

  fn attach(&self, request: RequestBuilder) -> Result<RequestBuilder, ErrorType> {
    Ok(request)
  }
}

/// A file uploaded as one part of a `multipart/form-data` body.
///
/// The content is held in memory so the part can be rebuilt when a request is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
  file_name: String,
  content: Vec<u8>,
  mime: Option<String>,
}

impl FileAttachment {
  pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    FileAttachment {
      file_name: file_name.into(),
      content: content.into(),
      mime: None,
    }
  }

  /// Reads the file at `path`. The part's file name is the last component of the path.
  pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ErrorType> {
    let path = path.as_ref();
    let content = tokio::fs::read(path).await?;
    let file_name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();

    Ok(FileAttachment::new(file_name, content))
  }

  pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
    self.mime = Some(mime.into());
    self
  }

  pub fn file_name(&self) -> &str {
    &self.file_name
  }

  pub fn content(&self) -> &[u8] {
    &self.content
  }

  fn to_part(&self) -> Result<Part, ErrorType> {
    let part = Part::bytes(self.content.clone()).file_name(self.file_name.clone());

    match &self.mime {
      Some(mime) => part
        .mime_str(mime)
        .map_err(|_| ErrorType::InvalidHeader(format!("content-type: {mime}"))),
      None => Ok(part),
    }
  }
}

use std::{collections::HashMap, str::FromStr};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};

use crate::ErrorType;

mod statics;

/// The built-in default header table as owned pairs.
pub fn default_headers() -> HashMap<String, String> {
    statics::DEFAULT_HEADERS
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Parses a header table once, at runner construction.
pub(crate) fn to_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ErrorType> {
    let mut map = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers {
        let (name, value) = parse_header(name, value)?;
        map.insert(name, value);
    }

    Ok(map)
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ErrorType> {
    let header_name = HeaderName::from_str(name)
        .map_err(|_| ErrorType::InvalidHeader(name.to_string()))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| ErrorType::InvalidHeader(name.to_string()))?;

    Ok((header_name, header_value))
}

/// The header set of one call.
///
/// Precedence, lowest first: the runner's defaults, the request headers, the content type
/// required by the request kind. The content type is only added when none of the former set one.
/// Inputs are borrowed and never modified.
pub struct HttpHeaders<'a> {
    context: HttpHeadersBuilder<'a>,
}

impl<'a> HttpHeaders<'a> {
    pub fn new(options: &HttpHeadersBuilder<'a>) -> HttpHeaders<'a> {
        HttpHeaders {
            context: options.clone(),
        }
    }

    pub fn get_builder() -> HttpHeadersBuilder<'a> {
        HttpHeadersBuilder::default()
    }
}

impl<'a> TryFrom<HttpHeaders<'a>> for HeaderMap {
    type Error = ErrorType;

    fn try_from(headers: HttpHeaders<'a>) -> Result<HeaderMap, ErrorType> {
        let context = headers.context;
        let mut merged = context.defaults.cloned().unwrap_or_default();

        // HeaderName is lowercase, so `insert` replaces defaults regardless of the caller's casing.
        for (name, value) in context.custom_headers.into_iter().flatten() {
            let (name, value) = parse_header(name, value)?;
            merged.insert(name, value);
        }

        if context.drop_content_type {
            merged.remove(CONTENT_TYPE);
        } else if let Some(content_type) = context.content_type {
            if !merged.contains_key(CONTENT_TYPE) {
                merged.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        if let Some(cookie) = context.cookie {
            let value = match merged.get(COOKIE) {
                Some(existing) if !existing.is_empty() => [existing.as_bytes(), &b"; "[..], cookie.as_bytes()].concat(),
                _ => cookie.into_bytes(),
            };
            let value = HeaderValue::from_bytes(&value)
                .map_err(|_| ErrorType::InvalidHeader(COOKIE.to_string()))?;
            merged.insert(COOKIE, value);
        }

        Ok(merged)
    }
}

#[derive(Default, Clone)]
pub struct HttpHeadersBuilder<'a> {
    defaults: Option<&'a HeaderMap>,
    custom_headers: Option<&'a HashMap<String, String>>,
    content_type: Option<&'static str>,
    drop_content_type: bool,
    cookie: Option<String>,
}

impl<'a> HttpHeadersBuilder<'a> {
    pub fn with_defaults (&mut self, defaults: &'a HeaderMap) -> &mut Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn with_custom_headers (&mut self, custom_headers: Option<&'a HashMap<String, String>>) -> &mut Self {
        self.custom_headers = custom_headers;
        self
    }

    pub fn with_content_type (&mut self, content_type: Option<&'static str>) -> &mut Self {
        self.content_type = content_type;
        self
    }

    /// Removes any `content-type`, for bodies whose encoder sets its own (multipart boundaries).
    pub fn without_content_type (&mut self, drop: bool) -> &mut Self {
        self.drop_content_type = drop;
        self
    }

    /// A rendered `Cookie` value, appended to a cookie header the caller may have set.
    pub fn with_cookie (&mut self, cookie: Option<String>) -> &mut Self {
        self.cookie = cookie;
        self
    }

    pub fn build(&self) -> HttpHeaders<'a> {
        HttpHeaders::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn merge(
        defaults: &HeaderMap,
        custom: Option<&HashMap<String, String>>,
        content_type: Option<&'static str>,
    ) -> HeaderMap {
        HeaderMap::try_from(
            HttpHeaders::get_builder()
                .with_defaults(defaults)
                .with_custom_headers(custom)
                .with_content_type(content_type)
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn request_headers_win_over_defaults() {
        let defaults = to_header_map(&headers(&[("A", "1")])).unwrap();
        let custom = headers(&[("A", "2"), ("B", "3")]);

        let merged = merge(&defaults, Some(&custom), Some("application/json"));

        assert_eq!(merged.len(), 3);
        assert_eq!(merged["a"], "2");
        assert_eq!(merged["b"], "3");
        assert_eq!(merged[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn header_names_compare_case_insensitively() {
        let defaults = to_header_map(&headers(&[("Accept-Language", "en-US")])).unwrap();
        let custom = headers(&[("accept-language", "cs-CZ")]);

        let merged = merge(&defaults, Some(&custom), None);

        assert_eq!(merged.get_all("accept-language").iter().count(), 1);
        assert_eq!(merged["accept-language"], "cs-CZ");
    }

    #[test]
    fn required_content_type_never_overwrites() {
        let defaults = HeaderMap::new();
        let custom = headers(&[("Content-Type", "application/vnd.api+json")]);

        let merged = merge(&defaults, Some(&custom), Some("application/json"));
        assert_eq!(merged[CONTENT_TYPE], "application/vnd.api+json");

        let defaults = to_header_map(&headers(&[("content-type", "text/plain")])).unwrap();
        let merged = merge(&defaults, None, Some("application/json"));
        assert_eq!(merged[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn absent_and_empty_request_headers_keep_defaults() {
        let defaults = to_header_map(&headers(&[("cache-control", "max-age=0")])).unwrap();
        let empty = HashMap::new();

        assert_eq!(merge(&defaults, None, None), defaults);
        assert_eq!(merge(&defaults, Some(&empty), None), defaults);
    }

    #[test]
    fn inputs_are_not_modified() {
        let defaults = to_header_map(&headers(&[("A", "1")])).unwrap();
        let custom = headers(&[("A", "2")]);

        let _ = merge(&defaults, Some(&custom), Some("application/json"));

        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults["a"], "1");
        assert_eq!(custom, headers(&[("A", "2")]));
    }

    #[test]
    fn multipart_drops_content_type() {
        let defaults = HeaderMap::new();
        let custom = headers(&[("content-type", "application/x-www-form-urlencoded")]);

        let merged = HeaderMap::try_from(
            HttpHeaders::get_builder()
                .with_defaults(&defaults)
                .with_custom_headers(Some(&custom))
                .without_content_type(true)
                .build(),
        )
        .unwrap();

        assert!(!merged.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn cookies_are_appended_to_existing_header() {
        let defaults = HeaderMap::new();
        let custom = headers(&[("Cookie", "theme=dark")]);

        let merged = HeaderMap::try_from(
            HttpHeaders::get_builder()
                .with_defaults(&defaults)
                .with_custom_headers(Some(&custom))
                .with_cookie(Some("session=abc".to_string()))
                .build(),
        )
        .unwrap();

        assert_eq!(merged[COOKIE], "theme=dark; session=abc");
    }

    #[test]
    fn invalid_header_is_an_error() {
        let defaults = HeaderMap::new();
        let custom = headers(&[("bad header", "x")]);

        let result = HeaderMap::try_from(
            HttpHeaders::get_builder()
                .with_defaults(&defaults)
                .with_custom_headers(Some(&custom))
                .build(),
        );

        assert!(matches!(result, Err(ErrorType::InvalidHeader(name)) if name == "bad header"));
    }

    #[test]
    fn default_table_is_valid() {
        let map = to_header_map(&default_headers()).unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map["cache-control"], "max-age=0");
    }
}

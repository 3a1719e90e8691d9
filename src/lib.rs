//! # courier | per-request options over a shared HTTP client
//!
//! Courier is a `rust` library for sending JSON, HTML, form and file-download requests through a
//! shared, connection-pooling client. It is built on top of `reqwest` and `tokio`.
//!
//! Every request carries its own options (headers, retry count, timeout, redirect policy). Options that
//! are not set fall back to the runner's defaults, and options that are set only apply to that request,
//! so one runner can be used from many tasks at once. Cookies from an external jar are attached to the
//! requests whose host they belong to.
//!
//! ```rust,no_run
//! use courier::{dialer::DirectDialer, request::JsonRequestOptions, runner::HttpRunner};
//!
//! #[tokio::main]
//! async fn main() {
//!    let runner = HttpRunner::direct(DirectDialer::new()).unwrap();
//!
//!    let mut options = JsonRequestOptions::new("https://example.com/api/items");
//!    options.set_value(r#"{"name":"item"}"#).set_retry_option(1);
//!
//!    let response = runner.post_json(&options, &[]).await.unwrap();
//!
//!    println!("{}", response.text().await.unwrap());
//! }
//! ```
//!
//! ### Redirects
//!
//! JSON and form requests do **not** follow redirects unless `follow_redirect_option` is set to `true`,
//! the `3xx` response is returned to the caller. HTML and file requests follow redirects unless the option
//! is set to `false`.
//!
//! ### Errors
//!
//! A `4xx` or `5xx` response is a regular response. [`ErrorType`] covers invalid input (URLs, headers,
//! options), failed cookie scoping, transport failures and file I/O.

#![cfg_attr(not(test), deny(unused_crate_dependencies))]
mod http_headers;
mod error;

/// Main module that contains the `HttpRunner` struct and its methods.
pub mod runner;

/// Customizing request options.
pub mod request;

/// Matching jar cookies to requests.
pub mod cookies;

/// Direct and proxied connection setup.
pub mod dialer;

pub use error::ErrorType;
pub use http_headers::default_headers;

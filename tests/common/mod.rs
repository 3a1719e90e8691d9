#![allow(dead_code)]

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use axum::{
  body::Bytes,
  extract::Path,
  http::{header::LOCATION, HeaderMap, Method, StatusCode, Uri},
  routing::{any, get},
  Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub const FILE_SIZE: usize = 64 * 1024;

/// What the echo endpoint saw.
#[derive(Debug, Deserialize)]
pub struct Echo {
  pub method: String,
  pub uri: String,
  pub headers: HashMap<String, String>,
  pub body: String,
}

pub fn init_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

pub fn file_content() -> Vec<u8> {
  (0..FILE_SIZE).map(|i| (i % 251) as u8).collect()
}

fn app() -> Router {
  Router::new()
    .route("/echo", any(echo))
    .route("/redirect", any(|| async { (StatusCode::FOUND, [(LOCATION, "/echo")]) }))
    .route("/slow", get(|| async {
      tokio::time::sleep(Duration::from_millis(300)).await;
      "done"
    }))
    .route("/file", get(|| async { file_content() }))
    .route("/status/{code}", any(|Path(code): Path<u16>| async move {
      StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }))
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
  let headers: serde_json::Map<String, Value> = headers
    .iter()
    .map(|(name, value)| (name.to_string(), json!(value.to_str().unwrap_or_default())))
    .collect();

  Json(json!({
    "method": method.as_str(),
    "uri": uri.to_string(),
    "headers": headers,
    "body": String::from_utf8_lossy(&body),
  }))
}

/// Starts the test server on a random local port.
pub async fn spawn_server() -> SocketAddr {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();

  tokio::spawn(async move {
    axum::serve(listener, app()).await.unwrap();
  });

  addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  listener.local_addr().unwrap()
}

pub async fn read_echo(response: reqwest::Response) -> Echo {
  assert_eq!(response.status(), reqwest::StatusCode::OK);
  serde_json::from_slice(&response.bytes().await.unwrap()).unwrap()
}

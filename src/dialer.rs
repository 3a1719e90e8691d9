use std::{fmt::Debug, net::{IpAddr, SocketAddr}, time::Duration};
use reqwest::{ClientBuilder, Proxy};

use crate::ErrorType;

/// How a runner reaches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
  Direct,
  Proxied,
}

/// Decides how connections of a runner's connection pool are established.
///
/// A dialer is applied once, when the runner's transports are built. Every pooled connection is
/// then opened according to it.
pub trait Dialer: Debug + Send + Sync {
  fn mode(&self) -> TransportMode;

  /// Applies the dialer's routing to a transport under construction.
  fn configure(&self, builder: ClientBuilder) -> Result<ClientBuilder, ErrorType>;
}

/// Connects straight to the target host.
///
/// System proxy settings (`HTTP_PROXY` and friends) are ignored.
#[derive(Debug, Clone, Default)]
pub struct DirectDialer {
  connect_timeout: Option<Duration>,
  local_address: Option<IpAddr>,
  overrides: Vec<(String, SocketAddr)>,
}

impl DirectDialer {
  pub fn new() -> Self {
    DirectDialer::default()
  }

  /// Limits the time spent establishing a connection (DNS, TCP and TLS handshakes).
  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = Some(timeout);
    self
  }

  /// Binds outgoing connections to a local address.
  pub fn with_local_address(mut self, address: IpAddr) -> Self {
    self.local_address = Some(address);
    self
  }

  /// Connects to `address` whenever `host` is requested, bypassing DNS.
  pub fn with_resolve(mut self, host: impl Into<String>, address: SocketAddr) -> Self {
    self.overrides.push((host.into(), address));
    self
  }
}

impl Dialer for DirectDialer {
  fn mode(&self) -> TransportMode {
    TransportMode::Direct
  }

  fn configure(&self, builder: ClientBuilder) -> Result<ClientBuilder, ErrorType> {
    let mut builder = builder.no_proxy().local_address(self.local_address);

    if let Some(timeout) = self.connect_timeout {
      builder = builder.connect_timeout(timeout);
    }

    for (host, address) in &self.overrides {
      builder = builder.resolve(host, *address);
    }

    Ok(builder)
  }
}

/// Routes every connection through a single proxy (`http://`, `https://` or `socks5://`).
#[derive(Debug, Clone)]
pub struct ProxyDialer {
  proxy_url: String,
  connect_timeout: Option<Duration>,
  credentials: Option<(String, String)>,
}

impl ProxyDialer {
  pub fn new(proxy_url: impl Into<String>) -> Self {
    ProxyDialer {
      proxy_url: proxy_url.into(),
      connect_timeout: None,
      credentials: None,
    }
  }

  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = Some(timeout);
    self
  }

  /// Sends `Proxy-Authorization` basic credentials to the proxy.
  pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
    self.credentials = Some((username.into(), password.into()));
    self
  }

  pub fn proxy_url(&self) -> &str {
    &self.proxy_url
  }
}

impl Dialer for ProxyDialer {
  fn mode(&self) -> TransportMode {
    TransportMode::Proxied
  }

  fn configure(&self, builder: ClientBuilder) -> Result<ClientBuilder, ErrorType> {
    let mut proxy = Proxy::all(self.proxy_url.as_str()).map_err(ErrorType::ClientBuildError)?;

    if let Some((username, password)) = &self.credentials {
      proxy = proxy.basic_auth(username, password);
    }

    let mut builder = builder.proxy(proxy);

    if let Some(timeout) = self.connect_timeout {
      builder = builder.connect_timeout(timeout);
    }

    Ok(builder)
  }
}

//! Session login and token caching.
//!
//! Before the realtime stream opens, the client logs in with the device id
//! and subscription token. The backend answers with a session cookie that
//! rides along on the stream handshake.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::SET_COOKIE;
use tokio::time::Instant;

use super::DeviceConfig;
use crate::error::{LockstreamError, Result};
use crate::transport::BoxFuture;

/// Device identity used to log in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub device_id: String,
    pub token: String,
}

impl Credentials {
    pub fn new(device_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            token: token.into(),
        }
    }
}

/// Obtains a session for the realtime stream.
///
/// Called before every connect, including reconnects.
pub trait Authenticator: Send + Sync + 'static {
    /// Log in. Returns the cookie to attach to the stream handshake, if the
    /// backend set one.
    fn login<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, Result<Option<String>>>;
}

/// Form POST to `http://host/login` with `did` and `subsc_token`.
pub struct HttpAuthenticator {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpAuthenticator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.login_url(), config.login_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Authenticator for HttpAuthenticator {
    fn login<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .form(&[
                    ("did", credentials.device_id.as_str()),
                    ("subsc_token", credentials.token.as_str()),
                ])
                .timeout(self.timeout)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(LockstreamError::Login(format!(
                    "{} returned {}",
                    self.url, status
                )));
            }

            let cookies: Vec<&str> = response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .filter_map(cookie_pair)
                .collect();
            if cookies.is_empty() {
                tracing::debug!("Login to {} set no cookie", self.url);
                return Ok(None);
            }
            Ok(Some(cookies.join("; ")))
        })
    }
}

/// `name=value` part of a `Set-Cookie` header.
fn cookie_pair(set_cookie: &str) -> Option<&str> {
    let pair = set_cookie.split(';').next()?.trim();
    if pair.is_empty() || !pair.contains('=') {
        return None;
    }
    Some(pair)
}

/// Default lifetime of a cached access token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(2333);

/// Access token cached until it expires.
pub struct TokenCache {
    ttl: Duration,
    slot: Mutex<Option<(String, Instant)>>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// The cached token, if it has not expired.
    pub fn cached(&self) -> Option<String> {
        let slot = self.slot.lock();
        match &*slot {
            Some((token, expires)) if Instant::now() < *expires => Some(token.clone()),
            _ => None,
        }
    }

    /// Cached token, or the result of `fetch` which is then cached.
    ///
    /// A failed fetch leaves the cache empty.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(token) = self.cached() {
            return Ok(token);
        }
        let token = fetch().await?;
        *self.slot.lock() = Some((token.clone(), Instant::now() + self.ttl));
        Ok(token)
    }

    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

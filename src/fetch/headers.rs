use crate::error::{NmbsError, Result};
use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that sets one header on every request.
///
/// The header is validated when the wrapper is built, so a bad token fails at
/// startup instead of on every tick.
pub struct WithHeader<C> {
    inner: C,
    name: HeaderName,
    value: HeaderValue,
}

impl<C> WithHeader<C> {
    pub fn new(inner: C, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| NmbsError::fetch("configuration", format!("invalid header name: {e}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| NmbsError::fetch("configuration", format!("invalid header value: {e}")))?;
        value.set_sensitive(true);
        Ok(Self { inner, name, value })
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(inner: C, token: &str) -> Result<Self> {
        Self::new(inner, AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for WithHeader<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Request, Response};

/// The single seam between this crate and the network.
///
/// Production code uses [`super::BasicClient`], optionally wrapped in
/// [`super::WithHeader`]; tests substitute canned responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}

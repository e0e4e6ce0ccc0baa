use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use reqwest::Url;

/// Fully buffered snapshot of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL the response was served from.
    pub url: Url,
}

impl CachedResponse {
    pub fn new(status: StatusCode, url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            url,
        }
    }

    /// 2xx status.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Split into a caller copy and a storage copy.
    ///
    /// The storage copy owns its own buffer so it never aliases the bytes
    /// handed back to the caller.
    pub fn duplicate(self) -> (CachedResponse, CachedResponse) {
        let stored = CachedResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::copy_from_slice(&self.body),
            url: self.url.clone(),
        };
        (self, stored)
    }
}

//! The object store the pipeline reads ciphertext from.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Error;

/// A pushed sequence of raw body chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, Error>>;

/// A request to fetch (part of) an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetObjectRequest {
    /// The bucket holding the object.
    pub bucket: String,
    /// The object key.
    pub key: String,
    /// An optional range header, `bytes=<start>-<end>`.
    pub range: Option<String>,
}

impl GetObjectRequest {
    /// A request for the whole object.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            range: None,
        }
    }

    /// Add a range header.
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// Response headers of a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetObjectResponse {
    /// Number of body bytes in this response.
    pub content_length: Option<u64>,
    /// The `Content-Range` header, present when a range was served.
    pub content_range: Option<String>,
    /// User metadata stored with the object.
    pub metadata: BTreeMap<String, String>,
}

/// Transport to a remote object store.
///
/// Retry policy, if any, belongs to implementations of this trait.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, or the byte range given in the request.
    ///
    /// Resolves once the response headers are available; the body follows as a stream.
    async fn get_object(
        &self,
        request: &GetObjectRequest,
    ) -> Result<(GetObjectResponse, ByteStream), Error>;
}

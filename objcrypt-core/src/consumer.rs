//! Destinations for decrypted objects.

use async_trait::async_trait;
use futures::io::{AsyncWrite, AsyncWriteExt};
use futures::TryStreamExt;

use crate::error::Error;
use crate::pipeline::PlaintextStream;
use crate::store::GetObjectResponse;

/// Turns a decrypted object into the caller's result type.
///
/// Driven by [`Pipeline::get_object_with`][crate::pipeline::Pipeline::get_object_with]:
/// `prepare` first, `on_response` once the headers are processed, then `on_stream` with the
/// plaintext. Any failure along the way is reported to `on_error` exactly once.
#[async_trait]
pub trait ResponseConsumer: Send {
    /// The result of a successful get.
    type Output: Send;

    /// Called before the fetch is issued.
    fn prepare(&mut self) {}

    /// Called with the response headers, before any plaintext.
    fn on_response(&mut self, _response: &GetObjectResponse) {}

    /// Consume the plaintext.
    async fn on_stream(&mut self, body: PlaintextStream) -> Result<Self::Output, Error>;

    /// Called with the error that failed the get.
    fn on_error(&mut self, _error: &Error) {}
}

#[async_trait]
impl<C: ResponseConsumer> ResponseConsumer for &mut C {
    type Output = C::Output;

    fn prepare(&mut self) {
        (**self).prepare()
    }

    fn on_response(&mut self, response: &GetObjectResponse) {
        (**self).on_response(response)
    }

    async fn on_stream(&mut self, body: PlaintextStream) -> Result<Self::Output, Error> {
        (**self).on_stream(body).await
    }

    fn on_error(&mut self, error: &Error) {
        (**self).on_error(error)
    }
}

/// Collects the plaintext in memory.
#[derive(Debug, Default)]
pub struct ToBytes {
    response: Option<GetObjectResponse>,
}

impl ToBytes {
    /// Create a new [`ToBytes`].
    pub fn new() -> Self {
        Self::default()
    }
}

/// A decrypted object held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBytes {
    /// The response headers of the ciphertext fetch.
    pub response: GetObjectResponse,
    /// The plaintext.
    pub bytes: Vec<u8>,
}

impl ResponseBytes {
    /// The plaintext.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the plaintext.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[async_trait]
impl ResponseConsumer for ToBytes {
    type Output = ResponseBytes;

    fn on_response(&mut self, response: &GetObjectResponse) {
        self.response = Some(response.clone());
    }

    async fn on_stream(&mut self, body: PlaintextStream) -> Result<ResponseBytes, Error> {
        let bytes = body.try_concat().await?;

        Ok(ResponseBytes {
            response: self.response.take().unwrap_or_default(),
            bytes,
        })
    }
}

/// Copies the plaintext into an [`AsyncWrite`], yielding the number of bytes written.
///
/// The writer is flushed but not closed.
#[derive(Debug)]
pub struct ToWriter<W> {
    writer: W,
}

impl<W> ToWriter<W> {
    /// Create a new [`ToWriter`].
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Get back the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> ResponseConsumer for ToWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    type Output = u64;

    async fn on_stream(&mut self, mut body: PlaintextStream) -> Result<u64, Error> {
        let mut written = 0u64;

        while let Some(chunk) = body.try_next().await? {
            self.writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        self.writer.flush().await?;

        Ok(written)
    }
}

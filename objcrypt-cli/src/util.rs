use std::fmt;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use futures::io::{AsyncWrite, AsyncWriteExt};
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};

use objcrypt_core::consumer::ResponseConsumer;
use objcrypt_core::error::Error;
use objcrypt_core::pipeline::PlaintextStream;
use objcrypt_core::store::GetObjectResponse;

pub const DATA_KEY_ENV: &str = "OBJCRYPT_DATA_KEY";

#[derive(Debug)]
pub enum CliError {
    Core(Error),
    DataKey(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    Endpoint(String),
    Http(reqwest::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core(e) => write!(f, "{e}"),
            Self::DataKey(s) => write!(f, "data key: {s}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Json(e) => write!(f, "invalid configuration: {e}"),
            Self::Endpoint(s) => write!(f, "invalid endpoint: {s}"),
            Self::Http(e) => write!(f, "HTTP client: {e}"),
        }
    }
}

impl From<Error> for CliError {
    fn from(e: Error) -> Self {
        Self::Core(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<reqwest::Error> for CliError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

/// Decodes the data key from the command line, or from the environment.
pub(crate) fn data_key(arg: Option<String>) -> Result<Vec<u8>, CliError> {
    let encoded = match arg {
        Some(key) => key,
        None => std::env::var(DATA_KEY_ENV).map_err(|_e| {
            CliError::DataKey(format!("pass --data-key or set ${DATA_KEY_ENV}"))
        })?,
    };

    Base64::decode_vec(encoded.trim())
        .map_err(|e| CliError::DataKey(format!("invalid base64: {e}")))
}

/// Copies the plaintext into a writer, with a progress bar sized by the response's content
/// length.
pub(crate) struct ProgressWriter<W> {
    writer: W,
    bar: ProgressBar,
}

impl<W> ProgressWriter<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            writer,
            bar: ProgressBar::hidden(),
        }
    }
}

#[async_trait]
impl<W> ResponseConsumer for ProgressWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    type Output = u64;

    fn on_response(&mut self, response: &GetObjectResponse) {
        if let Some(len) = response.content_length {
            self.bar = ProgressBar::new(len);
            self.bar.set_style(ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} {binary_bytes_per_sec} ({eta} left)")
                .unwrap_or_else(|_e| ProgressStyle::default_bar())
                .progress_chars("#>-"));
        }
    }

    async fn on_stream(&mut self, mut body: PlaintextStream) -> Result<u64, Error> {
        let mut written = 0u64;

        while let Some(chunk) = body.try_next().await? {
            self.writer.write_all(&chunk).await?;
            self.bar.inc(chunk.len() as u64);
            written += chunk.len() as u64;
        }

        self.writer.flush().await?;
        self.bar.finish();

        Ok(written)
    }

    fn on_error(&mut self, _error: &Error) {
        self.bar.abandon();
    }
}

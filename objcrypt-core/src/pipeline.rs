//! The decryption pipeline.
//!
//! One call to [`Pipeline::get_object`] runs through these states:
//!
//! 1. the request is checked against the configuration and the fetch range is computed,
//! 2. once the response headers arrive, content metadata and decryption materials are resolved,
//! 3. ciphertext chunks are decrypted and trimmed as the caller pulls on the [`PlaintextStream`],
//! 4. the stream ends after the last plaintext chunk, or with exactly one error.

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{FusedStream, Stream, StreamExt};
use log::{debug, warn};

use crate::config::PipelineConfig;
use crate::consumer::ResponseConsumer;
use crate::error::Error;
use crate::materials::{DecryptMaterialsRequest, MaterialsManager};
use crate::metadata::ContentMetadataResolver;
use crate::range::RangePlan;
use crate::store::{ByteStream, GetObjectRequest, GetObjectResponse, ObjectStore};
use crate::transform::CipherTransform;

/// Decrypts objects fetched from an [`ObjectStore`].
///
/// A pipeline holds no per-request state and can serve any number of concurrent requests.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    materials: Arc<dyn MaterialsManager>,
    resolver: ContentMetadataResolver,
    config: PipelineConfig,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a new [`Pipeline`].
    ///
    /// Instruction files, unless disabled, are read from `store` as well.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        materials: Arc<dyn MaterialsManager>,
        config: PipelineConfig,
    ) -> Result<Self, Error> {
        if let Err(e) = config.validate() {
            warn!("{e}");
            return Err(e);
        }

        let instruction_store = (!config.instruction_file.disabled).then(|| store.clone());

        Ok(Self {
            store,
            materials,
            resolver: ContentMetadataResolver::new(instruction_store),
            config,
        })
    }

    /// Read instruction files from a dedicated store.
    ///
    /// Has no effect when instruction files are disabled.
    pub fn with_instruction_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        if !self.config.instruction_file.disabled {
            self.resolver = ContentMetadataResolver::new(Some(store));
        }
        self
    }

    /// The configuration of this pipeline.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch an object and set up its decryption.
    ///
    /// Resolves once the response headers have been processed. All configuration, metadata and
    /// materials failures are reported here, before any plaintext is produced.
    pub async fn get_object(&self, request: GetObjectRequest) -> Result<DecryptedObject, Error> {
        if let Some(range) = &request.range {
            if !self.config.enable_legacy_unauthenticated_modes {
                let e = Error::ConfigurationRejected(format!(
                    "ranged get ({range}) requires legacy unauthenticated modes to be enabled"
                ));
                warn!("{e}");
                return Err(e);
            }
        }

        let plan = RangePlan::new(request.range.as_deref());
        let fetch = GetObjectRequest {
            range: plan.fetch_header(),
            ..request.clone()
        };

        debug!(
            "fetching {}/{} (range: {:?})",
            fetch.bucket, fetch.key, fetch.range
        );

        let (response, body) = self.store.get_object(&fetch).await?;

        debug!(
            "headers received: length {:?}, content range {:?}",
            response.content_length, response.content_range
        );

        if plan.fetch.is_none() {
            if let Some(content_range) = &response.content_range {
                return Err(Error::UnsupportedLayout(format!(
                    "the response carries content range {content_range} but no range was requested; \
                     multipart layouts are not supported"
                )));
            }
        }

        let metadata = self.resolver.resolve(&request, &response).await?;
        let suite = metadata.algorithm_suite;

        if suite.is_legacy() && !self.config.enable_legacy_unauthenticated_modes {
            let e = Error::ConfigurationRejected(format!(
                "object {} is encrypted with the legacy suite {}, which requires legacy unauthenticated modes to be enabled",
                request.key,
                suite.cipher_name()
            ));
            warn!("{e}");
            return Err(e);
        }

        let materials = self
            .materials
            .decrypt_materials(DecryptMaterialsRequest {
                request: request.clone(),
                algorithm_suite: suite,
                encrypted_data_keys: vec![metadata.encrypted_data_key],
                encryption_context: metadata.encryption_context,
                ciphertext_length: response.content_length,
                content_range: request.range.clone(),
            })
            .await?;

        let transform = CipherTransform::new(
            materials,
            &metadata.content_iv,
            metadata.unencrypted_content_length,
            &response,
            &self.config,
        )?;

        Ok(DecryptedObject {
            response,
            body: PlaintextStream::new(body, transform),
        })
    }

    /// Fetch and decrypt an object into `consumer`.
    ///
    /// Every failure is reported to [`ResponseConsumer::on_error`] before it is returned.
    pub async fn get_object_with<C: ResponseConsumer>(
        &self,
        request: GetObjectRequest,
        mut consumer: C,
    ) -> Result<C::Output, Error> {
        consumer.prepare();

        let object = match self.get_object(request).await {
            Ok(object) => object,
            Err(e) => {
                consumer.on_error(&e);
                return Err(e);
            }
        };

        consumer.on_response(&object.response);

        match consumer.on_stream(object.body).await {
            Ok(output) => Ok(output),
            Err(e) => {
                consumer.on_error(&e);
                Err(e)
            }
        }
    }
}

/// A fetched object whose body decrypts as it is read.
#[derive(Debug)]
pub struct DecryptedObject {
    /// The response headers of the ciphertext fetch.
    pub response: GetObjectResponse,
    /// The plaintext.
    pub body: PlaintextStream,
}

enum State {
    Streaming {
        body: ByteStream,
        transform: CipherTransform,
    },
    Failing(Error),
    Terminated,
}

/// The decrypted body of an object.
///
/// Yields plaintext chunks in the order their ciphertext arrived. The stream either ends after
/// the last chunk, or yields a single error and then ends. The upstream body is only polled when
/// no plaintext is pending, and is dropped as soon as the stream terminates or is cancelled.
pub struct PlaintextStream {
    ready: VecDeque<Vec<u8>>,
    state: State,
}

impl fmt::Debug for PlaintextStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Streaming { transform, .. } => format!("Streaming({transform:?})"),
            State::Failing(e) => format!("Failing({e})"),
            State::Terminated => "Terminated".to_string(),
        };

        f.debug_struct("PlaintextStream")
            .field("ready", &self.ready.len())
            .field("state", &state)
            .finish()
    }
}

impl PlaintextStream {
    fn new(body: ByteStream, transform: CipherTransform) -> Self {
        Self {
            ready: VecDeque::new(),
            state: State::Streaming { body, transform },
        }
    }

    /// Stop decrypting.
    ///
    /// Drops the upstream body and any buffered data. The stream yields [`Error::Cancelled`]
    /// next, unless it had already terminated.
    pub fn cancel(&mut self) {
        self.ready.clear();

        if let State::Streaming { .. } = self.state {
            debug!("plaintext stream cancelled");
            self.state = State::Failing(Error::Cancelled);
        }
    }

    fn fail(&mut self, e: Error) {
        debug!("plaintext stream failed: {e}");
        self.ready.clear();
        self.state = State::Failing(e);
    }
}

impl Stream for PlaintextStream {
    type Item = Result<Vec<u8>, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(chunk) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }

            let (mut body, mut transform) = match mem::replace(&mut this.state, State::Terminated) {
                State::Terminated => return Poll::Ready(None),
                State::Failing(e) => return Poll::Ready(Some(Err(e))),
                State::Streaming { body, transform } => (body, transform),
            };

            match body.poll_next_unpin(cx) {
                Poll::Pending => {
                    this.state = State::Streaming { body, transform };
                    return Poll::Pending;
                }
                Poll::Ready(Some(Ok(chunk))) => match transform.update(&chunk, &mut this.ready) {
                    Ok(()) => this.state = State::Streaming { body, transform },
                    Err(e) => this.fail(e),
                },
                Poll::Ready(Some(Err(e))) => this.fail(e),
                Poll::Ready(None) => match transform.finish(&mut this.ready) {
                    Ok(()) => debug!("plaintext stream completed"),
                    Err(e) => this.fail(e),
                },
            }
        }
    }
}

impl FusedStream for PlaintextStream {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Terminated) && self.ready.is_empty()
    }
}

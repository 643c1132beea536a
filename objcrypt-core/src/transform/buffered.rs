use std::collections::VecDeque;
use std::fmt;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::Aes256Gcm;
use log::debug;

use super::{emit, Trimmer};
use crate::consts::*;
use crate::error::{Error, StorageError, StorageErrorKind};
use crate::range::TrimRange;

/// Upper bound on the buffer reserved before any ciphertext arrived.
const INITIAL_CAPACITY: usize = 1 << 20;

/// Decrypts a whole GCM object in one go and releases it only once the tag checks out.
///
/// The plaintext is handed on in chunks of the same sizes the ciphertext arrived in.
pub struct BufferedTransform {
    aead: Aes256Gcm,
    nonce: [u8; GCM_IV_SIZE],
    ciphertext: Vec<u8>,
    chunk_lengths: Vec<usize>,
    content_length: u64,
    limit: u64,
    trimmer: Trimmer,
}

impl fmt::Debug for BufferedTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedTransform")
            .field("buffered", &self.ciphertext.len())
            .field("content_length", &self.content_length)
            .field("limit", &self.limit)
            .finish()
    }
}

impl BufferedTransform {
    /// Create a new [`BufferedTransform`] for an object of `content_length` bytes.
    ///
    /// Objects with an unknown length or a length over `limit` are rejected up front.
    pub fn new(
        key: &[u8],
        content_iv: &[u8],
        content_length: Option<u64>,
        limit: u64,
        trim: Option<TrimRange>,
    ) -> Result<Self, Error> {
        let content_length = content_length.ok_or_else(|| {
            Error::ConfigurationRejected(
                "the object length is unknown, it cannot be buffered; enable delayed authentication to stream it"
                    .to_string(),
            )
        })?;

        if content_length > limit {
            return Err(Error::ConfigurationRejected(format!(
                "the object is {content_length} bytes, which exceeds the buffer size of {limit} bytes; \
                 raise the buffer size or enable delayed authentication"
            )));
        }

        let nonce: [u8; GCM_IV_SIZE] = content_iv.try_into().map_err(|_e| {
            Error::Symmetric(format!(
                "expected a {GCM_IV_SIZE} byte IV, got {}",
                content_iv.len()
            ))
        })?;

        debug!("buffering {content_length} bytes of ciphertext");

        Ok(Self {
            aead: Aes256Gcm::new_from_slice(key)?,
            nonce,
            ciphertext: Vec::with_capacity(content_length.min(INITIAL_CAPACITY as u64) as usize),
            chunk_lengths: Vec::new(),
            content_length,
            limit,
            trimmer: Trimmer::new(0, trim),
        })
    }

    pub(crate) fn update(
        &mut self,
        chunk: &[u8],
        _out: &mut VecDeque<Vec<u8>>,
    ) -> Result<(), Error> {
        if (self.ciphertext.len() + chunk.len()) as u64 > self.content_length {
            return Err(StorageError::new(
                StorageErrorKind::Other,
                format!(
                    "the body is longer than its announced length of {} bytes",
                    self.content_length
                ),
            )
            .into());
        }

        if !chunk.is_empty() {
            self.ciphertext.extend_from_slice(chunk);
            self.chunk_lengths.push(chunk.len());
        }

        Ok(())
    }

    pub(crate) fn finish(self, out: &mut VecDeque<Vec<u8>>) -> Result<(), Error> {
        let Self {
            aead,
            nonce,
            ciphertext: mut buf,
            chunk_lengths,
            mut trimmer,
            ..
        } = self;

        let tag_start = buf
            .len()
            .checked_sub(TAG_SIZE)
            .ok_or(Error::Authentication)?;
        let tag = buf.split_off(tag_start);

        aead.decrypt_in_place_detached(
            GenericArray::from_slice(&nonce),
            b"",
            &mut buf,
            GenericArray::from_slice(&tag),
        )?;

        debug!("tag verified, releasing {} bytes", buf.len());

        let mut rest = buf;
        for len in chunk_lengths {
            if rest.is_empty() {
                break;
            }
            let tail = rest.split_off(len.min(rest.len()));
            emit(out, trimmer.apply(rest));
            rest = tail;
        }

        Ok(())
    }
}

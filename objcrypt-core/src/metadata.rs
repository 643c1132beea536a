//! Content metadata: how an object was encrypted, and where to find that out.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use futures::TryStreamExt;
use log::debug;

use crate::consts::metadata_keys::*;
use crate::consts::*;
use crate::error::{Error, StorageErrorKind};
use crate::store::{GetObjectRequest, GetObjectResponse, ObjectStore};
use crate::suite::AlgorithmSuite;

/// A wrapped data key, opaque to the pipeline.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedDataKey {
    /// Identifies the keyring family that can unwrap this key.
    pub key_provider_id: String,
    /// The wrapping algorithm, e.g. `AES/GCM`, `kms+context` or `RSA-OAEP-SHA1`.
    pub key_provider_info: String,
    /// The wrapped key.
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for EncryptedDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedDataKey")
            .field("key_provider_id", &self.key_provider_id)
            .field("key_provider_info", &self.key_provider_info)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Per-object encryption metadata, normalized from either metadata source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadata {
    /// The suite to decrypt the fetched bytes with.
    pub algorithm_suite: AlgorithmSuite,
    /// The wrapped data key.
    pub encrypted_data_key: EncryptedDataKey,
    /// Encryption context or material description of the wrapped key.
    pub encryption_context: BTreeMap<String, String>,
    /// The content IV as stored.
    pub content_iv: Vec<u8>,
    /// The content range of the response this metadata was resolved for.
    pub content_range: Option<String>,
    /// The plaintext length advertised by the writer, if any.
    pub unencrypted_content_length: Option<u64>,
}

fn required<'a>(map: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, Error> {
    map.get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::Metadata(format!("missing {key}")))
}

impl ContentMetadata {
    /// Decodes content metadata from a map of metadata keys.
    ///
    /// `content_range` is the response's content range. A GCM object that was fetched as a
    /// range is read through the CTR suite, as the tag cannot be verified.
    pub fn from_map(
        map: &BTreeMap<String, String>,
        content_range: Option<&str>,
    ) -> Result<Self, Error> {
        let stored = AlgorithmSuite::from_cipher_name(map.get(CONTENT_CIPHER).map(String::as_str))?;

        let (edk_ciphertext, key_provider_info) = match stored {
            AlgorithmSuite::Aes256CbcIv16NoKdf => {
                let edk = match (map.get(ENCRYPTED_DATA_KEY_V1), map.get(ENCRYPTED_DATA_KEY_V2)) {
                    (Some(v1), _) => Base64::decode_vec(v1)?,
                    // First generation clients may write the second generation key entry.
                    (None, Some(v2)) => Base64::decode_vec(v2)?,
                    (None, None) => {
                        return Err(Error::Metadata(
                            "could not find the encrypted data key".to_string(),
                        ))
                    }
                };

                let info = match map.get(ENCRYPTED_DATA_KEY_ALGORITHM) {
                    Some(alg) => alg.clone(),
                    None if edk.len() > MAX_AES_WRAPPED_KEY_SIZE => "RSA".to_string(),
                    None => "AES".to_string(),
                };

                (edk, info)
            }
            AlgorithmSuite::Aes256GcmIv12Tag16NoKdf | AlgorithmSuite::Aes256CtrIv16Tag16NoKdf => {
                let tag_len = required(map, CONTENT_CIPHER_TAG_LENGTH)?;
                let tag_len: usize = tag_len
                    .parse()
                    .map_err(|_e| Error::Metadata(format!("invalid tag length: {tag_len}")))?;

                if tag_len != stored.cipher_tag_length_bits() {
                    return Err(Error::Metadata(format!(
                        "expected tag length (bits) of: {}, got: {tag_len}",
                        stored.cipher_tag_length_bits()
                    )));
                }

                let edk = Base64::decode_vec(required(map, ENCRYPTED_DATA_KEY_V2)?)?;
                let info = required(map, ENCRYPTED_DATA_KEY_ALGORITHM)?.to_string();

                (edk, info)
            }
        };

        let content_iv = Base64::decode_vec(required(map, CONTENT_IV)?)?;
        let expected_iv_len = stored.cipher_iv_length_bits() / 8;
        if content_iv.len() != expected_iv_len {
            return Err(Error::Metadata(format!(
                "expected a {expected_iv_len} byte IV for {}, got {}",
                stored.cipher_name(),
                content_iv.len()
            )));
        }

        let encryption_context = match map.get(ENCRYPTED_DATA_KEY_CONTEXT) {
            Some(json) => serde_json::from_str::<BTreeMap<String, String>>(json).map_err(|e| {
                Error::Metadata(format!("invalid {ENCRYPTED_DATA_KEY_CONTEXT}: {e}"))
            })?,
            None => BTreeMap::new(),
        };

        let unencrypted_content_length = map
            .get(UNENCRYPTED_CONTENT_LENGTH)
            .map(|len| {
                len.parse::<u64>()
                    .map_err(|_e| Error::Metadata(format!("invalid content length: {len}")))
            })
            .transpose()?;

        let algorithm_suite = match (stored, content_range) {
            (AlgorithmSuite::Aes256GcmIv12Tag16NoKdf, Some(_)) => {
                AlgorithmSuite::Aes256CtrIv16Tag16NoKdf
            }
            (s, _) => s,
        };

        Ok(ContentMetadata {
            algorithm_suite,
            encrypted_data_key: EncryptedDataKey {
                key_provider_id: KEY_PROVIDER_ID.to_string(),
                key_provider_info,
                ciphertext: edk_ciphertext,
            },
            encryption_context,
            content_iv,
            content_range: content_range.map(str::to_string),
            unencrypted_content_length,
        })
    }
}

/// A place content metadata can be found, in order of priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    /// The metadata stored with the object itself.
    ObjectMetadata,
    /// A separate instruction file stored under `<key>.instruction`.
    InstructionFile,
}

impl MetadataSource {
    /// Sources are tried in this order, the first that yields metadata wins.
    pub const PRIORITY: [MetadataSource; 2] = [Self::ObjectMetadata, Self::InstructionFile];
}

/// Resolves [`ContentMetadata`] for a fetched object.
#[derive(Clone)]
pub struct ContentMetadataResolver {
    // `None` if instruction files are disabled.
    instruction_store: Option<Arc<dyn ObjectStore>>,
}

impl fmt::Debug for ContentMetadataResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentMetadataResolver")
            .field("instruction_file_enabled", &self.instruction_store.is_some())
            .finish()
    }
}

impl ContentMetadataResolver {
    /// Create a resolver that reads instruction files from `instruction_store`, or never reads
    /// them if `None`.
    pub fn new(instruction_store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self { instruction_store }
    }

    /// Resolve the content metadata of the object fetched by `request`.
    pub async fn resolve(
        &self,
        request: &GetObjectRequest,
        response: &GetObjectResponse,
    ) -> Result<ContentMetadata, Error> {
        for source in MetadataSource::PRIORITY {
            if let Some(map) = self.lookup(source, request, response).await? {
                debug!("content metadata of {} found in {source:?}", request.key);
                return ContentMetadata::from_map(&map, response.content_range.as_deref());
            }
        }

        let hint = if self.instruction_store.is_none() {
            " and instruction files are disabled"
        } else {
            ""
        };

        Err(Error::Metadata(format!(
            "no content metadata found for {}: the object metadata holds no encryption metadata{hint}",
            request.key
        )))
    }

    async fn lookup(
        &self,
        source: MetadataSource,
        request: &GetObjectRequest,
        response: &GetObjectResponse,
    ) -> Result<Option<BTreeMap<String, String>>, Error> {
        match source {
            MetadataSource::ObjectMetadata => {
                let m = &response.metadata;
                let present = m.contains_key(CONTENT_IV)
                    && (m.contains_key(ENCRYPTED_DATA_KEY_V1)
                        || m.contains_key(ENCRYPTED_DATA_KEY_V2));

                Ok(present.then(|| m.clone()))
            }
            MetadataSource::InstructionFile => match &self.instruction_store {
                None => Ok(None),
                Some(store) => read_instruction_file(store.as_ref(), request).await,
            },
        }
    }
}

async fn read_instruction_file(
    store: &dyn ObjectStore,
    request: &GetObjectRequest,
) -> Result<Option<BTreeMap<String, String>>, Error> {
    let instruction_request = GetObjectRequest::new(
        request.bucket.clone(),
        format!("{}{INSTRUCTION_FILE_SUFFIX}", request.key),
    );

    let mut body = match store.get_object(&instruction_request).await {
        Ok((_, body)) => body,
        Err(Error::Storage(e)) if e.kind == StorageErrorKind::NotFound => {
            debug!("no instruction file at {}", instruction_request.key);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let mut raw = Vec::new();
    while let Some(chunk) = body.try_next().await? {
        raw.extend_from_slice(&chunk);
        if raw.len() > MAX_INSTRUCTION_FILE_SIZE {
            return Err(Error::Metadata(format!(
                "instruction file {} exceeds {MAX_INSTRUCTION_FILE_SIZE} bytes",
                instruction_request.key
            )));
        }
    }

    let map: BTreeMap<String, serde_json::Value> = serde_json::from_slice(&raw).map_err(|e| {
        Error::Metadata(format!(
            "invalid instruction file {}: {e}",
            instruction_request.key
        ))
    })?;
    let map: BTreeMap<String, String> = map
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => Ok((k, s)),
            _ => Err(Error::Metadata(format!(
                "instruction file entry {k} is not a string"
            ))),
        })
        .collect::<Result<_, _>>()?;

    Ok(Some(map))
}

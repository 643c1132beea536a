//! Decryption materials and the manager that resolves them.
//!
//! Unwrapping the data key (against a KMS, with an AES or RSA wrapping key, ...) is the job of
//! a [`MaterialsManager`]. The pipeline only forwards what it found in the content metadata and
//! consumes the plaintext data key that comes back.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::consts::DATA_KEY_SIZE;
use crate::error::Error;
use crate::metadata::EncryptedDataKey;
use crate::store::GetObjectRequest;
use crate::suite::AlgorithmSuite;

/// Everything a [`MaterialsManager`] gets to resolve a data key.
#[derive(Debug, Clone)]
pub struct DecryptMaterialsRequest {
    /// The caller's original request.
    pub request: GetObjectRequest,
    /// The suite the content will be decrypted with.
    pub algorithm_suite: AlgorithmSuite,
    /// The wrapped data keys; always exactly one.
    pub encrypted_data_keys: Vec<EncryptedDataKey>,
    /// Encryption context or material description.
    pub encryption_context: BTreeMap<String, String>,
    /// Number of ciphertext bytes in the response.
    pub ciphertext_length: Option<u64>,
    /// The caller's requested range.
    pub content_range: Option<String>,
}

/// Resolved materials for one get-operation.
///
/// The data key is wiped from memory when this is dropped, which happens as soon as the
/// cipher is constructed.
pub struct DecryptionMaterials {
    /// The plaintext data key.
    pub plaintext_data_key: Zeroizing<Vec<u8>>,
    /// The confirmed algorithm suite.
    pub algorithm_suite: AlgorithmSuite,
    /// Encryption context or material description.
    pub encryption_context: BTreeMap<String, String>,
    /// Number of ciphertext bytes in the response.
    pub ciphertext_length: Option<u64>,
    /// The effective content range: the request's range, or `None` for the whole object.
    pub content_range: Option<String>,
}

impl fmt::Debug for DecryptionMaterials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionMaterials")
            .field("plaintext_data_key", &"<redacted>")
            .field("algorithm_suite", &self.algorithm_suite)
            .field("encryption_context", &self.encryption_context)
            .field("ciphertext_length", &self.ciphertext_length)
            .field("content_range", &self.content_range)
            .finish()
    }
}

/// Resolves decryption materials, e.g. by unwrapping the data key with a keyring.
#[async_trait]
pub trait MaterialsManager: Send + Sync {
    /// Resolve the plaintext data key for a get-operation.
    ///
    /// Failures are reported as [`Error::Materials`] and propagated without interpretation.
    async fn decrypt_materials(
        &self,
        request: DecryptMaterialsRequest,
    ) -> Result<DecryptionMaterials, Error>;
}

/// A [`MaterialsManager`] that hands out a data key it was given up front.
///
/// Useful when the data key has already been unwrapped out of band.
pub struct StaticMaterialsManager {
    data_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for StaticMaterialsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticMaterialsManager").finish_non_exhaustive()
    }
}

impl StaticMaterialsManager {
    /// Create a new [`StaticMaterialsManager`] for an AES-256 data key.
    pub fn new(data_key: Vec<u8>) -> Result<Self, Error> {
        let data_key = Zeroizing::new(data_key);

        if data_key.len() != DATA_KEY_SIZE {
            return Err(Error::Materials(format!(
                "expected a {DATA_KEY_SIZE} byte data key, got {}",
                data_key.len()
            )));
        }

        Ok(Self { data_key })
    }
}

#[async_trait]
impl MaterialsManager for StaticMaterialsManager {
    async fn decrypt_materials(
        &self,
        request: DecryptMaterialsRequest,
    ) -> Result<DecryptionMaterials, Error> {
        if request.encrypted_data_keys.is_empty() {
            return Err(Error::Materials("no encrypted data key".to_string()));
        }

        Ok(DecryptionMaterials {
            plaintext_data_key: self.data_key.clone(),
            algorithm_suite: request.algorithm_suite,
            encryption_context: request.encryption_context,
            ciphertext_length: request.ciphertext_length,
            content_range: request.content_range,
        })
    }
}

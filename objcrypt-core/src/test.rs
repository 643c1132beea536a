//! Test helpers.
//!
//! An in-memory object store that serves byte ranges the way a real object store does, and
//! helpers that encrypt objects in every stored layout.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use futures::stream::{self, StreamExt};
use rand::{CryptoRng, RngCore};

use crate::config::PipelineConfig;
use crate::consts::metadata_keys::*;
use crate::consts::*;
use crate::error::{Error, StorageError, StorageErrorKind};
use crate::materials::StaticMaterialsManager;
use crate::pipeline::Pipeline;
use crate::range::ByteRange;
use crate::store::{ByteStream, GetObjectRequest, GetObjectResponse, ObjectStore};
use crate::suite::AlgorithmSuite;

/// 200 bytes of recognizable plaintext: every byte's offset can be read off its neighbours.
pub const RANGE_INPUT: &[u8] = b"0bcdefghijklmnopqrst0BCDEFGHIJKLMNOPQRST\
1bcdefghijklmnopqrst1BCDEFGHIJKLMNOPQRST\
2bcdefghijklmnopqrst2BCDEFGHIJKLMNOPQRST\
3bcdefghijklmnopqrst3BCDEFGHIJKLMNOPQRST\
4bcdefghijklmnopqrst4BCDEFGHIJKLMNOPQRST";

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    metadata: BTreeMap<String, String>,
}

#[derive(Debug)]
struct BodyGuard(Arc<AtomicUsize>);

impl BodyGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live.clone())
    }
}

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An in-memory [`ObjectStore`].
///
/// Bodies are pushed in chunks of a configurable size. Range headers are honored the way S3
/// honors them: malformed or inverted ranges are ignored, ranges starting past the object fail
/// and range ends are clamped to the object.
#[derive(Debug)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    requests: Mutex<Vec<GetObjectRequest>>,
    chunk_size: usize,
    fail_after: Mutex<Option<usize>>,
    live_bodies: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store, serving bodies in 64 byte chunks.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            requests: Mutex::new(Vec::new()),
            chunk_size: 64,
            fail_after: Mutex::new(None),
            live_bodies: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve bodies in chunks of `chunk_size` bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0);
        self.chunk_size = chunk_size;
        self
    }

    /// Store an object.
    pub fn insert(&self, key: &str, body: Vec<u8>, metadata: BTreeMap<String, String>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredObject { body, metadata });
    }

    /// Store the instruction file of the object under `key`.
    pub fn insert_instruction_file(&self, key: &str, metadata: &BTreeMap<String, String>) {
        let body = serde_json::to_vec(metadata).unwrap();
        self.insert(
            &format!("{key}{INSTRUCTION_FILE_SUFFIX}"),
            body,
            BTreeMap::new(),
        );
    }

    /// Make every body stream fail after `chunks` chunks.
    pub fn fail_bodies_after(&self, chunks: usize) {
        *self.fail_after.lock().unwrap() = Some(chunks);
    }

    /// All requests served so far.
    pub fn requests(&self) -> Vec<GetObjectRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of body streams handed out and not yet dropped.
    pub fn live_bodies(&self) -> usize {
        self.live_bodies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(
        &self,
        request: &GetObjectRequest,
    ) -> Result<(GetObjectResponse, ByteStream), Error> {
        self.requests.lock().unwrap().push(request.clone());

        let object = self
            .objects
            .lock()
            .unwrap()
            .get(&request.key)
            .cloned()
            .ok_or_else(|| {
                StorageError::new(StorageErrorKind::NotFound, format!("no such key: {}", request.key))
            })?;

        let len = object.body.len() as u64;
        let range = request
            .range
            .as_deref()
            .and_then(ByteRange::parse)
            .filter(ByteRange::is_ordered);

        let (content_range, body) = match range {
            None => (None, object.body),
            Some(r) if r.start >= len => {
                return Err(StorageError::new(
                    StorageErrorKind::RangeNotSatisfiable,
                    format!("{r} is not satisfiable for an object of {len} bytes"),
                )
                .into())
            }
            Some(r) => {
                let end = r.end.min(len - 1);
                (
                    Some(format!("bytes {}-{end}/{len}", r.start)),
                    object.body[r.start as usize..=end as usize].to_vec(),
                )
            }
        };

        let response = GetObjectResponse {
            content_length: Some(body.len() as u64),
            content_range,
            metadata: object.metadata,
        };

        let fail_after = *self.fail_after.lock().unwrap();
        let mut chunks: Vec<Result<Vec<u8>, Error>> =
            body.chunks(self.chunk_size).map(|c| Ok(c.to_vec())).collect();
        if let Some(n) = fail_after {
            chunks.truncate(n);
            chunks.push(Err(StorageError::new(
                StorageErrorKind::Other,
                "connection reset",
            )
            .into()));
        }

        let guard = BodyGuard::new(&self.live_bodies);
        let body = stream::iter(chunks)
            .map(move |chunk| {
                let _alive = &guard;
                chunk
            })
            .boxed();

        Ok((response, body))
    }
}

/// Encrypts `plain` under `suite` the way a writer stores it, returning `(ciphertext, iv)`.
///
/// GCM (and CTR, which reads GCM objects) ciphertext carries the tag at the end, CBC ciphertext
/// is PKCS#7 padded.
pub fn encrypt<R: RngCore + CryptoRng>(
    suite: AlgorithmSuite,
    key: &[u8],
    plain: &[u8],
    rng: &mut R,
) -> (Vec<u8>, Vec<u8>) {
    match suite {
        AlgorithmSuite::Aes256GcmIv12Tag16NoKdf | AlgorithmSuite::Aes256CtrIv16Tag16NoKdf => {
            let mut iv = vec![0u8; GCM_IV_SIZE];
            rng.fill_bytes(&mut iv);

            let aead = Aes256Gcm::new_from_slice(key).unwrap();
            let ct = aead.encrypt(Nonce::from_slice(&iv), plain).unwrap();

            (ct, iv)
        }
        AlgorithmSuite::Aes256CbcIv16NoKdf => {
            let mut iv = vec![0u8; CBC_IV_SIZE];
            rng.fill_bytes(&mut iv);

            let block = CIPHER_BLOCK_SIZE as usize;
            let pad = block - plain.len() % block;
            let mut buf = plain.to_vec();
            buf.resize(plain.len() + pad, pad as u8);

            let mut enc = cbc::Encryptor::<Aes256>::new_from_slices(key, &iv).unwrap();
            for b in buf.chunks_exact_mut(block) {
                enc.encrypt_block_mut(GenericArray::from_mut_slice(b));
            }

            (buf, iv)
        }
    }
}

/// The content metadata a writer stores next to an object encrypted by [`encrypt`].
///
/// GCM objects get second generation metadata, CBC objects first generation metadata.
pub fn content_metadata<R: RngCore + CryptoRng>(
    suite: AlgorithmSuite,
    iv: &[u8],
    plain_len: usize,
    rng: &mut R,
) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut edk = [0u8; MAX_AES_WRAPPED_KEY_SIZE];
    rng.fill_bytes(&mut edk);

    match suite {
        AlgorithmSuite::Aes256CbcIv16NoKdf => {
            map.insert(ENCRYPTED_DATA_KEY_V1.to_string(), Base64::encode_string(&edk));
            map.insert(ENCRYPTED_DATA_KEY_CONTEXT.to_string(), "{}".to_string());
        }
        _ => {
            let cipher = AlgorithmSuite::Aes256GcmIv12Tag16NoKdf.cipher_name();
            map.insert(ENCRYPTED_DATA_KEY_V2.to_string(), Base64::encode_string(&edk));
            map.insert(ENCRYPTED_DATA_KEY_ALGORITHM.to_string(), "AES/GCM".to_string());
            map.insert(CONTENT_CIPHER.to_string(), cipher.to_string());
            map.insert(CONTENT_CIPHER_TAG_LENGTH.to_string(), "128".to_string());
            map.insert(
                ENCRYPTED_DATA_KEY_CONTEXT.to_string(),
                format!(r#"{{"aws:x-amz-cek-alg":"{cipher}"}}"#),
            );
        }
    }

    map.insert(CONTENT_IV.to_string(), Base64::encode_string(iv));
    map.insert(UNENCRYPTED_CONTENT_LENGTH.to_string(), plain_len.to_string());

    map
}

/// A test setup.
#[derive(Debug)]
pub struct TestSetup {
    /// The data key every object is encrypted under.
    pub data_key: Vec<u8>,

    /// The store holding the encrypted objects.
    pub store: Arc<MemoryStore>,
}

impl TestSetup {
    /// Create a new test setup with an empty store.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::with_store(MemoryStore::new(), rng)
    }

    /// Create a new test setup around `store`.
    pub fn with_store<R: RngCore + CryptoRng>(store: MemoryStore, rng: &mut R) -> Self {
        let mut data_key = vec![0u8; DATA_KEY_SIZE];
        rng.fill_bytes(&mut data_key);

        TestSetup {
            data_key,
            store: Arc::new(store),
        }
    }

    /// Encrypt and store an object with its metadata embedded.
    pub fn put<R: RngCore + CryptoRng>(
        &self,
        key: &str,
        suite: AlgorithmSuite,
        plain: &[u8],
        rng: &mut R,
    ) {
        let (ct, iv) = encrypt(suite, &self.data_key, plain, rng);
        let metadata = content_metadata(suite, &iv, plain.len(), rng);
        self.store.insert(key, ct, metadata);
    }

    /// Encrypt and store an object with its metadata in an instruction file.
    pub fn put_with_instruction_file<R: RngCore + CryptoRng>(
        &self,
        key: &str,
        suite: AlgorithmSuite,
        plain: &[u8],
        rng: &mut R,
    ) {
        let (ct, iv) = encrypt(suite, &self.data_key, plain, rng);
        let metadata = content_metadata(suite, &iv, plain.len(), rng);
        self.store.insert(key, ct, BTreeMap::new());
        self.store.insert_instruction_file(key, &metadata);
    }

    /// A materials manager that hands out the data key.
    pub fn materials(&self) -> StaticMaterialsManager {
        StaticMaterialsManager::new(self.data_key.clone()).unwrap()
    }

    /// A pipeline reading from the store.
    pub fn pipeline(&self, config: PipelineConfig) -> Result<Pipeline, Error> {
        Pipeline::new(self.store.clone(), Arc::new(self.materials()), config)
    }
}

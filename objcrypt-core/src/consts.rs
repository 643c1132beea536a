//! Constants shared by the decryption pipeline.

/// Size of one AES block, for every supported content cipher.
pub const CIPHER_BLOCK_SIZE: u64 = 16;

/// Size of the AES-256 data key.
pub const DATA_KEY_SIZE: usize = 32;

/// Size of the GCM nonce as stored in the content metadata.
pub const GCM_IV_SIZE: usize = 12;

/// Size of the CBC IV as stored in the content metadata.
pub const CBC_IV_SIZE: usize = 16;

/// Size of the GCM authentication tag.
pub const TAG_SIZE: usize = 16;

/// The largest counter value a GCM/CTR keystream can reach (`2^32 - 2`).
pub const MAX_GCM_BLOCKS: u64 = (1 << 32) - 2;

/// Maximum content length of a GCM encrypted object, in bytes (`2^39 - 256` bits).
pub const GCM_MAX_CONTENT_LENGTH_BYTES: u64 = ((1 << 39) - 256) / 8;

/// Default working buffer for buffered (authenticate-first) decryption (64 MiB).
pub const DEFAULT_BUFFER_SIZE: u64 = 64 * 1024 * 1024;

/// Smallest configurable working buffer.
pub const MIN_BUFFER_SIZE: u64 = 16;

/// Largest configurable working buffer.
pub const MAX_BUFFER_SIZE: u64 = GCM_MAX_CONTENT_LENGTH_BYTES;

/// Suffix of the key under which an object's instruction file is stored.
pub const INSTRUCTION_FILE_SUFFIX: &str = ".instruction";

/// Upper bound on the size of an instruction file (1 MiB).
pub const MAX_INSTRUCTION_FILE_SIZE: usize = 1024 * 1024;

/// Key provider id attached to every encrypted data key read by this library.
pub const KEY_PROVIDER_ID: &str = "S3Keyring";

/// Wrapped key sizes above this are taken to be RSA wrapped, when the wrapping algorithm was not
/// recorded (first generation objects).
pub const MAX_AES_WRAPPED_KEY_SIZE: usize = 48;

/// Keys of the content metadata, both when embedded and in instruction files.
pub mod metadata_keys {
    /// Encrypted data key, first generation.
    pub const ENCRYPTED_DATA_KEY_V1: &str = "x-amz-key";

    /// Encrypted data key, second generation.
    pub const ENCRYPTED_DATA_KEY_V2: &str = "x-amz-key-v2";

    /// Content IV.
    pub const CONTENT_IV: &str = "x-amz-iv";

    /// Material description or encryption context (JSON object).
    pub const ENCRYPTED_DATA_KEY_CONTEXT: &str = "x-amz-matdesc";

    /// Content cipher name.
    pub const CONTENT_CIPHER: &str = "x-amz-cek-alg";

    /// Key wrapping algorithm.
    pub const ENCRYPTED_DATA_KEY_ALGORITHM: &str = "x-amz-wrap-alg";

    /// Tag length in bits.
    pub const CONTENT_CIPHER_TAG_LENGTH: &str = "x-amz-tag-len";

    /// Advertised plaintext length.
    pub const UNENCRYPTED_CONTENT_LENGTH: &str = "x-amz-unencrypted-content-length";
}

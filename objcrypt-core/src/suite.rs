//! Catalog of supported content encryption algorithm suites.

use crate::consts::*;
use crate::error::Error;

/// A content encryption algorithm suite.
///
/// The catalog is static: suites are looked up by their stored cipher name or numeric id and are
/// never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmSuite {
    /// AES-256-GCM with a 96-bit IV and a 128-bit tag.
    Aes256GcmIv12Tag16NoKdf,
    /// AES-256-CTR, used to read byte ranges of GCM encrypted objects without authentication.
    Aes256CtrIv16Tag16NoKdf,
    /// AES-256-CBC with PKCS#7 padding.
    Aes256CbcIv16NoKdf,
}

impl AlgorithmSuite {
    /// All suites in the catalog.
    pub const ALL: [AlgorithmSuite; 3] = [
        Self::Aes256GcmIv12Tag16NoKdf,
        Self::Aes256CtrIv16Tag16NoKdf,
        Self::Aes256CbcIv16NoKdf,
    ];

    /// The numeric identifier of this suite.
    pub const fn id(self) -> u16 {
        match self {
            Self::Aes256GcmIv12Tag16NoKdf => 0x0072,
            Self::Aes256CtrIv16Tag16NoKdf => 0x0071,
            Self::Aes256CbcIv16NoKdf => 0x0070,
        }
    }

    /// Whether this suite is only readable with legacy unauthenticated modes enabled.
    pub const fn is_legacy(self) -> bool {
        match self {
            Self::Aes256GcmIv12Tag16NoKdf => false,
            Self::Aes256CtrIv16Tag16NoKdf | Self::Aes256CbcIv16NoKdf => true,
        }
    }

    /// The cipher name, as stored in the content metadata.
    pub const fn cipher_name(self) -> &'static str {
        match self {
            Self::Aes256GcmIv12Tag16NoKdf => "AES/GCM/NoPadding",
            Self::Aes256CtrIv16Tag16NoKdf => "AES/CTR/NoPadding",
            Self::Aes256CbcIv16NoKdf => "AES/CBC/PKCS5Padding",
        }
    }

    /// Length of the data key.
    pub const fn data_key_length_bits(self) -> usize {
        256
    }

    /// Block size of the underlying block cipher.
    pub const fn cipher_block_size_bytes(self) -> u64 {
        CIPHER_BLOCK_SIZE
    }

    /// Length of the IV (for CTR: the full counter block).
    pub const fn cipher_iv_length_bits(self) -> usize {
        match self {
            Self::Aes256GcmIv12Tag16NoKdf => 96,
            Self::Aes256CtrIv16Tag16NoKdf | Self::Aes256CbcIv16NoKdf => 128,
        }
    }

    /// Length of the trailing tag in the stored ciphertext.
    pub const fn cipher_tag_length_bits(self) -> usize {
        match self {
            Self::Aes256GcmIv12Tag16NoKdf | Self::Aes256CtrIv16Tag16NoKdf => 128,
            Self::Aes256CbcIv16NoKdf => 0,
        }
    }

    /// Length of the trailing tag in bytes.
    pub const fn cipher_tag_length_bytes(self) -> u64 {
        (self.cipher_tag_length_bits() / 8) as u64
    }

    /// Length of the stored ciphertext for `plaintext_len` bytes of content.
    pub const fn stored_length(self, plaintext_len: u64) -> u64 {
        match self {
            Self::Aes256GcmIv12Tag16NoKdf | Self::Aes256CtrIv16Tag16NoKdf => {
                plaintext_len.saturating_add(self.cipher_tag_length_bytes())
            }
            // PKCS#7 always adds between 1 and a full block of padding.
            Self::Aes256CbcIv16NoKdf => {
                let full_blocks = plaintext_len - plaintext_len % CIPHER_BLOCK_SIZE;
                full_blocks.saturating_add(CIPHER_BLOCK_SIZE)
            }
        }
    }

    /// Whether decryption under this suite verifies an authentication tag.
    ///
    /// The CTR suite carries the GCM tag in its ciphertext but never checks it.
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Aes256GcmIv12Tag16NoKdf)
    }

    /// Whether the content key is derived from the data key first.
    pub const fn requires_kdf(self) -> bool {
        false
    }

    /// The largest content this suite can encrypt.
    pub const fn max_content_length_bytes(self) -> u64 {
        match self {
            Self::Aes256GcmIv12Tag16NoKdf | Self::Aes256CtrIv16Tag16NoKdf => {
                GCM_MAX_CONTENT_LENGTH_BYTES
            }
            Self::Aes256CbcIv16NoKdf => u64::MAX / 8,
        }
    }

    /// Look up a suite by numeric identifier.
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Look up the stored suite by its cipher name.
    ///
    /// Objects written by the first generation of clients carry no cipher name; those are CBC.
    /// The CTR suite is never stored and therefore never returned.
    pub fn from_cipher_name(name: Option<&str>) -> Result<Self, Error> {
        match name {
            None => Ok(Self::Aes256CbcIv16NoKdf),
            Some(n) if n == Self::Aes256CbcIv16NoKdf.cipher_name() => Ok(Self::Aes256CbcIv16NoKdf),
            Some(n) if n == Self::Aes256GcmIv12Tag16NoKdf.cipher_name() => {
                Ok(Self::Aes256GcmIv12Tag16NoKdf)
            }
            Some(n) => Err(Error::Metadata(format!(
                "unknown content encryption algorithm: {n}"
            ))),
        }
    }
}

//! Incremental AES-GCM decryption: CTR keystream plus a running GHASH.
//!
//! The last [`TAG_SIZE`] bytes seen so far are always held back, as they may be the tag.

use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::{Aes256, Block};
use ghash::universal_hash::UniversalHash;
use ghash::GHash;
use subtle::ConstantTimeEq;

use super::Aes256Ctr32;
use crate::consts::*;
use crate::error::Error;
use crate::range::adjust_ctr_iv;

const BLOCK: usize = CIPHER_BLOCK_SIZE as usize;
const TAG: usize = TAG_SIZE;

pub(crate) struct GcmDecryptor {
    ctr: Aes256Ctr32,
    ghash: GHash,
    // E(K, J0), XORed onto the GHASH output to form the tag.
    tag_mask: Block,
    unhashed: Vec<u8>,
    tail: Vec<u8>,
    ciphertext_len: u64,
}

impl GcmDecryptor {
    pub(crate) fn new(key: &[u8], iv: &[u8]) -> Result<Self, Error> {
        let aes = Aes256::new_from_slice(key)?;

        let mut h = Block::default();
        aes.encrypt_block(&mut h);

        // Also validates the IV length.
        let counter = adjust_ctr_iv(iv, 0)?;

        let mut tag_mask = Block::default();
        tag_mask[..GCM_IV_SIZE].copy_from_slice(iv);
        tag_mask[BLOCK - 1] = 1;
        aes.encrypt_block(&mut tag_mask);

        Ok(Self {
            ctr: Aes256Ctr32::new_from_slices(key, &counter)?,
            ghash: GHash::new(&h),
            tag_mask,
            unhashed: Vec::with_capacity(BLOCK),
            tail: Vec::with_capacity(2 * TAG),
            ciphertext_len: 0,
        })
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.tail.extend_from_slice(chunk);

        if self.tail.len() <= TAG {
            return Vec::new();
        }

        let ready = self.tail.len() - TAG;
        let mut buf: Vec<u8> = self.tail.drain(..ready).collect();

        self.absorb(&buf);
        self.ctr.apply_keystream(&mut buf);

        buf
    }

    fn absorb(&mut self, ciphertext: &[u8]) {
        self.ciphertext_len += ciphertext.len() as u64;
        self.unhashed.extend_from_slice(ciphertext);

        let full = self.unhashed.len() - self.unhashed.len() % BLOCK;
        if full > 0 {
            self.ghash.update_padded(&self.unhashed[..full]);
            self.unhashed.drain(..full);
        }
    }

    /// Verifies the held back tag.
    pub(crate) fn finish(mut self) -> Result<(), Error> {
        if self.tail.len() != TAG {
            return Err(Error::Authentication);
        }

        self.ghash.update_padded(&self.unhashed);

        // No associated data, so only the ciphertext length is set.
        let mut lengths = Block::default();
        lengths[8..].copy_from_slice(&(self.ciphertext_len * 8).to_be_bytes());
        self.ghash.update_padded(&lengths);

        let mut expected = self.ghash.finalize();
        for (e, m) in expected.iter_mut().zip(self.tag_mask.iter()) {
            *e ^= m;
        }

        if bool::from(expected.as_slice().ct_eq(&self.tail)) {
            Ok(())
        } else {
            Err(Error::Authentication)
        }
    }
}

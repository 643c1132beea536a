use std::collections::VecDeque;
use std::fmt;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, KeyIvInit, StreamCipher};
use aes::Aes256;
use zeroize::Zeroizing;

use super::gcm::GcmDecryptor;
use super::{emit, Aes256Ctr32, Trimmer};
use crate::consts::*;
use crate::error::Error;
use crate::range::{adjust_ctr_iv, FetchedSpan, TrimRange};
use crate::suite::AlgorithmSuite;

const BLOCK: usize = CIPHER_BLOCK_SIZE as usize;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

enum CbcState {
    // The first fetched block is the chaining IV of a ranged read.
    AwaitingIv(Zeroizing<Vec<u8>>),
    Ready(Aes256CbcDec),
}

/// Incremental CBC decryption over arbitrarily sized chunks.
struct CbcDecryptor {
    state: CbcState,
    pending: Vec<u8>,
    held: Option<Vec<u8>>,
    strip_padding: bool,
    iv_from_stream: bool,
}

impl CbcDecryptor {
    fn new(key: &[u8], iv: Option<&[u8]>, strip_padding: bool) -> Result<Self, Error> {
        let (state, iv_from_stream) = match iv {
            Some(iv) => (CbcState::Ready(Aes256CbcDec::new_from_slices(key, iv)?), false),
            None => (CbcState::AwaitingIv(Zeroizing::new(key.to_vec())), true),
        };

        Ok(Self {
            state,
            pending: Vec::new(),
            held: None,
            strip_padding,
            iv_from_stream,
        })
    }

    fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>, Error> {
        self.pending.extend_from_slice(chunk);

        if let CbcState::AwaitingIv(key) = &self.state {
            if self.pending.len() < BLOCK {
                return Ok(Vec::new());
            }
            let iv: Vec<u8> = self.pending.drain(..BLOCK).collect();
            let dec = Aes256CbcDec::new_from_slices(key, &iv)?;
            self.state = CbcState::Ready(dec);
        }

        let dec = match &mut self.state {
            CbcState::Ready(dec) => dec,
            CbcState::AwaitingIv(_) => return Ok(Vec::new()),
        };

        let full = self.pending.len() - self.pending.len() % BLOCK;
        let mut plain: Vec<u8> = self.pending.drain(..full).collect();
        for block in plain.chunks_exact_mut(BLOCK) {
            dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        if !self.strip_padding {
            return Ok(plain);
        }

        // The last block may carry the padding, keep it until the end of the stream.
        let mut out = self.held.take().unwrap_or_default();
        out.extend_from_slice(&plain);
        if out.len() >= BLOCK {
            self.held = Some(out.split_off(out.len() - BLOCK));
        }

        Ok(out)
    }

    fn finish(self) -> Result<Vec<u8>, Error> {
        if !self.strip_padding {
            // A ranged read that stops short of the end may cut a block in half.
            return Ok(Vec::new());
        }

        if !self.pending.is_empty() {
            return Err(Error::Symmetric(
                "ciphertext length is not a multiple of the block size".to_string(),
            ));
        }

        match self.held {
            Some(block) => pkcs7_unpad(block),
            None if self.iv_from_stream => Ok(Vec::new()),
            None => Err(Error::Symmetric("empty CBC ciphertext".to_string())),
        }
    }
}

fn pkcs7_unpad(mut block: Vec<u8>) -> Result<Vec<u8>, Error> {
    let invalid = || Error::Symmetric("invalid padding".to_string());

    let pad = *block.last().ok_or_else(invalid)? as usize;
    if pad == 0 || pad > BLOCK || pad > block.len() {
        return Err(invalid());
    }

    let keep = block.len() - pad;
    if !block[keep..].iter().all(|&b| b as usize == pad) {
        return Err(invalid());
    }

    block.truncate(keep);
    Ok(block)
}

enum Engine {
    Cbc(CbcDecryptor),
    Ctr(Aes256Ctr32),
    Gcm(GcmDecryptor),
}

impl Engine {
    fn name(&self) -> &'static str {
        match self {
            Engine::Cbc(_) => "cbc",
            Engine::Ctr(_) => "ctr",
            Engine::Gcm(_) => "gcm",
        }
    }
}

/// Decrypts and releases plaintext chunk by chunk.
///
/// For GCM the trailing tag is verified when the stream ends, after the plaintext before it has
/// already been released.
pub struct StreamingTransform {
    engine: Engine,
    trimmer: Trimmer,
}

impl fmt::Debug for StreamingTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingTransform")
            .field("engine", &self.engine.name())
            .field("trimmer", &self.trimmer)
            .finish()
    }
}

impl StreamingTransform {
    /// Create a new [`StreamingTransform`] for ciphertext starting at `span.start`.
    pub fn new(
        suite: AlgorithmSuite,
        key: &[u8],
        content_iv: &[u8],
        span: &FetchedSpan,
        trim: Option<TrimRange>,
    ) -> Result<Self, Error> {
        if span.start % CIPHER_BLOCK_SIZE != 0 {
            return Err(Error::UnsupportedLayout(format!(
                "ciphertext starts at {}, which is not on a block boundary",
                span.start
            )));
        }

        let (engine, origin) = match suite {
            AlgorithmSuite::Aes256CbcIv16NoKdf => {
                let iv_from_stream = span.start > 0;
                let iv = (!iv_from_stream).then(|| content_iv);
                let origin = if iv_from_stream {
                    span.start + CIPHER_BLOCK_SIZE
                } else {
                    0
                };

                (
                    Engine::Cbc(CbcDecryptor::new(key, iv, span.reaches_end)?),
                    origin,
                )
            }
            AlgorithmSuite::Aes256CtrIv16Tag16NoKdf => {
                let counter = adjust_ctr_iv(content_iv, span.start)?;
                (
                    Engine::Ctr(Aes256Ctr32::new_from_slices(key, &counter)?),
                    span.start,
                )
            }
            AlgorithmSuite::Aes256GcmIv12Tag16NoKdf => {
                if span.start != 0 {
                    return Err(Error::UnsupportedLayout(
                        "a partial GCM object cannot be authenticated".to_string(),
                    ));
                }
                (Engine::Gcm(GcmDecryptor::new(key, content_iv)?), 0)
            }
        };

        Ok(Self {
            engine,
            trimmer: Trimmer::new(origin, trim),
        })
    }

    pub(crate) fn update(
        &mut self,
        chunk: &[u8],
        out: &mut VecDeque<Vec<u8>>,
    ) -> Result<(), Error> {
        let plain = match &mut self.engine {
            Engine::Cbc(dec) => dec.update(chunk)?,
            Engine::Ctr(ctr) => {
                let mut buf = chunk.to_vec();
                ctr.apply_keystream(&mut buf);
                buf
            }
            Engine::Gcm(dec) => dec.update(chunk),
        };

        emit(out, self.trimmer.apply(plain));

        Ok(())
    }

    pub(crate) fn finish(mut self, out: &mut VecDeque<Vec<u8>>) -> Result<(), Error> {
        let plain = match self.engine {
            Engine::Cbc(dec) => dec.finish()?,
            Engine::Ctr(_) => Vec::new(),
            Engine::Gcm(dec) => {
                dec.finish()?;
                Vec::new()
            }
        };

        emit(out, self.trimmer.apply(plain));

        Ok(())
    }
}

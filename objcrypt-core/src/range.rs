//! Translation between plaintext byte ranges and ciphertext byte ranges.
//!
//! A caller asks for plaintext bytes `[s, e]`. Block ciphers can only be decrypted from block
//! boundaries, so the range that is fetched from storage is widened:
//!
//! ```text
//! fetch start = s - (s mod 16) - 16, clamped at 0
//! fetch end   = e + (16 - e mod 16) + 16
//! ```
//!
//! The extra leading block serves as the chaining IV for CBC, the trailing allowance covers CBC
//! padding. After decryption the plaintext is trimmed back to `[s, e]`, clipped at the end of the
//! plaintext.

use core::fmt;

use crate::consts::*;
use crate::error::Error;
use crate::store::GetObjectResponse;
use crate::suite::AlgorithmSuite;

/// An inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte.
    pub start: u64,
    /// Last byte (inclusive).
    pub end: u64,
}

fn parse_u64(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl ByteRange {
    /// Parses a range header of the form `bytes=<start>-<end>`.
    ///
    /// Returns `None` for anything else, including open-ended and suffix ranges. Inverted ranges
    /// are returned as-is.
    pub fn parse(range: &str) -> Option<Self> {
        let (start, end) = range.strip_prefix("bytes=")?.split_once('-')?;

        Some(ByteRange {
            start: parse_u64(start)?,
            end: parse_u64(end)?,
        })
    }

    /// Whether `start <= end`.
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

fn cipher_block_lower_bound(leftmost: u64) -> u64 {
    let offset = leftmost % CIPHER_BLOCK_SIZE;
    (leftmost - offset).saturating_sub(CIPHER_BLOCK_SIZE)
}

fn cipher_block_upper_bound(rightmost: u64) -> u64 {
    let offset = CIPHER_BLOCK_SIZE - (rightmost % CIPHER_BLOCK_SIZE);
    rightmost.saturating_add(offset + CIPHER_BLOCK_SIZE)
}

/// The ranges involved in one get-operation, derived from the caller's range text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangePlan {
    /// The plaintext range the caller asked for, if it was well-formed and ordered.
    pub desired: Option<ByteRange>,
    /// The ciphertext range to fetch from storage; `None` fetches the whole object.
    pub fetch: Option<ByteRange>,
}

impl RangePlan {
    /// Plans the fetch for an optional range header.
    ///
    /// Absent, malformed and inverted ranges all fetch and deliver the whole object.
    pub fn new(range: Option<&str>) -> Self {
        let desired = range.and_then(ByteRange::parse).filter(ByteRange::is_ordered);
        let fetch = desired.map(|r| ByteRange {
            start: cipher_block_lower_bound(r.start),
            end: cipher_block_upper_bound(r.end),
        });

        RangePlan { desired, fetch }
    }

    /// The range header to send to storage.
    pub fn fetch_header(&self) -> Option<String> {
        self.fetch.map(|r| r.to_string())
    }
}

/// A parsed `Content-Range` response header: `bytes <start>-<end>/<total or *>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte of the stored object that was returned.
    pub start: u64,
    /// Last byte (inclusive) that was returned.
    pub end: u64,
    /// Length of the whole stored object, if the store told us.
    pub instance_length: Option<u64>,
}

impl ContentRange {
    /// Parses a `Content-Range` header value.
    pub fn parse(header: &str) -> Result<Self, Error> {
        let malformed = || Error::UnsupportedLayout(format!("malformed content range: {header}"));

        let rest = header.strip_prefix("bytes ").ok_or_else(malformed)?;
        let (span, total) = rest.split_once('/').ok_or_else(malformed)?;
        let (start, end) = span.split_once('-').ok_or_else(malformed)?;

        let start = parse_u64(start).ok_or_else(malformed)?;
        let end = parse_u64(end).ok_or_else(malformed)?;
        let instance_length = match total {
            "*" => None,
            t => Some(parse_u64(t).ok_or_else(malformed)?),
        };

        if start > end {
            return Err(malformed());
        }

        Ok(ContentRange {
            start,
            end,
            instance_length,
        })
    }
}

/// The part of the stored ciphertext that a response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchedSpan {
    /// Offset of the first returned byte within the stored object.
    pub start: u64,
    /// Whether the last returned byte is the last byte of the stored object.
    pub reaches_end: bool,
    /// Length of the whole stored object, if known.
    pub instance_length: Option<u64>,
}

impl FetchedSpan {
    /// Derives the span from the response headers.
    ///
    /// A ranged response whose `Content-Range` leaves the object length open (`/*`) falls back to
    /// the stored length implied by `plaintext_length`, the writer's advertised content length.
    /// Without either, the end of the plaintext cannot be located.
    pub fn from_response(
        response: &GetObjectResponse,
        suite: AlgorithmSuite,
        plaintext_length: Option<u64>,
    ) -> Result<Self, Error> {
        let header = match response.content_range.as_deref() {
            None => {
                return Ok(FetchedSpan {
                    start: 0,
                    reaches_end: true,
                    instance_length: response.content_length,
                })
            }
            Some(header) => header,
        };

        let cr = ContentRange::parse(header)?;
        let total = match (cr.instance_length, plaintext_length) {
            (Some(total), _) => total,
            (None, Some(len)) => suite.stored_length(len),
            (None, None) => {
                return Err(Error::UnsupportedLayout(format!(
                    "content range {header} does not state the object length and the object \
                     has no unencrypted content length"
                )))
            }
        };

        Ok(FetchedSpan {
            start: cr.start,
            reaches_end: cr.end.saturating_add(1) >= total,
            instance_length: Some(total),
        })
    }
}

/// The plaintext window `[start, end)` to deliver, in absolute plaintext offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimRange {
    /// First plaintext byte to deliver.
    pub start: u64,
    /// One past the last plaintext byte to deliver.
    pub end: u64,
}

impl TrimRange {
    /// Clips the caller's range at the end of the plaintext.
    ///
    /// The plaintext ends where the stored object's trailing tag begins. Without a known object
    /// length (a whole-object response of unknown size) the range is only clipped by the end of
    /// the stream itself.
    pub fn new(desired: ByteRange, span: &FetchedSpan, suite: AlgorithmSuite) -> Self {
        let end = desired.end.saturating_add(1);
        let end = match span.instance_length {
            Some(total) => end.min(total.saturating_sub(suite.cipher_tag_length_bytes())),
            None => end,
        };

        TrimRange {
            start: desired.start,
            end,
        }
    }

    /// Whether nothing is to be delivered.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Computes the CTR counter block for decrypting a GCM object from `byte_offset` onwards.
///
/// GCM encrypts its first plaintext block with `J0 + 1`, where `J0 = IV || 0x00000001`. The
/// offset must be a multiple of the block size.
pub fn adjust_ctr_iv(iv: &[u8], byte_offset: u64) -> Result<[u8; 16], Error> {
    if iv.len() != GCM_IV_SIZE {
        return Err(Error::Symmetric(format!(
            "expected a {GCM_IV_SIZE} byte IV to derive a counter, got {}",
            iv.len()
        )));
    }

    if byte_offset % CIPHER_BLOCK_SIZE != 0 {
        return Err(Error::Symmetric(format!(
            "expected the byte offset to be a multiple of {CIPHER_BLOCK_SIZE}, got {byte_offset}"
        )));
    }

    let counter = 2 + byte_offset / CIPHER_BLOCK_SIZE;
    if counter > MAX_GCM_BLOCKS {
        return Err(Error::Symmetric(format!(
            "byte offset {byte_offset} exceeds the GCM counter space"
        )));
    }

    let mut block = [0u8; 16];
    block[..GCM_IV_SIZE].copy_from_slice(iv);
    // Cannot truncate, bounded by MAX_GCM_BLOCKS above.
    block[GCM_IV_SIZE..].copy_from_slice(&(counter as u32).to_be_bytes());

    Ok(block)
}

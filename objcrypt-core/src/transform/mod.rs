//! Cipher transforms: turn ciphertext chunks into trimmed plaintext chunks.
//!
//! Two release strategies exist, chosen once per request:
//!
//! * [`StreamingTransform`] releases plaintext as soon as a chunk is decrypted. Used for the
//!   unauthenticated suites, and for GCM when the caller enabled delayed authentication.
//! * [`BufferedTransform`] holds the whole object until the GCM tag has been verified.

mod buffered;
mod gcm;
mod streaming;

pub use buffered::BufferedTransform;
pub use streaming::StreamingTransform;

use std::collections::VecDeque;

use log::{debug, warn};

use crate::config::PipelineConfig;
use crate::consts::DATA_KEY_SIZE;
use crate::error::Error;
use crate::materials::DecryptionMaterials;
use crate::range::{FetchedSpan, RangePlan, TrimRange};
use crate::store::GetObjectResponse;
use crate::suite::AlgorithmSuite;

pub(crate) type Aes256Ctr32 = ctr::Ctr32BE<aes::Aes256>;

/// Drops decrypted bytes outside the caller's window.
///
/// Positions are absolute plaintext offsets. The origin is the plaintext offset of the first
/// byte the cipher will produce.
#[derive(Debug, Clone)]
pub(crate) struct Trimmer {
    position: u64,
    window: Option<TrimRange>,
}

impl Trimmer {
    pub(crate) fn new(origin: u64, window: Option<TrimRange>) -> Self {
        Self {
            position: origin,
            window,
        }
    }

    pub(crate) fn apply(&mut self, mut plain: Vec<u8>) -> Vec<u8> {
        let start = self.position;
        let end = start + plain.len() as u64;
        self.position = end;

        let window = match self.window {
            None => return plain,
            Some(w) => w,
        };

        let lo = window.start.clamp(start, end);
        let hi = window.end.clamp(start, end);

        if lo >= hi {
            return Vec::new();
        }

        plain.truncate((hi - start) as usize);
        plain.drain(..(lo - start) as usize);
        plain
    }
}

fn emit(out: &mut VecDeque<Vec<u8>>, chunk: Vec<u8>) {
    if !chunk.is_empty() {
        out.push_back(chunk);
    }
}

/// The cipher stage of one get-operation.
#[derive(Debug)]
pub enum CipherTransform {
    /// Decrypt and release immediately.
    Streaming(StreamingTransform),
    /// Decrypt and release after authentication.
    Buffered(BufferedTransform),
}

impl CipherTransform {
    /// Whether plaintext under `suite` may be released before the whole object is authenticated.
    pub fn releases_early(suite: AlgorithmSuite, config: &PipelineConfig) -> bool {
        !suite.is_authenticated() || config.enable_delayed_authentication
    }

    /// Build the transform for a response.
    ///
    /// Consumes the materials, so the data key is wiped once the cipher holds it.
    /// `plaintext_length` is the writer's advertised content length, used to find the end of the
    /// plaintext when a ranged response does not state the object length.
    pub fn new(
        materials: DecryptionMaterials,
        content_iv: &[u8],
        plaintext_length: Option<u64>,
        response: &GetObjectResponse,
        config: &PipelineConfig,
    ) -> Result<Self, Error> {
        let DecryptionMaterials {
            plaintext_data_key: key,
            algorithm_suite: suite,
            content_range,
            ..
        } = materials;

        if key.len() != DATA_KEY_SIZE {
            return Err(Error::Symmetric(format!(
                "expected a {DATA_KEY_SIZE} byte data key, got {}",
                key.len()
            )));
        }

        let span = FetchedSpan::from_response(response, suite, plaintext_length)?;
        let trim = RangePlan::new(content_range.as_deref())
            .desired
            .map(|desired| TrimRange::new(desired, &span, suite));

        if Self::releases_early(suite, config) {
            if suite.is_authenticated() {
                warn!("delayed authentication: releasing plaintext before the tag is verified");
            }
            debug!("streaming {} transform, span {span:?}, trim {trim:?}", suite.cipher_name());

            StreamingTransform::new(suite, &key, content_iv, &span, trim).map(Self::Streaming)
        } else {
            debug!("buffered {} transform, span {span:?}", suite.cipher_name());

            BufferedTransform::new(
                &key,
                content_iv,
                response.content_length,
                config.effective_buffer_size(),
                trim,
            )
            .map(Self::Buffered)
        }
    }

    /// Consume a ciphertext chunk, queueing zero or more plaintext chunks.
    pub fn update(&mut self, chunk: &[u8], out: &mut VecDeque<Vec<u8>>) -> Result<(), Error> {
        match self {
            Self::Streaming(t) => t.update(chunk, out),
            Self::Buffered(t) => t.update(chunk, out),
        }
    }

    /// Signal the end of the ciphertext, queueing the remaining plaintext.
    pub fn finish(self, out: &mut VecDeque<Vec<u8>>) -> Result<(), Error> {
        match self {
            Self::Streaming(t) => t.finish(out),
            Self::Buffered(t) => t.finish(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::TrimRange;
    use crate::test::{encrypt, TestSetup};
    use rand::RngCore;
    use std::collections::BTreeMap;
    use zeroize::Zeroizing;

    fn materials(key: &[u8], suite: AlgorithmSuite, range: Option<&str>) -> DecryptionMaterials {
        DecryptionMaterials {
            plaintext_data_key: Zeroizing::new(key.to_vec()),
            algorithm_suite: suite,
            encryption_context: BTreeMap::new(),
            ciphertext_length: None,
            content_range: range.map(str::to_string),
        }
    }

    fn run(mut t: CipherTransform, ct: &[u8], chunk: usize) -> Result<Vec<Vec<u8>>, Error> {
        let mut out = VecDeque::new();
        for c in ct.chunks(chunk) {
            t.update(c, &mut out)?;
        }
        t.finish(&mut out)?;
        Ok(out.into_iter().collect())
    }

    #[test]
    fn test_trimmer_across_chunks() {
        let mut t = Trimmer::new(0, Some(TrimRange { start: 5, end: 12 }));
        assert_eq!(t.apply(vec![0, 1, 2, 3]), Vec::<u8>::new());
        assert_eq!(t.apply(vec![4, 5, 6, 7]), vec![5, 6, 7]);
        assert_eq!(t.apply(vec![8, 9, 10, 11, 12, 13]), vec![8, 9, 10, 11]);
        assert_eq!(t.apply(vec![14]), Vec::<u8>::new());

        let mut t = Trimmer::new(176, Some(TrimRange { start: 190, end: 200 }));
        assert_eq!(t.apply((176..200).collect()), (190..200).collect::<Vec<u8>>());

        let mut t = Trimmer::new(3, None);
        assert_eq!(t.apply(vec![1, 2]), vec![1, 2]);
    }

    #[test]
    fn test_selection() {
        let default = PipelineConfig::default();
        let delayed = PipelineConfig::default().with_delayed_authentication(true);

        assert!(!CipherTransform::releases_early(
            AlgorithmSuite::Aes256GcmIv12Tag16NoKdf,
            &default
        ));
        assert!(CipherTransform::releases_early(
            AlgorithmSuite::Aes256GcmIv12Tag16NoKdf,
            &delayed
        ));
        assert!(CipherTransform::releases_early(
            AlgorithmSuite::Aes256CbcIv16NoKdf,
            &default
        ));
        assert!(CipherTransform::releases_early(
            AlgorithmSuite::Aes256CtrIv16Tag16NoKdf,
            &default
        ));
    }

    #[test]
    fn test_gcm_buffered_keeps_chunking() {
        let mut rng = rand::thread_rng();
        let setup = TestSetup::new(&mut rng);
        let mut plain = vec![0u8; 1000];
        rng.fill_bytes(&mut plain);

        let (ct, iv) = encrypt(
            AlgorithmSuite::Aes256GcmIv12Tag16NoKdf,
            &setup.data_key,
            &plain,
            &mut rng,
        );
        let response = GetObjectResponse {
            content_length: Some(ct.len() as u64),
            ..Default::default()
        };

        let t = CipherTransform::new(
            materials(&setup.data_key, AlgorithmSuite::Aes256GcmIv12Tag16NoKdf, None),
            &iv,
            None,
            &response,
            &PipelineConfig::default(),
        )
        .unwrap();
        assert!(matches!(t, CipherTransform::Buffered(_)));

        let chunks = run(t, &ct, 300).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![300, 300, 300, 100]);
        assert_eq!(chunks.concat(), plain);
    }

    #[test]
    fn test_gcm_delayed_auth_matches_buffered() {
        let mut rng = rand::thread_rng();
        let setup = TestSetup::new(&mut rng);

        for len in [0usize, 1, 15, 16, 17, 255, 4096] {
            let mut plain = vec![0u8; len];
            rng.fill_bytes(&mut plain);

            let (ct, iv) = encrypt(
                AlgorithmSuite::Aes256GcmIv12Tag16NoKdf,
                &setup.data_key,
                &plain,
                &mut rng,
            );
            let response = GetObjectResponse {
                content_length: Some(ct.len() as u64),
                ..Default::default()
            };

            for chunk in [1, 7, 16, 64] {
                let t = CipherTransform::new(
                    materials(&setup.data_key, AlgorithmSuite::Aes256GcmIv12Tag16NoKdf, None),
                    &iv,
                    None,
                    &response,
                    &PipelineConfig::default().with_delayed_authentication(true),
                )
                .unwrap();
                assert!(matches!(t, CipherTransform::Streaming(_)));

                assert_eq!(run(t, &ct, chunk).unwrap().concat(), plain);
            }
        }
    }

    #[test]
    fn test_gcm_tag_mismatch() {
        let mut rng = rand::thread_rng();
        let setup = TestSetup::new(&mut rng);
        let plain = vec![42u8; 100];

        let (mut ct, iv) = encrypt(
            AlgorithmSuite::Aes256GcmIv12Tag16NoKdf,
            &setup.data_key,
            &plain,
            &mut rng,
        );
        let len = ct.len();
        ct[len - 5] = !ct[len - 5];

        let response = GetObjectResponse {
            content_length: Some(len as u64),
            ..Default::default()
        };

        for config in [
            PipelineConfig::default(),
            PipelineConfig::default().with_delayed_authentication(true),
        ] {
            let t = CipherTransform::new(
                materials(&setup.data_key, AlgorithmSuite::Aes256GcmIv12Tag16NoKdf, None),
                &iv,
                None,
                &response,
                &config,
            )
            .unwrap();

            assert!(matches!(run(t, &ct, 32), Err(Error::Authentication)));
        }
    }

    #[test]
    fn test_buffered_never_releases_before_tag() {
        let mut rng = rand::thread_rng();
        let setup = TestSetup::new(&mut rng);
        let plain = vec![1u8; 512];

        let (ct, iv) = encrypt(
            AlgorithmSuite::Aes256GcmIv12Tag16NoKdf,
            &setup.data_key,
            &plain,
            &mut rng,
        );
        let response = GetObjectResponse {
            content_length: Some(ct.len() as u64),
            ..Default::default()
        };

        let mut t = CipherTransform::new(
            materials(&setup.data_key, AlgorithmSuite::Aes256GcmIv12Tag16NoKdf, None),
            &iv,
            None,
            &response,
            &PipelineConfig::default(),
        )
        .unwrap();

        let mut out = VecDeque::new();
        for c in ct.chunks(64) {
            t.update(c, &mut out).unwrap();
            assert!(out.is_empty());
        }
        t.finish(&mut out).unwrap();
        assert_eq!(out.len(), plain.len() / 64);
    }

    #[test]
    fn test_buffered_rejects_large_or_unknown_length() {
        let key = [0u8; DATA_KEY_SIZE];
        let iv = [0u8; 12];
        let suite = AlgorithmSuite::Aes256GcmIv12Tag16NoKdf;
        let config = PipelineConfig::default().with_buffer_size(1024);

        let too_large = GetObjectResponse {
            content_length: Some(1025),
            ..Default::default()
        };
        let res =
            CipherTransform::new(materials(&key, suite, None), &iv, None, &too_large, &config);
        assert!(matches!(res, Err(Error::ConfigurationRejected(_))));

        let unknown = GetObjectResponse::default();
        let res = CipherTransform::new(materials(&key, suite, None), &iv, None, &unknown, &config);
        assert!(matches!(res, Err(Error::ConfigurationRejected(_))));

        let fits = GetObjectResponse {
            content_length: Some(1024),
            ..Default::default()
        };
        let mut t =
            CipherTransform::new(materials(&key, suite, None), &iv, None, &fits, &config).unwrap();

        // A transport that sends more than it announced cannot grow the buffer past the limit.
        let mut out = VecDeque::new();
        t.update(&[0u8; 1024], &mut out).unwrap();
        assert!(matches!(
            t.update(&[0u8; 1], &mut out),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_rejects_short_key() {
        let response = GetObjectResponse::default();
        let res = CipherTransform::new(
            materials(&[0u8; 16], AlgorithmSuite::Aes256CbcIv16NoKdf, None),
            &[0u8; 16],
            None,
            &response,
            &PipelineConfig::default(),
        );
        assert!(matches!(res, Err(Error::Symmetric(_))));
    }
}

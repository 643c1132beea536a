//! # objcrypt core library
#![deny(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! Client-side decryption of envelope-encrypted objects kept in a remote object store.
//!
//! Every object is encrypted under its own data key. The data key is wrapped by a key provider
//! and stored next to the object, together with the content IV and the name of the content
//! cipher, either:
//!
//! * embedded in the object's own metadata, or
//! * in a separate _instruction file_ stored under `<key>.instruction`.
//!
//! The [`pipeline::Pipeline`] fetches the object, resolves this metadata, asks a
//! [`materials::MaterialsManager`] for the plaintext data key and decrypts the body while it
//! streams in.
//!
//! ## Algorithm suites
//!
//! Three generations of content encryption are supported, see [`suite::AlgorithmSuite`]:
//!
//! * AES-256-GCM (current, authenticated),
//! * AES-256-CBC with PKCS#7 padding (legacy, unauthenticated),
//! * AES-256-CTR, the read-side view of a GCM object that is fetched with a byte range
//!   (legacy, unauthenticated: the tag cannot be checked on a partial object).
//!
//! Legacy suites and ranged reads are refused unless
//! [`config::PipelineConfig::enable_legacy_unauthenticated_modes`] is set.
//!
//! ## Buffered vs. streaming release
//!
//! By default plaintext of an authenticated object is withheld until the GCM tag over the whole
//! object has been verified. The object is held in memory for this, up to
//! [`config::PipelineConfig::buffer_size`] bytes. Callers that need to stream objects larger than
//! that can opt into _delayed authentication_: plaintext is released as it is decrypted and the tag
//! is only checked at the end of the stream. A tag failure then still fails the stream, but bytes
//! that were already released cannot be taken back.
//!
//! ## Example
//!
//! ```
//! use objcrypt_core::config::PipelineConfig;
//! use objcrypt_core::consumer::ToBytes;
//! use objcrypt_core::store::GetObjectRequest;
//! use objcrypt_core::suite::AlgorithmSuite;
//! use objcrypt_core::test::TestSetup;
//! # use objcrypt_core::error::Error;
//!
//! # fn main() -> Result<(), Error> {
//! let mut rng = rand::thread_rng();
//! let setup = TestSetup::new(&mut rng);
//! setup.put("report.txt", AlgorithmSuite::Aes256GcmIv12Tag16NoKdf, b"SECRET DATA", &mut rng);
//!
//! let pipeline = setup.pipeline(PipelineConfig::default())?;
//! let request = GetObjectRequest::new("bucket", "report.txt");
//!
//! let plain = futures::executor::block_on(pipeline.get_object_with(request, ToBytes::new()))?;
//! assert_eq!(plain.as_bytes(), b"SECRET DATA");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consts;
pub mod consumer;
pub mod error;
pub mod materials;
pub mod metadata;
pub mod pipeline;
pub mod range;
pub mod store;
pub mod suite;
pub mod transform;

#[doc(hidden)]
pub use consts::*;

#[doc(hidden)]
pub mod test;

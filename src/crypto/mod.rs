//! The cryptographic envelope: session-key derivation, symmetric cipher and
//! MAC application, host-key verification and client-authentication signing.
//!
//! Corresponds to component **B** of the system overview: everything needed
//! to turn a raw key-exchange secret into the two keyed pipelines
//! ([`cipher`] + [`mac`]) that every packet after `NEWKEYS` flows through.

pub mod algorithms;
pub mod cipher;
pub mod hostkey;
pub mod kex;
pub mod mac;
pub mod privkey;

mod derive;
pub use derive::derive_key;

use thiserror::Error;

/// Errors produced by the cryptographic envelope.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The negotiated algorithm name is not one this crate implements.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A MAC check failed on an inbound packet.
    #[error("MAC verification failed")]
    MacMismatch,

    /// A cipher operation was given a buffer not aligned to its block size.
    #[error("ciphertext length {0} is not a multiple of the cipher block size")]
    Unaligned(usize),

    /// The host key presented by the server could not be parsed.
    #[error("malformed host key: {0}")]
    MalformedKey(String),

    /// Signature verification of the exchange hash, or of a server reply, failed.
    #[error("signature verification failed")]
    BadSignature,

    /// A private key parameter required to be non-zero was zero.
    #[error("private key contains a zero parameter")]
    ZeroParameter,

    /// Failure decoding a PEM/PKCS#8 private key file.
    #[error("failed to decode private key: {0}")]
    KeyDecode(String),

    /// The embedder's password callback returned no password for an encrypted key.
    #[error("private key is encrypted and no password was supplied")]
    NoPassword,
}

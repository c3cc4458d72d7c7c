//! Message-authentication-code selection and application, per RFC 4253 §6.4.

use hmac::{Hmac, Mac as _};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use super::CryptoError;

/// The MAC algorithms this crate negotiates and implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// `hmac-sha1`.
    HmacSha1,
    /// `hmac-sha2-256`.
    HmacSha256,
    /// `hmac-sha2-384`.
    HmacSha384,
    /// `hmac-sha2-512`.
    HmacSha512,
}

impl Algorithm {
    /// Algorithm names, in the client's preference order.
    pub const PREFERENCE: &'static [Self] = &[
        Self::HmacSha512,
        Self::HmacSha384,
        Self::HmacSha256,
        Self::HmacSha1,
    ];

    /// Parse an algorithm from its SSH wire name.
    pub fn from_name(name: &str) -> Result<Self, CryptoError> {
        Ok(match name {
            "hmac-sha1" => Self::HmacSha1,
            "hmac-sha2-256" => Self::HmacSha256,
            "hmac-sha2-384" => Self::HmacSha384,
            "hmac-sha2-512" => Self::HmacSha512,
            other => return Err(CryptoError::UnsupportedAlgorithm(other.into())),
        })
    }

    /// The SSH wire name for this algorithm.
    pub fn name(self) -> &'static str {
        match self {
            Self::HmacSha1 => "hmac-sha1",
            Self::HmacSha256 => "hmac-sha2-256",
            Self::HmacSha384 => "hmac-sha2-384",
            Self::HmacSha512 => "hmac-sha2-512",
        }
    }

    /// Key (and digest) length in bytes, as derived via [`super::derive_key`].
    pub fn key_len(self) -> usize {
        match self {
            Self::HmacSha1 => 20,
            Self::HmacSha256 => 32,
            Self::HmacSha384 => 48,
            Self::HmacSha512 => 64,
        }
    }
}

/// A keyed MAC instance bound to one direction of one connection.
pub enum Mac {
    /// No MAC is applied; used before the first `NEWKEYS`, where the integrity
    /// check is absent by protocol design.
    None,
    Sha1(Box<Hmac<Sha1>>),
    Sha256(Box<Hmac<Sha256>>),
    Sha384(Box<Hmac<Sha384>>),
    Sha512(Box<Hmac<Sha512>>),
}

impl Mac {
    /// No MAC, used before the first key exchange completes.
    pub fn identity() -> Self {
        Self::None
    }

    /// Build a [`Mac`] from the negotiated `algorithm` and a freshly derived `key`.
    pub fn new(algorithm: Algorithm, key: &[u8]) -> Result<Self, CryptoError> {
        Ok(match algorithm {
            Algorithm::HmacSha1 => Self::Sha1(Box::new(
                Hmac::new_from_slice(key).expect("HMAC accepts keys of any length"),
            )),
            Algorithm::HmacSha256 => Self::Sha256(Box::new(
                Hmac::new_from_slice(key).expect("HMAC accepts keys of any length"),
            )),
            Algorithm::HmacSha384 => Self::Sha384(Box::new(
                Hmac::new_from_slice(key).expect("HMAC accepts keys of any length"),
            )),
            Algorithm::HmacSha512 => Self::Sha512(Box::new(
                Hmac::new_from_slice(key).expect("HMAC accepts keys of any length"),
            )),
        })
    }

    /// Digest length in bytes (0 for the identity MAC).
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Sha1(_) => 20,
            Self::Sha256(_) => 32,
            Self::Sha384(_) => 48,
            Self::Sha512(_) => 64,
        }
    }

    /// Whether this MAC produces no digest bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute `MAC(key, seq_no || unencrypted_packet)`.
    pub fn compute(&self, seq_no: u32, packet: &[u8]) -> Vec<u8> {
        match self {
            Self::None => Vec::new(),
            Self::Sha1(mac) => compute_with(mac.as_ref(), seq_no, packet),
            Self::Sha256(mac) => compute_with(mac.as_ref(), seq_no, packet),
            Self::Sha384(mac) => compute_with(mac.as_ref(), seq_no, packet),
            Self::Sha512(mac) => compute_with(mac.as_ref(), seq_no, packet),
        }
    }

    /// Verify `tag` against `MAC(key, seq_no || unencrypted_packet)` in constant time.
    pub fn verify(&self, seq_no: u32, packet: &[u8], tag: &[u8]) -> Result<(), CryptoError> {
        if self.is_empty() {
            return if tag.is_empty() {
                Ok(())
            } else {
                Err(CryptoError::MacMismatch)
            };
        }

        let expected = self.compute(seq_no, packet);
        let matches = expected.len() == tag.len()
            && expected
                .iter()
                .zip(tag)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0;

        if matches {
            Ok(())
        } else {
            Err(CryptoError::MacMismatch)
        }
    }
}

fn compute_with<M: hmac::Mac + Clone>(mac: &M, seq_no: u32, packet: &[u8]) -> Vec<u8> {
    let mut mac = mac.clone();
    mac.update(&seq_no.to_be_bytes());
    mac.update(packet);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Algorithm::HmacSha1, 20)]
    #[case(Algorithm::HmacSha256, 32)]
    #[case(Algorithm::HmacSha384, 48)]
    #[case(Algorithm::HmacSha512, 64)]
    fn it_verifies_a_tag_it_computed(#[case] algorithm: Algorithm, #[case] key_len: usize) {
        let key = vec![0x42u8; key_len];
        let mac = Mac::new(algorithm, &key).expect("fixed-size key");

        let tag = mac.compute(7, b"some packet body");
        assert_eq!(tag.len(), mac.len());
        assert!(mac.verify(7, b"some packet body", &tag).is_ok());
    }

    #[test]
    fn it_rejects_a_tampered_packet() {
        let mac = Mac::new(Algorithm::HmacSha256, &[0x11; 32]).expect("fixed-size key");

        let tag = mac.compute(0, b"payload");
        assert!(mac.verify(0, b"tampered", &tag).is_err());
        assert!(mac.verify(1, b"payload", &tag).is_err());
    }

    #[test]
    fn identity_mac_accepts_only_an_empty_tag() {
        let mac = Mac::identity();

        assert!(mac.verify(0, b"anything", &[]).is_ok());
        assert!(mac.verify(0, b"anything", &[0]).is_err());
    }

    #[test]
    fn round_trips_every_algorithm_name() {
        for algorithm in Algorithm::PREFERENCE {
            assert_eq!(Algorithm::from_name(algorithm.name()).unwrap(), *algorithm);
        }
    }
}

//! Symmetric cipher selection and application, per RFC 4253 §6.3.
//!
//! Each connection holds two independent [`Cipher`] instances: one for the
//! client→server direction (`encrypt`) and one for server→client (`decrypt`).
//! Both are the identity transform until the first `NEWKEYS`.

use aes::{Aes128, Aes192, Aes256};
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher as _, generic_array::GenericArray};
use des::TdesEde3;

use super::CryptoError;

/// The symmetric cipher algorithms this crate negotiates and implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// `aes128-cbc`.
    Aes128Cbc,
    /// `aes128-ctr`.
    Aes128Ctr,
    /// `aes192-ctr`.
    Aes192Ctr,
    /// `aes256-ctr`.
    Aes256Ctr,
    /// `3des-cbc`.
    TDesCbc,
    /// `3des-ctr`.
    TDesCtr,
}

impl Algorithm {
    /// Algorithm names, in the client's preference order.
    pub const PREFERENCE: &'static [Self] = &[
        Self::Aes256Ctr,
        Self::Aes192Ctr,
        Self::Aes128Ctr,
        Self::Aes128Cbc,
        Self::TDesCtr,
        Self::TDesCbc,
    ];

    /// Parse an algorithm from its SSH wire name.
    pub fn from_name(name: &str) -> Result<Self, CryptoError> {
        Ok(match name {
            "aes128-cbc" => Self::Aes128Cbc,
            "aes128-ctr" => Self::Aes128Ctr,
            "aes192-ctr" => Self::Aes192Ctr,
            "aes256-ctr" => Self::Aes256Ctr,
            "3des-cbc" => Self::TDesCbc,
            "3des-ctr" => Self::TDesCtr,
            other => return Err(CryptoError::UnsupportedAlgorithm(other.into())),
        })
    }

    /// The SSH wire name for this algorithm.
    pub fn name(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "aes128-cbc",
            Self::Aes128Ctr => "aes128-ctr",
            Self::Aes192Ctr => "aes192-ctr",
            Self::Aes256Ctr => "aes256-ctr",
            Self::TDesCbc => "3des-cbc",
            Self::TDesCtr => "3des-ctr",
        }
    }

    /// Cipher block size in bytes; the packet codec rounds padding up to
    /// `max(block_size, 8)`.
    pub fn block_size(self) -> usize {
        match self {
            Self::TDesCbc | Self::TDesCtr => 8,
            _ => 16,
        }
    }

    /// Key length in bytes, as derived via [`super::derive_key`].
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Ctr => 16,
            Self::Aes192Ctr => 24,
            Self::Aes256Ctr => 32,
            Self::TDesCbc | Self::TDesCtr => 24,
        }
    }

    /// IV length in bytes, equal to the block size for every algorithm here.
    pub fn iv_len(self) -> usize {
        self.block_size()
    }
}

/// A keyed, stateful cipher instance bound to one direction of one connection.
///
/// Constructed once per key exchange (initial or re-key) from freshly derived
/// key and IV material, then fed one packet body at a time: CBC and CTR modes
/// both carry internal chaining state across calls, exactly as RFC 4253 requires.
pub enum Cipher {
    /// Identity transform used before the first `NEWKEYS`.
    None,
    Aes128CbcEnc(Box<cbc::Encryptor<Aes128>>),
    Aes128CbcDec(Box<cbc::Decryptor<Aes128>>),
    TDesCbcEnc(Box<cbc::Encryptor<TdesEde3>>),
    TDesCbcDec(Box<cbc::Decryptor<TdesEde3>>),
    Aes128Ctr(Box<ctr::Ctr128BE<Aes128>>),
    Aes192Ctr(Box<ctr::Ctr128BE<Aes192>>),
    Aes256Ctr(Box<ctr::Ctr128BE<Aes256>>),
    TDesCtr(Box<ctr::Ctr64BE<TdesEde3>>),
}

impl Cipher {
    /// The identity cipher, used before any key exchange has completed.
    pub fn identity() -> Self {
        Self::None
    }

    /// Construct the encrypting half of `algorithm` from `key` and `iv`.
    pub fn for_encryption(algorithm: Algorithm, key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        Ok(match algorithm {
            Algorithm::Aes128Cbc => Self::Aes128CbcEnc(Box::new(cbc::Encryptor::new(key.into(), iv.into()))),
            Algorithm::TDesCbc => Self::TDesCbcEnc(Box::new(cbc::Encryptor::new(key.into(), iv.into()))),
            Algorithm::Aes128Ctr => Self::Aes128Ctr(Box::new(ctr::Ctr128BE::new(key.into(), iv.into()))),
            Algorithm::Aes192Ctr => Self::Aes192Ctr(Box::new(ctr::Ctr128BE::new(key.into(), iv.into()))),
            Algorithm::Aes256Ctr => Self::Aes256Ctr(Box::new(ctr::Ctr128BE::new(key.into(), iv.into()))),
            Algorithm::TDesCtr => Self::TDesCtr(Box::new(ctr::Ctr64BE::new(key.into(), iv.into()))),
        })
    }

    /// Construct the decrypting half of `algorithm` from `key` and `iv`.
    pub fn for_decryption(algorithm: Algorithm, key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        Ok(match algorithm {
            Algorithm::Aes128Cbc => Self::Aes128CbcDec(Box::new(cbc::Decryptor::new(key.into(), iv.into()))),
            Algorithm::TDesCbc => Self::TDesCbcDec(Box::new(cbc::Decryptor::new(key.into(), iv.into()))),
            // Stream-cipher modes are direction-agnostic: the same keystream
            // generator both encrypts and decrypts.
            _ => Self::for_encryption(algorithm, key, iv)?,
        })
    }

    /// Block size in bytes of the underlying algorithm, or `8` for the identity cipher.
    pub fn block_size(&self) -> usize {
        match self {
            Self::None => 8,
            Self::Aes128CbcEnc(..)
            | Self::Aes128CbcDec(..)
            | Self::Aes128Ctr(..)
            | Self::Aes192Ctr(..)
            | Self::Aes256Ctr(..) => 16,
            Self::TDesCbcEnc(..) | Self::TDesCbcDec(..) | Self::TDesCtr(..) => 8,
        }
    }

    /// Encrypt `data` in place. `data.len()` must already be a multiple of
    /// [`Cipher::block_size`] for block-mode (CBC) ciphers.
    pub fn encrypt(&mut self, data: &mut [u8]) -> Result<(), CryptoError> {
        match self {
            Self::None => Ok(()),
            Self::Aes128CbcEnc(enc) => encrypt_blocks(enc.as_mut(), data, 16),
            Self::TDesCbcEnc(enc) => encrypt_blocks(enc.as_mut(), data, 8),
            Self::Aes128Ctr(s) => Ok(s.apply_keystream(data)),
            Self::Aes192Ctr(s) => Ok(s.apply_keystream(data)),
            Self::Aes256Ctr(s) => Ok(s.apply_keystream(data)),
            Self::TDesCtr(s) => Ok(s.apply_keystream(data)),
            Self::Aes128CbcDec(_) | Self::TDesCbcDec(_) => {
                panic!("a CBC decryptor was used to encrypt; construct a Cipher::for_encryption instead")
            }
        }
    }

    /// Decrypt `data` in place.
    pub fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CryptoError> {
        match self {
            Self::None => Ok(()),
            Self::Aes128CbcDec(dec) => decrypt_blocks(dec.as_mut(), data, 16),
            Self::TDesCbcDec(dec) => decrypt_blocks(dec.as_mut(), data, 8),
            // CTR mode is its own inverse.
            Self::Aes128Ctr(s) => Ok(s.apply_keystream(data)),
            Self::Aes192Ctr(s) => Ok(s.apply_keystream(data)),
            Self::Aes256Ctr(s) => Ok(s.apply_keystream(data)),
            Self::TDesCtr(s) => Ok(s.apply_keystream(data)),
            Self::Aes128CbcEnc(_) | Self::TDesCbcEnc(_) => {
                panic!("a CBC encryptor was used to decrypt; construct a Cipher::for_decryption instead")
            }
        }
    }
}

fn encrypt_blocks<C: BlockEncryptMut>(enc: &mut C, data: &mut [u8], block_size: usize) -> Result<(), CryptoError> {
    if data.len() % block_size != 0 {
        return Err(CryptoError::Unaligned(data.len()));
    }

    for chunk in data.chunks_mut(block_size) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }

    Ok(())
}

fn decrypt_blocks<C: BlockDecryptMut>(dec: &mut C, data: &mut [u8], block_size: usize) -> Result<(), CryptoError> {
    if data.len() % block_size != 0 {
        return Err(CryptoError::Unaligned(data.len()));
    }

    for chunk in data.chunks_mut(block_size) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Algorithm::Aes128Cbc)]
    #[case(Algorithm::Aes128Ctr)]
    #[case(Algorithm::Aes192Ctr)]
    #[case(Algorithm::Aes256Ctr)]
    #[case(Algorithm::TDesCbc)]
    #[case(Algorithm::TDesCtr)]
    fn encrypt_then_decrypt_recovers_the_plaintext(#[case] algorithm: Algorithm) {
        let key = vec![0x42; algorithm.key_len()];
        let iv = vec![0x24; algorithm.iv_len()];
        let plaintext = vec![0xAB; algorithm.block_size() * 4];

        let mut ciphertext = plaintext.clone();
        Cipher::for_encryption(algorithm, &key, &iv)
            .unwrap()
            .encrypt(&mut ciphertext)
            .unwrap();
        assert_ne!(ciphertext, plaintext);

        let mut recovered = ciphertext.clone();
        Cipher::for_decryption(algorithm, &key, &iv)
            .unwrap()
            .decrypt(&mut recovered)
            .unwrap();

        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn cbc_rejects_unaligned_input() {
        let key = vec![0; Algorithm::Aes128Cbc.key_len()];
        let iv = vec![0; Algorithm::Aes128Cbc.iv_len()];
        let mut data = vec![0u8; 17];

        let err = Cipher::for_encryption(Algorithm::Aes128Cbc, &key, &iv)
            .unwrap()
            .encrypt(&mut data);

        assert!(matches!(err, Err(CryptoError::Unaligned(17))));
    }

    #[test]
    fn identity_cipher_is_a_noop() {
        let mut data = vec![1, 2, 3, 4];
        let original = data.clone();

        Cipher::identity().encrypt(&mut data).unwrap();
        assert_eq!(data, original);

        Cipher::identity().decrypt(&mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn from_name_roundtrips_through_name() {
        for algorithm in Algorithm::PREFERENCE {
            assert_eq!(Algorithm::from_name(algorithm.name()).unwrap(), *algorithm);
        }
    }

    #[test]
    fn from_name_rejects_unknown_algorithms() {
        assert!(Algorithm::from_name("blowfish-cbc").is_err());
    }
}

//! Client private-key loading (PKCS#8 PEM and legacy OpenSSL/OpenSSH PEM) and
//! `publickey` authentication signing, per RFC 4253 §6.6 / RFC 4252 §7.
//!
//! Grounded on `sshcryptofacility.cpp`'s `SshEncryptionFacility`: PKCS#8 is
//! tried first, falling back to the legacy `-----BEGIN RSA|DSA PRIVATE
//! KEY-----` form (a bare DER `SEQUENCE` of integers) on failure.

use std::path::{Path, PathBuf};

use der::{Decode, asn1::UintRef};
use rsa::{RsaPrivateKey, pkcs1v15::SigningKey as RsaSigningKey, signature::SignatureEncoding, traits::PublicKeyParts};
use sha1::Sha1;

use crate::{arch, sig};

use super::CryptoError;

/// A parsed client authentication key, either RSA or DSA.
enum KeyMaterial {
    Rsa(RsaPrivateKey),
    Dsa(dsa::SigningKey),
}

/// A loaded private key, cached by the raw file contents it was parsed from
/// so repeated signing operations within one connection need not re-parse
/// (mirrors `SshEncryptionFacility::m_cachedPrivKeyContents`).
pub struct AuthKey {
    path: PathBuf,
    raw: Vec<u8>,
    material: KeyMaterial,
}

/// A callback the embedder supplies to retrieve a password for an
/// encrypted PKCS#8 private key, per the §6 "Private-key password retriever" interface.
pub trait PasswordRetriever {
    /// Return a password, or `None` if the user declined to provide one.
    fn get_password(&mut self) -> Option<String>;
}

impl AuthKey {
    /// Load and parse the private key at `path`, trying PKCS#8 PEM first and
    /// falling back to the legacy OpenSSL/OpenSSH PEM form.
    pub fn load(path: impl AsRef<Path>, password: &mut dyn PasswordRetriever) -> Result<Self, CryptoError> {
        let path = path.as_ref().to_path_buf();
        let raw = std::fs::read(&path).map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        let material = Self::from_pkcs8(&raw, password)
            .or_else(|_| Self::from_legacy_pem(&raw))?;

        Ok(Self { path, raw, material })
    }

    /// Re-use an already-loaded key if `path`/`raw` match the cached contents,
    /// otherwise load fresh. Named after, but simplifying, the original's
    /// content-keyed cache.
    pub fn load_cached(
        cached: Option<&AuthKey>,
        path: impl AsRef<Path>,
        password: &mut dyn PasswordRetriever,
    ) -> Result<Self, CryptoError> {
        let path = path.as_ref();

        if let Some(cached) = cached {
            if cached.path == path {
                let raw = std::fs::read(path).map_err(|err| CryptoError::KeyDecode(err.to_string()))?;
                if raw == cached.raw {
                    return Self::load(path, password);
                }
            }
        }

        Self::load(path, password)
    }

    fn from_pkcs8(raw: &[u8], password: &mut dyn PasswordRetriever) -> Result<KeyMaterial, CryptoError> {
        use pkcs8::DecodePrivateKey;

        let text = std::str::from_utf8(raw).map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        if text.contains("ENCRYPTED") {
            let pw = password.get_password().ok_or(CryptoError::NoPassword)?;
            let key = RsaPrivateKey::from_pkcs8_encrypted_pem(text, pw.as_bytes())
                .map_err(|err| CryptoError::KeyDecode(err.to_string()))?;
            return Ok(KeyMaterial::Rsa(key));
        }

        RsaPrivateKey::from_pkcs8_pem(text)
            .map(KeyMaterial::Rsa)
            .map_err(|err| CryptoError::KeyDecode(err.to_string()))
    }

    /// Parse the legacy `-----BEGIN RSA|DSA PRIVATE KEY-----` form: a bare DER
    /// `SEQUENCE` of integers, `version` first (must be `0`), then the key's
    /// numeric parameters in RFC-order.
    fn from_legacy_pem(raw: &[u8]) -> Result<KeyMaterial, CryptoError> {
        let text = std::str::from_utf8(raw).map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        let (label, der) = pem_rfc7468::decode_vec(text.as_bytes())
            .map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        let label = label.as_str_or(String::new);

        match &*label.unwrap_or_default() {
            "RSA PRIVATE KEY" => Self::rsa_from_der(&der),
            "DSA PRIVATE KEY" => Self::dsa_from_der(&der),
            other => Err(CryptoError::KeyDecode(format!("unsupported PEM label: {other}"))),
        }
    }

    fn rsa_from_der(der: &[u8]) -> Result<KeyMaterial, CryptoError> {
        // SEQUENCE { version(0) INTEGER n, e, d, p, q, ... }
        let seq = der::asn1::SequenceOf::<UintRef, 8>::from_der(der)
            .map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        let fields: Vec<&UintRef> = seq.iter().collect();
        let [version, n, e, d, p, q, ..] = fields[..] else {
            return Err(CryptoError::KeyDecode("RSA key is missing fields".into()));
        };

        if version.as_bytes() != [0] {
            return Err(CryptoError::KeyDecode("unexpected RSA key version".into()));
        }

        for field in [n, e, d, p, q] {
            if field.as_bytes().iter().all(|&b| b == 0) {
                return Err(CryptoError::ZeroParameter);
            }
        }

        let key = RsaPrivateKey::from_components(
            rsa::BigUint::from_bytes_be(n.as_bytes()),
            rsa::BigUint::from_bytes_be(e.as_bytes()),
            rsa::BigUint::from_bytes_be(d.as_bytes()),
            vec![
                rsa::BigUint::from_bytes_be(p.as_bytes()),
                rsa::BigUint::from_bytes_be(q.as_bytes()),
            ],
        )
        .map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        Ok(KeyMaterial::Rsa(key))
    }

    fn dsa_from_der(der: &[u8]) -> Result<KeyMaterial, CryptoError> {
        // SEQUENCE { version(0) INTEGER p, q, g, y, x }
        let seq = der::asn1::SequenceOf::<UintRef, 6>::from_der(der)
            .map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        let fields: Vec<&UintRef> = seq.iter().collect();
        let [version, p, q, g, y, x] = fields[..] else {
            return Err(CryptoError::KeyDecode("DSA key is missing fields".into()));
        };

        if version.as_bytes() != [0] {
            return Err(CryptoError::KeyDecode("unexpected DSA key version".into()));
        }

        for field in [p, q, g, y, x] {
            if field.as_bytes().iter().all(|&b| b == 0) {
                return Err(CryptoError::ZeroParameter);
            }
        }

        let components = dsa::Components::from_components(
            dsa::BigUint::from_bytes_be(p.as_bytes()),
            dsa::BigUint::from_bytes_be(q.as_bytes()),
            dsa::BigUint::from_bytes_be(g.as_bytes()),
        )
        .map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        let public = dsa::VerifyingKey::from_components(components, dsa::BigUint::from_bytes_be(y.as_bytes()))
            .map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        let signing = dsa::SigningKey::from_components(public, dsa::BigUint::from_bytes_be(x.as_bytes()))
            .map_err(|err| CryptoError::KeyDecode(err.to_string()))?;

        Ok(KeyMaterial::Dsa(signing))
    }

    /// The public-key algorithm name advertised for this key (`ssh-rsa`/`ssh-dss`).
    pub fn algorithm_name(&self) -> &'static str {
        match self.material {
            KeyMaterial::Rsa(_) => "ssh-rsa",
            KeyMaterial::Dsa(_) => "ssh-dss",
        }
    }

    /// The RFC 4253 `string(name) || string(params...)` public key blob.
    pub fn public_blob(&self) -> Vec<u8> {
        match &self.material {
            KeyMaterial::Rsa(key) => {
                let mut buf = ssh_string(b"ssh-rsa");
                buf.extend(ssh_mpint(&key.e().to_bytes_be()));
                buf.extend(ssh_mpint(&key.n().to_bytes_be()));
                buf
            }
            KeyMaterial::Dsa(key) => {
                let components = key.verifying_key().components();
                let mut buf = ssh_string(b"ssh-dss");
                buf.extend(ssh_mpint(&components.p().to_bytes_be()));
                buf.extend(ssh_mpint(&components.q().to_bytes_be()));
                buf.extend(ssh_mpint(&components.g().to_bytes_be()));
                buf.extend(ssh_mpint(&key.verifying_key().y().to_bytes_be()));
                buf
            }
        }
    }

    /// Sign `session_id || userauth_request_payload` per RFC 4252 §7, returning
    /// the RFC 4253 `string(algo_name) || string(raw_signature)` blob.
    pub fn sign_auth_request(
        &self,
        session_id: &[u8],
        username: &str,
        service_name: &str,
    ) -> Vec<u8> {
        let payload = sig::Publickey {
            session_id: arch::Bytes::new(session_id.to_vec()),
            username: username.into(),
            service_name: service_name.into(),
            algorithm: arch::Bytes::new(self.algorithm_name().as_bytes().to_vec()),
            blob: arch::Bytes::new(self.public_blob()),
        };

        let raw_signature = match &self.material {
            KeyMaterial::Rsa(key) => {
                let signing_key = RsaSigningKey::<Sha1>::new(key.clone());
                payload.sign::<rsa::pkcs1v15::Signature, _>(&signing_key).to_vec()
            }
            KeyMaterial::Dsa(key) => payload
                .sign::<dsa::Signature, _>(key)
                .to_bytes()
                .to_vec(),
        };

        let mut blob = ssh_string(self.algorithm_name().as_bytes());
        blob.extend(ssh_string(&raw_signature));
        blob
    }
}

fn ssh_string(bytes: &[u8]) -> Vec<u8> {
    let mut buf = (bytes.len() as u32).to_be_bytes().to_vec();
    buf.extend_from_slice(bytes);
    buf
}

fn ssh_mpint(magnitude: &[u8]) -> Vec<u8> {
    ssh_string(arch::MpInt::from_unsigned_be(magnitude).as_bytes())
}

#[cfg(test)]
mod tests {
    use binrw::BinWrite;
    use pkcs8::EncodePrivateKey;

    use super::*;

    struct NoPassword;

    impl PasswordRetriever for NoPassword {
        fn get_password(&mut self) -> Option<String> {
            None
        }
    }

    #[test]
    fn pkcs8_rsa_key_loads_and_signs_a_verifiable_auth_request() {
        let rsa_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
        let pem = rsa_key.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();

        let material = AuthKey::from_pkcs8(pem.as_bytes(), &mut NoPassword).unwrap();
        let key = AuthKey {
            path: PathBuf::new(),
            raw: pem.as_bytes().to_vec(),
            material,
        };

        assert_eq!(key.algorithm_name(), "ssh-rsa");

        let session_id = b"session-id-bytes";
        let sig_blob = key.sign_auth_request(session_id, "alice", "ssh-connection");

        let payload = sig::Publickey {
            session_id: arch::Bytes::new(session_id.to_vec()),
            username: "alice".into(),
            service_name: "ssh-connection".into(),
            algorithm: arch::Bytes::new(key.algorithm_name().as_bytes().to_vec()),
            blob: arch::Bytes::new(key.public_blob()),
        };
        let mut buffer = Vec::new();
        payload.write(&mut std::io::Cursor::new(&mut buffer)).unwrap();

        super::super::hostkey::verify_host_signature(&key.public_blob(), &buffer, &sig_blob).unwrap();
    }

    #[test]
    fn tampered_message_fails_verification() {
        let rsa_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
        let pem = rsa_key.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();

        let material = AuthKey::from_pkcs8(pem.as_bytes(), &mut NoPassword).unwrap();
        let key = AuthKey {
            path: PathBuf::new(),
            raw: pem.as_bytes().to_vec(),
            material,
        };

        let sig_blob = key.sign_auth_request(b"session-a", "alice", "ssh-connection");

        let payload = sig::Publickey {
            session_id: arch::Bytes::new(b"session-b".to_vec()),
            username: "alice".into(),
            service_name: "ssh-connection".into(),
            algorithm: arch::Bytes::new(key.algorithm_name().as_bytes().to_vec()),
            blob: arch::Bytes::new(key.public_blob()),
        };
        let mut buffer = Vec::new();
        payload.write(&mut std::io::Cursor::new(&mut buffer)).unwrap();

        assert!(super::super::hostkey::verify_host_signature(&key.public_blob(), &buffer, &sig_blob).is_err());
    }

    #[test]
    fn from_pkcs8_rejects_non_utf8_non_pem_garbage() {
        assert!(AuthKey::from_pkcs8(&[0xff, 0xfe, 0x00, 0x01], &mut NoPassword).is_err());
    }
}

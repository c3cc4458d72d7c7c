//! Host-key blob parsing, server-signature verification and the
//! [`HostKeyDatabase`] collaborator interface (component B / §6).

use std::collections::HashMap;

use rsa::{pkcs1v15::VerifyingKey as RsaVerifyingKey, signature::Verifier};
use sha1::Sha1;

use super::CryptoError;

/// Host-key checking strictness, per the `hostKeyCheckingMode` connection option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckingMode {
    /// No verification is performed at all.
    None,
    /// A mismatch or a no-match both abort the connection.
    #[default]
    Strict,
    /// A no-match (first-ever connection to the host) is tolerated; a mismatch still aborts.
    AllowNoMatch,
    /// Both a no-match and a mismatch are tolerated.
    AllowMismatch,
}

/// The outcome of looking up a host's key in a [`HostKeyDatabase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The presented key matches the stored one for this host.
    Match,
    /// A key is stored for this host, but it differs from the one presented.
    Mismatch,
    /// No key is stored for this host.
    NoMatch,
}

impl CheckingMode {
    /// Whether `outcome` should abort the connection under this mode.
    pub fn rejects(self, outcome: Outcome) -> bool {
        match (self, outcome) {
            (Self::None, _) => false,
            (Self::Strict, Outcome::Match) => false,
            (Self::Strict, _) => true,
            (Self::AllowNoMatch, Outcome::Mismatch) => true,
            (Self::AllowNoMatch, _) => false,
            (Self::AllowMismatch, _) => false,
        }
    }
}

/// A collaborator interface mapping hosts to their known host-key blobs.
///
/// Implementations are supplied by the embedder; this crate never persists
/// host keys itself (per §6 "Persisted state. None mandated.").
pub trait HostKeyDatabase {
    /// Look up the stored key for `host`, comparing it against `key_blob`.
    fn matches(&self, host: &str, key_blob: &[u8]) -> Outcome;

    /// Record `key_blob` as the known key for `host`.
    fn insert(&mut self, host: &str, key_blob: Vec<u8>);
}

/// A simple in-memory [`HostKeyDatabase`], handy for tests and for embedders
/// who manage persistence themselves by snapshotting [`MemoryHostKeyDatabase::entries`].
#[derive(Debug, Default, Clone)]
pub struct MemoryHostKeyDatabase {
    known: HashMap<String, Vec<u8>>,
}

impl MemoryHostKeyDatabase {
    /// An empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a single host/key pair, e.g. when restoring persisted state.
    pub fn with_entry(mut self, host: impl Into<String>, key_blob: Vec<u8>) -> Self {
        self.known.insert(host.into(), key_blob);
        self
    }

    /// The current host → key-blob entries, for the embedder to persist.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.known.iter().map(|(h, k)| (h.as_str(), k.as_slice()))
    }
}

impl HostKeyDatabase for MemoryHostKeyDatabase {
    fn matches(&self, host: &str, key_blob: &[u8]) -> Outcome {
        match self.known.get(host) {
            Some(stored) if stored == key_blob => Outcome::Match,
            Some(_) => Outcome::Mismatch,
            None => Outcome::NoMatch,
        }
    }

    fn insert(&mut self, host: &str, key_blob: Vec<u8>) {
        self.known.insert(host.to_string(), key_blob);
    }
}

/// Verify `signature_blob` (the RFC 4253 `string(algo) || string(sig)` blob)
/// over `message` using the host key encoded in `key_blob`.
///
/// Supports `ssh-rsa` and `ssh-dss` host keys; other negotiated host-key
/// algorithms are rejected with [`CryptoError::UnsupportedAlgorithm`] (the
/// architecture supports adding further algorithms the same way
/// `crypto::kex` does).
pub fn verify_host_signature(key_blob: &[u8], message: &[u8], signature_blob: &[u8]) -> Result<(), CryptoError> {
    let (algo, key_body) = split_ssh_string(key_blob)
        .ok_or_else(|| CryptoError::MalformedKey("host key blob is truncated".into()))?;

    match std::str::from_utf8(algo) {
        Ok("ssh-rsa") => verify_rsa(key_body, message, signature_blob),
        Ok("ssh-dss") => verify_dss(key_body, message, signature_blob),
        Ok(other) => Err(CryptoError::UnsupportedAlgorithm(other.into())),
        Err(_) => Err(CryptoError::MalformedKey("host key algorithm name is not UTF-8".into())),
    }
}

fn verify_rsa(key_body: &[u8], message: &[u8], signature_blob: &[u8]) -> Result<(), CryptoError> {
    let (e, rest) = split_ssh_string(key_body).ok_or_else(|| CryptoError::MalformedKey("ssh-rsa key truncated".into()))?;
    let (n, _) = split_ssh_string(rest).ok_or_else(|| CryptoError::MalformedKey("ssh-rsa key truncated".into()))?;

    let key = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(n),
        rsa::BigUint::from_bytes_be(e),
    )
    .map_err(|err| CryptoError::MalformedKey(err.to_string()))?;

    let (sig_algo, sig_body) =
        split_ssh_string(signature_blob).ok_or_else(|| CryptoError::MalformedKey("signature blob truncated".into()))?;

    if sig_algo != b"ssh-rsa" {
        return Err(CryptoError::UnsupportedAlgorithm(
            String::from_utf8_lossy(sig_algo).into_owned(),
        ));
    }

    let verifying_key = RsaVerifyingKey::<Sha1>::new(key);
    let signature = sig_body
        .try_into()
        .map_err(|_| CryptoError::MalformedKey("RSA signature has the wrong length".into()))?;

    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::BadSignature)
}

/// `ssh-dss` host key blob: `string(p) string(q) string(g) string(y)`;
/// signature blob body is the fixed-size `r || s` pair (RFC 4253 §6.6), not
/// DER-encoded.
fn verify_dss(key_body: &[u8], message: &[u8], signature_blob: &[u8]) -> Result<(), CryptoError> {
    let (p, rest) = split_ssh_string(key_body).ok_or_else(|| CryptoError::MalformedKey("ssh-dss key truncated".into()))?;
    let (q, rest) = split_ssh_string(rest).ok_or_else(|| CryptoError::MalformedKey("ssh-dss key truncated".into()))?;
    let (g, rest) = split_ssh_string(rest).ok_or_else(|| CryptoError::MalformedKey("ssh-dss key truncated".into()))?;
    let (y, _) = split_ssh_string(rest).ok_or_else(|| CryptoError::MalformedKey("ssh-dss key truncated".into()))?;

    let components = dsa::Components::from_components(
        dsa::BigUint::from_bytes_be(p),
        dsa::BigUint::from_bytes_be(q),
        dsa::BigUint::from_bytes_be(g),
    )
    .map_err(|err| CryptoError::MalformedKey(err.to_string()))?;

    let key = dsa::VerifyingKey::from_components(components, dsa::BigUint::from_bytes_be(y))
        .map_err(|err| CryptoError::MalformedKey(err.to_string()))?;

    let (sig_algo, sig_body) =
        split_ssh_string(signature_blob).ok_or_else(|| CryptoError::MalformedKey("signature blob truncated".into()))?;

    if sig_algo != b"ssh-dss" {
        return Err(CryptoError::UnsupportedAlgorithm(
            String::from_utf8_lossy(sig_algo).into_owned(),
        ));
    }

    if sig_body.len() != 40 {
        return Err(CryptoError::MalformedKey("DSA signature has the wrong length".into()));
    }
    let (r, s) = sig_body.split_at(20);
    let signature = dsa::Signature::from_components(
        dsa::BigUint::from_bytes_be(r),
        dsa::BigUint::from_bytes_be(s),
    )
    .map_err(|err| CryptoError::MalformedKey(err.to_string()))?;

    use signature::Verifier as _;
    key.verify(message, &signature).map_err(|_| CryptoError::BadSignature)
}

fn split_ssh_string(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let (len, rest) = buf.split_at_checked(4)?;
    let len = u32::from_be_bytes(len.try_into().ok()?) as usize;

    if rest.len() < len {
        return None;
    }

    Some(rest.split_at(len))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CheckingMode::None, Outcome::Match, false)]
    #[case(CheckingMode::None, Outcome::Mismatch, false)]
    #[case(CheckingMode::None, Outcome::NoMatch, false)]
    #[case(CheckingMode::Strict, Outcome::Match, false)]
    #[case(CheckingMode::Strict, Outcome::Mismatch, true)]
    #[case(CheckingMode::Strict, Outcome::NoMatch, true)]
    #[case(CheckingMode::AllowNoMatch, Outcome::Match, false)]
    #[case(CheckingMode::AllowNoMatch, Outcome::Mismatch, true)]
    #[case(CheckingMode::AllowNoMatch, Outcome::NoMatch, false)]
    #[case(CheckingMode::AllowMismatch, Outcome::Match, false)]
    #[case(CheckingMode::AllowMismatch, Outcome::Mismatch, false)]
    #[case(CheckingMode::AllowMismatch, Outcome::NoMatch, false)]
    fn checking_mode_rejects_the_documented_outcomes(
        #[case] mode: CheckingMode,
        #[case] outcome: Outcome,
        #[case] expect_reject: bool,
    ) {
        assert_eq!(mode.rejects(outcome), expect_reject);
    }

    #[test]
    fn memory_database_reports_no_match_then_match_then_mismatch() {
        let mut db = MemoryHostKeyDatabase::new();

        assert_eq!(db.matches("host", b"key-a"), Outcome::NoMatch);

        db.insert("host", b"key-a".to_vec());
        assert_eq!(db.matches("host", b"key-a"), Outcome::Match);
        assert_eq!(db.matches("host", b"key-b"), Outcome::Mismatch);
    }

    #[test]
    fn with_entry_preseeds_the_database() {
        let db = MemoryHostKeyDatabase::new().with_entry("host", b"key-a".to_vec());

        assert_eq!(db.matches("host", b"key-a"), Outcome::Match);
    }

    #[test]
    fn verify_host_signature_rejects_an_unsupported_algorithm() {
        let mut key_blob = Vec::new();
        key_blob.extend((7u32).to_be_bytes());
        key_blob.extend(b"ssh-ed25519");

        let err = verify_host_signature(&key_blob, b"message", b"signature");
        assert!(matches!(err, Err(CryptoError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn verify_host_signature_rejects_a_truncated_blob() {
        assert!(verify_host_signature(&[0, 0, 0, 99], b"message", b"signature").is_err());
    }

    #[test]
    fn split_ssh_string_extracts_a_length_prefixed_field() {
        let buf = [0, 0, 0, 3, b'a', b'b', b'c', 0xff];

        let (field, rest) = split_ssh_string(&buf).unwrap();
        assert_eq!(field, b"abc");
        assert_eq!(rest, &[0xff]);
    }

    #[test]
    fn split_ssh_string_rejects_a_length_exceeding_the_buffer() {
        let buf = [0, 0, 0, 10, b'a'];

        assert!(split_ssh_string(&buf).is_none());
    }
}

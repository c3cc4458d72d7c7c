//! Implements the iterative key-derivation formula of RFC 4253 §7.2.

use digest::{Digest, OutputSizeUser, generic_array::GenericArray};

/// Derive `length` bytes of key material for role character `c` from the
/// key-exchange outputs `k` (the shared secret, SSH `mpint`-encoded) and `h`
/// (the exchange hash), binding it to the connection's `session_id`.
///
/// ```text
/// K1 = HASH(K || H || c || session_id)
/// K(n+1) = HASH(K || H || K1 || K2 || ... || Kn)
/// key = K1 || K2 || ...    (truncated to `length`)
/// ```
///
/// `session_id` is the first exchange hash ever computed on this connection;
/// it never changes across re-keys even though `k`/`h` do.
pub fn derive_key<D: Digest>(k: &[u8], h: &[u8], c: u8, session_id: &[u8], length: usize) -> Vec<u8>
where
    D: Clone,
{
    let mut hasher = D::new();
    hasher.update(k);
    hasher.update(h);
    hasher.update([c]);
    hasher.update(session_id);

    let mut accumulated: Vec<u8> = hasher.finalize().to_vec();
    let mut key = accumulated.clone();

    while key.len() < length {
        let mut hasher = D::new();
        hasher.update(k);
        hasher.update(h);
        hasher.update(&accumulated);

        let next: GenericArray<u8, <D as OutputSizeUser>::OutputSize> = hasher.finalize();

        accumulated = [accumulated, next.to_vec()].concat();
        key.extend_from_slice(&next);
    }

    key.truncate(length);
    key
}

#[cfg(test)]
mod tests {
    use sha2::Sha256;

    use super::*;

    #[test]
    fn it_derives_deterministically() {
        let k = b"shared-secret";
        let h = b"exchange-hash";
        let session_id = b"session-id";

        let a = derive_key::<Sha256>(k, h, b'A', session_id, 64);
        let b = derive_key::<Sha256>(k, h, b'A', session_id, 64);

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn it_differs_per_role_character() {
        let k = b"shared-secret";
        let h = b"exchange-hash";
        let session_id = b"session-id";

        let a = derive_key::<Sha256>(k, h, b'A', session_id, 32);
        let b = derive_key::<Sha256>(k, h, b'B', session_id, 32);

        assert_ne!(a, b);
    }

    #[test]
    fn it_truncates_to_the_requested_length() {
        let key = derive_key::<Sha256>(b"k", b"h", b'C', b"sid", 5);
        assert_eq!(key.len(), 5);
    }
}

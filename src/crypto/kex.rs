//! Diffie-Hellman and elliptic-curve Diffie-Hellman key exchange, per
//! RFC 4253 §8 and RFC 5656 §4.

use num_bigint_dig::BigUint;
use p256::ecdh::EphemeralSecret as P256Secret;
use rand::rngs::OsRng;

use crate::arch::MpInt;

use super::CryptoError;

/// The key-exchange (and exchange-hash digest) algorithms this crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// `diffie-hellman-group14-sha1`, the MODP group 14 (2048-bit) from RFC 3526, hashed with SHA-1.
    DhGroup14Sha1,
    /// `diffie-hellman-group1-sha1`, the MODP group 1 (1024-bit) from RFC 2409 §6.2, hashed with SHA-1.
    /// Offered last: group 1 is weaker than group 14 and kept only for legacy servers.
    DhGroup1Sha1,
    /// `ecdh-sha2-nistp256`.
    EcdhSha2Nistp256,
    /// `ecdh-sha2-nistp384`.
    EcdhSha2Nistp384,
}

impl Algorithm {
    /// Algorithm names, in the client's preference order.
    pub const PREFERENCE: &'static [Self] = &[
        Self::EcdhSha2Nistp384,
        Self::EcdhSha2Nistp256,
        Self::DhGroup14Sha1,
        Self::DhGroup1Sha1,
    ];

    /// Parse an algorithm from its SSH wire name.
    pub fn from_name(name: &str) -> Result<Self, CryptoError> {
        Ok(match name {
            "diffie-hellman-group14-sha1" => Self::DhGroup14Sha1,
            "diffie-hellman-group1-sha1" => Self::DhGroup1Sha1,
            "ecdh-sha2-nistp256" => Self::EcdhSha2Nistp256,
            "ecdh-sha2-nistp384" => Self::EcdhSha2Nistp384,
            other => return Err(CryptoError::UnsupportedAlgorithm(other.into())),
        })
    }

    /// The SSH wire name for this algorithm.
    pub fn name(self) -> &'static str {
        match self {
            Self::DhGroup14Sha1 => "diffie-hellman-group14-sha1",
            Self::DhGroup1Sha1 => "diffie-hellman-group1-sha1",
            Self::EcdhSha2Nistp256 => "ecdh-sha2-nistp256",
            Self::EcdhSha2Nistp384 => "ecdh-sha2-nistp384",
        }
    }

    /// Begin a fresh exchange for this algorithm, generating an ephemeral keypair.
    pub fn begin(self) -> Exchange {
        match self {
            Self::DhGroup14Sha1 => Exchange::Dh(DhExchange::generate(DhGroup::Group14)),
            Self::DhGroup1Sha1 => Exchange::Dh(DhExchange::generate(DhGroup::Group1)),
            Self::EcdhSha2Nistp256 => Exchange::Ecdh256(EcdhExchange::generate()),
            Self::EcdhSha2Nistp384 => Exchange::Ecdh384(Ecdh384Exchange::generate()),
        }
    }
}

/// An in-progress key exchange holding the client's ephemeral private material.
pub enum Exchange {
    Dh(DhExchange),
    Ecdh256(EcdhExchange),
    Ecdh384(Ecdh384Exchange),
}

impl Exchange {
    /// The client's public value to send in `KEXDH_INIT`/`KEX_ECDH_INIT`, as an SSH wire value.
    pub fn client_public(&self) -> Vec<u8> {
        match self {
            Self::Dh(dh) => dh.public().as_bytes().to_vec(),
            Self::Ecdh256(ecdh) => ecdh.public_sec1(),
            Self::Ecdh384(ecdh) => ecdh.public_sec1(),
        }
    }

    /// Complete the exchange given the server's public value, returning the
    /// shared secret `K` as an SSH `mpint`-encoded big-endian magnitude.
    pub fn finish(&self, server_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Dh(dh) => {
                let f = BigUint::from_bytes_be(server_public);
                Ok(dh.shared_secret(&f).to_bytes_be())
            }
            Self::Ecdh256(ecdh) => ecdh.shared_secret(server_public),
            Self::Ecdh384(ecdh) => ecdh.shared_secret(server_public),
        }
    }
}

/// Which fixed MODP group a [`DhExchange`] runs over.
#[derive(Debug, Clone, Copy)]
pub enum DhGroup {
    /// RFC 3526 §3, 2048-bit.
    Group14,
    /// RFC 2409 §6.2, 1024-bit. Weaker; only offered for legacy server compatibility.
    Group1,
}

/// Diffie-Hellman exchange over a fixed MODP group (RFC 3526 group 14 or
/// RFC 2409 group 1).
pub struct DhExchange {
    group: DhGroup,
    x: BigUint,
    e: BigUint,
}

impl DhExchange {
    /// The group's generator; both group 1 and group 14 use `g = 2`.
    const GENERATOR: u64 = 2;

    fn group_prime(group: DhGroup) -> BigUint {
        let hex: &str = match group {
            // RFC 3526 §3, 2048-bit MODP Group.
            DhGroup::Group14 => concat!(
                "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E0",
                "88A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A43",
                "1B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C4",
                "2E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B",
                "1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69",
                "163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9ED52907",
                "7096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE",
                "3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2B",
                "CBF6955817183995497CEA956AE515D2261898FA051015728E5A8A",
                "ACAA68FFFFFFFFFFFFFFFF",
            ),
            // RFC 2409 §6.2, 1024-bit MODP Group (Oakley "group 2" — confusingly
            // named "group1" in SSH's `diffie-hellman-group1-sha1`).
            DhGroup::Group1 => concat!(
                "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E0",
                "88A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A43",
                "1B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C4",
                "2E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B",
                "1FE649286651ECE65381FFFFFFFFFFFFFFFF",
            ),
        };

        BigUint::parse_bytes(hex.as_bytes(), 16).expect("static MODP group prime is well-formed")
    }

    /// Generate a fresh ephemeral private exponent `x` and public value `e = g^x mod p`.
    pub fn generate(group: DhGroup) -> Self {
        let p = Self::group_prime(group);

        // A 2*|q| bit exponent gives adequate security margin for group 14;
        // 256 random bytes comfortably exceeds that while staying inside `p`.
        let mut bytes = [0u8; 256];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        let x = BigUint::from_bytes_be(&bytes) % (&p - BigUint::from(1u32));

        let e = BigUint::from(Self::GENERATOR).modpow(&x, &p);

        Self { group, x, e }
    }

    /// The client's public value `e`.
    pub fn public(&self) -> MpInt<'static> {
        MpInt::from_unsigned_be(&self.e.to_bytes_be())
    }

    /// Compute the shared secret `K = f^x mod p`.
    pub fn shared_secret(&self, f: &BigUint) -> BigUint {
        f.modpow(&self.x, &Self::group_prime(self.group))
    }
}

/// Elliptic-curve Diffie-Hellman exchange over NIST P-256.
pub struct EcdhExchange {
    secret: P256Secret,
    public: p256::EncodedPoint,
}

impl EcdhExchange {
    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> Self {
        let secret = P256Secret::random(&mut OsRng);
        let public = p256::EncodedPoint::from(secret.public_key());

        Self { secret, public }
    }

    /// The client's ephemeral public key, as an uncompressed SEC1 octet string (`Q_C`).
    pub fn public_sec1(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    /// Compute the shared secret from the server's ephemeral public key (`Q_S`),
    /// returned as the big-endian magnitude of the shared point's x-coordinate.
    pub fn shared_secret(&self, server_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let point = p256::EncodedPoint::from_bytes(server_public)
            .map_err(|_| CryptoError::MalformedKey("invalid P-256 point".into()))?;

        let server_public = p256::PublicKey::from_sec1_bytes(point.as_bytes())
            .map_err(|_| CryptoError::MalformedKey("invalid P-256 public key".into()))?;

        let shared = self.secret.diffie_hellman(&server_public);

        Ok(shared.raw_secret_bytes().to_vec())
    }
}

/// Elliptic-curve Diffie-Hellman exchange over NIST P-384.
pub struct Ecdh384Exchange {
    secret: p384::ecdh::EphemeralSecret,
    public: p384::EncodedPoint,
}

impl Ecdh384Exchange {
    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> Self {
        let secret = p384::ecdh::EphemeralSecret::random(&mut OsRng);
        let public = p384::EncodedPoint::from(secret.public_key());

        Self { secret, public }
    }

    /// The client's ephemeral public key, as an uncompressed SEC1 octet string (`Q_C`).
    pub fn public_sec1(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    /// Compute the shared secret from the server's ephemeral public key (`Q_S`),
    /// returned as the big-endian magnitude of the shared point's x-coordinate.
    pub fn shared_secret(&self, server_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let point = p384::EncodedPoint::from_bytes(server_public)
            .map_err(|_| CryptoError::MalformedKey("invalid P-384 point".into()))?;

        let server_public = p384::PublicKey::from_sec1_bytes(point.as_bytes())
            .map_err(|_| CryptoError::MalformedKey("invalid P-384 public key".into()))?;

        let shared = self.secret.diffie_hellman(&server_public);

        Ok(shared.raw_secret_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_roundtrips_through_name() {
        for algorithm in Algorithm::PREFERENCE {
            assert_eq!(Algorithm::from_name(algorithm.name()).unwrap(), *algorithm);
        }
    }

    #[test]
    fn from_name_rejects_unknown_algorithms() {
        assert!(Algorithm::from_name("curve25519-sha256").is_err());
    }

    #[test]
    fn dh_group14_agrees_on_a_shared_secret() {
        let client = DhExchange::generate(DhGroup::Group14);
        let server = DhExchange::generate(DhGroup::Group14);

        let client_secret = client.shared_secret(&server.e);
        let server_secret = server.shared_secret(&client.e);

        assert_eq!(client_secret, server_secret);
    }

    #[test]
    fn ecdh_p256_agrees_on_a_shared_secret() {
        let client = EcdhExchange::generate();
        let server = EcdhExchange::generate();

        let client_secret = client.shared_secret(&server.public_sec1()).unwrap();
        let server_secret = server.shared_secret(&client.public_sec1()).unwrap();

        assert_eq!(client_secret, server_secret);
    }

    #[test]
    fn ecdh_p384_agrees_on_a_shared_secret() {
        let client = Ecdh384Exchange::generate();
        let server = Ecdh384Exchange::generate();

        let client_secret = client.shared_secret(&server.public_sec1()).unwrap();
        let server_secret = server.shared_secret(&client.public_sec1()).unwrap();

        assert_eq!(client_secret, server_secret);
    }

    #[test]
    fn exchange_begin_and_finish_agree_end_to_end() {
        for algorithm in Algorithm::PREFERENCE {
            let client = algorithm.begin();
            let server = algorithm.begin();

            let client_secret = client.finish(&server.client_public()).unwrap();
            let server_secret = server.finish(&client.client_public()).unwrap();

            assert_eq!(client_secret, server_secret, "mismatch for {}", algorithm.name());
        }
    }

    #[test]
    fn ecdh_rejects_a_malformed_server_public_point() {
        let client = EcdhExchange::generate();

        assert!(client.shared_secret(&[0x00, 0x01, 0x02]).is_err());
    }
}

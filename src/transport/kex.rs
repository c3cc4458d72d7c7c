//! Key-exchange negotiation and execution: `KEXINIT` algorithm negotiation,
//! the DH/ECDH exchange itself, host-key verification and key derivation.
//! Grounded on RFC 4253 §7-§8 and RFC 5656 §4; the teacher crate supplied the
//! `Ecdh`/`Dh` exchange-hash structs in `kex/mod.rs` but no orchestration.

use futures::{AsyncRead, AsyncWrite};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Sha256, Sha384};

use crate::{
    arch,
    crypto::{
        self, algorithms,
        cipher::Cipher,
        hostkey::Outcome,
        kex::Exchange,
        mac::Mac,
    },
    error::Error,
    kex::{Dh, Ecdh, Lengthed},
    trans,
};

use super::Transport;

/// `peer_kex_init`, when `Some`, is a server `SSH_MSG_KEXINIT` already read
/// off the wire by [`Transport::recv_raw`] (a server-initiated re-key); this
/// function then skips reading a second one and negotiates against it
/// directly. `None` means this side is the one starting the exchange (the
/// initial handshake, or a client-initiated re-key), so the server's
/// `KexInit` is still to be read.
pub(super) async fn perform<S>(transport: &mut Transport<S>, peer_kex_init: Option<Vec<u8>>) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let client_kex_init = build_kex_init();
    transport.send(&client_kex_init).await?;

    let payload = match peer_kex_init {
        Some(payload) => payload,
        None => transport.recv_raw().await?,
    };
    let server_kex_init =
        trans::KexInit::from_bytes(&payload).map_err(|err| Error::Protocol(err.to_string()))?;

    let kex_algo_name = client_kex_init
        .kex_algorithms
        .negotiate(&server_kex_init.kex_algorithms)
        .ok_or_else(|| Error::KeyExchangeFailed("no common key-exchange algorithm".into()))?;
    // The algorithm actually used is read back off the key blob itself in
    // `verify_host_signature`; this negotiation only needs to confirm both
    // sides have at least one algorithm in common.
    let _host_key_algo = client_kex_init
        .server_host_key_algorithms
        .negotiate(&server_kex_init.server_host_key_algorithms)
        .ok_or_else(|| Error::KeyExchangeFailed("no common host-key algorithm".into()))?;
    let enc_c2s = client_kex_init
        .encryption_algorithms_client_to_server
        .negotiate(&server_kex_init.encryption_algorithms_client_to_server)
        .ok_or_else(|| Error::KeyExchangeFailed("no common client->server cipher".into()))?;
    let enc_s2c = client_kex_init
        .encryption_algorithms_server_to_client
        .negotiate(&server_kex_init.encryption_algorithms_server_to_client)
        .ok_or_else(|| Error::KeyExchangeFailed("no common server->client cipher".into()))?;
    let mac_c2s = client_kex_init
        .mac_algorithms_client_to_server
        .negotiate(&server_kex_init.mac_algorithms_client_to_server)
        .ok_or_else(|| Error::KeyExchangeFailed("no common client->server MAC".into()))?;
    let mac_s2c = client_kex_init
        .mac_algorithms_server_to_client
        .negotiate(&server_kex_init.mac_algorithms_server_to_client)
        .ok_or_else(|| Error::KeyExchangeFailed("no common server->client MAC".into()))?;
    client_kex_init
        .compression_algorithms_client_to_server
        .negotiate(&server_kex_init.compression_algorithms_client_to_server)
        .ok_or_else(|| Error::KeyExchangeFailed("no common client->server compression".into()))?;
    client_kex_init
        .compression_algorithms_server_to_client
        .negotiate(&server_kex_init.compression_algorithms_server_to_client)
        .ok_or_else(|| Error::KeyExchangeFailed("no common server->client compression".into()))?;

    let kex_algorithm = crypto::kex::Algorithm::from_name(&kex_algo_name)?;
    let exchange = kex_algorithm.begin();

    let v_c = transport.client_id().to_string().into_bytes();
    let v_s = transport.server_id().to_string().into_bytes();

    let (k_s, raw_k, exchange_hash, signature) = match &exchange {
        Exchange::Dh(_) => {
            let e = exchange.client_public();
            transport
                .send(&trans::KexdhInit {
                    e: arch::MpInt::borrowed(&e),
                })
                .await?;

            let payload = transport.recv_raw().await?;
            let reply =
                trans::KexdhReply::from_bytes(&payload).map_err(|err| Error::Protocol(err.to_string()))?;

            let raw_k = exchange.finish(reply.f.magnitude_be())?;
            let k = arch::MpInt::from_unsigned_be(&raw_k);

            let hash_input = Dh {
                v_c: arch::Bytes::new(v_c.clone()),
                v_s: arch::Bytes::new(v_s.clone()),
                i_c: Lengthed(&client_kex_init),
                i_s: Lengthed(&server_kex_init),
                k_s: arch::Bytes::new(reply.k_s.as_ref().to_vec()),
                e: arch::MpInt::borrowed(&e),
                f: reply.f.clone(),
                k,
            };

            let hash = hash_input.hash::<Sha1>().to_vec();

            (
                reply.k_s.as_ref().to_vec(),
                raw_k,
                hash,
                reply.signature.as_ref().to_vec(),
            )
        }
        Exchange::Ecdh256(_) | Exchange::Ecdh384(_) => {
            let q_c = exchange.client_public();
            transport
                .send(&trans::KexEcdhInit {
                    q_c: arch::Bytes::new(q_c.clone()),
                })
                .await?;

            let payload = transport.recv_raw().await?;
            let reply =
                trans::KexEcdhReply::from_bytes(&payload).map_err(|err| Error::Protocol(err.to_string()))?;

            let raw_k = exchange.finish(reply.q_s.as_ref())?;
            let k = arch::MpInt::from_unsigned_be(&raw_k);

            let hash_input = Ecdh {
                v_c: arch::Bytes::new(v_c.clone()),
                v_s: arch::Bytes::new(v_s.clone()),
                i_c: Lengthed(&client_kex_init),
                i_s: Lengthed(&server_kex_init),
                k_s: arch::Bytes::new(reply.k_s.as_ref().to_vec()),
                q_c: arch::Bytes::new(q_c),
                q_s: arch::Bytes::new(reply.q_s.as_ref().to_vec()),
                k,
            };

            let hash = match &exchange {
                Exchange::Ecdh384(_) => hash_input.hash::<Sha384>().to_vec(),
                _ => hash_input.hash::<Sha256>().to_vec(),
            };

            (
                reply.k_s.as_ref().to_vec(),
                raw_k,
                hash,
                reply.signature.as_ref().to_vec(),
            )
        }
    };

    crypto::hostkey::verify_host_signature(&k_s, &exchange_hash, &signature)
        .map_err(|err| Error::KeyExchangeFailed(err.to_string()))?;

    let host = transport.host().to_string();
    let mode = transport.host_key_mode();
    let host_keys = transport.host_keys_mut();

    let outcome = host_keys.matches(&host, &k_s);
    if mode.rejects(outcome) {
        return Err(Error::HostKeyNotVerifiable);
    }
    if outcome != Outcome::Match {
        host_keys.insert(&host, k_s.clone());
    }

    transport.set_session_id(exchange_hash.clone());
    let session_id = transport.session_id().expect("just set").to_vec();

    transport.send(&trans::NewKeys).await?;
    let payload = transport.recv_raw().await?;
    if payload.first() != Some(&21) {
        return Err(Error::Protocol("expected SSH_MSG_NEWKEYS".into()));
    }

    let cipher_c2s = crypto::cipher::Algorithm::from_name(&enc_c2s)?;
    let cipher_s2c = crypto::cipher::Algorithm::from_name(&enc_s2c)?;
    let mac_algo_c2s = crypto::mac::Algorithm::from_name(&mac_c2s)?;
    let mac_algo_s2c = crypto::mac::Algorithm::from_name(&mac_s2c)?;

    let derive = |c: u8, len: usize| -> Vec<u8> {
        match kex_algorithm {
            crypto::kex::Algorithm::DhGroup14Sha1 | crypto::kex::Algorithm::DhGroup1Sha1 => {
                crypto::derive_key::<Sha1>(&raw_k, &exchange_hash, c, &session_id, len)
            }
            crypto::kex::Algorithm::EcdhSha2Nistp256 => {
                crypto::derive_key::<Sha256>(&raw_k, &exchange_hash, c, &session_id, len)
            }
            crypto::kex::Algorithm::EcdhSha2Nistp384 => {
                crypto::derive_key::<Sha384>(&raw_k, &exchange_hash, c, &session_id, len)
            }
        }
    };

    let iv_c2s = derive(b'A', cipher_c2s.iv_len());
    let iv_s2c = derive(b'B', cipher_s2c.iv_len());
    let key_c2s = derive(b'C', cipher_c2s.key_len());
    let key_s2c = derive(b'D', cipher_s2c.key_len());
    let mac_key_c2s = derive(b'E', mac_algo_c2s.key_len());
    let mac_key_s2c = derive(b'F', mac_algo_s2c.key_len());

    let enc = Cipher::for_encryption(cipher_c2s, &key_c2s, &iv_c2s)?;
    let dec = Cipher::for_decryption(cipher_s2c, &key_s2c, &iv_s2c)?;
    let mac_out = Mac::new(mac_algo_c2s, &mac_key_c2s)?;
    let mac_in = Mac::new(mac_algo_s2c, &mac_key_s2c)?;

    transport.outbound_mut().rekey(enc, mac_out);
    transport.inbound_mut().rekey(dec, mac_in);

    Ok(())
}

fn build_kex_init() -> trans::KexInit<'static> {
    let mut cookie = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut cookie);

    trans::KexInit {
        cookie,
        kex_algorithms: algorithms::kex_algorithms(),
        server_host_key_algorithms: algorithms::host_key_algorithms(),
        encryption_algorithms_client_to_server: algorithms::cipher_algorithms(),
        encryption_algorithms_server_to_client: algorithms::cipher_algorithms(),
        mac_algorithms_client_to_server: algorithms::mac_algorithms(),
        mac_algorithms_server_to_client: algorithms::mac_algorithms(),
        compression_algorithms_client_to_server: algorithms::compression_algorithms(),
        compression_algorithms_server_to_client: algorithms::compression_algorithms(),
        languages_client_to_server: algorithms::language_list(),
        languages_server_to_client: algorithms::language_list(),
        first_kex_packet_follows: false.into(),
    }
}

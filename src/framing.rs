//! Binary packet framing: `len | pad_len | payload | padding | MAC`, per
//! RFC 4253 §6. Grounded on the teacher's `packet/mod.rs`, which declared
//! (but did not ship) `OpeningCipher`/`SealingCipher` collaborators; this
//! module is that missing half, built against [`crate::crypto`] instead.

use std::io;

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use rand::RngCore;

use crate::crypto::{CryptoError, cipher::Cipher, mac::Mac};

/// The sanity ceiling imposed on a decoded packet length, per the spec's
/// open question on inbound packet size (§9): servers advertising a larger
/// packet than this are treated as a protocol violation rather than trusted.
pub const MAX_PACKET_LEN: usize = 256 * 1024;

/// One direction's framing state: the cipher, MAC and sequence number used
/// to seal (outbound) or open (inbound) packets.
pub struct Codec {
    cipher: Cipher,
    mac: Mac,
    seq_no: u32,
}

impl Codec {
    /// The identity codec used before the first key exchange completes.
    pub fn identity() -> Self {
        Self {
            cipher: Cipher::identity(),
            mac: Mac::identity(),
            seq_no: 0,
        }
    }

    /// Install freshly derived keys after `NEWKEYS`, keeping the running
    /// sequence-number counter (it is never reset across a re-key).
    pub fn rekey(&mut self, cipher: Cipher, mac: Mac) {
        self.cipher = cipher;
        self.mac = mac;
    }

    fn padded_len(&self, payload_len: usize) -> (usize, usize) {
        let block = self.cipher.block_size().max(8);
        // RFC 4253 §6: `packet_length`(4) + `padding_length`(1) + payload +
        // padding together must be a multiple of `block` — the length field
        // itself is encrypted (and so shares the alignment) even though its
        // own value excludes those leading 4 bytes.
        let unpadded = 4 + 1 + payload_len;
        let mut pad_len = block - (unpadded % block);
        if pad_len < 4 {
            pad_len += block;
        }

        (pad_len, 1 + payload_len + pad_len)
    }

    /// Seal `payload` into a wire-ready packet and advance the sequence number.
    pub fn seal(&mut self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (pad_len, body_len) = self.padded_len(payload.len());

        let mut body = Vec::with_capacity(4 + body_len);
        body.extend_from_slice(&(body_len as u32).to_be_bytes());
        body.push(pad_len as u8);
        body.extend_from_slice(payload);

        let mut padding = vec![0u8; pad_len];
        rand::rngs::OsRng.fill_bytes(&mut padding);
        body.extend_from_slice(&padding);

        let mac = self.mac.compute(self.seq_no, &body);

        // This crate encrypts the whole body uniformly, length field
        // included — every cipher mode implemented here (CBC/CTR) is fine
        // operating on it too, and `read_packet` decrypts the same range to
        // recover the length, so encrypt and decrypt must cover identical bytes.
        self.cipher.encrypt(&mut body)?;
        body.extend_from_slice(&mac);

        self.seq_no = self.seq_no.wrapping_add(1);

        Ok(body)
    }

    /// Write a packet to `writer`.
    pub async fn write_packet<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, payload: &[u8]) -> io::Result<()> {
        let encoded = self
            .seal(payload)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;

        writer.write_all(&encoded).await
    }

    /// Read and open one packet from `reader`, verifying its MAC.
    pub async fn read_packet<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Vec<u8>, FrameError> {
        let block = self.cipher.block_size().max(8);

        let mut first_block = vec![0u8; block];
        reader.read_exact(&mut first_block).await?;

        let mut len_block = first_block.clone();
        self.cipher.decrypt(&mut len_block)?;

        let body_len = u32::from_be_bytes(len_block[..4].try_into().expect("4 bytes")) as usize;
        if body_len > MAX_PACKET_LEN || body_len < 1 {
            return Err(FrameError::OversizedPacket(body_len));
        }

        let mac_len = self.mac.len();
        let tail_ciphertext_len = 4 + body_len - block;

        let mut rest = vec![0u8; tail_ciphertext_len + mac_len];
        reader.read_exact(&mut rest).await?;

        let (tail_ciphertext, mac_tag) = rest.split_at_mut(tail_ciphertext_len);
        self.cipher.decrypt(tail_ciphertext)?;

        let mut unencrypted = len_block;
        unencrypted.extend_from_slice(tail_ciphertext);

        self.mac.verify(self.seq_no, &unencrypted, mac_tag)?;

        let pad_len = unencrypted[4] as usize;
        if 1 + pad_len > body_len {
            return Err(FrameError::Protocol("padding length exceeds packet body".into()));
        }

        let payload_len = body_len - 1 - pad_len;
        let payload = unencrypted[5..5 + payload_len].to_vec();

        self.seq_no = self.seq_no.wrapping_add(1);

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use async_std::task::block_on;
    use rstest::rstest;

    use super::*;
    use crate::crypto::{cipher, mac};

    fn keyed_pair() -> (Codec, Codec) {
        let key = [0x24u8; 32];
        let iv = [0x7cu8; 16];
        let mac_key = [0x99u8; 64];

        let send = Codec {
            cipher: cipher::Cipher::for_encryption(cipher::Algorithm::Aes256Ctr, &key, &iv).unwrap(),
            mac: mac::Mac::new(mac::Algorithm::HmacSha512, &mac_key).unwrap(),
            seq_no: 0,
        };
        let recv = Codec {
            cipher: cipher::Cipher::for_decryption(cipher::Algorithm::Aes256Ctr, &key, &iv).unwrap(),
            mac: mac::Mac::new(mac::Algorithm::HmacSha512, &mac_key).unwrap(),
            seq_no: 0,
        };

        (send, recv)
    }

    #[rstest]
    #[case(&[])]
    #[case(b"short")]
    #[case(&[0xab; 1000])]
    fn it_round_trips_through_the_identity_codec(#[case] payload: &[u8]) {
        let mut send = Codec::identity();
        let mut recv = Codec::identity();

        let sealed = send.seal(payload).unwrap();
        let mut cursor = futures::io::Cursor::new(sealed);

        let opened = block_on(recv.read_packet(&mut cursor)).unwrap();
        assert_eq!(opened, payload);
    }

    #[rstest]
    #[case(&[])]
    #[case(b"a keyed packet")]
    #[case(&[0x5a; 5000])]
    fn it_round_trips_through_a_keyed_codec(#[case] payload: &[u8]) {
        let (mut send, mut recv) = keyed_pair();

        let sealed = send.seal(payload).unwrap();
        let mut cursor = futures::io::Cursor::new(sealed);

        let opened = block_on(recv.read_packet(&mut cursor)).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn sealed_body_length_is_block_aligned_with_minimum_padding() {
        let mut send = Codec::identity();

        for len in [0, 1, 7, 8, 15, 16, 100] {
            let payload = vec![0u8; len];
            let sealed = send.seal(&payload).unwrap();

            let body_len = u32::from_be_bytes(sealed[..4].try_into().unwrap()) as usize;
            let pad_len = sealed[4] as usize;

            assert_eq!(body_len, sealed.len() - 4 - send.mac.len());
            assert_eq!((1 + payload.len() + pad_len) % 8, 0);
            assert!(pad_len >= 4);
        }
    }

    #[test]
    fn tampered_ciphertext_fails_mac_verification() {
        let (mut send, mut recv) = keyed_pair();

        let mut sealed = send.seal(b"integrity matters").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;

        let mut cursor = futures::io::Cursor::new(sealed);
        assert!(matches!(
            block_on(recv.read_packet(&mut cursor)),
            Err(FrameError::Crypto(CryptoError::MacMismatch))
        ));
    }

    #[test]
    fn oversized_length_field_is_rejected() {
        let mut recv = Codec::identity();

        let mut bogus = vec![0u8; 8];
        bogus[..4].copy_from_slice(&((MAX_PACKET_LEN + 1) as u32).to_be_bytes());
        bogus[4] = 4;

        let mut cursor = futures::io::Cursor::new(bogus);
        assert!(matches!(
            block_on(recv.read_packet(&mut cursor)),
            Err(FrameError::OversizedPacket(_))
        ));
    }
}

/// Errors produced while reading a framed packet off the wire.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying transport failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The decoded length field exceeds [`MAX_PACKET_LEN`].
    #[error("packet length {0} exceeds the maximum allowed size")]
    OversizedPacket(usize),

    /// A structural protocol violation in the frame itself (not its payload).
    #[error("malformed packet frame: {0}")]
    Protocol(String),

    /// Cipher or MAC failure while opening the packet.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

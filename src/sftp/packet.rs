//! The SFTP v3 wire codec (component H, §4.8), layered over a `session`
//! channel running the `sftp` subsystem.
//!
//! Every packet on the wire is `length(uint32) | type(uint8) | body`, where
//! for every type but [`Init`]/[`Version`] the body starts with a
//! `request_id(uint32)`. `length` counts everything after itself. Following
//! `channel::mod`'s convention, responses are dispatched by matching the
//! first body byte rather than through one tagged enum.

use binrw::binrw;

use crate::{Packet, arch, error::Error};

use super::attrs::Attrs;

/// The greatest allowed SFTP packet length, guarding against a malicious or
/// corrupt peer claiming an enormous `length` field (§4.8: "max incoming
/// packet allocation MUST be capped").
pub const MAX_PACKET_LEN: usize = 256 * 1024;

/// The chunk size used for pipelined READ/WRITE transfer requests (§4.9).
pub const TRANSFER_CHUNK_SIZE: u32 = 32 * 1024;

/// Up to this many transfer requests are kept in flight at once (§4.9).
pub const MAX_IN_FLIGHT: usize = 10;

pub const SSH_FXP_INIT: u8 = 1;
pub const SSH_FXP_VERSION: u8 = 2;
pub const SSH_FXP_OPEN: u8 = 3;
pub const SSH_FXP_CLOSE: u8 = 4;
pub const SSH_FXP_READ: u8 = 5;
pub const SSH_FXP_WRITE: u8 = 6;
pub const SSH_FXP_FSTAT: u8 = 8;
pub const SSH_FXP_OPENDIR: u8 = 11;
pub const SSH_FXP_READDIR: u8 = 12;
pub const SSH_FXP_REMOVE: u8 = 13;
pub const SSH_FXP_MKDIR: u8 = 14;
pub const SSH_FXP_RMDIR: u8 = 15;
pub const SSH_FXP_STAT: u8 = 17;
pub const SSH_FXP_RENAME: u8 = 18;
pub const SSH_FXP_SYMLINK: u8 = 20;
pub const SSH_FXP_STATUS: u8 = 101;
pub const SSH_FXP_HANDLE: u8 = 102;
pub const SSH_FXP_DATA: u8 = 103;
pub const SSH_FXP_NAME: u8 = 104;
pub const SSH_FXP_ATTRS: u8 = 105;

/// `SSH_FX_OK`: request succeeded (or, for CLOSE, confirms completion).
pub const SSH_FX_OK: u32 = 0;
/// `SSH_FX_EOF`: end of file or directory listing reached.
pub const SSH_FX_EOF: u32 = 1;
/// `SSH_FX_NO_SUCH_FILE`.
pub const SSH_FX_NO_SUCH_FILE: u32 = 2;
/// `SSH_FX_PERMISSION_DENIED`.
pub const SSH_FX_PERMISSION_DENIED: u32 = 3;
/// `SSH_FX_FAILURE`: a generic failure, notably also "already exists" for MKDIR.
pub const SSH_FX_FAILURE: u32 = 4;

/// SFTP v3 `pflags` (§4.8).
pub const OPEN_READ: u32 = 0x0000_0001;
pub const OPEN_WRITE: u32 = 0x0000_0002;
pub const OPEN_APPEND: u32 = 0x0000_0004;
pub const OPEN_CREAT: u32 = 0x0000_0008;
pub const OPEN_TRUNC: u32 = 0x0000_0010;
pub const OPEN_EXCL: u32 = 0x0000_0020;

impl Packet for Init {}
impl Packet for Version {}
impl Packet for Open<'_> {}
impl Packet for Close<'_> {}
impl Packet for Read<'_> {}
impl Packet for Write<'_> {}
impl Packet for OpenDir<'_> {}
impl Packet for ReadDir<'_> {}
impl Packet for Remove<'_> {}
impl Packet for Mkdir<'_> {}
impl Packet for Rmdir<'_> {}
impl Packet for Rename<'_> {}
impl Packet for Fstat<'_> {}
impl Packet for Stat<'_> {}
impl Packet for Symlink<'_> {}
impl Packet for Status<'_> {}
impl Packet for Handle<'_> {}
impl Packet for Data<'_> {}
impl Packet for Name<'_> {}
impl Packet for AttrsPacket {}

/// `SSH_FXP_INIT`: the client's opening handshake message. Carries no
/// request id; version negotiation is the whole of its body.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 1u8)]
pub struct Init {
    /// The highest protocol version the client supports (3, here).
    pub version: u32,
}

/// `SSH_FXP_VERSION`: the server's reply to [`Init`]. Extension pairs
/// (name/data) are parsed but not interpreted by this client.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 2u8)]
pub struct Version {
    /// The protocol version the server has selected.
    pub version: u32,
}

/// `SSH_FXP_OPEN`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 3u8)]
pub struct Open<'b> {
    /// Request id this response's [`Status`]/[`Handle`] will echo back.
    pub request_id: u32,
    /// The path to open, relative to the server's default directory.
    pub filename: arch::Bytes<'b>,
    /// Bitwise-or of `OPEN_*` flags.
    pub pflags: u32,
    /// Requested initial attributes for a newly created file.
    pub attrs: Attrs,
}

/// `SSH_FXP_CLOSE`: closes a file or directory handle from [`Handle`].
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 4u8)]
pub struct Close<'b> {
    /// Request id.
    pub request_id: u32,
    /// The handle to close.
    pub handle: arch::Bytes<'b>,
}

/// `SSH_FXP_READ`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 5u8)]
pub struct Read<'b> {
    /// Request id.
    pub request_id: u32,
    /// The open file handle to read from.
    pub handle: arch::Bytes<'b>,
    /// Byte offset to read from.
    pub offset: u64,
    /// Maximum number of bytes to return.
    pub len: u32,
}

/// `SSH_FXP_WRITE`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 6u8)]
pub struct Write<'b> {
    /// Request id.
    pub request_id: u32,
    /// The open file handle to write to.
    pub handle: arch::Bytes<'b>,
    /// Byte offset to write at.
    pub offset: u64,
    /// The bytes to write.
    pub data: arch::Bytes<'b>,
}

/// `SSH_FXP_OPENDIR`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 11u8)]
pub struct OpenDir<'b> {
    /// Request id.
    pub request_id: u32,
    /// The directory path to open.
    pub path: arch::Bytes<'b>,
}

/// `SSH_FXP_READDIR`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 12u8)]
pub struct ReadDir<'b> {
    /// Request id.
    pub request_id: u32,
    /// The directory handle from a prior [`OpenDir`]/[`Handle`] exchange.
    pub handle: arch::Bytes<'b>,
}

/// `SSH_FXP_REMOVE`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 13u8)]
pub struct Remove<'b> {
    /// Request id.
    pub request_id: u32,
    /// The file path to remove.
    pub filename: arch::Bytes<'b>,
}

/// `SSH_FXP_MKDIR`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 14u8)]
pub struct Mkdir<'b> {
    /// Request id.
    pub request_id: u32,
    /// The directory path to create.
    pub path: arch::Bytes<'b>,
    /// Requested attributes for the new directory.
    pub attrs: Attrs,
}

/// `SSH_FXP_RMDIR`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 15u8)]
pub struct Rmdir<'b> {
    /// Request id.
    pub request_id: u32,
    /// The directory path to remove.
    pub path: arch::Bytes<'b>,
}

/// `SSH_FXP_RENAME`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 18u8)]
pub struct Rename<'b> {
    /// Request id.
    pub request_id: u32,
    /// The existing path.
    pub old_path: arch::Bytes<'b>,
    /// The new path.
    pub new_path: arch::Bytes<'b>,
}

/// `SSH_FXP_FSTAT`: attributes of an already-open handle.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 8u8)]
pub struct Fstat<'b> {
    /// Request id.
    pub request_id: u32,
    /// The open handle to stat.
    pub handle: arch::Bytes<'b>,
}

/// `SSH_FXP_STAT`: attributes of a path, following symbolic links.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 17u8)]
pub struct Stat<'b> {
    /// Request id.
    pub request_id: u32,
    /// The path to stat.
    pub path: arch::Bytes<'b>,
}

/// `SSH_FXP_SYMLINK`.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 20u8)]
pub struct Symlink<'b> {
    /// Request id.
    pub request_id: u32,
    /// The path of the new symlink.
    pub link_path: arch::Bytes<'b>,
    /// The path the symlink points to.
    pub target_path: arch::Bytes<'b>,
}

/// `SSH_FXP_STATUS`: the generic completion response for non-data-bearing requests.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 101u8)]
pub struct Status<'b> {
    /// Request id this responds to.
    pub request_id: u32,
    /// One of the `SSH_FX_*` constants.
    pub code: u32,
    /// A human-readable message.
    pub message: arch::Bytes<'b>,
    /// An RFC 3066 language tag for `message`.
    pub language: arch::Bytes<'b>,
}

/// `SSH_FXP_HANDLE`: a server-assigned opaque handle for an open file or directory.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 102u8)]
pub struct Handle<'b> {
    /// Request id this responds to.
    pub request_id: u32,
    /// The opaque handle, to be echoed back in subsequent requests.
    pub handle: arch::Bytes<'b>,
}

/// `SSH_FXP_DATA`: a chunk of bytes from a [`Read`] request.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 103u8)]
pub struct Data<'b> {
    /// Request id this responds to.
    pub request_id: u32,
    /// The bytes read.
    pub data: arch::Bytes<'b>,
}

/// One entry in a [`Name`] response, per §5 of the draft (`longname` is
/// the `ls -l`-style rendering; this client exposes only `filename`/`attrs`).
#[binrw]
#[derive(Debug, Clone)]
#[brw(big)]
pub struct NameEntry<'b> {
    /// The entry's file name, relative to the directory handle it came from.
    pub filename: arch::Bytes<'b>,
    /// A server-formatted long listing; not interpreted by this client.
    pub longname: arch::Bytes<'b>,
    /// The entry's attributes.
    pub attrs: Attrs,
}

/// `SSH_FXP_NAME`: one or more directory entries (`SSH_FXP_READDIR`) or a
/// single resolved path (`SSH_FXP_REALPATH`, unused by this client).
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 104u8)]
pub struct Name<'b> {
    /// Request id this responds to.
    pub request_id: u32,
    /// The number of entries present.
    #[bw(calc = entries.len() as u32)]
    count: u32,
    /// The listed entries.
    #[br(count = count)]
    pub entries: Vec<NameEntry<'b>>,
}

/// `SSH_FXP_ATTRS`: the response to [`Stat`]/[`Fstat`]. Named `AttrsPacket`
/// to avoid clashing with [`Attrs`] itself.
#[binrw]
#[derive(Debug, Clone)]
#[brw(big, magic = 105u8)]
pub struct AttrsPacket {
    /// Request id this responds to.
    pub request_id: u32,
    /// The reported attributes.
    pub attrs: Attrs,
}

/// Frame one SFTP packet for sending over the subsystem channel: a
/// big-endian `uint32` length prefix followed by `body` (which already
/// starts with the message type byte).
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(body);
    framed
}

/// Reassembles length-prefixed SFTP packets out of the raw `CHANNEL_DATA`
/// chunks a `session` channel's stdout delivers, since channel data frames
/// don't align with SFTP packet boundaries.
#[derive(Debug, Default)]
pub struct Defragmenter {
    buf: Vec<u8>,
}

impl Defragmenter {
    /// A fresh, empty reassembly buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly received bytes in.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop one complete packet body (message type byte onward) if the buffer
    /// holds one, rejecting a claimed length over [`MAX_PACKET_LEN`].
    pub fn pop(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes(self.buf[..4].try_into().expect("4 bytes")) as usize;
        if len > MAX_PACKET_LEN {
            return Err(Error::Protocol(format!(
                "SFTP packet length {len} exceeds the maximum allowed allocation"
            )));
        }

        if self.buf.len() < 4 + len {
            return Ok(None);
        }

        let body = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(body))
    }
}

/// Turn a [`Status`] into `Ok(())` for `SSH_FX_OK`, `Ok(())` for
/// `SSH_FX_EOF` when `eof_is_ok` (directory-listing/read exhaustion is not
/// itself an error), or `Err(Error::Sftp { .. })` otherwise.
pub fn status_to_result(status: &Status<'_>, eof_is_ok: bool) -> Result<(), Error> {
    if status.code == SSH_FX_OK || (eof_is_ok && status.code == SSH_FX_EOF) {
        return Ok(());
    }

    Err(Error::Sftp {
        code: status.code,
        message: String::from_utf8_lossy(status.message.as_ref()).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_round_trips_without_a_request_id() {
        let init = Init { version: 3 };
        let bytes = init.to_bytes();
        assert_eq!(bytes, vec![SSH_FXP_INIT, 0, 0, 0, 3]);

        let decoded = Init::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.version, 3);
    }

    #[test]
    fn handle_round_trips_with_a_request_id() {
        let handle = Handle { request_id: 7, handle: b"abc"[..].into() };
        let bytes = handle.to_bytes();

        let decoded = Handle::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.request_id, 7);
        assert_eq!(decoded.handle.as_ref(), b"abc");
    }

    #[test]
    fn defragmenter_reassembles_a_packet_split_across_pushes() {
        let body = Handle { request_id: 1, handle: b"h"[..].into() }.to_bytes();
        let framed = frame(&body);

        let mut defrag = Defragmenter::new();
        assert!(defrag.pop().unwrap().is_none());

        defrag.push(&framed[..3]);
        assert!(defrag.pop().unwrap().is_none());

        defrag.push(&framed[3..]);
        let popped = defrag.pop().unwrap().expect("a complete packet");
        assert_eq!(popped, body);
        assert!(defrag.pop().unwrap().is_none());
    }

    #[test]
    fn defragmenter_rejects_an_oversized_claimed_length() {
        let mut defrag = Defragmenter::new();
        defrag.push(&(MAX_PACKET_LEN as u32 + 1).to_be_bytes());
        assert!(defrag.pop().is_err());
    }

    #[test]
    fn status_to_result_treats_eof_as_ok_only_when_asked() {
        let eof = Status {
            request_id: 1,
            code: SSH_FX_EOF,
            message: b""[..].into(),
            language: b""[..].into(),
        };

        assert!(status_to_result(&eof, true).is_ok());
        assert!(status_to_result(&eof, false).is_err());
    }
}

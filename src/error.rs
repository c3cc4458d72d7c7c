//! The crate's unified error taxonomy (§7), composing the per-concern error
//! enums of each subsystem behind a single [`Error`] an embedder can match on.

use thiserror::Error;

use crate::{crypto::CryptoError, framing::FrameError, trans::DisconnectReason};

/// Errors that can occur while using the library.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed packet, invalid length, or other wire-level violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A MAC check failed on an inbound packet.
    #[error("MAC verification failed")]
    MacError,

    /// Key exchange failed to find a mutually supported algorithm, or the
    /// exchange-hash signature failed to verify.
    #[error("key exchange failed: {0}")]
    KeyExchangeFailed(String),

    /// Authentication was rejected and no further methods remain to try.
    #[error("authentication failed: no more methods available")]
    AuthenticationFailed,

    /// Host-key verification failed under the connection's checking mode.
    #[error("host key not verifiable for this host")]
    HostKeyNotVerifiable,

    /// The peer (or we) sent `SSH_MSG_DISCONNECT`.
    #[error("disconnected: {reason:?}: {description}")]
    Disconnected {
        /// The protocol-level reason code.
        reason: DisconnectReason,
        /// Human-readable description sent alongside the reason.
        description: String,
    },

    /// A channel-level failure (open failure, request failure), confined to one channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// An SFTP operation returned an `SSH_FX_*` status other than OK/EOF.
    #[error("sftp error {code}: {message}")]
    Sftp {
        /// The raw `SSH_FX_*` status code.
        code: u32,
        /// The status message returned by the server.
        message: String,
    },

    /// A local I/O failure unrelated to the wire protocol (e.g. opening a local file).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure encoding or decoding a wire structure.
    #[error(transparent)]
    Wire(#[from] binrw::Error),

    /// Failure reading or writing a framed packet.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Failure in the cryptographic envelope.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The connection was closed while an operation was still pending.
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// The `SSH_MSG_DISCONNECT` reason code this error should be reported to
    /// the peer with, if it is fatal to the whole transport. `None` for
    /// errors that are confined to a single channel or job (§7 propagation policy).
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            Self::Protocol(_) | Self::Frame(_) | Self::Wire(_) => Some(DisconnectReason::ProtocolError),
            Self::MacError => Some(DisconnectReason::MacError),
            Self::KeyExchangeFailed(_) => Some(DisconnectReason::KeyExchangeFailed),
            Self::AuthenticationFailed => Some(DisconnectReason::NoMoreAuthMethodsAvailable),
            Self::HostKeyNotVerifiable => Some(DisconnectReason::HostKeyNotVerifiable),
            _ => None,
        }
    }
}

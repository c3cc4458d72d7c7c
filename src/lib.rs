//! An SSH-2 client: transport-layer key exchange, user authentication,
//! channel multiplexing (shell/exec/pty, direct TCP tunnels) and an SFTP v3
//! subsystem, built on `binrw` wire codecs and an `async-std`/`futures`
//! single-threaded event loop.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    clippy::todo,
    clippy::unwrap_used,
    clippy::unimplemented,
    clippy::undocumented_unsafe_blocks
)]
#![forbid(unsafe_code)]

/// Maximum size for a packet, coincidentally this is
/// the maximum size for a TCP packet.
pub const MAX_SIZE: usize = u16::MAX as usize;

/// Minimum size for a packet, coincidentally this is
/// the largest block cipher's block-size.
pub const MIN_SIZE: usize = 16;

mod binary;
pub use binary::Packet;

pub mod arch;
pub mod connect;
pub mod kex;
pub mod sig;
pub mod trans;
pub mod userauth;

pub mod crypto;
pub mod error;
pub mod framing;
pub mod transport;
pub mod channel;
pub mod sftp;
pub mod connection;
pub mod pool;

pub use connection::Connection;
pub use error::Error;

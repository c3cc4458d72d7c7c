//! The connection state machine's phases, per the spec's §4.4 diagram.

/// One phase of a connection's lifecycle, from an unconnected socket through
/// to a fully established, authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No socket is open yet.
    SocketUnconnected,
    /// The TCP connection is open; identification strings not yet exchanged.
    SocketConnected,
    /// `KEXINIT` has been sent and we are waiting for (or negotiating) the
    /// server's reply.
    KexInitSent,
    /// `KEXDH_INIT`/`KEX_ECDH_INIT` has been sent; awaiting the reply.
    KexReplySent,
    /// `NEWKEYS` has been sent; awaiting the server's `NEWKEYS`.
    NewKeysSent,
    /// Key exchange has completed and fresh keys are installed in both directions.
    KeyExchangeSuccess,
    /// `SSH_MSG_SERVICE_REQUEST` for `ssh-userauth` has been sent.
    UserAuthServiceRequested,
    /// The service was accepted; authentication requests may now be sent.
    UserAuthRequested,
    /// Authentication succeeded; channels and SFTP subsystems may be opened.
    ConnectionEstablished,
}

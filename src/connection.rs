//! The connection façade (component J, §4.10 "Connection façade" / §3
//! "Connection parameters"): lifecycle orchestration and a factory for the
//! channel types this crate exposes, wrapping one [`Transport`] shared by
//! every channel and SFTP session opened on it.

use std::{
    cell::{Cell, RefCell},
    path::PathBuf,
    rc::Rc,
    time::Duration,
};

use futures::{AsyncRead, AsyncWrite, FutureExt};

use crate::{
    channel::{Tables, pump_into_tables, process::RemoteProcess, tunnel::Tunnel},
    crypto::{
        hostkey::{CheckingMode, HostKeyDatabase},
        privkey::{AuthKey, PasswordRetriever},
    },
    error::Error,
    sftp::Engine,
    trans::DisconnectReason,
    transport::{AuthOutcome, KeyboardInteractiveResponder, Phase, Transport},
};

/// Whether a connection may attempt any supported authentication method, or
/// is restricted to a single configured private key (§3 "authentication method").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRestriction {
    /// Password, public-key, and keyboard-interactive may all be attempted.
    AllMethods,
    /// Only the configured private key may be used.
    SpecificKeyOnly,
}

/// The credential actually supplied for one `connect` attempt. Kept separate
/// from [`ConnectionParameters`] since parameters are an `Eq` sharing key
/// (§3) and secrets don't belong in one.
pub enum AuthCredential<'a> {
    /// No authentication (used to probe what a server will accept).
    None,
    /// Plaintext password authentication.
    Password(&'a str),
    /// Public-key authentication; `password` decrypts an encrypted private key, if needed.
    PublicKey(&'a mut dyn PasswordRetriever),
    /// Keyboard-interactive authentication, driven by `responder`.
    KeyboardInteractive(&'a mut dyn KeyboardInteractiveResponder),
}

/// An immutable record of how to reach and authenticate to a host (§3
/// "Connection parameters"). Two values are equal iff every field matches —
/// this is exactly [`crate::pool::Pool`]'s sharing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    /// The remote host name or address.
    pub host: String,
    /// The remote TCP port.
    pub port: u16,
    /// The username to authenticate as.
    pub user: String,
    /// Which authentication methods may be attempted.
    pub auth_restriction: AuthRestriction,
    /// PEM-encoded private key path, required when publickey auth is used.
    pub private_key_path: Option<PathBuf>,
    /// Host-key verification strictness.
    pub host_key_checking_mode: CheckingMode,
    /// Upper bound on key exchange plus authentication completing, if any.
    pub timeout: Option<Duration>,
    /// Opaque string forwarded in X11 forwarding requests.
    pub x11_display_name: Option<String>,
    /// **\[AMBIENT\]** Period between `SSH_MSG_IGNORE` keep-alive emissions.
    pub keep_alive_interval: Option<Duration>,
    /// **\[AMBIENT\]** Whether [`crate::pool::Pool::acquire`] may hand back this connection.
    pub connection_sharing: bool,
    /// **\[AMBIENT\]** Idle-reap threshold; the pool's sweep interval is half of this.
    pub sharing_timeout: Option<Duration>,
}

/// A live, authenticated SSH-2 connection: a cheaply-`Clone`-able handle
/// sharing one underlying [`Transport`] and channel [`Tables`].
pub struct Connection<S> {
    transport: Rc<RefCell<Transport<S>>>,
    tables: Rc<Tables>,
    params: ConnectionParameters,
    deprecated: Rc<Cell<bool>>,
}

impl<S> Clone for Connection<S> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            tables: self.tables.clone(),
            params: self.params.clone(),
            deprecated: self.deprecated.clone(),
        }
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Establish a connection over an already-open `stream`: identification
    /// exchange, key exchange (verifying the host key against `host_keys`
    /// under `params.host_key_checking_mode`), the `ssh-userauth` service
    /// request, and one authentication attempt using `credential`.
    ///
    /// Bounded by `params.timeout` when set.
    pub async fn connect(
        stream: S,
        params: ConnectionParameters,
        host_keys: Box<dyn HostKeyDatabase>,
        credential: AuthCredential<'_>,
    ) -> Result<Self, Error> {
        let mut transport = Transport::new(stream, params.host.clone(), host_keys, params.host_key_checking_mode);

        let run = Self::handshake_and_authenticate(&mut transport, &params, credential);

        match params.timeout {
            Some(timeout) => async_std::future::timeout(timeout, run)
                .await
                .map_err(|_| Error::Protocol("connection timed out".into()))??,
            None => run.await?,
        }

        transport.mark_established();

        Ok(Self {
            transport: Rc::new(RefCell::new(transport)),
            tables: Tables::new(),
            params,
            deprecated: Rc::new(Cell::new(false)),
        })
    }

    async fn handshake_and_authenticate(
        transport: &mut Transport<S>,
        params: &ConnectionParameters,
        credential: AuthCredential<'_>,
    ) -> Result<(), Error> {
        if params.auth_restriction == AuthRestriction::SpecificKeyOnly
            && !matches!(credential, AuthCredential::PublicKey(_))
        {
            return Err(Error::Protocol(
                "connection parameters restrict authentication to the configured private key".into(),
            ));
        }

        transport.handshake().await?;
        transport.request_userauth_service().await?;

        let outcome = match credential {
            AuthCredential::None => transport.authenticate_none(&params.user).await?,
            AuthCredential::Password(password) => {
                transport.authenticate_password(&params.user, password).await?
            }
            AuthCredential::PublicKey(retriever) => {
                let path = params.private_key_path.as_ref().ok_or_else(|| {
                    Error::Protocol("publickey authentication requires a private key path".into())
                })?;
                let key = AuthKey::load(path, retriever)?;
                transport.authenticate_publickey(&params.user, &key).await?
            }
            AuthCredential::KeyboardInteractive(responder) => {
                transport
                    .authenticate_keyboard_interactive(&params.user, responder)
                    .await?
            }
        };

        match outcome {
            AuthOutcome::Success => Ok(()),
            AuthOutcome::Failure { .. } => Err(Error::AuthenticationFailed),
        }
    }

    /// This connection's parameters.
    pub fn parameters(&self) -> &ConnectionParameters {
        &self.params
    }

    /// The current connection phase.
    pub fn phase(&self) -> Phase {
        self.transport.borrow().phase()
    }

    /// Whether [`crate::pool::Pool::acquire`] must treat this connection as
    /// stale and hand out a fresh one instead (set by `forceNewConnection`).
    pub fn is_deprecated(&self) -> bool {
        self.deprecated.get()
    }

    /// Mark this connection (and every other handle sharing it) deprecated.
    pub fn mark_deprecated(&self) {
        self.deprecated.set(true);
    }

    /// Open a `session` channel to run a remote command, shell, or subsystem.
    pub async fn open_process(&self) -> Result<RemoteProcess<S>, Error> {
        RemoteProcess::open(self.transport.clone(), self.tables.clone()).await
    }

    /// Open a `direct-tcpip` tunnel to `address:port`.
    pub async fn open_tunnel(
        &self,
        address: &str,
        port: u32,
        originator_address: &str,
        originator_port: u32,
    ) -> Result<Tunnel<S>, Error> {
        Tunnel::open(
            self.transport.clone(),
            self.tables.clone(),
            address,
            port,
            originator_address,
            originator_port,
        )
        .await
    }

    /// Start an SFTP v3 session over a fresh `sftp` subsystem channel.
    pub async fn open_sftp(&self) -> Result<Engine<S>, Error> {
        Engine::open(self.transport.clone(), self.tables.clone()).await
    }

    /// Send an `SSH_MSG_IGNORE` keep-alive, per `params.keep_alive_interval`.
    pub async fn send_keepalive(&self) -> Result<(), Error> {
        self.transport.borrow_mut().send_keepalive().await
    }

    /// Re-key if the byte or time thresholds have been crossed since the last exchange.
    pub async fn rekey_if_needed(&self) -> Result<(), Error> {
        let should_rekey = self.transport.borrow().should_rekey();
        if should_rekey {
            self.transport.borrow_mut().rekey().await?;
        }

        Ok(())
    }

    /// Send `SSH_MSG_DISCONNECT` and close the underlying stream.
    pub async fn disconnect(&self, reason: DisconnectReason, description: &str) -> Result<(), Error> {
        self.transport.borrow_mut().disconnect(reason, description).await
    }

    /// **\[AMBIENT\]** Drive this connection in the background: pump inbound
    /// messages not claimed by an open channel or SFTP engine, and — when
    /// `params.keep_alive_interval` is set — race that against a timer so a
    /// keep-alive goes out on schedule even while nothing else is reading.
    ///
    /// Every open [`Channel`](crate::channel::Channel) and [`Engine`]
    /// already pumps the transport itself while awaiting its own replies, so
    /// running this loop is optional, not a prerequisite for using them; it
    /// exists for the case where the embedder holds channels open without
    /// continuously reading from them (e.g. an idle interactive session)
    /// and still wants keep-alives and server-initiated re-keys serviced.
    /// Returns only on a transport error or disconnect; an embedder runs it
    /// as its own background task (e.g. `async_std::task::spawn_local`).
    pub async fn run(&self) -> Result<(), Error> {
        loop {
            match self.params.keep_alive_interval {
                Some(period) => {
                    futures::select! {
                        _ = async_io::Timer::after(period).fuse() => {
                            self.send_keepalive().await?;
                        }
                        result = pump_into_tables(&self.transport, &self.tables).fuse() => {
                            result?;
                        }
                    }
                }
                None => {
                    pump_into_tables(&self.transport, &self.tables).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_equality_is_the_pool_sharing_key() {
        let base = ConnectionParameters {
            host: "example.com".into(),
            port: 22,
            user: "alice".into(),
            auth_restriction: AuthRestriction::AllMethods,
            private_key_path: None,
            host_key_checking_mode: CheckingMode::Strict,
            timeout: None,
            x11_display_name: None,
            keep_alive_interval: None,
            connection_sharing: true,
            sharing_timeout: None,
        };

        let same = base.clone();
        let mut different_user = base.clone();
        different_user.user = "bob".into();

        assert_eq!(base, same);
        assert_ne!(base, different_user);
    }

    #[test]
    fn deprecation_is_shared_across_clones() {
        let deprecated = Rc::new(Cell::new(false));
        let handle_a = deprecated.clone();
        let handle_b = deprecated.clone();

        handle_a.set(true);
        assert!(handle_b.get());
    }
}

//! User authentication (RFC 4252 / RFC 4256), layered on top of [`Transport`]
//! once the `ssh-userauth` service has been accepted.

use futures::{AsyncRead, AsyncWrite};

use crate::{
    crypto::privkey::AuthKey,
    error::Error,
    userauth::{self, Method},
};

use super::Transport;

/// The service name authentication requests target once authenticated.
pub const CONNECTION_SERVICE: &str = "ssh-connection";
const USERAUTH_SERVICE: &str = "ssh-userauth";

/// The result of one authentication attempt.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// The server accepted this attempt; the connection may proceed to `ssh-connection`.
    Success,
    /// The server rejected this attempt.
    Failure {
        /// Other methods the server will still accept.
        continue_with: Vec<String>,
        /// Whether this attempt partially succeeded (only meaningful for multi-factor auth).
        partial_success: bool,
    },
}

/// A callback answering a `keyboard-interactive` challenge, per RFC 4256 §3.
pub trait KeyboardInteractiveResponder {
    /// Produce one response per `prompts`, in order.
    fn respond(&mut self, name: &str, instruction: &str, prompts: &[(String, bool)]) -> Vec<String>;
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Attempt the `none` authentication method, typically used to discover
    /// which methods the server will accept (RFC 4252 §5.2).
    pub async fn authenticate_none(&mut self, username: &str) -> Result<AuthOutcome, Error> {
        self.send(&userauth::Request {
            username: username.into(),
            service_name: CONNECTION_SERVICE.into(),
            method: Method::None,
        })
        .await?;

        self.await_auth_response().await
    }

    /// Attempt `password` authentication (RFC 4252 §8).
    pub async fn authenticate_password(&mut self, username: &str, password: &str) -> Result<AuthOutcome, Error> {
        self.send(&userauth::Request {
            username: username.into(),
            service_name: CONNECTION_SERVICE.into(),
            method: Method::Password {
                password: password.into(),
                new: None,
            },
        })
        .await?;

        self.await_auth_response().await
    }

    /// Attempt `publickey` authentication (RFC 4252 §7), signing the request
    /// over this connection's session id.
    pub async fn authenticate_publickey(&mut self, username: &str, key: &AuthKey) -> Result<AuthOutcome, Error> {
        let session_id = self
            .session_id()
            .ok_or_else(|| Error::Protocol("no session id; key exchange has not completed".into()))?
            .to_vec();

        let signature = key.sign_auth_request(&session_id, username, CONNECTION_SERVICE);

        self.send(&userauth::Request {
            username: username.into(),
            service_name: CONNECTION_SERVICE.into(),
            method: Method::Publickey {
                algorithm: key.algorithm_name().as_bytes().to_vec().into(),
                blob: key.public_blob().into(),
                signature: Some(signature.into()),
            },
        })
        .await?;

        self.await_auth_response().await
    }

    /// Attempt `keyboard-interactive` authentication (RFC 4256), driving
    /// `responder` for each challenge the server sends until it replies with
    /// success, failure, or a further challenge round.
    pub async fn authenticate_keyboard_interactive(
        &mut self,
        username: &str,
        responder: &mut dyn KeyboardInteractiveResponder,
    ) -> Result<AuthOutcome, Error> {
        self.send(&userauth::Request {
            username: username.into(),
            service_name: CONNECTION_SERVICE.into(),
            method: Method::KeyboardInteractive {
                language: "".into(),
                submethods: "".into(),
            },
        })
        .await?;

        loop {
            let payload = self.recv_raw().await?;
            match payload.first() {
                Some(52) => return Ok(AuthOutcome::Success),
                Some(51) => return Ok(self.parse_failure(&payload)?),
                Some(53) => continue,
                Some(60) => {
                    let info = userauth::InfoRequest::from_bytes(&payload)
                        .map_err(|err| Error::Protocol(err.to_string()))?;

                    let prompts: Vec<(String, bool)> = info
                        .prompts
                        .iter()
                        .map(|p| (p.prompt.as_str().to_string(), *p.echo))
                        .collect();

                    let answers = responder.respond(info.name.as_str(), info.instruction.as_str(), &prompts);

                    self.send(&userauth::InfoResponse {
                        responses: answers.into_iter().map(Into::into).collect(),
                    })
                    .await?;
                }
                _ => return Err(Error::Protocol("unexpected message during keyboard-interactive auth".into())),
            }
        }
    }

    /// Send `SSH_MSG_SERVICE_REQUEST("ssh-userauth")` ahead of the first auth attempt.
    pub async fn request_userauth_service(&mut self) -> Result<(), Error> {
        self.request_service(USERAUTH_SERVICE).await
    }

    async fn await_auth_response(&mut self) -> Result<AuthOutcome, Error> {
        loop {
            let payload = self.recv_raw().await?;
            match payload.first() {
                Some(52) => return Ok(AuthOutcome::Success),
                Some(51) => return self.parse_failure(&payload),
                Some(53) => continue,
                Some(60) => continue, // PK_OK / PASSWD_CHANGEREQ: treated as a pending prompt, not a terminal outcome
                _ => return Err(Error::Protocol("unexpected message during authentication".into())),
            }
        }
    }

    fn parse_failure(&self, payload: &[u8]) -> Result<AuthOutcome, Error> {
        let failure = userauth::Failure::from_bytes(payload).map_err(|err| Error::Protocol(err.to_string()))?;

        Ok(AuthOutcome::Failure {
            continue_with: failure.continue_with.iter().map(|n| n.as_str().to_string()).collect(),
            partial_success: *failure.partial_success,
        })
    }
}

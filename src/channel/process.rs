//! Remote process channels (component F, §4.6): `exec`/`shell`/`subsystem`
//! over a `session` channel, with stdout/stderr separation and exit
//! status/signal reporting.
//!
//! Grounded on RFC 4254 §6.5/§6.10 and the spec's §4.6 state description;
//! the teacher crate only supplies the wire messages (`connect.rs`), this
//! module is the missing collaborator built against [`Channel`].

use std::{cell::RefCell, rc::Rc};

use futures::{AsyncRead, AsyncWrite};

use crate::{
    connect::{ChannelOpenContext, ChannelRequestContext},
    error::Error,
    transport::Transport,
};

use super::{Channel, ChannelEvent, OwnedChannelRequest, Tables};

/// How the remote process channel's exec/shell/subsystem request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No `exec`/`shell`/`subsystem` request has been sent yet.
    Starting,
    /// `SSH_MSG_CHANNEL_SUCCESS` was received for the start request.
    Running,
    /// `SSH_MSG_CHANNEL_FAILURE` was received for the start request.
    StartFailed,
    /// `done` has been emitted; no further events will be produced.
    Done,
}

/// How the remote process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The process ran to completion and reported an `exit-status`.
    ExitedNormally(u32),
    /// The process was terminated by a signal.
    KilledBySignal {
        /// Signal name, without the `SIG` prefix (e.g. `"TERM"`).
        signal: String,
        /// Whether a core dump accompanied the signal.
        core_dumped: bool,
        /// The error message sent alongside the signal.
        message: String,
    },
}

/// One event produced by a [`RemoteProcess`], mirroring §6's "Remote process
/// channel" event list (`started`, `readyReadStandardOutput`,
/// `readyReadStandardError`, `done`).
#[derive(Debug, Clone)]
pub enum Event {
    /// The start request (`exec`/`shell`/`subsystem`) succeeded.
    Started,
    /// New bytes are available on standard output.
    Stdout(Vec<u8>),
    /// New bytes are available on standard error.
    Stderr(Vec<u8>),
    /// The process is done; no further events follow. `None` if the start
    /// request itself failed (`StartFailed`) rather than the process exiting.
    Done(Option<Outcome>),
}

/// A `session` channel running a single remote command, shell, or subsystem.
pub struct RemoteProcess<S> {
    channel: Channel<S>,
    state: State,
    exit_status: Option<u32>,
    exit_signal: Option<(String, bool, String)>,
}

impl<S> RemoteProcess<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Open a new `session` channel to host a remote process.
    pub async fn open(transport: Rc<RefCell<Transport<S>>>, tables: Rc<Tables>) -> Result<Self, Error> {
        let channel = Channel::open(transport, tables, ChannelOpenContext::Session).await?;

        Ok(Self {
            channel,
            state: State::Starting,
            exit_status: None,
            exit_signal: None,
        })
    }

    /// Set an environment variable for the forthcoming process, per RFC 4254
    /// §6.4. Must be called before `exec`/`shell`/`subsystem`; servers are
    /// free to reject this (e.g. `AcceptEnv` restrictions), so it is sent
    /// with `want_reply=false` per the spec's "zero or more env/pty requests".
    pub async fn set_env(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.channel
            .request(
                ChannelRequestContext::Env {
                    name: name.as_bytes().into(),
                    value: value.as_bytes().into(),
                },
                false,
            )
            .await?;

        Ok(())
    }

    /// Request a pseudo-terminal, per RFC 4254 §6.2.
    #[allow(clippy::too_many_arguments)]
    pub async fn request_pty(
        &mut self,
        term: &str,
        width_chars: u32,
        height_chars: u32,
        width_pixels: u32,
        height_pixels: u32,
        modes: &[u8],
    ) -> Result<(), Error> {
        self.channel
            .request(
                ChannelRequestContext::Pty {
                    term: term.as_bytes().into(),
                    width_chars,
                    height_chars,
                    width_pixels,
                    height_pixels,
                    modes: modes.into(),
                },
                false,
            )
            .await?;

        Ok(())
    }

    /// Run `command` via `exec` (RFC 4254 §6.5).
    pub async fn exec(&mut self, command: &str) -> Result<(), Error> {
        self.start(ChannelRequestContext::Exec {
            command: command.as_bytes().into(),
        })
        .await
    }

    /// Start an interactive `shell` (RFC 4254 §6.5).
    pub async fn shell(&mut self) -> Result<(), Error> {
        self.start(ChannelRequestContext::Shell).await
    }

    /// Start a named `subsystem` (e.g. `sftp`) per RFC 4254 §6.5.
    pub async fn subsystem(&mut self, name: &str) -> Result<(), Error> {
        self.start(ChannelRequestContext::Subsystem { name: name.as_bytes().into() }).await
    }

    async fn start(&mut self, context: ChannelRequestContext<'_>) -> Result<(), Error> {
        let accepted = self.channel.request(context, true).await?;

        self.state = if accepted { State::Running } else { State::StartFailed };

        if !accepted {
            self.channel.close().await?;
            return Err(Error::Channel("remote process start request was refused".into()));
        }

        Ok(())
    }

    /// Write to the process's standard input.
    pub async fn write_stdin(&mut self, data: &[u8]) -> Result<(), Error> {
        self.channel.send_data(data).await
    }

    /// Signal no more stdin will be written.
    pub async fn close_stdin(&mut self) -> Result<(), Error> {
        self.channel.send_eof().await
    }

    /// Notify the remote pty of a terminal resize (RFC 4254 §6.7).
    pub async fn window_change(
        &mut self,
        width_chars: u32,
        height_chars: u32,
        width_pixels: u32,
        height_pixels: u32,
    ) -> Result<(), Error> {
        self.channel
            .request(
                ChannelRequestContext::WindowChange {
                    width_chars,
                    height_chars,
                    width_pixels,
                    height_pixels,
                },
                false,
            )
            .await?;

        Ok(())
    }

    /// Send a signal to the remote process (RFC 4254 §6.9), without the `SIG` prefix.
    pub async fn signal(&mut self, name: &str) -> Result<(), Error> {
        self.channel
            .request(ChannelRequestContext::Signal { name: name.as_bytes().into() }, false)
            .await?;

        Ok(())
    }

    /// Await the next event: stdout/stderr data, or the terminal `done` event.
    /// Returns `Ok(None)` once `done` has already been delivered.
    pub async fn next_event(&mut self) -> Result<Option<Event>, Error> {
        if self.state == State::Done {
            return Ok(None);
        }

        loop {
            let event = self.channel.next_event().await?;
            match event {
                ChannelEvent::Data(data) => return Ok(Some(Event::Stdout(data))),
                ChannelEvent::ExtendedData(1, data) => return Ok(Some(Event::Stderr(data))),
                ChannelEvent::ExtendedData(other, _) => {
                    tracing::warn!(data_type = other, "discarding unexpected extended-data type");
                    continue;
                }
                ChannelEvent::Success if self.state == State::Starting => {
                    self.state = State::Running;
                    return Ok(Some(Event::Started));
                }
                ChannelEvent::Failure if self.state == State::Starting => {
                    self.state = State::StartFailed;
                    self.channel.close().await?;
                    self.state = State::Done;
                    return Ok(Some(Event::Done(None)));
                }
                ChannelEvent::Request(OwnedChannelRequest::ExitStatus(code)) => {
                    self.exit_status = Some(code);
                    continue;
                }
                ChannelEvent::Request(OwnedChannelRequest::ExitSignal { name, core_dumped, message }) => {
                    self.exit_signal = Some((name, core_dumped, message));
                    continue;
                }
                ChannelEvent::Request(OwnedChannelRequest::EndOfWrite) => continue,
                ChannelEvent::Request(OwnedChannelRequest::Other(kind)) => {
                    tracing::warn!(kind, "ignoring unrecognized channel request");
                    continue;
                }
                ChannelEvent::Eof | ChannelEvent::Close => {
                    self.channel.close().await?;
                    self.state = State::Done;

                    let outcome = match self.exit_signal.take() {
                        Some((signal, core_dumped, message)) => Outcome::KilledBySignal {
                            signal,
                            core_dumped,
                            message,
                        },
                        None => Outcome::ExitedNormally(self.exit_status.unwrap_or(0)),
                    };

                    return Ok(Some(Event::Done(Some(outcome))));
                }
                ChannelEvent::WindowAdjust(_) | ChannelEvent::Success | ChannelEvent::Failure => continue,
            }
        }
    }

    /// This channel's local id.
    pub fn id(&self) -> u32 {
        self.channel.id()
    }
}

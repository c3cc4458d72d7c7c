//! Direct TCP/IP tunnel channels (component G, §4.7): a byte pipe to an
//! arbitrary `host:port` forwarded through the SSH connection, per RFC 4254
//! §7.2's `direct-tcpip` channel type.

use std::{cell::RefCell, rc::Rc};

use futures::{AsyncRead, AsyncWrite};

use crate::{connect::ChannelOpenContext, error::Error, transport::Transport};

use super::{Channel, ChannelEvent, Tables};

/// One event produced by a [`Tunnel`], mirroring §6's "Tunnel channel" event
/// list (`initialized`, `readyRead`, `error`, `closed`).
#[derive(Debug, Clone)]
pub enum Event {
    /// New bytes are available to read from the forwarded connection.
    ReadyRead(Vec<u8>),
    /// The tunnel has closed (either side initiated `SSH_MSG_CHANNEL_CLOSE`).
    Closed,
}

/// A `direct-tcpip` channel: a half-duplex-safe byte pipe to `host:port` as
/// seen from the server, tunneled over one SSH channel.
pub struct Tunnel<S> {
    channel: Channel<S>,
    closed: bool,
}

impl<S> Tunnel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Open a `direct-tcpip` channel, requesting the server connect onward to
    /// `address:port`, identifying the originator as `originator_address:originator_port`.
    pub async fn open(
        transport: Rc<RefCell<Transport<S>>>,
        tables: Rc<Tables>,
        address: &str,
        port: u32,
        originator_address: &str,
        originator_port: u32,
    ) -> Result<Self, Error> {
        let channel = Channel::open(
            transport,
            tables,
            ChannelOpenContext::DirectTcpip {
                address: address.into(),
                port,
                originator_address: originator_address.into(),
                originator_port,
            },
        )
        .await?;

        Ok(Self { channel, closed: false })
    }

    /// Write bytes into the tunnel, to be delivered to the forwarded endpoint.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.channel.send_data(data).await
    }

    /// Signal no more data will be written from this end.
    pub async fn send_eof(&mut self) -> Result<(), Error> {
        self.channel.send_eof().await
    }

    /// Await the next event. Returns `Ok(None)` once the tunnel has closed.
    pub async fn next_event(&mut self) -> Result<Option<Event>, Error> {
        if self.closed {
            return Ok(None);
        }

        loop {
            match self.channel.next_event().await? {
                ChannelEvent::Data(data) => return Ok(Some(Event::ReadyRead(data))),
                ChannelEvent::ExtendedData(data_type, _) => {
                    tracing::warn!(data_type, "unexpected extended-data on a direct-tcpip tunnel");
                    continue;
                }
                // OpenSSH sends EOF but not CLOSE when the forwarded endpoint
                // disconnects (§4.7), so the tunnel must itself initiate close.
                ChannelEvent::Eof => {
                    self.channel.close().await?;
                    self.closed = true;
                    return Ok(Some(Event::Closed));
                }
                ChannelEvent::Close => {
                    self.channel.close().await?;
                    self.closed = true;
                    return Ok(Some(Event::Closed));
                }
                ChannelEvent::WindowAdjust(_) | ChannelEvent::Success | ChannelEvent::Failure => continue,
                ChannelEvent::Request(_) => continue,
            }
        }
    }

    /// This channel's local id.
    pub fn id(&self) -> u32 {
        self.channel.id()
    }
}

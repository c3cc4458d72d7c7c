//! Channel multiplexing over one [`Transport`] (component E, RFC 4254 §5).
//!
//! The teacher crate only supplies the `SSH-CONNECT` wire messages
//! (`src/connect.rs`); this module is the missing collaborator that tracks
//! local/remote channel ids, window accounting and two-phase close on top of
//! them. Every open channel shares one `Transport` through an `Rc<RefCell<_>>`
//! — the spec's single-threaded cooperative event loop (§5) means normally
//! only one logical reader drives `Transport::recv_raw` at a time; a packet
//! destined for a channel that isn't the current reader is queued in that
//! channel's inbox until it asks for it. `Connection::run` is the one
//! exception: it may contend for the same read, so both it and
//! `read_dispatching` back off on a failed `try_borrow_mut` rather than
//! blocking on `borrow_mut`, which would panic the `RefCell` if the other
//! side is mid-await holding it.

pub mod process;
pub mod tunnel;

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use futures::{AsyncRead, AsyncWrite};

use crate::{
    connect::{
        ChannelClose, ChannelData, ChannelEof, ChannelExtendedData, ChannelOpen, ChannelOpenConfirmation,
        ChannelOpenContext, ChannelOpenFailure, ChannelRequest, ChannelRequestContext, ChannelWindowAdjust,
    },
    error::Error,
    transport::Transport,
};

/// The initial local window this client advertises for every channel it opens.
pub const INITIAL_WINDOW_SIZE: u32 = 2 * 1024 * 1024;

/// The maximum packet size this client advertises for every channel it opens,
/// matching [`crate::framing::MAX_PACKET_LEN`] minus RFC 4254 §5.2's recipient
/// channel and message-type overhead.
pub const MAX_PACKET_SIZE: u32 = (crate::framing::MAX_PACKET_LEN - 9) as u32;

/// One event delivered to a channel, queued by the dispatcher when it isn't
/// the event's owning channel currently reading.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// `SSH_MSG_CHANNEL_DATA`.
    Data(Vec<u8>),
    /// `SSH_MSG_CHANNEL_EXTENDED_DATA`.
    ExtendedData(u32, Vec<u8>),
    /// `SSH_MSG_CHANNEL_WINDOW_ADJUST`.
    WindowAdjust(u32),
    /// `SSH_MSG_CHANNEL_EOF`.
    Eof,
    /// `SSH_MSG_CHANNEL_CLOSE`.
    Close,
    /// A channel-specific `SSH_MSG_CHANNEL_REQUEST` the server sent us
    /// (e.g. `exit-status`, `exit-signal`).
    Request(OwnedChannelRequest),
    /// `SSH_MSG_CHANNEL_SUCCESS`.
    Success,
    /// `SSH_MSG_CHANNEL_FAILURE`.
    Failure,
}

/// An owned copy of a channel request's context, detached from the wire buffer.
#[derive(Debug, Clone)]
pub enum OwnedChannelRequest {
    /// `exit-status`.
    ExitStatus(u32),
    /// `exit-signal`.
    ExitSignal {
        /// Signal name, without the `SIG` prefix.
        name: String,
        /// Whether a core dump accompanied the signal.
        core_dumped: bool,
        /// The error message sent alongside the signal.
        message: String,
    },
    /// `eow@openssh.com`: the peer will send no more data on this channel.
    /// Silently ignored per the spec's §4.6 note — it carries no information
    /// this client doesn't already learn from `SSH_MSG_CHANNEL_EOF`.
    EndOfWrite,
    /// Any other channel request kind this client doesn't implement.
    /// Logged at `tracing::warn!` and otherwise ignored, never propagated as an error.
    Other(String),
}

impl OwnedChannelRequest {
    /// `exit-signal`'s error message, when this is that variant.
    pub fn exit_signal_message(&self) -> Option<&str> {
        match self {
            Self::ExitSignal { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Dispatch {
    inboxes: HashMap<u32, VecDeque<ChannelEvent>>,
}

/// Shared per-connection channel-dispatch state: the next local channel id
/// to hand out and each open channel's queued-but-not-yet-read events.
pub struct Tables {
    next_id: Cell<u32>,
    dispatch: RefCell<Dispatch>,
}

impl Tables {
    /// A fresh, empty channel table.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            next_id: Cell::new(0),
            dispatch: RefCell::new(Dispatch::default()),
        })
    }
}

/// A single SSH channel: a bidirectional, flow-controlled byte pipe
/// multiplexed over the connection's `Transport` (RFC 4254 §5).
pub struct Channel<S> {
    id: u32,
    remote_id: u32,
    local_window: u32,
    remote_window: u32,
    max_packet: u32,
    transport: Rc<RefCell<Transport<S>>>,
    tables: Rc<Tables>,
    eof_sent: bool,
    eof_received: bool,
    close_sent: bool,
    close_received: bool,
    pending_window_topup: Option<u32>,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Open a channel of the given `context`, waiting for the server's
    /// `SSH_MSG_CHANNEL_OPEN_CONFIRMATION` or `SSH_MSG_CHANNEL_OPEN_FAILURE`.
    pub async fn open(
        transport: Rc<RefCell<Transport<S>>>,
        tables: Rc<Tables>,
        context: ChannelOpenContext<'_>,
    ) -> Result<Self, Error> {
        let id = allocate_id(&tables);

        transport
            .borrow_mut()
            .send(&ChannelOpen {
                sender_channel: id,
                initial_window_size: INITIAL_WINDOW_SIZE,
                maximum_packet_size: MAX_PACKET_SIZE,
                context,
            })
            .await?;

        let wait_for_reply = async {
            loop {
                let payload = read_dispatching(&transport, &tables, id).await?;
                match payload.first() {
                    Some(91) => {
                        let confirm = ChannelOpenConfirmation::from_bytes(&payload)
                            .map_err(|err| Error::Protocol(err.to_string()))?;

                        return Ok(Self {
                            id,
                            remote_id: confirm.sender_channel,
                            local_window: INITIAL_WINDOW_SIZE,
                            remote_window: confirm.initial_window_size,
                            max_packet: confirm.maximum_packet_size,
                            transport: transport.clone(),
                            tables: tables.clone(),
                            eof_sent: false,
                            eof_received: false,
                            close_sent: false,
                            close_received: false,
                            pending_window_topup: None,
                        });
                    }
                    Some(92) => {
                        let failure = ChannelOpenFailure::from_bytes(&payload)
                            .map_err(|err| Error::Protocol(err.to_string()))?;

                        return Err(Error::Channel(format!(
                            "channel open failed: {:?}: {}",
                            failure.reason,
                            failure.description.as_str()
                        )));
                    }
                    _ => continue,
                }
            }
        };

        async_std::future::timeout(crate::transport::DEFAULT_REPLY_TIMEOUT, wait_for_reply)
            .await
            .map_err(|_| Error::Channel("timed out waiting for a channel open reply".into()))?
    }

    /// This channel's local id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Send data, chunked to the peer's maximum packet size and bounded by
    /// its advertised window, per RFC 4254 §5.2.
    pub async fn send_data(&mut self, mut data: &[u8]) -> Result<(), Error> {
        while !data.is_empty() {
            while self.remote_window == 0 {
                self.pump_until_window_opens().await?;
            }

            let chunk_len = data.len().min(self.max_packet as usize).min(self.remote_window as usize);
            let (chunk, rest) = data.split_at(chunk_len);
            data = rest;

            self.transport
                .borrow_mut()
                .send(&ChannelData {
                    recipient_channel: self.remote_id,
                    data: chunk.to_vec().into(),
                })
                .await?;

            self.remote_window -= chunk_len as u32;
        }

        Ok(())
    }

    /// Send a channel request, optionally awaiting `SSH_MSG_CHANNEL_SUCCESS`/`_FAILURE`.
    pub async fn request(&mut self, context: ChannelRequestContext<'_>, want_reply: bool) -> Result<bool, Error> {
        self.transport
            .borrow_mut()
            .send(&ChannelRequest {
                recipient_channel: self.remote_id,
                want_reply: want_reply.into(),
                context,
            })
            .await?;

        if !want_reply {
            return Ok(true);
        }

        let wait_for_reply = async {
            loop {
                match self.next_event().await? {
                    ChannelEvent::Success => return Ok(true),
                    ChannelEvent::Failure => return Ok(false),
                    _ => continue,
                }
            }
        };

        async_std::future::timeout(crate::transport::DEFAULT_REPLY_TIMEOUT, wait_for_reply)
            .await
            .map_err(|_| Error::Channel("timed out waiting for a channel request reply".into()))?
    }

    /// Send `SSH_MSG_CHANNEL_EOF`, signaling no more data will be sent.
    pub async fn send_eof(&mut self) -> Result<(), Error> {
        if !self.eof_sent {
            self.transport
                .borrow_mut()
                .send(&ChannelEof {
                    recipient_channel: self.remote_id,
                })
                .await?;
            self.eof_sent = true;
        }

        Ok(())
    }

    /// Perform the two-phase close: send `SSH_MSG_CHANNEL_CLOSE` and wait for
    /// the peer's own `SSH_MSG_CHANNEL_CLOSE` in return (RFC 4254 §5.3).
    pub async fn close(&mut self) -> Result<(), Error> {
        if !self.close_sent {
            self.transport
                .borrow_mut()
                .send(&ChannelClose {
                    recipient_channel: self.remote_id,
                })
                .await?;
            self.close_sent = true;
        }

        while !self.close_received {
            match self.next_event().await? {
                ChannelEvent::Close => self.close_received = true,
                _ => continue,
            }
        }

        self.tables.dispatch.borrow_mut().inboxes.remove(&self.id);

        Ok(())
    }

    /// Receive the next event for this channel, pumping the shared transport
    /// (and dispatching events for other channels) as needed, adjusting the
    /// local window once data has been delivered.
    pub async fn next_event(&mut self) -> Result<ChannelEvent, Error> {
        let payload = read_dispatching(&self.transport, &self.tables, self.id).await?;
        self.interpret(payload)
    }

    async fn pump_until_window_opens(&mut self) -> Result<(), Error> {
        match self.next_event().await? {
            ChannelEvent::WindowAdjust(_) => Ok(()),
            _ => Ok(()),
        }
    }

    fn interpret(&mut self, payload: Vec<u8>) -> Result<ChannelEvent, Error> {
        match payload.first() {
            Some(94) => {
                let msg = ChannelData::from_bytes(&payload).map_err(|err| Error::Protocol(err.to_string()))?;
                if msg.data.as_ref().len() > MAX_PACKET_SIZE as usize {
                    return Err(Error::Protocol(format!(
                        "channel data packet of {} bytes exceeds the negotiated max packet size",
                        msg.data.as_ref().len()
                    )));
                }

                let data = self.bound_to_window(msg.data.into_vec());
                Ok(ChannelEvent::Data(data))
            }
            Some(95) => {
                let msg =
                    ChannelExtendedData::from_bytes(&payload).map_err(|err| Error::Protocol(err.to_string()))?;
                if msg.data.as_ref().len() > MAX_PACKET_SIZE as usize {
                    return Err(Error::Protocol(format!(
                        "channel extended-data packet of {} bytes exceeds the negotiated max packet size",
                        msg.data.as_ref().len()
                    )));
                }

                let data_type = msg.data_type.get();
                let data = self.bound_to_window(msg.data.into_vec());
                Ok(ChannelEvent::ExtendedData(data_type, data))
            }
            Some(93) => {
                let msg =
                    ChannelWindowAdjust::from_bytes(&payload).map_err(|err| Error::Protocol(err.to_string()))?;
                self.remote_window = self.remote_window.saturating_add(msg.bytes_to_add);
                Ok(ChannelEvent::WindowAdjust(msg.bytes_to_add))
            }
            Some(96) => {
                self.eof_received = true;
                Ok(ChannelEvent::Eof)
            }
            Some(97) => {
                self.close_received = true;
                Ok(ChannelEvent::Close)
            }
            Some(98) => {
                let msg = ChannelRequest::from_bytes(&payload).map_err(|err| Error::Protocol(err.to_string()))?;
                Ok(ChannelEvent::Request(owned_request(msg.context)))
            }
            Some(99) => Ok(ChannelEvent::Success),
            Some(100) => Ok(ChannelEvent::Failure),
            _ => Err(Error::Protocol("unexpected message on channel".into())),
        }
    }

    /// Account inbound `data` against the local window, dropping whatever
    /// exceeds the remaining window per §4.5: "servers that violate windows
    /// are not rewarded".
    fn bound_to_window(&mut self, mut data: Vec<u8>) -> Vec<u8> {
        if data.len() as u32 > self.local_window {
            tracing::warn!(
                channel = self.id,
                received = data.len(),
                window = self.local_window,
                "peer sent more channel data than the advertised window allows; dropping excess"
            );
            data.truncate(self.local_window as usize);
        }

        self.consume_window(data.len());
        data
    }

    fn consume_window(&mut self, len: usize) {
        self.local_window = self.local_window.saturating_sub(len as u32);

        // §4.5: whenever the local window drops below one max-packet-size, a
        // WINDOW_ADJUST restoring exactly one max-packet-size is sent
        // immediately (never topped up to the full initial window).
        if self.local_window < MAX_PACKET_SIZE {
            self.local_window += MAX_PACKET_SIZE;

            let transport = self.transport.clone();
            let recipient = self.remote_id;
            async_std::task::spawn_local(async move {
                let _ = transport
                    .borrow_mut()
                    .send(&ChannelWindowAdjust {
                        recipient_channel: recipient,
                        bytes_to_add: MAX_PACKET_SIZE,
                    })
                    .await;
            });
        }
    }
}

fn owned_request(context: ChannelRequestContext<'_>) -> OwnedChannelRequest {
    match context {
        ChannelRequestContext::ExitStatus { code } => OwnedChannelRequest::ExitStatus(code),
        ChannelRequestContext::ExitSignal {
            name,
            core_dumped,
            error_message,
            ..
        } => OwnedChannelRequest::ExitSignal {
            name: String::from_utf8_lossy(name.as_ref()).into_owned(),
            core_dumped: *core_dumped,
            message: error_message.as_str().to_string(),
        },
        ChannelRequestContext::Unrecognized { kind, .. } if kind == "eow@openssh.com" => {
            OwnedChannelRequest::EndOfWrite
        }
        ChannelRequestContext::Unrecognized { kind, .. } => {
            tracing::warn!(request = %kind, "unrecognized channel-request kind; ignoring");
            OwnedChannelRequest::Other(kind)
        }
        other => OwnedChannelRequest::Other(format!("{other:?}")),
    }
}

fn allocate_id(tables: &Rc<Tables>) -> u32 {
    let id = tables.next_id.get();
    tables.next_id.set(id + 1);
    id
}

async fn read_dispatching<S>(
    transport: &Rc<RefCell<Transport<S>>>,
    tables: &Rc<Tables>,
    owner: u32,
) -> Result<Vec<u8>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        if let Some(payload) = tables.dispatch.borrow_mut().inboxes.get_mut(&owner).and_then(VecDeque::pop_front)
        {
            return Ok(payload);
        }

        // `Connection::run`, if the embedder is using it, may already be
        // holding this borrow across its own `recv_raw` await; contending
        // for it here would panic the `RefCell`. Yield and check the inbox
        // again instead of blocking on a borrow that won't free up promptly.
        let mut transport = match transport.try_borrow_mut() {
            Ok(transport) => transport,
            Err(_) => {
                async_std::task::yield_now().await;
                continue;
            }
        };

        let payload = transport.recv_raw().await?;
        drop(transport);

        let Some(recipient) = recipient_channel(&payload) else {
            // Not a channel message (global request, debug, etc); the caller
            // only cares about channel traffic here, so it's dropped.
            continue;
        };

        if recipient == owner {
            return Ok(payload);
        }

        tables
            .dispatch
            .borrow_mut()
            .inboxes
            .entry(recipient)
            .or_default()
            .push_back(payload);
    }
}

/// Read one message off the shared transport and route it into `tables`'
/// inboxes, same as [`read_dispatching`] does for any payload that isn't
/// addressed to its caller. Used by [`crate::connection::Connection::run`]
/// to drive the connection when nothing else is actively reading; like
/// `read_dispatching`, it backs off to a `try_borrow_mut` so it can't panic
/// a concurrent channel read.
pub(crate) async fn pump_into_tables<S>(transport: &Rc<RefCell<Transport<S>>>, tables: &Rc<Tables>) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut guard = match transport.try_borrow_mut() {
        Ok(guard) => guard,
        Err(_) => {
            async_std::task::yield_now().await;
            return Ok(());
        }
    };

    let payload = guard.recv_raw().await?;
    drop(guard);

    if let Some(recipient) = recipient_channel(&payload) {
        tables
            .dispatch
            .borrow_mut()
            .inboxes
            .entry(recipient)
            .or_default()
            .push_back(payload);
    }

    Ok(())
}

fn recipient_channel(payload: &[u8]) -> Option<u32> {
    match payload.first() {
        Some(91..=100) => payload.get(1..5).map(|b| u32::from_be_bytes(b.try_into().expect("4 bytes"))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(91)]
    #[case(94)]
    #[case(100)]
    fn recipient_channel_extracts_the_four_bytes_after_the_message_type(#[case] kind: u8) {
        let mut payload = vec![kind];
        payload.extend(42u32.to_be_bytes());
        payload.extend([0xde, 0xad]);

        assert_eq!(recipient_channel(&payload), Some(42));
    }

    #[test]
    fn recipient_channel_ignores_non_channel_message_types() {
        let payload = vec![90, 0, 0, 0, 1];

        assert_eq!(recipient_channel(&payload), None);
    }

    #[test]
    fn recipient_channel_handles_a_truncated_payload() {
        assert_eq!(recipient_channel(&[94, 0, 0]), None);
    }

    #[test]
    fn window_and_packet_size_constants_are_internally_consistent() {
        assert!(MAX_PACKET_SIZE < crate::framing::MAX_PACKET_LEN as u32);
        assert!(INITIAL_WINDOW_SIZE >= MAX_PACKET_SIZE);
    }

    #[test]
    fn allocate_id_is_monotonic_from_zero() {
        let tables = Tables::new();

        assert_eq!(allocate_id(&tables), 0);
        assert_eq!(allocate_id(&tables), 1);
        assert_eq!(allocate_id(&tables), 2);
    }

    #[test]
    fn owned_request_maps_eow_openssh_to_end_of_write() {
        let owned = owned_request(ChannelRequestContext::Unrecognized {
            kind: "eow@openssh.com".into(),
            body: Vec::new(),
        });

        assert!(matches!(owned, OwnedChannelRequest::EndOfWrite));
    }

    #[test]
    fn owned_request_preserves_unrecognized_kinds_as_other() {
        let owned = owned_request(ChannelRequestContext::Unrecognized {
            kind: "some-future-thing@example.com".into(),
            body: Vec::new(),
        });

        assert!(matches!(owned, OwnedChannelRequest::Other(ref k) if k == "some-future-thing@example.com"));
    }
}

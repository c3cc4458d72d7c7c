//! The SFTP job engine (component I, §4.9): a pipelined, request-id-keyed
//! operation engine running over one `sftp` subsystem channel.
//!
//! Requests and responses share one channel, dispatched by request id the
//! same way [`crate::channel`] dispatches channel messages by channel id —
//! a response for a request nobody is currently awaiting is queued in that
//! request's inbox until it is asked for.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    Packet,
    channel::{Channel, ChannelEvent, Tables},
    connect::ChannelOpenContext,
    error::Error,
    transport::Transport,
};

use super::{
    attrs::{Attrs, FileType},
    packet::{self, Defragmenter, MAX_IN_FLIGHT, TRANSFER_CHUNK_SIZE},
};

/// How an existing remote file should be handled by [`Engine::create_file`]
/// and [`Engine::upload_file`] (§4.9 "Overwrite semantics").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteMode {
    /// `WRITE | CREAT | TRUNC`: replace the file's contents.
    OverwriteExisting,
    /// `WRITE | CREAT | APPEND`, emulated via an FSTAT for the starting offset.
    AppendToExisting,
    /// `WRITE | CREAT | EXCL`: fail if the file already exists.
    SkipExisting,
}

impl OverwriteMode {
    fn pflags(self) -> u32 {
        use packet::{OPEN_APPEND, OPEN_CREAT, OPEN_EXCL, OPEN_TRUNC, OPEN_WRITE};
        match self {
            Self::OverwriteExisting => OPEN_WRITE | OPEN_CREAT | OPEN_TRUNC,
            Self::AppendToExisting => OPEN_WRITE | OPEN_CREAT | OPEN_APPEND,
            Self::SkipExisting => OPEN_WRITE | OPEN_CREAT | OPEN_EXCL,
        }
    }
}

/// One entry returned by [`Engine::list_dir`], mirroring the `fileInfoAvailable`
/// event's per-entry payload.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// The entry's file name.
    pub name: String,
    /// The entry's reported attributes.
    pub attrs: Attrs,
}

impl FileInfo {
    /// The entry's coarse file type, from its attributes.
    pub fn file_type(&self) -> FileType {
        self.attrs.file_type()
    }
}

/// A running SFTP v3 session over one `sftp` subsystem channel.
pub struct Engine<S> {
    channel: Channel<S>,
    defrag: Defragmenter,
    next_request_id: u32,
    inboxes: HashMap<u32, VecDeque<Vec<u8>>>,
}

impl<S> Engine<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Open a `session` channel, start the `sftp` subsystem on it, and
    /// perform the `SSH_FXP_INIT`/`SSH_FXP_VERSION` handshake.
    pub async fn open(transport: Rc<RefCell<Transport<S>>>, tables: Rc<Tables>) -> Result<Self, Error> {
        let mut channel = Channel::open(transport, tables, ChannelOpenContext::Session).await?;

        let accepted = channel
            .request(
                crate::connect::ChannelRequestContext::Subsystem { name: b"sftp"[..].into() },
                true,
            )
            .await?;
        if !accepted {
            return Err(Error::Channel("server refused to start the sftp subsystem".into()));
        }

        let mut engine = Self {
            channel,
            defrag: Defragmenter::new(),
            next_request_id: 1,
            inboxes: HashMap::new(),
        };

        engine.handshake().await?;
        Ok(engine)
    }

    async fn handshake(&mut self) -> Result<(), Error> {
        self.channel.send_data(&packet::frame(&packet::Init { version: 3 }.to_bytes())).await?;

        loop {
            let frame = self.next_raw_frame().await?;
            match frame.first() {
                Some(&packet::SSH_FXP_VERSION) => {
                    let version = packet::Version::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;
                    if version.version < 3 {
                        return Err(Error::Protocol(format!(
                            "server only supports SFTP version {}, need at least 3",
                            version.version
                        )));
                    }
                    return Ok(());
                }
                _ => continue,
            }
        }
    }

    fn allocate_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Pull one more raw channel data chunk into the defragmenter, ignoring
    /// anything that isn't plain data (extended-data, requests, replies to
    /// the earlier subsystem request) until a complete packet is available.
    async fn next_raw_frame(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            if let Some(frame) = self.defrag.pop()? {
                return Ok(frame);
            }

            match self.channel.next_event().await? {
                ChannelEvent::Data(data) => self.defrag.push(&data),
                ChannelEvent::ExtendedData(data_type, _) => {
                    tracing::warn!(data_type, "unexpected extended-data on an sftp channel");
                }
                ChannelEvent::Eof | ChannelEvent::Close => {
                    return Err(Error::ConnectionClosed);
                }
                ChannelEvent::WindowAdjust(_) | ChannelEvent::Request(_) | ChannelEvent::Success | ChannelEvent::Failure => {}
            }
        }
    }

    fn request_id_of(frame: &[u8]) -> Option<u32> {
        match frame.first() {
            Some(&packet::SSH_FXP_INIT) | Some(&packet::SSH_FXP_VERSION) => None,
            _ => frame.get(1..5).map(|b| u32::from_be_bytes(b.try_into().expect("4 bytes"))),
        }
    }

    /// Receive frames until one tagged with `owner`'s request id arrives,
    /// queuing any others in their own request's inbox.
    async fn await_response(&mut self, owner: u32) -> Result<Vec<u8>, Error> {
        if let Some(frame) = self.inboxes.get_mut(&owner).and_then(VecDeque::pop_front) {
            return Ok(frame);
        }

        loop {
            let frame = self.next_raw_frame().await?;
            match Self::request_id_of(&frame) {
                Some(id) if id == owner => return Ok(frame),
                Some(id) => {
                    self.inboxes.entry(id).or_default().push_back(frame);
                }
                None => continue,
            }
        }
    }

    async fn send<T: Packet>(&mut self, message: &T) -> Result<(), Error> {
        self.channel.send_data(&packet::frame(&message.to_bytes())).await
    }

    async fn status_or_other(&mut self, request_id: u32, eof_is_ok: bool) -> Result<Vec<u8>, Error> {
        let frame = self.await_response(request_id).await?;
        if frame.first() == Some(&packet::SSH_FXP_STATUS) {
            let status = packet::Status::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;
            packet::status_to_result(&status, eof_is_ok)?;
        }
        Ok(frame)
    }

    /// `SSH_FXP_STAT`: attributes of `path`, following symbolic links.
    pub async fn stat(&mut self, path: &str) -> Result<Attrs, Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Stat { request_id, path: path.as_bytes().into() }).await?;

        let frame = self.status_or_other(request_id, false).await?;
        let attrs = packet::AttrsPacket::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;
        Ok(attrs.attrs)
    }

    /// `SSH_FXP_OPENDIR` + repeated `SSH_FXP_READDIR` until `SSH_FX_EOF`, then `SSH_FXP_CLOSE`.
    pub async fn list_dir(&mut self, path: &str) -> Result<Vec<FileInfo>, Error> {
        let open_id = self.allocate_request_id();
        self.send(&packet::OpenDir { request_id: open_id, path: path.as_bytes().into() }).await?;
        let frame = self.status_or_other(open_id, false).await?;
        let handle = packet::Handle::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?.handle;

        let mut entries = Vec::new();
        loop {
            let read_id = self.allocate_request_id();
            self.send(&packet::ReadDir {
                request_id: read_id,
                handle: handle.as_ref().to_vec().into(),
            })
            .await?;

            let frame = self.await_response(read_id).await?;
            match frame.first() {
                Some(&packet::SSH_FXP_NAME) => {
                    let name = packet::Name::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;
                    for entry in name.entries {
                        entries.push(FileInfo {
                            name: String::from_utf8_lossy(entry.filename.as_ref()).into_owned(),
                            attrs: entry.attrs,
                        });
                    }
                }
                Some(&packet::SSH_FXP_STATUS) => {
                    let status = packet::Status::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;
                    if status.code == packet::SSH_FX_EOF {
                        break;
                    }
                    packet::status_to_result(&status, false)?;
                }
                _ => return Err(Error::Protocol("unexpected reply to SSH_FXP_READDIR".into())),
            }
        }

        self.close_handle(handle.as_ref()).await?;
        Ok(entries)
    }

    async fn close_handle(&mut self, handle: &[u8]) -> Result<(), Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Close { request_id, handle: handle.to_vec().into() }).await?;
        self.status_or_other(request_id, false).await?;
        Ok(())
    }

    /// `SSH_FXP_MKDIR`.
    pub async fn mkdir(&mut self, path: &str) -> Result<(), Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Mkdir {
            request_id,
            path: path.as_bytes().into(),
            attrs: Attrs::default(),
        })
        .await?;
        self.status_or_other(request_id, false).await?;
        Ok(())
    }

    /// `SSH_FXP_RMDIR`.
    pub async fn rmdir(&mut self, path: &str) -> Result<(), Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Rmdir { request_id, path: path.as_bytes().into() }).await?;
        self.status_or_other(request_id, false).await?;
        Ok(())
    }

    /// `SSH_FXP_REMOVE`.
    pub async fn remove(&mut self, path: &str) -> Result<(), Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Remove { request_id, filename: path.as_bytes().into() }).await?;
        self.status_or_other(request_id, false).await?;
        Ok(())
    }

    /// `SSH_FXP_RENAME`.
    pub async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<(), Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Rename {
            request_id,
            old_path: old_path.as_bytes().into(),
            new_path: new_path.as_bytes().into(),
        })
        .await?;
        self.status_or_other(request_id, false).await?;
        Ok(())
    }

    /// `SSH_FXP_SYMLINK`.
    pub async fn symlink(&mut self, link_path: &str, target_path: &str) -> Result<(), Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Symlink {
            request_id,
            link_path: link_path.as_bytes().into(),
            target_path: target_path.as_bytes().into(),
        })
        .await?;
        self.status_or_other(request_id, false).await?;
        Ok(())
    }

    /// Create (or truncate/append to) `remote_path` per `mode`, then stream
    /// `local_path`'s bytes to it with up to [`MAX_IN_FLIGHT`] pipelined writes.
    pub async fn upload_file(&mut self, local_path: &str, remote_path: &str, mode: OverwriteMode) -> Result<(), Error> {
        let mut file = async_std::fs::File::open(local_path).await?;
        let handle = self.open_remote(remote_path, mode.pflags()).await?;

        let mut offset = match mode {
            OverwriteMode::AppendToExisting => self
                .fstat_handle(&handle)
                .await?
                .size
                .ok_or_else(|| Error::Protocol("server does not support file size attribute".into()))?,
            _ => 0,
        };

        let mut in_flight: VecDeque<(u32, u32)> = VecDeque::new();
        let mut eof = false;

        loop {
            while !eof && in_flight.len() < MAX_IN_FLIGHT {
                let mut chunk = vec![0u8; TRANSFER_CHUNK_SIZE as usize];
                let read = file.read(&mut chunk).await?;
                if read == 0 {
                    eof = true;
                    break;
                }
                chunk.truncate(read);

                let request_id = self.allocate_request_id();
                self.send(&packet::Write {
                    request_id,
                    handle: handle.clone().into(),
                    offset,
                    data: chunk.into(),
                })
                .await?;

                in_flight.push_back((request_id, read as u32));
                offset += read as u64;
            }

            let Some((request_id, _)) = in_flight.pop_front() else {
                break;
            };
            self.status_or_other(request_id, false).await?;
        }

        self.close_handle(&handle).await
    }

    /// Create `remote_path` (empty) per `mode`, without transferring any data.
    pub async fn create_file(&mut self, remote_path: &str, mode: OverwriteMode) -> Result<(), Error> {
        let handle = self.open_remote(remote_path, mode.pflags()).await?;
        self.close_handle(&handle).await
    }

    async fn open_remote(&mut self, path: &str, pflags: u32) -> Result<Vec<u8>, Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Open {
            request_id,
            filename: path.as_bytes().into(),
            pflags,
            attrs: Attrs::default(),
        })
        .await?;

        let frame = self.status_or_other(request_id, false).await?;
        let handle = packet::Handle::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;
        Ok(handle.handle.into_vec())
    }

    async fn fstat_handle(&mut self, handle: &[u8]) -> Result<Attrs, Error> {
        let request_id = self.allocate_request_id();
        self.send(&packet::Fstat { request_id, handle: handle.to_vec().into() }).await?;

        let frame = self.status_or_other(request_id, false).await?;
        let attrs = packet::AttrsPacket::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;
        Ok(attrs.attrs)
    }

    /// Download `remote_path` to `local_path`, pipelining up to
    /// [`MAX_IN_FLIGHT`] READ requests and writing chunks at their reported offset.
    pub async fn download(&mut self, remote_path: &str, local_path: &str) -> Result<(), Error> {
        let handle = self.open_remote(remote_path, packet::OPEN_READ).await?;
        // absent size ⇒ treat as 0 and send exactly one READ (§4.9).
        let size = self.fstat_handle(&handle).await?.size.unwrap_or(0);

        let mut file = async_std::fs::File::create(local_path).await?;

        let total_requests = (size.div_ceil(TRANSFER_CHUNK_SIZE as u64)).max(1) as usize;
        let initial_in_flight = total_requests.min(MAX_IN_FLIGHT);

        let mut offset_map: HashMap<u32, u64> = HashMap::new();
        let mut next_offset = 0u64;
        let mut in_flight = 0usize;

        for _ in 0..initial_in_flight {
            let request_id = self.allocate_request_id();
            offset_map.insert(request_id, next_offset);
            self.send(&packet::Read {
                request_id,
                handle: handle.clone().into(),
                offset: next_offset,
                len: TRANSFER_CHUNK_SIZE,
            })
            .await?;
            next_offset += TRANSFER_CHUNK_SIZE as u64;
            in_flight += 1;
        }

        let mut eof_seen = false;
        while in_flight > 0 {
            let request_ids: Vec<u32> = offset_map.keys().copied().collect();
            let mut resolved = None;
            for request_id in request_ids {
                if let Some(frame) = self.inboxes.get_mut(&request_id).and_then(VecDeque::pop_front) {
                    resolved = Some((request_id, frame));
                    break;
                }
            }
            let (request_id, frame) = match resolved {
                Some(pair) => pair,
                None => {
                    let frame = self.next_raw_frame().await?;
                    match Self::request_id_of(&frame) {
                        Some(id) if offset_map.contains_key(&id) => (id, frame),
                        Some(id) => {
                            self.inboxes.entry(id).or_default().push_back(frame);
                            continue;
                        }
                        None => continue,
                    }
                }
            };

            let offset = offset_map.remove(&request_id).expect("tracked in-flight request");
            in_flight -= 1;

            match frame.first() {
                Some(&packet::SSH_FXP_DATA) => {
                    let data = packet::Data::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;

                    use futures::AsyncSeekExt;
                    file.seek(std::io::SeekFrom::Start(offset)).await?;
                    file.write_all(data.data.as_ref()).await?;

                    if !eof_seen && next_offset < size {
                        let request_id = self.allocate_request_id();
                        offset_map.insert(request_id, next_offset);
                        self.send(&packet::Read {
                            request_id,
                            handle: handle.clone().into(),
                            offset: next_offset,
                            len: TRANSFER_CHUNK_SIZE,
                        })
                        .await?;
                        next_offset += TRANSFER_CHUNK_SIZE as u64;
                        in_flight += 1;
                    }
                }
                Some(&packet::SSH_FXP_STATUS) => {
                    let status = packet::Status::from_bytes(&frame).map_err(|err| Error::Protocol(err.to_string()))?;
                    if status.code == packet::SSH_FX_EOF {
                        eof_seen = true;
                    } else {
                        packet::status_to_result(&status, false)?;
                    }
                }
                _ => return Err(Error::Protocol("unexpected reply to SSH_FXP_READ".into())),
            }
        }

        file.flush().await?;
        self.close_handle(&handle).await
    }

    /// Recursively upload the local directory `local_dir` as `remote_dir`
    /// (§4.9 "Upload-dir (composite)"): MKDIR the top-level target
    /// (tolerating `SSH_FX_FAILURE`, treated as "already exists"), then
    /// queue nested MKDIRs before sibling file uploads, depth-first.
    pub fn upload_dir<'a>(
        &'a mut self,
        local_dir: &'a str,
        remote_dir: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + 'a>> {
        Box::pin(async move {
            match self.mkdir(remote_dir).await {
                Ok(()) => {}
                Err(Error::Sftp { code, .. }) if code == packet::SSH_FX_FAILURE => {}
                Err(err) => return Err(err),
            }

            let mut dir_entries = async_std::fs::read_dir(local_dir).await?;
            let mut subdirs = Vec::new();
            let mut files = Vec::new();

            use futures::StreamExt;
            while let Some(entry) = dir_entries.next().await {
                let entry = entry?;
                let file_type = entry.file_type().await?;
                let name = entry.file_name().to_string_lossy().into_owned();

                if file_type.is_dir() {
                    subdirs.push(name);
                } else {
                    files.push(name);
                }
            }

            for subdir in subdirs {
                let local_child = format!("{local_dir}/{subdir}");
                let remote_child = format!("{remote_dir}/{subdir}");
                self.upload_dir(&local_child, &remote_child).await?;
            }

            for file in files {
                let local_child = format!("{local_dir}/{file}");
                let remote_child = format!("{remote_dir}/{file}");
                self.upload_file(&local_child, &remote_child, OverwriteMode::OverwriteExisting).await?;
            }

            Ok(())
        })
    }

    /// This engine's underlying channel id.
    pub fn id(&self) -> u32 {
        self.channel.id()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(OverwriteMode::OverwriteExisting, packet::OPEN_WRITE | packet::OPEN_CREAT | packet::OPEN_TRUNC)]
    #[case(OverwriteMode::AppendToExisting, packet::OPEN_WRITE | packet::OPEN_CREAT | packet::OPEN_APPEND)]
    #[case(OverwriteMode::SkipExisting, packet::OPEN_WRITE | packet::OPEN_CREAT | packet::OPEN_EXCL)]
    fn overwrite_mode_maps_to_the_documented_flags(#[case] mode: OverwriteMode, #[case] expect: u32) {
        assert_eq!(mode.pflags(), expect);
    }

    #[test]
    fn request_id_of_returns_none_for_init_and_version() {
        assert_eq!(Engine::<async_std::net::TcpStream>::request_id_of(&[packet::SSH_FXP_INIT]), None);
        assert_eq!(Engine::<async_std::net::TcpStream>::request_id_of(&[packet::SSH_FXP_VERSION]), None);
    }

    #[test]
    fn request_id_of_extracts_the_four_bytes_after_the_message_type() {
        let mut frame = vec![packet::SSH_FXP_STATUS];
        frame.extend(7u32.to_be_bytes());
        frame.extend([0, 0]);

        assert_eq!(
            Engine::<async_std::net::TcpStream>::request_id_of(&frame),
            Some(7)
        );
    }
}

//! SFTP v3 file attributes (`ATTRS`), per draft-ietf-secsh-filexfer-02 §5.
//!
//! The wire form is a `uint32` flags field followed by only the fields the
//! flags select — a variable-shaped structure the `arch` module's derive-based
//! types don't model, so (like [`crate::arch::Bytes`]) this is a hand-written
//! `BinRead`/`BinWrite` pair instead of a `#[binrw]` struct.

use binrw::{BinRead, BinWrite};

const SIZE: u32 = 0x0000_0001;
const UIDGID: u32 = 0x0000_0002;
const PERMISSIONS: u32 = 0x0000_0004;
const ACMODTIME: u32 = 0x0000_0008;
const EXTENDED: u32 = 0x8000_0000;

/// The coarse file type an SFTP server reports for a path, derived from the
/// `permissions` field's `S_IFMT` bits when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// A regular file.
    Regular,
    /// A directory.
    Directory,
    /// A symbolic link.
    Symlink,
    /// Any other POSIX file type (device, fifo, socket), or unknown.
    #[default]
    Other,
}

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;

/// SFTP v3 file attributes, as returned in `ATTRS`/`NAME` responses and sent
/// in `OPEN`/`SETSTAT`-shaped requests. Every field is optional on the wire;
/// a field absent from a server response is `None` here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs {
    /// File size in bytes.
    pub size: Option<u64>,
    /// Owning `(uid, gid)`.
    pub uid_gid: Option<(u32, u32)>,
    /// POSIX permission bits, including the `S_IFMT` file-type bits.
    pub permissions: Option<u32>,
    /// `(atime, mtime)`, seconds since the epoch.
    pub times: Option<(u32, u32)>,
}

impl Attrs {
    /// Attributes carrying only a file size, as used to discover an existing
    /// file's length before an `AppendToExisting` upload (§4.9).
    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Default::default()
        }
    }

    /// The coarse file type, from the `permissions` field's `S_IFMT` bits.
    /// `FileType::Other` if permissions were not reported.
    pub fn file_type(&self) -> FileType {
        match self.permissions.map(|p| p & S_IFMT) {
            Some(S_IFDIR) => FileType::Directory,
            Some(S_IFLNK) => FileType::Symlink,
            Some(S_IFREG) => FileType::Regular,
            _ => FileType::Other,
        }
    }
}

impl BinRead for Attrs {
    type Args<'a> = ();

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let flags = u32::read_options(reader, endian, ())?;
        let mut attrs = Attrs::default();

        if flags & SIZE != 0 {
            attrs.size = Some(u64::read_options(reader, endian, ())?);
        }
        if flags & UIDGID != 0 {
            let uid = u32::read_options(reader, endian, ())?;
            let gid = u32::read_options(reader, endian, ())?;
            attrs.uid_gid = Some((uid, gid));
        }
        if flags & PERMISSIONS != 0 {
            attrs.permissions = Some(u32::read_options(reader, endian, ())?);
        }
        if flags & ACMODTIME != 0 {
            let atime = u32::read_options(reader, endian, ())?;
            let mtime = u32::read_options(reader, endian, ())?;
            attrs.times = Some((atime, mtime));
        }
        if flags & EXTENDED != 0 {
            let count = u32::read_options(reader, endian, ())?;
            for _ in 0..count {
                let _type = crate::arch::Bytes::read_options(reader, endian, ())?;
                let _data = crate::arch::Bytes::read_options(reader, endian, ())?;
            }
        }

        Ok(attrs)
    }
}

impl BinWrite for Attrs {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        let mut flags = 0u32;
        if self.size.is_some() {
            flags |= SIZE;
        }
        if self.uid_gid.is_some() {
            flags |= UIDGID;
        }
        if self.permissions.is_some() {
            flags |= PERMISSIONS;
        }
        if self.times.is_some() {
            flags |= ACMODTIME;
        }

        flags.write_options(writer, endian, ())?;

        if let Some(size) = self.size {
            size.write_options(writer, endian, ())?;
        }
        if let Some((uid, gid)) = self.uid_gid {
            uid.write_options(writer, endian, ())?;
            gid.write_options(writer, endian, ())?;
        }
        if let Some(perms) = self.permissions {
            perms.write_options(writer, endian, ())?;
        }
        if let Some((atime, mtime)) = self.times {
            atime.write_options(writer, endian, ())?;
            mtime.write_options(writer, endian, ())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_wire_form() {
        let attrs = Attrs {
            size: Some(100_000),
            uid_gid: None,
            permissions: Some(0o100644),
            times: Some((10, 20)),
        };

        let mut buf = std::io::Cursor::new(Vec::new());
        attrs.write_options(&mut buf, binrw::Endian::Big, ()).unwrap();

        let mut cursor = std::io::Cursor::new(buf.into_inner());
        let decoded = Attrs::read_options(&mut cursor, binrw::Endian::Big, ()).unwrap();

        assert_eq!(attrs, decoded);
        assert_eq!(decoded.file_type(), FileType::Regular);
    }

    #[test]
    fn empty_attrs_reports_no_size() {
        let attrs = Attrs::default();
        assert_eq!(attrs.size, None);
        assert_eq!(attrs.file_type(), FileType::Other);
    }
}

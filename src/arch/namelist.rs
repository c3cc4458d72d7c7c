use binrw::{BinRead, BinWrite};

use super::{Ascii, Bytes};

/// A comma-separated `name-list` as defined in the SSH protocol, used to
/// negotiate algorithms during key exchange.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NameList<'b>(Vec<Ascii<'b>>);

impl<'b> NameList<'b> {
    /// Build a [`NameList`] from an iterator of names.
    pub fn new(names: impl IntoIterator<Item = impl Into<Ascii<'b>>>) -> Self {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Iterate over the contained names, in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &Ascii<'b>> {
        self.0.iter()
    }

    /// Whether the list contains no names at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pick the first name of `self` that is also present in `other`,
    /// following RFC 4253 §7.1's "client's preference order" negotiation rule.
    pub fn negotiate(&self, other: &NameList<'_>) -> Option<String> {
        self.iter()
            .map(|want| want.as_str())
            .find(|want| other.iter().any(|have| have.as_str() == *want))
            .map(str::to_owned)
    }
}

impl<'b> FromIterator<Ascii<'b>> for NameList<'b> {
    fn from_iter<T: IntoIterator<Item = Ascii<'b>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl BinRead for NameList<'_> {
    type Args<'a> = ();

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let bytes = Bytes::read_options(reader, endian, args)?;
        let text = std::str::from_utf8(bytes.as_ref()).map_err(|_| binrw::Error::AssertFail {
            pos: 0,
            message: "name-list is not valid UTF-8".into(),
        })?;

        Ok(Self(
            text.split(',')
                .filter(|s| !s.is_empty())
                .map(Ascii::new)
                .collect(),
        ))
    }
}

impl BinWrite for NameList<'_> {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        let joined = self
            .0
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(",");

        Bytes::new(joined.into_bytes()).write_options(writer, endian, args)
    }
}

#[cfg(test)]
mod tests {
    use binrw::{BinRead, BinWrite};

    use super::*;

    fn roundtrip(value: &NameList<'_>) -> NameList<'static> {
        let mut buf = std::io::Cursor::new(Vec::new());
        value.write(&mut buf).unwrap();

        buf.set_position(0);
        NameList::read(&mut buf).unwrap()
    }

    #[test]
    fn it_roundtrips_multiple_names() {
        let value = NameList::new(["diffie-hellman-group14-sha1", "ecdh-sha2-nistp256"]);

        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn it_roundtrips_empty() {
        let value = NameList::new(Vec::<&str>::new());

        assert!(roundtrip(&value).is_empty());
    }

    #[test]
    fn it_joins_with_commas_on_the_wire() {
        let value = NameList::new(["a", "b", "c"]);

        let mut buf = std::io::Cursor::new(Vec::new());
        value.write(&mut buf).unwrap();

        assert_eq!(buf.into_inner(), b"\x00\x00\x00\x05a,b,c");
    }

    #[test]
    fn negotiate_picks_clients_first_common_preference() {
        let client = NameList::new(["aes128-ctr", "aes256-ctr", "3des-cbc"]);
        let server = NameList::new(["3des-cbc", "aes256-ctr"]);

        assert_eq!(client.negotiate(&server).as_deref(), Some("aes256-ctr"));
    }

    #[test]
    fn negotiate_returns_none_without_overlap() {
        let client = NameList::new(["a"]);
        let server = NameList::new(["b"]);

        assert!(client.negotiate(&server).is_none());
    }
}

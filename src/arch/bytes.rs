use binrw::{BinRead, BinWrite};

#[cfg(feature = "zeroize")]
use zeroize::Zeroize;

use crate::MAX_SIZE;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "zeroize", derive(Zeroize))]
enum Inner<'b> {
    Owned(Vec<u8>),

    #[cfg_attr(feature = "zeroize", zeroize(skip))]
    Borrowed(&'b [u8]),
}

/// A `string` as defined in the SSH protocol, i.e. an arbitrary octet sequence
/// prefixed by its `uint32` length.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "zeroize", derive(Zeroize))]
pub struct Bytes<'b> {
    inner: Inner<'b>,
}

impl Default for Bytes<'_> {
    fn default() -> Self {
        Self {
            inner: Inner::Owned(Vec::new()),
        }
    }
}

impl<'b> Bytes<'b> {
    /// Create [`Bytes`] owning the provided data.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self::owned(value.into())
    }

    /// Create [`Bytes`] from a _vector_.
    pub fn owned(value: Vec<u8>) -> Self {
        Self {
            inner: Inner::Owned(value),
        }
    }

    /// Create [`Bytes`] from a _slice_, borrowing it for as long as `'b`.
    pub const fn borrowed(value: &'b [u8]) -> Self {
        Self {
            inner: Inner::Borrowed(value),
        }
    }

    /// Extract the buffer into a [`Vec`].
    pub fn into_vec(self) -> Vec<u8> {
        match self.inner {
            Inner::Owned(vec) => vec,
            Inner::Borrowed(slice) => slice.to_vec(),
        }
    }
}

impl AsRef<[u8]> for Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        match &self.inner {
            Inner::Owned(vec) => vec,
            Inner::Borrowed(slice) => slice,
        }
    }
}

impl PartialEq for Bytes<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for Bytes<'_> {}

impl From<Vec<u8>> for Bytes<'_> {
    fn from(value: Vec<u8>) -> Self {
        Self::owned(value)
    }
}

impl<'b> From<&'b [u8]> for Bytes<'b> {
    fn from(value: &'b [u8]) -> Self {
        Self::borrowed(value)
    }
}

impl BinRead for Bytes<'_> {
    type Args<'a> = ();

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let pos = reader.stream_position()?;
        let size = u32::read_options(reader, endian, ())?;

        if size as usize > MAX_SIZE {
            return Err(binrw::Error::AssertFail {
                pos,
                message: format!("string length {size} exceeds the maximum allowed size"),
            });
        }

        <Vec<u8>>::read_options(
            reader,
            endian,
            binrw::VecArgs {
                count: size as usize,
                inner: args,
            },
        )
        .map(Self::owned)
    }
}

impl BinWrite for Bytes<'_> {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        let buf = self.as_ref();
        let size = buf.len() as u32;

        size.write_options(writer, endian, ())?;
        buf.write_options(writer, endian, args)
    }
}

#[cfg(test)]
mod tests {
    use binrw::{BinRead, BinWrite};
    use rstest::rstest;

    use super::*;

    fn roundtrip(value: &Bytes<'_>) -> Bytes<'static> {
        let mut buf = std::io::Cursor::new(Vec::new());
        value.write(&mut buf).unwrap();

        buf.set_position(0);
        Bytes::read(&mut buf).unwrap()
    }

    #[rstest]
    #[case(&[])]
    #[case(b"a")]
    #[case(b"hello, world!")]
    fn it_roundtrips(#[case] data: &[u8]) {
        let value = Bytes::new(data.to_vec());

        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn it_prefixes_with_a_big_endian_length() {
        let value = Bytes::new(b"abc".to_vec());

        let mut buf = std::io::Cursor::new(Vec::new());
        value.write(&mut buf).unwrap();

        assert_eq!(buf.into_inner(), b"\x00\x00\x00\x03abc");
    }

    #[test]
    fn it_rejects_a_length_above_the_maximum_size() {
        let mut buf = std::io::Cursor::new(Vec::new());
        (crate::MAX_SIZE as u32 + 1)
            .write_options(&mut buf, binrw::Endian::Big, ())
            .unwrap();

        buf.set_position(0);
        assert!(Bytes::read(&mut buf).is_err());
    }

    #[test]
    fn borrowed_and_owned_compare_equal() {
        assert_eq!(Bytes::borrowed(b"xyz"), Bytes::new(b"xyz".to_vec()));
    }
}

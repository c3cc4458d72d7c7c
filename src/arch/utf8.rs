use std::ops::Deref;

use binrw::{BinRead, BinWrite};

use super::Bytes;

/// A `string` as defined in the SSH protocol, restricted to valid **UTF-8**.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Utf8<'b>(pub(super) Bytes<'b>);

impl<'b> Utf8<'b> {
    /// Create a new [`Utf8`] from a [`String`] or `&str`.
    pub fn new(s: impl Into<String>) -> Self {
        Self(Bytes::new(s.into().into_bytes()))
    }

    const fn from_static_bytes(bytes: &'b [u8]) -> Self {
        Self(Bytes::borrowed(bytes))
    }

    /// Views this [`Utf8`] as a `str`.
    pub fn as_str(&self) -> &str {
        self
    }

    /// Converts the [`Utf8`] into an owned [`String`].
    pub fn into_string(self) -> String {
        String::from_utf8(self.0.into_vec()).expect("Utf8 was constructed in an unexpected way")
    }
}

impl std::fmt::Debug for Utf8<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Utf8").field(&self.as_str()).finish()
    }
}

impl Deref for Utf8<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        std::str::from_utf8(self.0.as_ref()).expect("Utf8 was constructed in an unexpected way")
    }
}

impl<T: Into<String>> From<T> for Utf8<'_> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for Utf8<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl BinRead for Utf8<'_> {
    type Args<'a> = ();

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let pos = reader.stream_position()?;
        let bytes = Bytes::read_options(reader, endian, args)?;

        if std::str::from_utf8(bytes.as_ref()).is_err() {
            return Err(binrw::Error::AssertFail {
                pos,
                message: "string is not valid UTF-8".into(),
            });
        }

        Ok(Self(bytes))
    }
}

impl BinWrite for Utf8<'_> {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        self.0.write_options(writer, endian, args)
    }
}

/// Build a `const` [`Utf8`] from a `&'static str` literal at compile time.
#[doc(hidden)]
pub const fn utf8(s: &'static str) -> Utf8<'static> {
    Utf8::from_static_bytes(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use binrw::{BinRead, BinWrite};

    use super::*;

    fn roundtrip(value: &Utf8<'_>) -> Utf8<'static> {
        let mut buf = std::io::Cursor::new(Vec::new());
        value.write(&mut buf).unwrap();

        buf.set_position(0);
        Utf8::read(&mut buf).unwrap()
    }

    #[test]
    fn it_roundtrips_ascii() {
        let value = Utf8::new("hello, world!");

        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn it_roundtrips_multibyte_utf8() {
        let value = Utf8::new("héllo, wörld! 日本語");

        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn it_rejects_invalid_utf8_on_read() {
        let mut buf = std::io::Cursor::new(Vec::new());
        crate::arch::Bytes::new(vec![0xff, 0xfe])
            .write(&mut buf)
            .unwrap();

        buf.set_position(0);
        assert!(Utf8::read(&mut buf).is_err());
    }
}

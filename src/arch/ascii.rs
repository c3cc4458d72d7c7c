use std::ops::Deref;

use binrw::{BinRead, BinWrite};

use super::Utf8;

/// Error produced when a [`Utf8`] value contains non-ASCII characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value is not valid ASCII")]
pub struct AsciiError;

/// A `string` as defined in the SSH protocol, restricted to valid **ASCII**,
/// used for algorithm names, service names and the like.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Ascii<'b>(Utf8<'b>);

impl<'b> Ascii<'b> {
    /// Create a new [`Ascii`] from anything convertible to a [`Utf8`] value,
    /// stripping any non-ASCII characters it would contain.
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(Utf8::new(
            s.as_ref()
                .chars()
                .filter(char::is_ascii)
                .collect::<String>(),
        ))
    }

    /// Views this [`Ascii`] as a `str`.
    pub fn as_str(&self) -> &str {
        self
    }

    /// Converts the [`Ascii`] into an owned [`String`].
    pub fn into_string(self) -> String {
        self.0.into_string()
    }
}

impl std::fmt::Debug for Ascii<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Ascii").field(&self.as_str()).finish()
    }
}

impl Deref for Ascii<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: AsRef<str>> From<T> for Ascii<'_> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for Ascii<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl BinRead for Ascii<'_> {
    type Args<'a> = ();

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let pos = reader.stream_position()?;
        let utf8 = Utf8::read_options(reader, endian, args)?;

        if !utf8.is_ascii() {
            return Err(binrw::Error::AssertFail {
                pos,
                message: "string is not valid ASCII".into(),
            });
        }

        Ok(Self(utf8))
    }
}

impl BinWrite for Ascii<'_> {
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

/// Build a `const` [`Ascii`] name from a `&'static str` literal at compile time,
/// used to define the fixed method/kind identifiers of the protocol.
#[macro_export]
macro_rules! ascii {
    ($s:expr) => {
        $crate::arch::Ascii::from_static($s)
    };
}

#[doc(inline)]
pub use crate::ascii;

impl Ascii<'static> {
    /// Build a `const` [`Ascii`] from a `&'static str`, used by the [`ascii!`] macro.
    ///
    /// # Panics
    ///
    /// Panics (at compile time, when used in a `const` context) if `s` is not ASCII.
    pub const fn from_static(s: &'static str) -> Self {
        if !s.is_ascii() {
            panic!("ascii! literal is not valid ASCII");
        }

        Self(super::utf8::utf8(s))
    }
}

#[cfg(test)]
mod tests {
    use binrw::{BinRead, BinWrite};

    use super::*;

    fn roundtrip(value: &Ascii<'_>) -> Ascii<'static> {
        let mut buf = std::io::Cursor::new(Vec::new());
        value.write(&mut buf).unwrap();

        buf.set_position(0);
        Ascii::read(&mut buf).unwrap()
    }

    #[test]
    fn it_roundtrips() {
        let value = Ascii::new("diffie-hellman-group14-sha1");

        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn it_strips_non_ascii_characters() {
        assert_eq!(Ascii::new("héllo").as_str(), "hllo");
    }

    #[test]
    fn it_rejects_non_ascii_bytes_on_read() {
        let mut buf = std::io::Cursor::new(Vec::new());
        crate::arch::Utf8::new("héllo").write(&mut buf).unwrap();

        buf.set_position(0);
        assert!(Ascii::read(&mut buf).is_err());
    }

    #[test]
    fn from_static_builds_at_compile_time() {
        const NAME: Ascii<'static> = Ascii::from_static("ssh-rsa");

        assert_eq!(NAME.as_str(), "ssh-rsa");
    }
}

use binrw::{BinRead, BinWrite};

/// A `boolean` as defined in the SSH protocol: a single octet, `0` for `false`
/// and any non-zero value (canonically `1`) for `true`.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Bool(bool);

impl From<bool> for Bool {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl From<Bool> for bool {
    fn from(value: Bool) -> Self {
        value.0
    }
}

impl std::ops::Deref for Bool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl BinRead for Bool {
    type Args<'a> = ();

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let byte = u8::read_options(reader, endian, ())?;

        Ok(Self(byte != 0))
    }
}

impl BinWrite for Bool {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        u8::from(self.0).write_options(writer, endian, ())
    }
}

#[cfg(test)]
mod tests {
    use binrw::{BinRead, BinWrite};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(true, &[0x01])]
    #[case(false, &[0x00])]
    fn it_roundtrips(#[case] value: bool, #[case] wire: &[u8]) {
        let mut buf = std::io::Cursor::new(Vec::new());
        Bool::from(value).write(&mut buf).unwrap();
        assert_eq!(buf.get_ref().as_slice(), wire);

        buf.set_position(0);
        assert_eq!(bool::from(Bool::read(&mut buf).unwrap()), value);
    }

    #[test]
    fn any_nonzero_octet_decodes_as_true() {
        let mut buf = std::io::Cursor::new(vec![0xffu8]);

        assert!(*Bool::read(&mut buf).unwrap());
    }
}

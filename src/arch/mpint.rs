use binrw::{BinRead, BinWrite};

use super::Bytes;

/// An `mpint` as defined in the SSH protocol: an arbitrary-precision integer
/// in two's-complement, big-endian, with the minimum number of octets
/// required to represent the value (a leading `0x00` is prepended whenever
/// the magnitude's most-significant bit would otherwise be set, so that the
/// value is never mistaken for negative). Zero is encoded as an empty string.
///
/// see <https://datatracker.ietf.org/doc/html/rfc4251#section-5>.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MpInt<'b> {
    /// Minimal big-endian two's-complement encoding, without the `uint32` length prefix.
    bytes: Bytes<'b>,
}

impl<'b> MpInt<'b> {
    /// Build an [`MpInt`] from an unsigned, big-endian magnitude, as produced
    /// by e.g. `BigUint::to_bytes_be`.
    pub fn from_unsigned_be(magnitude: &[u8]) -> Self {
        let trimmed = skip_leading_zeroes(magnitude);

        if trimmed.is_empty() {
            return Self {
                bytes: Bytes::default(),
            };
        }

        let mut buf = Vec::with_capacity(trimmed.len() + 1);
        if trimmed[0] & 0x80 != 0 {
            buf.push(0);
        }
        buf.extend_from_slice(trimmed);

        Self {
            bytes: Bytes::new(buf),
        }
    }

    /// Build an [`MpInt`] that borrows an already-minimally-encoded two's-complement buffer.
    pub const fn borrowed(encoded: &'b [u8]) -> Self {
        Self {
            bytes: Bytes::borrowed(encoded),
        }
    }

    /// View the minimal two's-complement encoding (sans length prefix).
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_ref()
    }

    /// Whether the encoded value is negative.
    pub fn is_negative(&self) -> bool {
        matches!(self.as_bytes().first(), Some(b) if b & 0x80 != 0)
    }

    /// Magnitude as unsigned big-endian bytes, with any leading sign-avoidance
    /// zero byte stripped. Only meaningful for non-negative values, which is
    /// the only case this crate's key exchange and RSA/DSA key material use.
    pub fn magnitude_be(&self) -> &[u8] {
        match self.as_bytes() {
            [0, rest @ ..] => rest,
            other => other,
        }
    }
}

fn skip_leading_zeroes(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0);

    match first_nonzero {
        Some(i) => &bytes[i..],
        None => &[],
    }
}

impl BinRead for MpInt<'_> {
    type Args<'a> = ();

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        Bytes::read_options(reader, endian, args).map(|bytes| Self { bytes })
    }
}

impl BinWrite for MpInt<'_> {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        self.bytes.write_options(writer, endian, args)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[], &[])]
    #[case(&[0x00], &[])]
    #[case(&[0x01], &[0x01])]
    #[case(&[0x80], &[0x00, 0x80])]
    #[case(&[0x00, 0x00, 0x01], &[0x01])]
    fn it_encodes_unsigned_magnitudes(#[case] magnitude: &[u8], #[case] expect: &[u8]) {
        assert_eq!(MpInt::from_unsigned_be(magnitude).as_bytes(), expect);
    }

    #[test]
    fn zero_roundtrips_to_empty_string_on_the_wire() {
        use binrw::BinWrite;

        let mut buf = std::io::Cursor::new(Vec::new());
        MpInt::from_unsigned_be(&[]).write(&mut buf).unwrap();

        assert_eq!(buf.into_inner(), b"\x00\x00\x00\x00");
    }

    #[test]
    fn magnitude_be_strips_the_sign_avoidance_byte() {
        let value = MpInt::from_unsigned_be(&[0x80]);

        assert_eq!(value.as_bytes(), &[0x00, 0x80]);
        assert_eq!(value.magnitude_be(), &[0x80]);
        assert!(!value.is_negative());
    }

    #[test]
    fn is_negative_detects_a_high_bit_without_sign_avoidance() {
        let value = MpInt::borrowed(&[0x80]);

        assert!(value.is_negative());
    }

    #[test]
    fn decode_encode_roundtrips_through_the_wire() {
        use binrw::{BinRead, BinWrite};

        let original = MpInt::from_unsigned_be(&[0x01, 0x23, 0x45]);

        let mut buf = std::io::Cursor::new(Vec::new());
        original.write(&mut buf).unwrap();

        buf.set_position(0);
        let decoded = MpInt::read(&mut buf).unwrap();

        assert_eq!(decoded, original);
    }
}

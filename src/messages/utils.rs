macro_rules! write_integer {
    ($name:ident, $type:ty) => {
        pub(crate) fn $name(writer: &mut impl std::io::Write, n: $type) -> std::io::Result<usize> {
            let bytes = n.to_le_bytes();
            writer.write_all(&bytes[..])?;
            Ok(bytes.len())
        }
    };
}
write_integer!(write_u8, u8);
write_integer!(write_u16, u16);
write_integer!(write_u32, u32);
write_integer!(write_u64, u64);

/// UTF-16LE encoding, as used by every "Unicode" string in NTLMSSP.
pub(crate) fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Copies a slice that a parser already checked for length into an array.
pub(crate) fn to_array<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut array = [0u8; N];
    array.copy_from_slice(data);
    array
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_is_little_endian() {
        pretty_assertions::assert_eq!(utf16le("Ab"), vec![0x41, 0x00, 0x62, 0x00]);
    }

    #[test]
    fn integers_are_little_endian() {
        let mut buf = Vec::new();
        assert_eq!(write_u32(&mut buf, 0x0102_0304).unwrap(), 4);
        assert_eq!(write_u16(&mut buf, 0x0506).unwrap(), 2);
        pretty_assertions::assert_eq!(buf, vec![0x04, 0x03, 0x02, 0x01, 0x06, 0x05]);
    }
}

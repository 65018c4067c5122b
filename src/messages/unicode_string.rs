use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};

use nom::combinator::{map_opt, rest};
use nom::error::context;

use crate::messages::{utils::utf16le, NomError, Wire};

/// A string carried as UTF-16LE on the wire.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct UnicodeString(String);

impl Deref for UnicodeString {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UnicodeString {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<String> for UnicodeString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UnicodeString {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<UnicodeString> for String {
    fn from(s: UnicodeString) -> Self {
        s.0
    }
}

impl fmt::Display for UnicodeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for UnicodeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl UnicodeString {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() % 2 != 0 {
            return None;
        }
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).ok().map(Self)
    }
}

/// Consumes the whole input: strings always live in a payload slice whose
/// length comes from the enclosing [`Field`](crate::messages::Field).
impl<'a> Wire<'a> for UnicodeString {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let data = utf16le(&self.0);
        writer.write_all(&data[..])?;
        Ok(data.len())
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        context("UnicodeString", map_opt(rest, Self::from_bytes))(input)
    }
}

/// OEM strings. The code page is not negotiated, so bytes that are not UTF-8
/// are replaced rather than rejected.
impl<'a> Wire<'a> for String {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        writer.write_all(self.as_bytes())?;
        Ok(self.len())
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (remaining, data) = rest(input)?;
        Ok((remaining, String::from_utf8_lossy(data).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode() {
        let raw = [0x50, 0x00, 0x43, 0x00, 0x31, 0x00];
        let (rest, s) = UnicodeString::deserialize::<()>(&raw[..]).unwrap();
        assert!(rest.is_empty());
        pretty_assertions::assert_eq!(s, UnicodeString::from("PC1"));
        pretty_assertions::assert_eq!(s.serialize(), raw.to_vec());
    }

    #[test]
    fn odd_length_is_rejected() {
        assert!(UnicodeString::deserialize::<()>(&[0x50, 0x00, 0x43][..]).is_err());
        assert!(UnicodeString::from_bytes(&[0x00]).is_none());
    }
}

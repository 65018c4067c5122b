use std::io;
use std::ops::Range;

use nom::error::{context, ErrorKind};
use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;

use crate::messages::{
    unicode_string::UnicodeString,
    utils::{write_u16, write_u32},
    NomError, Wire,
};

/// `(len, max_len, offset)` triple pointing into a message's payload.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub len: u16,
    pub max_len: u16,
    pub offset: u32,
}

impl<'a> Wire<'a> for Field {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let mut written = 0;
        written += write_u16(writer, self.len)?;
        written += write_u16(writer, self.max_len)?;
        written += write_u32(writer, self.offset)?;
        Ok(written)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (rest, (len, max_len, offset)) =
            context("Field", tuple((le_u16, le_u16, le_u32)))(input)?;

        Ok((
            rest,
            Self {
                len,
                max_len,
                offset,
            },
        ))
    }
}

impl Field {
    pub const fn zeroed() -> Self {
        Self {
            len: 0,
            max_len: 0,
            offset: 0,
        }
    }

    pub(crate) fn get_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        let end = start + self.len as usize;
        start..end
    }

    /// Offset of the data, or `None` for an empty field.
    pub(crate) fn data_offset(&self) -> Option<usize> {
        (self.len != 0).then_some(self.offset as usize)
    }

    /// The bytes this field points at. Offsets come from the peer, so a field
    /// reaching past the end of the message is a parse error.
    pub(crate) fn slice<'a, E>(
        &self,
        typename: &'static str,
        input: &'a [u8],
    ) -> Result<&'a [u8], nom::Err<E>>
    where
        E: NomError<'a>,
    {
        input.get(self.get_range()).ok_or_else(|| {
            nom::Err::Error(E::add_context(
                input,
                typename,
                E::from_error_kind(input, ErrorKind::Eof),
            ))
        })
    }

    pub(crate) fn get_data_if<'a, T, E>(
        &self,
        typename: &'static str,
        input: &'a [u8],
        cond: bool,
    ) -> Result<Option<T>, nom::Err<E>>
    where
        E: NomError<'a>,
        T: Wire<'a>,
    {
        if !cond {
            return Ok(None);
        }
        if self.len == 0 {
            return Ok(None);
        }
        let data = self.slice::<E>(typename, input)?;
        let (rest, value) = context(typename, T::deserialize::<E>)(data)?;
        if !rest.is_empty() {
            log::warn!(
                "Not all is consumed for {}. {} bytes remaining",
                typename,
                rest.len()
            );
        }
        Ok(Some(value))
    }

    /// Decodes a string field, UTF-16LE when `unicode` is negotiated and OEM
    /// otherwise.
    pub(crate) fn get_text<'a, E>(
        &self,
        typename: &'static str,
        input: &'a [u8],
        unicode: bool,
    ) -> Result<Option<String>, nom::Err<E>>
    where
        E: NomError<'a>,
    {
        if unicode {
            Ok(self
                .get_data_if::<UnicodeString, E>(typename, input, true)?
                .map(String::from))
        } else {
            self.get_data_if::<String, E>(typename, input, true)
        }
    }

    pub(crate) fn append<'a, T, W>(
        value: Option<&T>,
        data: &mut Vec<u8>,
        writer: &mut W,
    ) -> io::Result<usize>
    where
        T: Wire<'a>,
        W: io::Write,
    {
        let bytes = match value {
            Some(val) => {
                let mut bytes = Vec::new();
                val.serialize_into(&mut bytes)?;
                Some(bytes)
            }
            None => None,
        };
        Self::append_bytes(bytes.as_deref(), data, writer)
    }

    /// Appends `value` to the payload `data` and writes the field pointing at
    /// it, or a zeroed field for `None`.
    pub(crate) fn append_bytes<W>(
        value: Option<&[u8]>,
        data: &mut Vec<u8>,
        writer: &mut W,
    ) -> io::Result<usize>
    where
        W: io::Write,
    {
        let field = match value {
            Some(bytes) => {
                let offset = u32::try_from(data.len()).map_err(too_long)?;
                let len = u16::try_from(bytes.len()).map_err(too_long)?;
                data.extend_from_slice(bytes);
                Self {
                    len,
                    max_len: len,
                    offset,
                }
            }
            None => Self::zeroed(),
        };
        field.serialize_into(writer)
    }

    pub(crate) fn append_text<W>(
        value: Option<&String>,
        unicode: bool,
        data: &mut Vec<u8>,
        writer: &mut W,
    ) -> io::Result<usize>
    where
        W: io::Write,
    {
        if unicode {
            let value = value.map(|s| UnicodeString::from(s.as_str()));
            Self::append(value.as_ref(), data, writer)
        } else {
            Self::append(value, data, writer)
        }
    }
}

fn too_long<T>(_: T) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "NTLM payload field exceeds 65535 bytes",
    )
}

/// Start of the payload area: the lowest offset among non-empty fields, or the
/// end of the message when every field is empty.
pub(crate) fn payload_start(fields: &[&Field], message_len: usize) -> usize {
    fields
        .iter()
        .filter_map(|f| f.data_offset())
        .min()
        .unwrap_or(message_len)
}

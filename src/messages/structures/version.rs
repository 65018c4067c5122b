use std::io;

use crate::messages::{
    utils::{write_u16, write_u8},
    NomError, Wire,
};

use nom::error::context;
use nom::number::complete::{le_u16, le_u24, le_u8};
use nom::sequence::tuple;

/// OS version advertised in the VERSION field (MS-NLMP 2.2.2.10).
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub build: u16,
    pub revision_count: u8,
}

pub const NTLMSSP_REVISION_W2K3: u8 = 0x0f;

impl Version {
    /// Windows 7 SP1, what this client advertises.
    pub const fn client() -> Self {
        Self {
            major: 6,
            minor: 1,
            build: 7601,
            revision_count: NTLMSSP_REVISION_W2K3,
        }
    }
}

impl<'a> Wire<'a> for Version {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let mut size = 0;
        size += write_u8(writer, self.major)?;
        size += write_u8(writer, self.minor)?;
        size += write_u16(writer, self.build)?;
        size += write_u8(writer, 0)?;
        size += write_u16(writer, 0)?;
        size += write_u8(writer, self.revision_count)?;
        Ok(size)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (rest, (major, minor, build, _reserved, revision_count)) = context(
            "Version",
            tuple((
                context("major", le_u8),
                context("minor", le_u8),
                context("build", le_u16),
                context("reserved", le_u24),
                context("revision_count", le_u8),
            )),
        )(input)?;

        if revision_count != NTLMSSP_REVISION_W2K3 {
            log::warn!("unexpected NTLM revision {:#04x}", revision_count);
        }

        Ok((
            rest,
            Self {
                major,
                minor,
                build,
                revision_count,
            },
        ))
    }
}

use std::fmt;

use nom::bytes::complete::tag;
use nom::combinator::{cond, verify};
use nom::error::context;
use nom::number::complete::{le_u32, le_u64};
use nom::sequence::{preceded, tuple};

use crate::messages::{
    decode, encode,
    field::payload_start,
    flags::{self, Flags},
    structures::{AvPair, FileTime, ServerChallenge, Version},
    utils::{write_u32, write_u64},
    Field, MessageError, NomError, Wire, SIGNATURE,
};

const MESSAGE_TYPE: u32 = 0x00000002;
const HEADER_SIZE: usize = 48;

/// CHALLENGE_MESSAGE (MS-NLMP 2.2.1.2).
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub target_name: Option<String>,
    pub negotiate_flags: Flags,
    pub server_challenge: ServerChallenge,
    pub target_infos: Vec<AvPair>,
    pub version: Option<Version>,
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("target_name", &self.target_name)
            .field("negotiate_flags", &self.negotiate_flags)
            .field("server_challenge", &hex::encode(self.server_challenge))
            .field("target_infos", &self.target_infos)
            .field("version", &self.version)
            .finish()
    }
}

impl Challenge {
    pub fn parse(input: &[u8]) -> Result<Self, MessageError> {
        decode(input)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }

    /// The server time from MsvAvTimestamp, if the server sent one.
    pub fn timestamp(&self) -> Option<FileTime> {
        self.target_infos.iter().find_map(|pair| match pair {
            AvPair::MsvAvTimestamp(ts) => Some(*ts),
            _ => None,
        })
    }

    fn unicode(&self) -> bool {
        self.negotiate_flags
            .has_flag(flags::NTLMSSP_NEGOTIATE_UNICODE)
    }
}

impl<'a> Wire<'a> for Challenge {
    fn serialize_into<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut payload = Vec::with_capacity(HEADER_SIZE * 4);
        payload.resize(HEADER_SIZE, 0);

        if let Some(ref version) = self.version {
            version.serialize_into(&mut payload)?;
        }

        let mut target_infos = Vec::new();
        if !self.target_infos.is_empty() {
            AvPair::write_list(&self.target_infos, &mut target_infos)?;
        }

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&SIGNATURE[..]);
        write_u32(&mut header, MESSAGE_TYPE)?;
        Field::append_text(
            self.target_name.as_ref(),
            self.unicode(),
            &mut payload,
            &mut header,
        )?;
        self.negotiate_flags.serialize_into(&mut header)?;
        self.server_challenge.serialize_into(&mut header)?;
        write_u64(&mut header, 0)?;
        Field::append_bytes(
            (!target_infos.is_empty()).then_some(&target_infos[..]),
            &mut payload,
            &mut header,
        )?;
        debug_assert_eq!(header.len(), HEADER_SIZE);

        writer.write_all(&header[..])?;
        writer.write_all(&payload[HEADER_SIZE..])?;

        Ok(payload.len())
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (
            rest,
            (target_name_field, negotiate_flags, server_challenge, _reserved, target_infos_field),
        ) = context(
            "Challenge",
            preceded(
                tuple((tag(SIGNATURE), verify(le_u32, |mt| *mt == MESSAGE_TYPE))),
                tuple((
                    context("target_name_field", Field::deserialize),
                    Flags::deserialize,
                    context("server_challenge", ServerChallenge::deserialize),
                    context("reserved", le_u64),
                    context("target_infos_field", Field::deserialize),
                )),
            ),
        )(input)?;

        // Some servers set NTLMSSP_NEGOTIATE_VERSION without making room for
        // the field, the payload then starts right after the header.
        let has_version = negotiate_flags.has_flag(flags::NTLMSSP_NEGOTIATE_VERSION)
            && payload_start(&[&target_name_field, &target_infos_field], input.len())
                >= HEADER_SIZE + 8;
        let (_, version) = cond(
            has_version,
            context("Challenge/version", Version::deserialize),
        )(rest)?;

        let target_name = target_name_field.get_text::<E>(
            "Challenge/TargetName",
            input,
            negotiate_flags.has_flag(flags::NTLMSSP_NEGOTIATE_UNICODE),
        )?;

        let target_infos = if target_infos_field.len == 0 {
            Vec::new()
        } else {
            let data = target_infos_field.slice::<E>("Challenge/TargetInfo", input)?;
            let (_, target_infos) = context("Challenge/TargetInfo", AvPair::parse_list::<E>)(data)?;
            target_infos
        };

        Ok((
            &b""[..],
            Self {
                target_name,
                negotiate_flags,
                server_challenge,
                target_infos,
                version,
            },
        ))
    }
}

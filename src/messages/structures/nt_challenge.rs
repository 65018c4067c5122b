use std::io;

use nom::combinator::{map, opt, verify};
use nom::error::context;
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::sequence::{preceded, tuple};

use crate::messages::{
    structures::{AvPair, ClientChallenge, FileTime, NtProofStr, Response24},
    utils::{write_u16, write_u32, write_u8},
    NomError, Wire,
};

/// NTLM v1 response, DESL of the server challenge.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Ntv1Challenge {
    pub response: Response24,
}

impl<'a> Wire<'a> for Ntv1Challenge {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        self.response.serialize_into(writer)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        context(
            "Ntv1Challenge",
            map(Response24::deserialize, |response| Self { response }),
        )(input)
    }
}

/// NTLMv2_CLIENT_CHALLENGE (MS-NLMP 2.2.2.7) followed by the four zero bytes
/// that close the `temp` buffer hashed into the NTProofStr.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Ntv2ClientChallenge {
    pub timestamp: FileTime,
    pub challenge_from_client: ClientChallenge,
    pub target_infos: Vec<AvPair>,
}

impl<'a> Wire<'a> for Ntv2ClientChallenge {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let mut size = 0;
        // RespType
        size += write_u8(writer, 1)?;
        // HiRespType
        size += write_u8(writer, 1)?;
        // Reserved1
        size += write_u16(writer, 0)?;
        // Reserved2
        size += write_u32(writer, 0)?;
        size += self.timestamp.serialize_into(writer)?;
        size += self.challenge_from_client.serialize_into(writer)?;
        // Reserved3
        size += write_u32(writer, 0)?;
        debug_assert_eq!(size, 28);
        size += AvPair::write_list(&self.target_infos, writer)?;
        size += write_u32(writer, 0)?;

        Ok(size)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (rest, (timestamp, challenge_from_client, _reserved3, target_infos, _z4)) = context(
            "Ntv2ClientChallenge",
            preceded(
                tuple((
                    context("RespType", verify(le_u8, |b| *b == 1)),
                    context("HiRespType", verify(le_u8, |b| *b == 1)),
                    context("Reserved1", le_u16),
                    context("Reserved2", le_u32),
                )),
                tuple((
                    FileTime::deserialize,
                    ClientChallenge::deserialize,
                    context("Reserved3", le_u32),
                    AvPair::parse_list,
                    opt(le_u32),
                )),
            ),
        )(input)?;

        Ok((
            rest,
            Self {
                timestamp,
                challenge_from_client,
                target_infos,
            },
        ))
    }
}

/// NTLMv2_RESPONSE (MS-NLMP 2.2.2.8).
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Ntv2Challenge {
    pub nt_proof_str: NtProofStr,
    pub client_challenge: Ntv2ClientChallenge,
}

impl<'a> Wire<'a> for Ntv2Challenge {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let mut size = self.nt_proof_str.serialize_into(writer)?;
        size += self.client_challenge.serialize_into(writer)?;
        Ok(size)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        context(
            "Ntv2Challenge",
            map(
                tuple((NtProofStr::deserialize, Ntv2ClientChallenge::deserialize)),
                |(nt_proof_str, client_challenge)| Self {
                    nt_proof_str,
                    client_challenge,
                },
            ),
        )(input)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum NtChallenge {
    V1(Ntv1Challenge),
    V2(Ntv2Challenge),
}

impl Default for NtChallenge {
    fn default() -> Self {
        Self::V2(Default::default())
    }
}

impl From<Ntv1Challenge> for NtChallenge {
    fn from(c: Ntv1Challenge) -> Self {
        Self::V1(c)
    }
}

impl From<Ntv2Challenge> for NtChallenge {
    fn from(c: Ntv2Challenge) -> Self {
        Self::V2(c)
    }
}

/// A 24 byte response is NTLM v1, anything else NTLMv2.
impl<'a> Wire<'a> for NtChallenge {
    fn serialize_into<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        match self {
            Self::V1(ref v1) => v1.serialize_into(writer),
            Self::V2(ref v2) => v2.serialize_into(writer),
        }
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        if input.len() == std::mem::size_of::<Response24>() {
            map(Ntv1Challenge::deserialize, Self::V1)(input)
        } else {
            map(Ntv2Challenge::deserialize, Self::V2)(input)
        }
    }
}

use std::io;

use nom::combinator::map;
use nom::error::context;
use nom::sequence::tuple;

use crate::messages::{
    structures::{ClientChallenge, Response24},
    NomError, Wire,
};

/// LM_RESPONSE (MS-NLMP 2.2.2.3).
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Lmv1Challenge {
    pub response: Response24,
}

impl Lmv1Challenge {
    /// The LM response sent with extended session security: the client
    /// challenge padded with zeros.
    pub fn from_client_challenge(client_challenge: &ClientChallenge) -> Self {
        let mut response = Response24::default();
        response[..8].copy_from_slice(client_challenge);
        Self { response }
    }
}

impl<'a> Wire<'a> for Lmv1Challenge {
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
            "Lmv1Challenge",
            map(Response24::deserialize, |response| Self { response }),
        )(input)
    }
}

/// LMv2_RESPONSE (MS-NLMP 2.2.2.4).
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Lmv2Challenge {
    pub response: [u8; 16],
    pub challenge_from_client: ClientChallenge,
}

impl<'a> Wire<'a> for Lmv2Challenge {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let mut written = self.response.serialize_into(writer)?;
        written += self.challenge_from_client.serialize_into(writer)?;
        Ok(written)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        context(
            "Lmv2Challenge",
            map(
                tuple((<[u8; 16]>::deserialize, ClientChallenge::deserialize)),
                |(response, challenge_from_client)| Self {
                    response,
                    challenge_from_client,
                },
            ),
        )(input)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LmChallenge {
    V1(Lmv1Challenge),
    V2(Lmv2Challenge),
}

impl Default for LmChallenge {
    fn default() -> Self {
        Self::V2(Default::default())
    }
}

impl From<Lmv1Challenge> for LmChallenge {
    fn from(c: Lmv1Challenge) -> Self {
        Self::V1(c)
    }
}

impl From<Lmv2Challenge> for LmChallenge {
    fn from(c: Lmv2Challenge) -> Self {
        Self::V2(c)
    }
}

/// Both versions are 24 bytes, so decoding alone cannot tell them apart and
/// yields [`LmChallenge::V1`]. The AUTHENTICATE_MESSAGE parser picks the
/// version from the NT response instead.
impl<'a> Wire<'a> for LmChallenge {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
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
        map(Lmv1Challenge::deserialize, Self::V1)(input)
    }
}

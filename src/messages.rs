//! NTLMSSP wire format (MS-NLMP section 2.2).
//!
//! Every structure implements [`Wire`], a pair of `nom` parser and
//! little-endian writer. Variable-length data is laid out the way Windows
//! does it: fixed header with `(len, max_len, offset)` fields followed by a
//! payload, see [`Field`].

use std::io::{self, Write};

use nom::error::{VerboseError, VerboseErrorKind};

pub(crate) trait NomError<'a>:
    nom::error::ContextError<&'a [u8]> + nom::error::ParseError<&'a [u8]>
{
}

impl<'a, E> NomError<'a> for E where
    E: nom::error::ParseError<&'a [u8]> + nom::error::ContextError<&'a [u8]>
{
}

pub(crate) trait Wire<'a>: Sized {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: Write;

    fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::new();
        self.serialize_into(&mut data)
            .expect("writing to a Vec cannot fail");
        data
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>;
}

/// Failure to decode an NTLMSSP message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("truncated NTLM message")]
    Incomplete,
    #[error("malformed NTLM message: {0}")]
    Invalid(String),
    #[error("cannot encode NTLM message: {0}")]
    Encode(#[from] io::Error),
}

/// Decodes a whole message, turning the `nom` error trail into a readable path
/// such as `Challenge/TargetInfo: Eof`.
pub(crate) fn decode<'a, T>(input: &'a [u8]) -> Result<T, MessageError>
where
    T: Wire<'a>,
{
    match T::deserialize::<VerboseError<&'a [u8]>>(input) {
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Incomplete(_)) => Err(MessageError::Incomplete),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let trail: Vec<_> = e
                .errors
                .iter()
                .rev()
                .map(|(_, kind)| match kind {
                    VerboseErrorKind::Context(ctx) => ctx.to_string(),
                    VerboseErrorKind::Char(c) => format!("'{}'", c),
                    VerboseErrorKind::Nom(kind) => format!("{:?}", kind),
                })
                .collect();
            Err(MessageError::Invalid(trail.join(": ")))
        }
    }
}

/// Encodes a whole message.
pub(crate) fn encode<'a, T>(message: &T) -> Result<Vec<u8>, MessageError>
where
    T: Wire<'a>,
{
    let mut data = Vec::with_capacity(256);
    message.serialize_into(&mut data)?;
    Ok(data)
}

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

mod authenticate;
pub(crate) mod challenge;
mod field;
pub mod flags;
mod negotiate;
mod structures;
mod unicode_string;
pub(crate) mod utils;

pub use authenticate::Authenticate;
pub use challenge::Challenge;
pub(crate) use field::Field;
pub use flags::Flags;
pub use negotiate::Negotiate;
pub use structures::{
    AvId, AvPair, ClientChallenge, EncryptedRandomSessionKey, ExportedSessionKey, FileTime,
    KeyExchangeKey, LmChallenge, Lmv1Challenge, Lmv2Challenge, Mic, MsvAvFlags, NtChallenge,
    NtProofStr, Ntv1Challenge, Ntv2Challenge, Ntv2ClientChallenge, Response24,
    ServerChallenge, SessionBaseKey, Version,
};
pub use unicode_string::UnicodeString;

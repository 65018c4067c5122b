//! Fixed-size building blocks shared by the three NTLM messages.

use std::fmt;
use std::io;
use std::ops::Deref;

use nom::bytes::complete::take;
use nom::combinator::{map, rest};

use crate::messages::{utils::to_array, NomError, Wire};

mod avid;
pub use avid::{AvId, AvPair, MsvAvFlags};

mod filetime;
pub use filetime::FileTime;

mod lm_challenge;
pub use lm_challenge::{LmChallenge, Lmv1Challenge, Lmv2Challenge};

mod nt_challenge;
pub use nt_challenge::{NtChallenge, Ntv1Challenge, Ntv2Challenge, Ntv2ClientChallenge};

mod version;
pub use version::Version;

pub type ServerChallenge = [u8; 8];
pub type ClientChallenge = [u8; 8];
pub type Response24 = [u8; 24];
pub type NtProofStr = [u8; 16];
pub type SessionBaseKey = [u8; 16];
pub type KeyExchangeKey = [u8; 16];
pub type ExportedSessionKey = [u8; 16];
pub type Mic = [u8; 16];

impl<'a, const N: usize> Wire<'a> for [u8; N] {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        writer.write_all(&self[..])?;
        Ok(N)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        map(take(N), to_array::<N>)(input)
    }
}

/// Session key sealed with the key exchange key. Its length is whatever the
/// AUTHENTICATE_MESSAGE field says, 16 bytes in practice.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct EncryptedRandomSessionKey(Vec<u8>);

impl<'a> Wire<'a> for EncryptedRandomSessionKey {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        writer.write_all(&self.0[..])?;
        Ok(self.0.len())
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        map(rest, Self::from)(input)
    }
}

impl From<&[u8]> for EncryptedRandomSessionKey {
    fn from(d: &[u8]) -> Self {
        Self(d.to_owned())
    }
}

impl From<Vec<u8>> for EncryptedRandomSessionKey {
    fn from(d: Vec<u8>) -> Self {
        Self(d)
    }
}

impl Deref for EncryptedRandomSessionKey {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for EncryptedRandomSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

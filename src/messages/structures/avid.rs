use std::io;

use nom::error::{context, ErrorKind};
use nom::multi::length_data;
use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;

use crate::messages::{
    structures::FileTime,
    unicode_string::UnicodeString,
    utils::{utf16le, write_u16, write_u32},
    NomError, Wire,
};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u16)]
pub enum AvId {
    MsvAvEOL = 0x0000,
    MsvAvNbComputerName = 0x0001,
    MsvAvNbDomainName = 0x0002,
    MsvAvDnsComputerName = 0x0003,
    MsvAvDnsDomainName = 0x0004,
    MsvAvDnsTreeName = 0x0005,
    MsvAvFlags = 0x0006,
    MsvAvTimestamp = 0x0007,
    MsvAvSingleHost = 0x0008,
    MsvAvTargetName = 0x0009,
    MsvAvChannelBindings = 0x000a,
}

impl AvId {
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x0000 => Some(Self::MsvAvEOL),
            0x0001 => Some(Self::MsvAvNbComputerName),
            0x0002 => Some(Self::MsvAvNbDomainName),
            0x0003 => Some(Self::MsvAvDnsComputerName),
            0x0004 => Some(Self::MsvAvDnsDomainName),
            0x0005 => Some(Self::MsvAvDnsTreeName),
            0x0006 => Some(Self::MsvAvFlags),
            0x0007 => Some(Self::MsvAvTimestamp),
            0x0008 => Some(Self::MsvAvSingleHost),
            0x0009 => Some(Self::MsvAvTargetName),
            0x000a => Some(Self::MsvAvChannelBindings),
            _ => None,
        }
    }
}

const ACCOUNT_AUTHENTICATION_CONSTRAINED: u32 = 0x0000_0001;
const MIC_PRESENT: u32 = 0x0000_0002;
const GENERATED_SPN_FROM_UNTRUSTED_SOURCE: u32 = 0x0000_0004;

#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct MsvAvFlags {
    /// Indicates to the client that the account authentication is constrained.
    pub account_authentication_constrained: bool,
    /// Indicates that the client is providing message integrity in the MIC
    /// field of the AUTHENTICATE_MESSAGE.
    pub mic_present: bool,
    /// Indicates that the client is providing a target SPN generated from an untrusted source.
    pub generated_spn_from_untrusted_source: bool,
}

impl<'a> Wire<'a> for MsvAvFlags {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let mut flags = 0;

        if self.account_authentication_constrained {
            flags |= ACCOUNT_AUTHENTICATION_CONSTRAINED;
        }
        if self.mic_present {
            flags |= MIC_PRESENT;
        }
        if self.generated_spn_from_untrusted_source {
            flags |= GENERATED_SPN_FROM_UNTRUSTED_SOURCE;
        }
        write_u32(writer, flags)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (rest, flags) = context("MsvAvFlags", le_u32)(input)?;
        if flags & !0x7 != 0 {
            log::debug!("ignoring unknown MsvAvFlags bits {:#010x}", flags & !0x7);
        }

        Ok((
            rest,
            Self {
                account_authentication_constrained: flags & ACCOUNT_AUTHENTICATION_CONSTRAINED != 0,
                mic_present: flags & MIC_PRESENT != 0,
                generated_spn_from_untrusted_source: flags & GENERATED_SPN_FROM_UNTRUSTED_SOURCE
                    != 0,
            },
        ))
    }
}

/// One entry of the TargetInfo list (MS-NLMP 2.2.2.1).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AvPair {
    /// Terminates the list. Never stored in a parsed list, the writer appends it.
    MsvAvEOL,
    /// The server's NetBIOS computer name.
    MsvAvNbComputerName(String),
    /// The server's NetBIOS domain name.
    MsvAvNbDomainName(String),
    /// The FQDN of the computer.
    MsvAvDnsComputerName(String),
    /// The FQDN of the domain.
    MsvAvDnsDomainName(String),
    /// The FQDN of the forest.
    MsvAvDnsTreeName(String),
    /// A 32-bit value indicating server or client configuration.
    MsvAvFlags(MsvAvFlags),
    /// Server local time. Its presence tells the client to send a zero LMv2 response.
    MsvAvTimestamp(FileTime),
    /// Single_Host_Data structure, kept opaque.
    MsvAvSingleHost(Vec<u8>),
    /// The SPN of the target server.
    MsvAvTargetName(String),
    /// MD5 hash of a gss_channel_bindings_struct, all zero when absent.
    MsvAvChannelBindings([u8; 16]),
    /// An AvId this crate does not know about, carried through unchanged.
    Unknown(u16, Vec<u8>),
}

impl AvPair {
    pub fn get_id(&self) -> u16 {
        let id = match self {
            Self::MsvAvEOL => AvId::MsvAvEOL,
            Self::MsvAvNbComputerName(_) => AvId::MsvAvNbComputerName,
            Self::MsvAvNbDomainName(_) => AvId::MsvAvNbDomainName,
            Self::MsvAvDnsComputerName(_) => AvId::MsvAvDnsComputerName,
            Self::MsvAvDnsDomainName(_) => AvId::MsvAvDnsDomainName,
            Self::MsvAvDnsTreeName(_) => AvId::MsvAvDnsTreeName,
            Self::MsvAvFlags(_) => AvId::MsvAvFlags,
            Self::MsvAvTimestamp(_) => AvId::MsvAvTimestamp,
            Self::MsvAvSingleHost(_) => AvId::MsvAvSingleHost,
            Self::MsvAvTargetName(_) => AvId::MsvAvTargetName,
            Self::MsvAvChannelBindings(_) => AvId::MsvAvChannelBindings,
            Self::Unknown(id, _) => return *id,
        };
        id as u16
    }

    fn value(&self) -> Vec<u8> {
        match self {
            Self::MsvAvEOL => Vec::new(),
            Self::MsvAvNbComputerName(s)
            | Self::MsvAvNbDomainName(s)
            | Self::MsvAvDnsComputerName(s)
            | Self::MsvAvDnsDomainName(s)
            | Self::MsvAvDnsTreeName(s)
            | Self::MsvAvTargetName(s) => utf16le(s),
            Self::MsvAvFlags(flags) => flags.serialize(),
            Self::MsvAvTimestamp(filetime) => filetime.serialize(),
            Self::MsvAvChannelBindings(hash) => hash.to_vec(),
            Self::MsvAvSingleHost(data) | Self::Unknown(_, data) => data.clone(),
        }
    }

    /// Parses a TargetInfo list up to and including its MsvAvEOL. Bytes after
    /// the terminator are left to the caller. A list that runs out before the
    /// terminator is accepted as is.
    pub(crate) fn parse_list<'a, E>(mut input: &'a [u8]) -> nom::IResult<&'a [u8], Vec<Self>, E>
    where
        E: NomError<'a>,
    {
        let mut pairs = Vec::new();
        while !input.is_empty() {
            let (rest, pair) = context("TargetInfo", Self::deserialize::<E>)(input)?;
            input = rest;
            if pair == Self::MsvAvEOL {
                break;
            }
            pairs.push(pair);
        }
        Ok((input, pairs))
    }

    /// Writes `pairs` followed by the MsvAvEOL terminator.
    pub(crate) fn write_list<W>(pairs: &[Self], writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let mut written = 0;
        for pair in pairs.iter().filter(|p| **p != Self::MsvAvEOL) {
            written += pair.serialize_into(writer)?;
        }
        written += Self::MsvAvEOL.serialize_into(writer)?;
        Ok(written)
    }
}

fn parse_value<'a, T, E>(data: &'a [u8]) -> Result<T, nom::Err<E>>
where
    T: Wire<'a>,
    E: NomError<'a>,
{
    let (rest, value) = T::deserialize::<E>(data)?;
    if !rest.is_empty() {
        return Err(nom::Err::Error(E::from_error_kind(rest, ErrorKind::Eof)));
    }
    Ok(value)
}

fn parse_text<'a, E>(data: &'a [u8]) -> Result<String, nom::Err<E>>
where
    E: NomError<'a>,
{
    parse_value::<UnicodeString, E>(data).map(String::from)
}

impl<'a> Wire<'a> for AvPair {
    fn serialize_into<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        let value = self.value();
        let len = u16::try_from(value.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "AvPair value too long"))?;

        let mut written = 0;
        written += write_u16(writer, self.get_id())?;
        written += write_u16(writer, len)?;
        writer.write_all(&value[..])?;
        written += value.len();

        Ok(written)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (rest, (id, data)) = context("AvPair", tuple((le_u16, length_data(le_u16))))(input)?;
        let pair = match AvId::from_u16(id) {
            Some(AvId::MsvAvEOL) => {
                if !data.is_empty() {
                    log::warn!("MsvAvEOL carries {} bytes", data.len());
                }
                Self::MsvAvEOL
            }
            Some(AvId::MsvAvNbComputerName) => Self::MsvAvNbComputerName(parse_text::<E>(data)?),
            Some(AvId::MsvAvNbDomainName) => Self::MsvAvNbDomainName(parse_text::<E>(data)?),
            Some(AvId::MsvAvDnsComputerName) => Self::MsvAvDnsComputerName(parse_text::<E>(data)?),
            Some(AvId::MsvAvDnsDomainName) => Self::MsvAvDnsDomainName(parse_text::<E>(data)?),
            Some(AvId::MsvAvDnsTreeName) => Self::MsvAvDnsTreeName(parse_text::<E>(data)?),
            Some(AvId::MsvAvTargetName) => Self::MsvAvTargetName(parse_text::<E>(data)?),
            Some(AvId::MsvAvFlags) => Self::MsvAvFlags(parse_value::<_, E>(data)?),
            Some(AvId::MsvAvTimestamp) => Self::MsvAvTimestamp(parse_value::<_, E>(data)?),
            Some(AvId::MsvAvSingleHost) => Self::MsvAvSingleHost(data.to_vec()),
            Some(AvId::MsvAvChannelBindings) => {
                Self::MsvAvChannelBindings(parse_value::<[u8; 16], E>(data)?)
            }
            None => {
                log::debug!("unknown AvId {:#06x}", id);
                Self::Unknown(id, data.to_vec())
            }
        };
        Ok((rest, pair))
    }
}

//! NEGOTIATE flags (MS-NLMP 2.2.2.5).
//!
//! Each constant is the bit index in the little-endian 32 bit flag word, so
//! `NTLMSSP_NEGOTIATE_UNICODE` is bit 0 (`0x0000_0001`) and
//! `NTLMSSP_NEGOTIATE_56` is bit 31 (`0x8000_0000`).

use std::fmt;

use crate::messages::{utils::write_u32, NomError, Wire};

use nom::combinator::{map, verify};
use nom::error::context;
use nom::number::complete::le_u32;

/// Requests Unicode character set encoding.
pub const NTLMSSP_NEGOTIATE_UNICODE: u32 = 0;

/// Requests OEM character set encoding.
pub const NTLM_NEGOTIATE_OEM: u32 = 1;

/// A TargetName field of the CHALLENGE_MESSAGE must be supplied.
pub const NTLMSSP_REQUEST_TARGET: u32 = 2;

/// Unused bit that must be set to 0
pub const R10: u32 = 3;

/// Requests session key negotiation for message signatures.
pub const NTLMSSP_NEGOTIATE_SIGN: u32 = 4;

/// Requests session key negotiation for message confidentiality.
pub const NTLMSSP_NEGOTIATE_SEAL: u32 = 5;

/// Requests connectionless authentication. When set, NTLMSSP_NEGOTIATE_KEY_EXCH
/// must always be set in the AUTHENTICATE_MESSAGE and the CHALLENGE_MESSAGE.
pub const NTLMSSP_NEGOTIATE_DATAGRAM: u32 = 6;

/// Requests LAN Manager session key computation. Mutually exclusive with
/// NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY, which wins if both are asked for.
pub const NTLMSSP_NEGOTIATE_LM_KEY: u32 = 7;

/// Unused bit that must be set to 0
pub const R9: u32 = 8;

/// Requests usage of the NTLM v1 session security protocol.
pub const NTLMSSP_NEGOTIATE_NTLM: u32 = 9;

/// Unused bit that must be set to 0
pub const R8: u32 = 10;

/// The connection should be anonymous.
pub const NTLMSSP_ANONYMOUS: u32 = 11;

/// The domain name is provided in the NEGOTIATE_MESSAGE.
pub const NTLMSSP_NEGOTIATE_OEM_DOMAIN_SUPPLIED: u32 = 12;

/// The workstation name is provided in the NEGOTIATE_MESSAGE.
pub const NTLMSSP_NEGOTIATE_OEM_WORKSTATION_SUPPLIED: u32 = 13;

/// Unused bit that must be set to 0
pub const R7: u32 = 14;

/// A session key is generated regardless of NTLMSSP_NEGOTIATE_SIGN and
/// NTLMSSP_NEGOTIATE_SEAL.
pub const NTLMSSP_NEGOTIATE_ALWAYS_SIGN: u32 = 15;

/// TargetName is a domain name. Excludes NTLMSSP_TARGET_TYPE_SERVER.
pub const NTLMSSP_TARGET_TYPE_DOMAIN: u32 = 16;

/// TargetName is a server name. Excludes NTLMSSP_TARGET_TYPE_DOMAIN.
pub const NTLMSSP_TARGET_TYPE_SERVER: u32 = 17;

/// Unused bit that must be set to 0
pub const R6: u32 = 18;

/// Requests NTLM v2 session security, which is really NTLM v1 with the
/// extended session security of NTLM v2.
pub const NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 19;

/// Requests an identify level token.
pub const NTLMSSP_NEGOTIATE_IDENTIFY: u32 = 20;

/// Unused bit that must be set to 0
pub const R5: u32 = 21;

/// Requests the usage of the LMOWF.
pub const NTLMSSP_REQUEST_NON_NT_SESSION_KEY: u32 = 22;

/// The TargetInfo fields in the CHALLENGE_MESSAGE are populated.
pub const NTLMSSP_NEGOTIATE_TARGET_INFO: u32 = 23;

/// Unused bit that must be set to 0
pub const R4: u32 = 24;

/// Requests the protocol version number, carried in the Version field of
/// every message.
pub const NTLMSSP_NEGOTIATE_VERSION: u32 = 25;

/// Unused bit that must be set to 0
pub const R3: u32 = 26;

/// Unused bit that must be set to 0
pub const R2: u32 = 27;

/// Unused bit that must be set to 0
pub const R1: u32 = 28;

/// Requests 128-bit session key negotiation.
pub const NTLMSSP_NEGOTIATE_128: u32 = 29;

/// Requests an explicit key exchange.
pub const NTLMSSP_NEGOTIATE_KEY_EXCH: u32 = 30;

/// Requests 56-bit encryption.
pub const NTLMSSP_NEGOTIATE_56: u32 = 31;

const NAMES: [&str; 32] = [
    "NTLMSSP_NEGOTIATE_UNICODE",
    "NTLM_NEGOTIATE_OEM",
    "NTLMSSP_REQUEST_TARGET",
    "R10",
    "NTLMSSP_NEGOTIATE_SIGN",
    "NTLMSSP_NEGOTIATE_SEAL",
    "NTLMSSP_NEGOTIATE_DATAGRAM",
    "NTLMSSP_NEGOTIATE_LM_KEY",
    "R9",
    "NTLMSSP_NEGOTIATE_NTLM",
    "R8",
    "NTLMSSP_ANONYMOUS",
    "NTLMSSP_NEGOTIATE_OEM_DOMAIN_SUPPLIED",
    "NTLMSSP_NEGOTIATE_OEM_WORKSTATION_SUPPLIED",
    "R7",
    "NTLMSSP_NEGOTIATE_ALWAYS_SIGN",
    "NTLMSSP_TARGET_TYPE_DOMAIN",
    "NTLMSSP_TARGET_TYPE_SERVER",
    "R6",
    "NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY",
    "NTLMSSP_NEGOTIATE_IDENTIFY",
    "R5",
    "NTLMSSP_REQUEST_NON_NT_SESSION_KEY",
    "NTLMSSP_NEGOTIATE_TARGET_INFO",
    "R4",
    "NTLMSSP_NEGOTIATE_VERSION",
    "R3",
    "R2",
    "R1",
    "NTLMSSP_NEGOTIATE_128",
    "NTLMSSP_NEGOTIATE_KEY_EXCH",
    "NTLMSSP_NEGOTIATE_56",
];

const RESERVED: [u32; 10] = [R1, R2, R3, R4, R5, R6, R7, R8, R9, R10];

#[derive(Default, PartialEq, Eq, Copy, Clone)]
#[repr(transparent)]
pub struct Flags(pub u32);

impl<'a> Wire<'a> for Flags {
    fn serialize_into<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        write_u32(writer, self.0)
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        context("Flags", map(verify(le_u32, Self::validate), Self))(input)
    }
}

impl Flags {
    /// Flags sent in the client's NEGOTIATE_MESSAGE.
    pub fn client() -> Self {
        Self::from_bits(&[
            NTLMSSP_NEGOTIATE_UNICODE,
            NTLM_NEGOTIATE_OEM,
            NTLMSSP_REQUEST_TARGET,
            NTLMSSP_NEGOTIATE_NTLM,
            NTLMSSP_NEGOTIATE_ALWAYS_SIGN,
            NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY,
            NTLMSSP_NEGOTIATE_VERSION,
            NTLMSSP_NEGOTIATE_128,
            NTLMSSP_NEGOTIATE_KEY_EXCH,
            NTLMSSP_NEGOTIATE_56,
        ])
    }

    pub fn from_bits(bits: &[u32]) -> Self {
        let mut flags = Self(0);
        for bit in bits {
            flags.set_flag(*bit);
        }
        flags
    }

    pub fn has_flag(&self, bit: u32) -> bool {
        debug_assert!(bit <= 31);
        self.0 & (1 << bit) != 0
    }

    pub fn set_flag(&mut self, bit: u32) {
        debug_assert!(bit <= 31);
        self.0 |= 1 << bit;
    }

    pub fn clear_flag(&mut self, bit: u32) {
        debug_assert!(bit <= 31);
        self.0 &= !(1 << bit);
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0 & other.0)
    }

    fn validate(flags: &u32) -> bool {
        let flags = Self(*flags);

        for bit in RESERVED {
            if flags.has_flag(bit) {
                log::warn!("flags.has_flag({})", NAMES[bit as usize]);
                if cfg!(feature = "strict") {
                    return false;
                }
            }
        }

        if flags.has_flag(NTLMSSP_TARGET_TYPE_DOMAIN) && flags.has_flag(NTLMSSP_TARGET_TYPE_SERVER)
        {
            log::warn!(
                "flags cannot have NTLMSSP_TARGET_TYPE_DOMAIN and NTLMSSP_TARGET_TYPE_SERVER"
            );
            return false;
        }

        if !flags.has_flag(NTLMSSP_NEGOTIATE_UNICODE) && !flags.has_flag(NTLM_NEGOTIATE_OEM) {
            log::warn!("neither NTLMSSP_NEGOTIATE_UNICODE nor NTLM_NEGOTIATE_OEM is set");
            return false;
        }

        true
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in NAMES.iter().enumerate() {
            if self.has_flag(bit as u32) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("0")?;
        }
        Ok(())
    }
}

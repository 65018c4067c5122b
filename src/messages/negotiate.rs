use nom::bytes::complete::tag;
use nom::combinator::{cond, verify};
use nom::error::context;
use nom::number::complete::le_u32;
use nom::sequence::{preceded, tuple};

use crate::messages::{
    decode, encode,
    field::payload_start,
    flags::{self, Flags},
    structures::Version,
    utils::write_u32,
    Field, MessageError, NomError, Wire, SIGNATURE,
};

const MESSAGE_TYPE: u32 = 0x00000001;
const HEADER_SIZE: usize = 32;

/// NEGOTIATE_MESSAGE (MS-NLMP 2.2.1.1). Domain and workstation are always
/// OEM strings here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Negotiate {
    pub negotiate_flags: Flags,
    domain_name: Option<String>,
    workstation: Option<String>,
    version: Option<Version>,
}

impl Negotiate {
    pub fn new(negotiate_flags: Flags) -> Self {
        Self {
            negotiate_flags,
            ..Default::default()
        }
    }

    pub fn parse(input: &[u8]) -> Result<Self, MessageError> {
        decode(input)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }

    pub fn set_domain_name(&mut self, domain_name: Option<String>) -> &mut Self {
        self.domain_name = domain_name;
        if self.domain_name.is_some() {
            self.negotiate_flags
                .set_flag(flags::NTLMSSP_NEGOTIATE_OEM_DOMAIN_SUPPLIED);
        } else {
            self.negotiate_flags
                .clear_flag(flags::NTLMSSP_NEGOTIATE_OEM_DOMAIN_SUPPLIED);
        }
        self
    }

    pub fn get_domain_name(&self) -> Option<&String> {
        self.domain_name.as_ref()
    }

    pub fn set_workstation(&mut self, workstation: Option<String>) -> &mut Self {
        self.workstation = workstation;
        if self.workstation.is_some() {
            self.negotiate_flags
                .set_flag(flags::NTLMSSP_NEGOTIATE_OEM_WORKSTATION_SUPPLIED);
        } else {
            self.negotiate_flags
                .clear_flag(flags::NTLMSSP_NEGOTIATE_OEM_WORKSTATION_SUPPLIED);
        }
        self
    }

    pub fn get_workstation(&self) -> Option<&String> {
        self.workstation.as_ref()
    }

    pub fn set_version(&mut self, version: Option<Version>) -> &mut Self {
        self.version = version;
        if self.version.is_some() {
            self.negotiate_flags
                .set_flag(flags::NTLMSSP_NEGOTIATE_VERSION);
        } else {
            self.negotiate_flags
                .clear_flag(flags::NTLMSSP_NEGOTIATE_VERSION);
        }
        self
    }

    pub fn get_version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
}

impl<'a> Wire<'a> for Negotiate {
    fn serialize_into<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut payload = Vec::with_capacity(HEADER_SIZE * 2);
        payload.resize(HEADER_SIZE, 0);

        if let Some(ref version) = self.version {
            version.serialize_into(&mut payload)?;
        }

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&SIGNATURE[..]);
        write_u32(&mut header, MESSAGE_TYPE)?;
        self.negotiate_flags.serialize_into(&mut header)?;
        Field::append(self.domain_name.as_ref(), &mut payload, &mut header)?;
        Field::append(self.workstation.as_ref(), &mut payload, &mut header)?;
        debug_assert_eq!(header.len(), HEADER_SIZE);

        writer.write_all(&header[..])?;
        writer.write_all(&payload[HEADER_SIZE..])?;

        Ok(payload.len())
    }

    fn deserialize<E>(input: &'a [u8]) -> nom::IResult<&'a [u8], Self, E>
    where
        E: NomError<'a>,
    {
        let (rest, (negotiate_flags, domain_name_field, workstation_field)) = context(
            "Negotiate",
            preceded(
                tuple((tag(SIGNATURE), verify(le_u32, |mt| *mt == MESSAGE_TYPE))),
                tuple((
                    Flags::deserialize,
                    context("domain_name_field", Field::deserialize),
                    context("workstation_field", Field::deserialize),
                )),
            ),
        )(input)?;

        let has_version = negotiate_flags.has_flag(flags::NTLMSSP_NEGOTIATE_VERSION)
            && payload_start(&[&domain_name_field, &workstation_field], input.len())
                >= HEADER_SIZE + 8;
        let (_, version) = cond(
            has_version,
            context("Negotiate/version", Version::deserialize),
        )(rest)?;

        let domain_name =
            domain_name_field.get_data_if::<String, E>("Negotiate/domain", input, true)?;
        let workstation =
            workstation_field.get_data_if::<String, E>("Negotiate/workstation", input, true)?;

        Ok((
            &b""[..],
            Self {
                negotiate_flags,
                domain_name,
                workstation,
                version,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// NEGOTIATE_MESSAGE with OEM domain "CONTOSO" and workstation "PC1".
    const RAW: [u8; 50] = [
        0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x32, 0x00,
        0x02, 0x07, 0x00, 0x07, 0x00, 0x28, 0x00, 0x00, 0x00, 0x03, 0x00, 0x03, 0x00, 0x2f, 0x00,
        0x00, 0x00, 0x06, 0x01, 0xb1, 0x1d, 0x00, 0x00, 0x00, 0x0f, 0x43, 0x4f, 0x4e, 0x54, 0x4f,
        0x53, 0x4f, 0x50, 0x43, 0x31,
    ];

    fn contoso() -> Negotiate {
        let mut message = Negotiate::new(Flags::from_bits(&[
            flags::NTLMSSP_NEGOTIATE_UNICODE,
            flags::NTLM_NEGOTIATE_OEM,
            flags::NTLMSSP_REQUEST_TARGET,
            flags::NTLMSSP_NEGOTIATE_NTLM,
        ]));
        message
            .set_domain_name(Some("CONTOSO".into()))
            .set_workstation(Some("PC1".into()))
            .set_version(Some(Version::client()));
        message
    }

    #[test]
    fn encode() {
        let message = contoso();
        pretty_assertions::assert_eq!(message.negotiate_flags.0, 0x0200_3207);
        pretty_assertions::assert_eq!(message.to_bytes().unwrap(), RAW.to_vec());
    }

    #[test]
    fn decode() {
        pretty_assertions::assert_eq!(Negotiate::parse(&RAW[..]).unwrap(), contoso());
    }

    #[test]
    fn minimal() {
        let message = Negotiate::new(Flags::client());
        let raw = message.to_bytes().unwrap();
        assert_eq!(raw.len(), HEADER_SIZE);

        // VERSION is advertised but the header leaves no room for it.
        let decoded = Negotiate::parse(&raw[..]).unwrap();
        assert_eq!(decoded.get_version(), None);
        assert_eq!(decoded.get_domain_name(), None);
    }

    #[test]
    fn bad_signature() {
        let mut raw = RAW;
        raw[0] = b'X';
        assert!(matches!(
            Negotiate::parse(&raw[..]),
            Err(MessageError::Invalid(_))
        ));
        assert!(Negotiate::parse(&RAW[..20]).is_err());
    }
}

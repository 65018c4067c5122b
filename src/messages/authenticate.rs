use nom::bytes::complete::tag;
use nom::combinator::{cond, verify};
use nom::error::context;
use nom::number::complete::le_u32;
use nom::sequence::{preceded, tuple};

use crate::messages::{
    decode, encode,
    field::payload_start,
    flags::{self, Flags},
    structures::{
        EncryptedRandomSessionKey, LmChallenge, Lmv1Challenge, Lmv2Challenge, Mic, NtChallenge,
        Version,
    },
    utils::write_u32,
    Field, MessageError, NomError, Wire, SIGNATURE,
};

const MESSAGE_TYPE: u32 = 0x00000003;
const HEADER_SIZE: usize = 64;

/// AUTHENTICATE_MESSAGE (MS-NLMP 2.2.1.3).
///
/// Strings are UTF-16LE when `negotiate_flags` carries
/// NTLMSSP_NEGOTIATE_UNICODE and OEM otherwise. The MIC is only written when
/// a version is present, as Windows does.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Authenticate {
    pub lm_challenge_response: Option<LmChallenge>,
    pub nt_challenge_response: Option<NtChallenge>,
    pub domain: Option<String>,
    pub user: Option<String>,
    pub workstation: Option<String>,
    encrypted_random_session_key: Option<EncryptedRandomSessionKey>,
    pub negotiate_flags: Flags,
    pub version: Option<Version>,
    pub mic: Option<Mic>,
}

impl Authenticate {
    pub fn parse(input: &[u8]) -> Result<Self, MessageError> {
        decode(input)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }

    pub fn set_encrypted_random_session_key(
        &mut self,
        encrypted_random_session_key: Option<EncryptedRandomSessionKey>,
    ) -> &mut Self {
        self.encrypted_random_session_key = encrypted_random_session_key;
        if self.encrypted_random_session_key.is_some() {
            self.negotiate_flags
                .set_flag(flags::NTLMSSP_NEGOTIATE_KEY_EXCH);
        } else {
            self.negotiate_flags
                .clear_flag(flags::NTLMSSP_NEGOTIATE_KEY_EXCH);
        }
        self
    }

    pub fn get_encrypted_random_session_key(&self) -> Option<&EncryptedRandomSessionKey> {
        self.encrypted_random_session_key.as_ref()
    }

    fn unicode(&self) -> bool {
        self.negotiate_flags
            .has_flag(flags::NTLMSSP_NEGOTIATE_UNICODE)
    }
}

impl<'a> Wire<'a> for Authenticate {
    fn serialize_into<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut payload = Vec::with_capacity(HEADER_SIZE * 4);
        payload.resize(HEADER_SIZE, 0);
        if let Some(ref version) = self.version {
            version.serialize_into(&mut payload)?;
            payload.extend_from_slice(&self.mic.unwrap_or_default()[..]);
        }

        let unicode = self.unicode();
        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&SIGNATURE[..]);
        write_u32(&mut header, MESSAGE_TYPE)?;
        Field::append(self.lm_challenge_response.as_ref(), &mut payload, &mut header)?;
        Field::append(self.nt_challenge_response.as_ref(), &mut payload, &mut header)?;
        Field::append_text(self.domain.as_ref(), unicode, &mut payload, &mut header)?;
        Field::append_text(self.user.as_ref(), unicode, &mut payload, &mut header)?;
        Field::append_text(self.workstation.as_ref(), unicode, &mut payload, &mut header)?;
        Field::append(
            self.encrypted_random_session_key.as_ref(),
            &mut payload,
            &mut header,
        )?;
        self.negotiate_flags.serialize_into(&mut header)?;
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
            (
                lm_challenge_response_field,
                nt_challenge_response_field,
                domain_field,
                user_field,
                workstation_field,
                encrypted_random_session_key_field,
                negotiate_flags,
            ),
        ) = context(
            "Authenticate",
            preceded(
                tuple((tag(SIGNATURE), verify(le_u32, |mt| *mt == MESSAGE_TYPE))),
                tuple((
                    context("lm_challenge", Field::deserialize),
                    context("nt_challenge", Field::deserialize),
                    context("domain_field", Field::deserialize),
                    context("user_field", Field::deserialize),
                    context("workstation_field", Field::deserialize),
                    context("encrypted_random_session_key_field", Field::deserialize),
                    Flags::deserialize,
                )),
            ),
        )(input)?;

        let start = payload_start(
            &[
                &lm_challenge_response_field,
                &nt_challenge_response_field,
                &domain_field,
                &user_field,
                &workstation_field,
                &encrypted_random_session_key_field,
            ],
            input.len(),
        );
        let has_version =
            negotiate_flags.has_flag(flags::NTLMSSP_NEGOTIATE_VERSION) && start >= HEADER_SIZE + 8;
        let (rest, version) = cond(
            has_version,
            context("Authenticate/version", Version::deserialize),
        )(rest)?;
        let (_, mic) = cond(
            has_version && start >= HEADER_SIZE + 8 + 16,
            context("Authenticate/mic", Mic::deserialize),
        )(rest)?;

        let nt_challenge_response = nt_challenge_response_field
            .get_data_if::<NtChallenge, E>("Authenticate/NtChallengeResponse", input, true)?;
        let lm_challenge_response = match nt_challenge_response {
            Some(NtChallenge::V2(_)) => lm_challenge_response_field
                .get_data_if::<Lmv2Challenge, E>("Authenticate/LmChallengeResponse", input, true)?
                .map(LmChallenge::V2),
            _ => lm_challenge_response_field
                .get_data_if::<Lmv1Challenge, E>("Authenticate/LmChallengeResponse", input, true)?
                .map(LmChallenge::V1),
        };

        let unicode = negotiate_flags.has_flag(flags::NTLMSSP_NEGOTIATE_UNICODE);
        let domain = domain_field.get_text::<E>("Authenticate/DomainName", input, unicode)?;
        let user = user_field.get_text::<E>("Authenticate/UserName", input, unicode)?;
        let workstation =
            workstation_field.get_text::<E>("Authenticate/Workstation", input, unicode)?;
        let encrypted_random_session_key = encrypted_random_session_key_field
            .get_data_if::<EncryptedRandomSessionKey, E>(
                "Authenticate/EncryptedRandomSessionKey",
                input,
                negotiate_flags.has_flag(flags::NTLMSSP_NEGOTIATE_KEY_EXCH),
            )?;

        Ok((
            &b""[..],
            Self {
                lm_challenge_response,
                nt_challenge_response,
                domain,
                user,
                workstation,
                encrypted_random_session_key,
                negotiate_flags,
                version,
                mic,
            },
        ))
    }
}

use log::{debug, warn};

use crate::{
    crypto::{
        self,
        lm::{self, LmHash},
        nt::{self, NtHash},
        ntlmv1, ntlmv2,
    },
    messages::{
        flags, Authenticate, Challenge, FileTime, Flags, KeyExchangeKey, LmChallenge,
        Lmv2Challenge, Negotiate, NtChallenge, Version,
    },
    session::{AuthenticateMessage, Engine, Mode, NtlmVersion, Session, SessionError},
};

/// The default engine: builds NTLMSSP messages with this crate's codec.
#[derive(Debug, Clone)]
pub struct ClientEngine {
    negotiate_flags: Flags,
}

impl Default for ClientEngine {
    fn default() -> Self {
        Self {
            negotiate_flags: Flags::client(),
        }
    }
}

impl ClientEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the flags advertised in the Negotiate message.
    pub fn with_flags(negotiate_flags: Flags) -> Self {
        Self { negotiate_flags }
    }
}

impl Engine for ClientEngine {
    type Session = ClientSession;

    fn negotiate_message(&self) -> anyhow::Result<Vec<u8>> {
        let mut message = Negotiate::new(self.negotiate_flags);
        if self
            .negotiate_flags
            .has_flag(flags::NTLMSSP_NEGOTIATE_VERSION)
        {
            message.set_version(Some(Version::client()));
        }
        Ok(message.to_bytes().map_err(SessionError::from)?)
    }

    fn create_client_session(
        &self,
        version: NtlmVersion,
        mode: Mode,
    ) -> anyhow::Result<Self::Session> {
        Ok(ClientSession::new(version, mode, self.negotiate_flags))
    }

    fn parse_challenge_message(&self, data: &[u8]) -> anyhow::Result<Challenge> {
        Ok(Challenge::parse(data).map_err(SessionError::from)?)
    }
}

#[derive(Debug)]
enum ClientState {
    New,
    ChallengeReceived(Box<Challenge>),
    AuthenticateSent,
}

pub struct ClientSession {
    version: NtlmVersion,
    mode: Mode,
    client_flags: Flags,
    state: ClientState,
    username: String,
    domain: String,
    workstation: String,
    lm_hash: LmHash,
    nt_hash: NtHash,
}

impl ClientSession {
    pub fn new(version: NtlmVersion, mode: Mode, client_flags: Flags) -> Self {
        let (lm_hash, nt_hash) = compute_ntlm_hashes("");
        Self {
            version,
            mode,
            client_flags,
            state: ClientState::New,
            username: String::new(),
            domain: String::new(),
            workstation: String::new(),
            lm_hash,
            nt_hash,
        }
    }

    fn negotiated_flags(&self, challenge: &Challenge) -> Result<Flags, SessionError> {
        match self.mode {
            Mode::Connectionless => Ok(challenge.negotiate_flags),
            Mode::ConnectionOriented => {
                let negotiated = self.client_flags.intersection(&challenge.negotiate_flags);
                if !negotiated.has_flag(flags::NTLMSSP_NEGOTIATE_NTLM) {
                    return Err(SessionError::Unsupported(
                        "server did not agree to NTLM authentication",
                    ));
                }
                Ok(negotiated)
            }
        }
    }

    fn ntlmv2_responses(
        &self,
        challenge: &Challenge,
    ) -> (LmChallenge, NtChallenge, KeyExchangeKey) {
        let response_key = nt::ntowfv2(&self.username, &self.nt_hash, &self.domain);
        let client_challenge = crypto::nonce::<8>();
        let server_timestamp = challenge.timestamp();
        let timestamp = server_timestamp.unwrap_or_else(FileTime::now);

        let (lm_response, nt_response, session_base_key) = ntlmv2::compute_response(
            &response_key,
            &challenge.server_challenge,
            &client_challenge,
            timestamp,
            &challenge.target_infos,
        );
        // MS-NLMP 3.1.5.1.2: no LMv2 response when the server sent its time.
        let lm_response = match server_timestamp {
            Some(_) => Lmv2Challenge::default(),
            None => lm_response,
        };

        (lm_response.into(), nt_response.into(), session_base_key)
    }

    fn ntlmv1_responses(
        &self,
        negotiate_flags: &Flags,
        challenge: &Challenge,
    ) -> (LmChallenge, NtChallenge, KeyExchangeKey) {
        let client_challenge = crypto::nonce::<8>();
        let (lm_response, nt_response, session_base_key) = ntlmv1::compute_response(
            negotiate_flags,
            &self.nt_hash,
            &self.lm_hash,
            &challenge.server_challenge,
            &client_challenge,
            true,
        );
        let key_exchange_key = ntlmv1::kxkey(
            negotiate_flags,
            &session_base_key,
            &lm_response,
            &self.lm_hash,
            &challenge.server_challenge,
        );

        (lm_response.into(), nt_response.into(), key_exchange_key)
    }
}

fn compute_ntlm_hashes(password: &str) -> (LmHash, NtHash) {
    (lm::lmowfv1(password), nt::ntowfv1(password))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

impl Session for ClientSession {
    type Challenge = Challenge;

    fn set_user_info(&mut self, user: &str, password: &str, domain: &str, workstation: &str) {
        self.username = user.to_owned();
        self.domain = domain.to_owned();
        self.workstation = workstation.to_owned();
        (self.lm_hash, self.nt_hash) = compute_ntlm_hashes(password);
    }

    fn process_challenge_message(&mut self, challenge: Challenge) -> anyhow::Result<()> {
        match self.state {
            ClientState::New => {}
            _ => return Err(SessionError::InvalidState("challenge already processed").into()),
        }
        if self.version == NtlmVersion::V2
            && !challenge
                .negotiate_flags
                .has_flag(flags::NTLMSSP_NEGOTIATE_TARGET_INFO)
        {
            warn!("NTLMv2 challenge without target info");
        }
        debug!(
            "challenge from {:?} with flags {:?}",
            challenge.target_name, challenge.negotiate_flags
        );
        self.state = ClientState::ChallengeReceived(Box::new(challenge));
        Ok(())
    }

    fn generate_authenticate_message(&mut self) -> anyhow::Result<AuthenticateMessage> {
        let challenge = match self.state {
            ClientState::ChallengeReceived(ref challenge) => challenge,
            _ => return Err(SessionError::InvalidState("no challenge to answer").into()),
        };
        let negotiate_flags = self.negotiated_flags(challenge)?;

        let (lm_response, nt_response, key_exchange_key) = match self.version {
            NtlmVersion::V2 => self.ntlmv2_responses(challenge),
            NtlmVersion::V1 => self.ntlmv1_responses(&negotiate_flags, challenge),
        };
        let (_exported_session_key, encrypted_random_session_key) =
            crypto::encrypt_random_session_key(&negotiate_flags, &key_exchange_key, None);

        let with_version = negotiate_flags.has_flag(flags::NTLMSSP_NEGOTIATE_VERSION);
        let mut message = Authenticate::default();
        message.lm_challenge_response = Some(lm_response);
        message.nt_challenge_response = Some(nt_response);
        message.domain = non_empty(&self.domain);
        message.user = non_empty(&self.username);
        message.workstation = non_empty(&self.workstation);
        message.negotiate_flags = negotiate_flags;
        message.version = with_version.then(Version::client);
        message.mic = with_version.then_some([0u8; 16]);
        if negotiate_flags.has_flag(flags::NTLMSSP_NEGOTIATE_KEY_EXCH)
            && encrypted_random_session_key.is_none()
        {
            debug!("key exchange without signing or sealing, no session key sent");
        }
        message.set_encrypted_random_session_key(encrypted_random_session_key);

        let data = message.to_bytes().map_err(SessionError::from)?;
        self.state = ClientState::AuthenticateSent;
        Ok(data.into())
    }
}

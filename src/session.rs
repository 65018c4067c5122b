//! The capability interface between the HTTP transport and an NTLM engine.
//!
//! The transport only ever needs three things from an engine: a Negotiate
//! message, a way to parse the server's Challenge, and a fresh session that
//! turns that challenge plus the user's credentials into an Authenticate
//! message. [`ClientEngine`] is the implementation shipped with this crate.

use std::fmt;

use crate::messages::MessageError;

pub use crate::client::{ClientEngine, ClientSession};

/// Which response algorithm the session computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NtlmVersion {
    V1,
    #[default]
    V2,
}

/// How the negotiate flags of the session are settled (MS-NLMP 3.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The client takes the flags offered in the challenge.
    #[default]
    Connectionless,
    /// The client keeps the flags it sent in its Negotiate message that the
    /// server also agreed to.
    ConnectionOriented,
}

pub trait Engine: Send + Sync {
    type Session: Session;

    /// The base message sent with the probe request.
    fn negotiate_message(&self) -> anyhow::Result<Vec<u8>>;

    fn create_client_session(
        &self,
        version: NtlmVersion,
        mode: Mode,
    ) -> anyhow::Result<Self::Session>;

    fn parse_challenge_message(
        &self,
        data: &[u8],
    ) -> anyhow::Result<<Self::Session as Session>::Challenge>;
}

/// One authentication attempt. A session is never reused.
pub trait Session {
    type Challenge;

    /// Empty strings stand for absent values.
    fn set_user_info(&mut self, user: &str, password: &str, domain: &str, workstation: &str);

    fn process_challenge_message(&mut self, challenge: Self::Challenge) -> anyhow::Result<()>;

    fn generate_authenticate_message(&mut self) -> anyhow::Result<AuthenticateMessage>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticateMessage(Vec<u8>);

impl AuthenticateMessage {
    pub fn bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl From<Vec<u8>> for AuthenticateMessage {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl fmt::Debug for AuthenticateMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthenticateMessage")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// What the transport hands to every new session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub domain: String,
    pub username: String,
    pub password: String,
    pub workstation: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Accepts `DOMAIN\user`, `user@domain` or a bare user name.
    pub fn parse_user(user: &str, password: impl Into<String>) -> Self {
        let (domain, username) = if let Some((domain, user)) = user.split_once('\\') {
            (domain, user)
        } else if let Some((user, domain)) = user.split_once('@') {
            (domain, user)
        } else {
            ("", user)
        };
        Self {
            domain: domain.to_owned(),
            username: username.to_owned(),
            password: password.into(),
            workstation: String::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_workstation(mut self, workstation: impl Into<String>) -> Self {
        self.workstation = workstation.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("workstation", &self.workstation)
            .finish()
    }
}

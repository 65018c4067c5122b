//! Client-side NTLM authentication for HTTP.
//!
//! [`transport::NtlmTransport`] wraps any [`transport::Transport`] (a
//! `reqwest::Client` by default) and answers the server's NTLM challenge
//! before sending the caller's request. The NTLM exchange itself is driven
//! through the [`session::Engine`] interface; [`session::ClientEngine`] builds
//! the messages with the [`messages`] codec.

mod client;
mod crypto;
pub mod messages;
pub mod session;
pub mod transport;

pub use session::{ClientEngine, Credentials, Mode, NtlmVersion};
pub use transport::{Error, NtlmTransport, Transport};

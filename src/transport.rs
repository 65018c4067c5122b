//! NTLM over HTTP: a [`Transport`] that runs the Negotiate / Challenge /
//! Authenticate exchange before handing the caller's request to the server.
//!
//! ```no_run
//! # async fn run() -> Result<(), http_ntlm::transport::Error> {
//! use http_ntlm::{session::Credentials, transport::NtlmTransport};
//!
//! let transport = NtlmTransport::builder()
//!     .credentials(Credentials::parse_user("CONTOSO\\alice", "secret"))
//!     .build()?;
//! let request = reqwest::Client::new()
//!     .get("http://intranet.contoso.com/")
//!     .build()?;
//! let response = transport.send(request).await?;
//! # drop(response);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{
    HeaderValue, InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE, WWW_AUTHENTICATE,
};
use http::{Method, StatusCode};
use log::debug;
use reqwest::cookie::CookieStore;
use reqwest::{Request, Response};

use crate::session::{ClientEngine, Credentials, Engine, Mode, NtlmVersion, Session};

/// Handshakes run per `send`: the first one plus a single retry on an empty
/// challenge.
const ATTEMPTS: usize = 2;

const SCHEME: &str = "NTLM";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("WWW-Authenticate header missing")]
    MissingHeader,
    #[error("wrong WWW-Authenticate header")]
    WrongHeader,
    #[error("empty NTLM challenge")]
    EmptyChallenge,
    #[error("invalid base64 in NTLM challenge: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("NTLM session: {0}")]
    Session(#[from] anyhow::Error),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),
}

/// Sends one request and yields its response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: Request) -> Result<Response, Error>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn round_trip(&self, request: Request) -> Result<Response, Error> {
        Ok(self.execute(request).await?)
    }
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn round_trip(&self, request: Request) -> Result<Response, Error> {
        (**self).round_trip(request).await
    }
}

/// The inner transport plus the optional cookie jar, shared by the probe and
/// the final request of one `send`.
struct Client<'a> {
    transport: &'a dyn Transport,
    cookie_store: Option<&'a dyn CookieStore>,
}

impl<'a> Client<'a> {
    async fn execute(&self, mut request: Request) -> Result<Response, Error> {
        let url = request.url().clone();
        if let Some(store) = self.cookie_store {
            if !request.headers().contains_key(COOKIE) {
                if let Some(cookies) = store.cookies(&url) {
                    request.headers_mut().insert(COOKIE, cookies);
                }
            }
        }

        let response = self.transport.round_trip(request).await?;

        if let Some(store) = self.cookie_store {
            let mut set_cookies = response.headers().get_all(SET_COOKIE).iter();
            store.set_cookies(&mut set_cookies, &url);
        }
        Ok(response)
    }
}

enum Handshake {
    /// The probe was not challenged; its response is the answer.
    Finished(Response),
    Authorize(HeaderValue),
}

/// Wraps an inner [`Transport`] and authenticates every request with NTLM.
pub struct NtlmTransport<H = ClientEngine> {
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    cookie_store: Option<Arc<dyn CookieStore>>,
    engine: H,
    version: NtlmVersion,
    mode: Mode,
}

impl NtlmTransport {
    pub fn builder() -> Builder {
        Builder::default()
    }
}

impl<H> NtlmTransport<H>
where
    H: Engine,
{
    /// Runs the handshake then sends `request` with the resulting
    /// `Authorization` header. The request itself is sent at most once.
    pub async fn send(&self, mut request: Request) -> Result<Response, Error> {
        let client = Client {
            transport: &*self.transport,
            cookie_store: self.cookie_store.as_deref(),
        };

        let mut attempt = 1;
        let authorization = loop {
            match self.handshake(&client, &request).await {
                Ok(Handshake::Finished(response)) => return Ok(response),
                Ok(Handshake::Authorize(authorization)) => break authorization,
                Err(Error::EmptyChallenge) if attempt < ATTEMPTS => {
                    debug!("empty NTLM challenge from {}, retrying", request.url());
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        request.headers_mut().insert(AUTHORIZATION, authorization);
        debug!("sending authenticated {} {}", request.method(), request.url());
        client.execute(request).await
    }

    async fn handshake(&self, client: &Client<'_>, request: &Request) -> Result<Handshake, Error> {
        let negotiate = self.engine.negotiate_message()?;
        let mut probe = Request::new(Method::GET, request.url().clone());
        *probe.timeout_mut() = request.timeout().copied();
        probe
            .headers_mut()
            .insert(AUTHORIZATION, authorization(&negotiate)?);

        debug!("sending NTLM negotiate to {}", request.url());
        let response = client.execute(probe).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            debug!("probe answered with {}", response.status());
            return Ok(Handshake::Finished(response));
        }

        let challenges: Vec<String> = response
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();
        // The connection only goes back to the pool once the body is read.
        response.bytes().await?;

        let challenge = base64::decode(select_challenge(&challenges)?)?;
        debug!("received {} byte NTLM challenge", challenge.len());
        Ok(Handshake::Authorize(self.authenticate(&challenge)?))
    }

    fn authenticate(&self, challenge: &[u8]) -> Result<HeaderValue, Error> {
        let mut session = self
            .engine
            .create_client_session(self.version, self.mode)?;
        session.set_user_info(
            &self.credentials.username,
            &self.credentials.password,
            &self.credentials.domain,
            &self.credentials.workstation,
        );
        let challenge = self.engine.parse_challenge_message(challenge)?;
        session.process_challenge_message(challenge)?;
        let message = session.generate_authenticate_message()?;
        authorization(message.bytes())
    }
}

#[async_trait]
impl<H> Transport for NtlmTransport<H>
where
    H: Engine,
{
    async fn round_trip(&self, request: Request) -> Result<Response, Error> {
        self.send(request).await
    }
}

fn authorization(message: &[u8]) -> Result<HeaderValue, Error> {
    Ok(HeaderValue::try_from(format!(
        "{} {}",
        SCHEME,
        base64::encode(message)
    ))?)
}

/// Picks the payload of the first `NTLM` value. The scheme is matched case
/// sensitively and must be followed by whitespace or nothing.
fn select_challenge(values: &[String]) -> Result<&str, Error> {
    if values.is_empty() {
        return Err(Error::MissingHeader);
    }
    for value in values {
        let rest = match value.strip_prefix(SCHEME) {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
            _ => continue,
        };
        let payload = rest.trim();
        if payload.is_empty() {
            return Err(Error::EmptyChallenge);
        }
        return Ok(payload);
    }
    Err(Error::WrongHeader)
}

pub struct Builder<H = ClientEngine> {
    credentials: Credentials,
    transport: Option<Arc<dyn Transport>>,
    cookie_store: Option<Arc<dyn CookieStore>>,
    engine: H,
    version: NtlmVersion,
    mode: Mode,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            transport: None,
            cookie_store: None,
            engine: ClientEngine::default(),
            version: NtlmVersion::default(),
            mode: Mode::default(),
        }
    }
}

impl<H> Builder<H>
where
    H: Engine,
{
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Inner transport for the probe and the final request. Defaults to a
    /// `reqwest::Client` that does not follow redirects.
    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport) as Arc<dyn Transport>);
        self
    }

    pub fn cookie_store<C>(mut self, cookie_store: Arc<C>) -> Self
    where
        C: CookieStore + 'static,
    {
        self.cookie_store = Some(cookie_store as Arc<dyn CookieStore>);
        self
    }

    pub fn engine<E>(self, engine: E) -> Builder<E>
    where
        E: Engine,
    {
        Builder {
            credentials: self.credentials,
            transport: self.transport,
            cookie_store: self.cookie_store,
            engine,
            version: self.version,
            mode: self.mode,
        }
    }

    pub fn version(mut self, version: NtlmVersion) -> Self {
        self.version = version;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<NtlmTransport<H>, Error> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                reqwest::Client::builder()
                    .redirect(reqwest::redirect::Policy::none())
                    .build()?,
            ),
        };
        Ok(NtlmTransport {
            credentials: self.credentials,
            transport,
            cookie_store: self.cookie_store,
            engine: self.engine,
            version: self.version,
            mode: self.mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use http::HeaderMap;
    use reqwest::Url;

    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct Recorded {
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
        timeout: Option<Duration>,
    }

    #[derive(Default)]
    struct StubTransport {
        responses: Mutex<VecDeque<http::Response<Vec<u8>>>>,
        requests: Mutex<Vec<Recorded>>,
    }

    impl StubTransport {
        fn new(responses: Vec<http::Response<Vec<u8>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> std::sync::MutexGuard<'_, Vec<Recorded>> {
            self.requests.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn round_trip(&self, request: Request) -> Result<Response, Error> {
            self.requests.lock().unwrap().push(Recorded {
                method: request.method().clone(),
                url: request.url().clone(),
                headers: request.headers().clone(),
                body: request
                    .body()
                    .and_then(|body| body.as_bytes())
                    .map(<[u8]>::to_vec),
                timeout: request.timeout().copied(),
            });
            match self.responses.lock().unwrap().pop_front() {
                Some(response) => Ok(response.into()),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "no response queued",
                )
                .into()),
            }
        }
    }

    #[derive(Default)]
    struct FakeEngine;

    #[derive(Default)]
    struct FakeSession {
        user: String,
        challenge: Vec<u8>,
    }

    impl Engine for FakeEngine {
        type Session = FakeSession;

        fn negotiate_message(&self) -> anyhow::Result<Vec<u8>> {
            Ok(b"negotiate".to_vec())
        }

        fn create_client_session(
            &self,
            _version: NtlmVersion,
            _mode: Mode,
        ) -> anyhow::Result<FakeSession> {
            Ok(FakeSession::default())
        }

        fn parse_challenge_message(&self, data: &[u8]) -> anyhow::Result<Vec<u8>> {
            if data == b"garbled" {
                anyhow::bail!("cannot parse challenge");
            }
            Ok(data.to_vec())
        }
    }

    impl Session for FakeSession {
        type Challenge = Vec<u8>;

        fn set_user_info(&mut self, user: &str, _: &str, _: &str, _: &str) {
            self.user = user.to_owned();
        }

        fn process_challenge_message(&mut self, challenge: Vec<u8>) -> anyhow::Result<()> {
            self.challenge = challenge;
            Ok(())
        }

        fn generate_authenticate_message(
            &mut self,
        ) -> anyhow::Result<crate::session::AuthenticateMessage> {
            let mut message = format!("{}:", self.user).into_bytes();
            message.extend_from_slice(&self.challenge);
            Ok(message.into())
        }
    }

    fn response(status: u16, www_authenticate: &[&str], body: &str) -> http::Response<Vec<u8>> {
        let mut builder = http::Response::builder().status(status);
        for value in www_authenticate {
            builder = builder.header(WWW_AUTHENTICATE, *value);
        }
        builder.body(body.as_bytes().to_vec()).unwrap()
    }

    fn challenge(payload: &[u8]) -> String {
        format!("NTLM {}", base64::encode(payload))
    }

    fn transport(stub: &Arc<StubTransport>) -> NtlmTransport<FakeEngine> {
        NtlmTransport::builder()
            .credentials(Credentials::new("alice", "secret"))
            .transport(Arc::clone(stub))
            .engine(FakeEngine)
            .build()
            .unwrap()
    }

    fn post() -> Request {
        let mut request = Request::new(
            Method::POST,
            Url::parse("http://intranet.test/upload").unwrap(),
        );
        *request.body_mut() = Some("payload".into());
        request
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_static("42"));
        request
    }

    fn negotiate_header() -> String {
        format!("NTLM {}", base64::encode(b"negotiate"))
    }

    #[tokio::test]
    async fn not_challenged() {
        init();
        let stub = StubTransport::new(vec![response(200, &[], "hello")]);
        let response = transport(&stub).send(post()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        pretty_assertions::assert_eq!(&response.bytes().await.unwrap()[..], b"hello");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url.as_str(), "http://intranet.test/upload");
        assert_eq!(requests[0].body, None);
        pretty_assertions::assert_eq!(requests[0].headers[AUTHORIZATION], negotiate_header());
        assert!(!requests[0].headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn authenticated() {
        init();
        let mut accepted = response(201, &[], "created");
        accepted
            .headers_mut()
            .insert("x-served-by", HeaderValue::from_static("iis"));
        let stub = StubTransport::new(vec![
            response(401, &[&challenge(b"nonce")], "denied"),
            accepted,
        ]);
        let mut request = post();
        *request.timeout_mut() = Some(Duration::from_secs(5));
        let response = transport(&stub).send(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-served-by"], "iis");
        pretty_assertions::assert_eq!(&response.bytes().await.unwrap()[..], b"created");

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(5)));

        let last = &requests[1];
        assert_eq!(last.method, Method::POST);
        assert_eq!(last.body.as_deref(), Some(&b"payload"[..]));
        assert_eq!(last.headers["x-request-id"], "42");
        pretty_assertions::assert_eq!(
            last.headers[AUTHORIZATION],
            format!("NTLM {}", base64::encode(b"alice:nonce"))
        );
    }

    #[tokio::test]
    async fn missing_header() {
        init();
        let stub = StubTransport::new(vec![response(401, &[], "")]);
        let err = transport(&stub).send(post()).await.unwrap_err();
        assert!(matches!(err, Error::MissingHeader));
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn wrong_header() {
        init();
        let stub = StubTransport::new(vec![response(
            401,
            &["Basic realm=\"intranet\"", "Negotiate abc"],
            "",
        )]);
        let err = transport(&stub).send(post()).await.unwrap_err();
        assert!(matches!(err, Error::WrongHeader));
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn empty_challenge_twice() {
        init();
        let stub = StubTransport::new(vec![
            response(401, &["NTLM"], ""),
            response(401, &["NTLM  "], ""),
        ]);
        let err = transport(&stub).send(post()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyChallenge));

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        for request in requests.iter() {
            assert_eq!(request.method, Method::GET);
            pretty_assertions::assert_eq!(request.headers[AUTHORIZATION], negotiate_header());
        }
    }

    #[tokio::test]
    async fn empty_challenge_then_valid() {
        init();
        let stub = StubTransport::new(vec![
            response(401, &["NTLM"], ""),
            response(401, &[&challenge(b"second")], ""),
            response(200, &[], "ok"),
        ]);
        let response = transport(&stub).send(post()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let requests = stub.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].method, Method::GET);
        assert_eq!(requests[2].method, Method::POST);
        pretty_assertions::assert_eq!(
            requests[2].headers[AUTHORIZATION],
            format!("NTLM {}", base64::encode(b"alice:second"))
        );
    }

    #[tokio::test]
    async fn ntlm_after_negotiate() {
        init();
        let stub = StubTransport::new(vec![
            response(401, &["Negotiate abc", &challenge(b"ntlm")], ""),
            response(200, &[], ""),
        ]);
        transport(&stub).send(post()).await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        pretty_assertions::assert_eq!(
            requests[1].headers[AUTHORIZATION],
            format!("NTLM {}", base64::encode(b"alice:ntlm"))
        );
    }

    #[tokio::test]
    async fn invalid_base64() {
        init();
        let stub = StubTransport::new(vec![response(401, &["NTLM !!!"], "")]);
        let err = transport(&stub).send(post()).await.unwrap_err();
        assert!(matches!(err, Error::Base64(_)));
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn engine_rejects_challenge() {
        init();
        let stub = StubTransport::new(vec![response(401, &[&challenge(b"garbled")], "")]);
        let err = transport(&stub).send(post()).await.unwrap_err();
        assert!(matches!(err, Error::Session(_)));
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure() {
        init();
        let stub = StubTransport::new(vec![]);
        let err = transport(&stub).send(post()).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn cookies() {
        init();
        let mut challenged = response(401, &[&challenge(b"nonce")], "");
        challenged
            .headers_mut()
            .insert(SET_COOKIE, HeaderValue::from_static("affinity=node1; Path=/"));
        let stub = StubTransport::new(vec![challenged, response(200, &[], "")]);
        let jar = Arc::new(reqwest::cookie::Jar::default());
        let transport = NtlmTransport::builder()
            .credentials(Credentials::new("alice", "secret"))
            .transport(Arc::clone(&stub))
            .cookie_store(Arc::clone(&jar))
            .engine(FakeEngine)
            .build()
            .unwrap();
        transport.send(post()).await.unwrap();

        let requests = stub.requests();
        assert!(!requests[0].headers.contains_key(COOKIE));
        assert_eq!(requests[1].headers[COOKIE], "affinity=node1");
    }

    #[test]
    fn scheme_token() {
        let values = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

        assert!(matches!(select_challenge(&[]), Err(Error::MissingHeader)));
        assert!(matches!(
            select_challenge(&values(&["ntlm abc"])),
            Err(Error::WrongHeader)
        ));
        assert!(matches!(
            select_challenge(&values(&["NTLMv2 abc"])),
            Err(Error::WrongHeader)
        ));
        assert!(matches!(
            select_challenge(&values(&["NTLM \t"])),
            Err(Error::EmptyChallenge)
        ));
        assert_eq!(
            select_challenge(&values(&["Negotiate", "NTLM\tabc= ", "NTLM def"])).unwrap(),
            "abc="
        );
        // Only the first NTLM value counts, even when it is empty.
        assert!(matches!(
            select_challenge(&values(&["NTLM", "NTLM def"])),
            Err(Error::EmptyChallenge)
        ));
    }
}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use http_ntlm::messages::{Authenticate, AvPair, NtChallenge};
use http_ntlm::{Credentials, NtlmTransport};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const CHALLENGE: &str = "TlRMTVNTUAACAAAAEAAQADAAAAAFgominWXBG0VA2i4AAAAAAAAAAHYAdgBAAAAAQwBJAFMAQwBPAEwAQQBCAAIAEABDAEkAUwBDAE8ATABBAEIAAQAQAFAATwBTAEUASQBEAE8ATgAEABgAYwBpAHMAYwBvAGwAYQBiAC4AYwBvAG0AAwAqAHAAbwBzAGUAaQBkAG8AbgAuAGMAaQBzAGMAbwBsAGEAYgAuAGMAbwBtAAAAAAA=";

/// Large enough that an unread 401 body keeps the connection out of the pool.
const DENIED_BODY_LEN: usize = 256 * 1024;

#[derive(Default)]
struct ServerState {
    empty_challenge: bool,
    connections: AtomicUsize,
    requests: Mutex<Vec<String>>,
    authenticate: Mutex<Option<Vec<u8>>>,
}

async fn serve(empty_challenge: bool) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState {
        empty_challenge,
        ..Default::default()
    });
    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            server_state.connections.fetch_add(1, Ordering::SeqCst);
            let state = Arc::clone(&server_state);
            tokio::spawn(async move {
                if let Err(err) = handle_client(stream, state).await {
                    eprintln!("client error: {err}");
                }
            });
        }
    });
    (addr, state)
}

async fn handle_client(stream: TcpStream, state: Arc<ServerState>) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }

        let mut authorization = None;
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let value = value.trim();
                if name.eq_ignore_ascii_case("authorization") {
                    authorization = Some(value.to_owned());
                } else if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.parse().unwrap_or(0);
                }
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        state
            .requests
            .lock()
            .unwrap()
            .push(request_line.trim_end().to_owned());

        let message = authorization
            .as_deref()
            .and_then(|value| value.strip_prefix("NTLM "))
            .and_then(|payload| base64::decode(payload).ok());
        let response = match message {
            Some(message) if message.get(8) == Some(&3) => {
                *state.authenticate.lock().unwrap() = Some(message);
                "HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\nwelcome".to_owned()
            }
            Some(_) if !state.empty_challenge => denied(&format!(
                "WWW-Authenticate: Negotiate\r\nWWW-Authenticate: NTLM {}\r\n",
                CHALLENGE
            )),
            _ => denied("WWW-Authenticate: NTLM\r\n"),
        };
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
    }
}

fn denied(headers: &str) -> String {
    format!(
        "HTTP/1.1 401 Unauthorized\r\n{}Content-Length: {}\r\n\r\n{}",
        headers,
        DENIED_BODY_LEN,
        "x".repeat(DENIED_BODY_LEN)
    )
}

#[tokio::test]
async fn handshake_against_server() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (addr, state) = serve(false).await;

    let transport = NtlmTransport::builder()
        .credentials(
            Credentials::parse_user("CISCOLAB\\alice", "Password").with_workstation("WS01"),
        )
        .build()
        .unwrap();
    let request = reqwest::Client::new()
        .get(format!("http://{}/protected", addr))
        .build()
        .unwrap();
    let response = transport.send(request).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(&response.bytes().await.unwrap()[..], b"welcome");
    assert_eq!(
        *state.requests.lock().unwrap(),
        vec![
            "GET /protected HTTP/1.1".to_owned(),
            "GET /protected HTTP/1.1".to_owned()
        ]
    );
    // The challenge body was read to the end, so the final request reused
    // the negotiate request's connection.
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);

    let message = state.authenticate.lock().unwrap().take().unwrap();
    let authenticate = Authenticate::parse(&message[..]).unwrap();
    assert_eq!(authenticate.user.as_deref(), Some("alice"));
    assert_eq!(authenticate.domain.as_deref(), Some("CISCOLAB"));
    assert_eq!(authenticate.workstation.as_deref(), Some("WS01"));
    match authenticate.nt_challenge_response {
        Some(NtChallenge::V2(response)) => {
            assert_eq!(response.client_challenge.target_infos.len(), 4);
            assert!(response
                .client_challenge
                .target_infos
                .contains(&AvPair::MsvAvNbComputerName("POSEIDON".into())));
        }
        other => panic!("expected an NTLMv2 response, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_challenge_is_retried_once() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (addr, state) = serve(true).await;

    let transport = NtlmTransport::builder()
        .credentials(Credentials::new("alice", "Password"))
        .build()
        .unwrap();
    let request = reqwest::Client::new()
        .get(format!("http://{}/", addr))
        .build()
        .unwrap();
    let err = transport.send(request).await.unwrap_err();
    assert!(matches!(err, http_ntlm::Error::EmptyChallenge));
    assert_eq!(state.requests.lock().unwrap().len(), 2);
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
    assert!(state.authenticate.lock().unwrap().is_none());
}

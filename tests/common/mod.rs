//! Shared utilities for integration tests.
//!
//! Provides a mock pub/sub SQL server: a loopback listener that performs the
//! preamble exchange and then hands the framed connection to a test-supplied
//! behavior.

#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::future::Future;

use pubsql::{codec::WireCodec, frame::Frame, preamble};
use tokio::{net::TcpListener, net::TcpStream, task::JoinHandle};
use tokio_util::codec::Framed;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Framed server side of one accepted connection.
pub type ServerConn = Framed<TcpStream, WireCodec>;

/// Start a one-connection mock server.
///
/// Accepts a single client, answers the preamble, and runs `behavior` on the
/// framed connection. Returns the `host:port` string to connect to.
pub async fn spawn_server<F, Fut>(behavior: F) -> TestResult<(String, JoinHandle<()>)>
where
    F: FnOnce(ServerConn) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept failed");
        preamble::accept(&mut stream)
            .await
            .expect("server handshake failed");
        behavior(Framed::new(stream, WireCodec::default())).await;
    });
    Ok((addr.to_string(), handle))
}

/// Build an ok response whose message echoes back for correlation checks.
pub fn ok_response(id: u64, message: &str) -> Frame {
    Frame::Response {
        id,
        payload: format!(
            r#"{{"status":"ok","msg":"{message}","rows":[{{"id":"1","col":"val"}}]}}"#
        ),
    }
}

/// Read frames until a request arrives, panicking on anything unexpected.
pub async fn expect_request(conn: &mut ServerConn) -> (u64, String) {
    use futures::StreamExt;

    match conn.next().await {
        Some(Ok(Frame::Request { id, query })) => (id, query),
        other => panic!("expected a request frame, got {other:?}"),
    }
}

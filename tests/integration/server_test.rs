//! TCP transport integration tests.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use vmrelay::interpreter::RelayContext;
use vmrelay::server;

use super::{test_settings, two_vm_backend};

/// Starts a relay on an ephemeral port and returns its address.
async fn start_relay(
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
) -> std::net::SocketAddr {
    let ctx = RelayContext::new(Arc::new(two_vm_backend()), test_settings());
    let listener = server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve_tcp(listener, ctx, idle_timeout, shutdown));
    addr
}

struct Controller {
    lines: tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Controller {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) -> Option<String> {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
        self.lines.next_line().await.unwrap()
    }
}

#[tokio::test]
async fn test_tcp_session() {
    let shutdown = CancellationToken::new();
    let addr = start_relay(None, shutdown.clone()).await;
    let mut controller = Controller::connect(addr).await;

    assert_eq!(controller.send("get backend").await.as_deref(), Some("Mock"));
    assert_eq!(
        controller.send("select search web").await.as_deref(),
        Some("SUCCEED VmName web")
    );
    assert_eq!(
        controller.send("set cpuCount 2").await.as_deref(),
        Some("SUCCEED")
    );
    assert_eq!(controller.send("exit").await.as_deref(), Some("exit"));
    assert_eq!(controller.lines.next_line().await.unwrap(), None);

    shutdown.cancel();
}

#[tokio::test]
async fn test_each_connection_has_its_own_selection() {
    let shutdown = CancellationToken::new();
    let addr = start_relay(None, shutdown.clone()).await;
    let mut first = Controller::connect(addr).await;
    let mut second = Controller::connect(addr).await;

    first.send("select search web").await;
    assert_eq!(
        second.send("get machineName").await.as_deref(),
        Some("ERROR UnknownCommand")
    );
    assert_eq!(first.send("get machineName").await.as_deref(), Some("web"));

    shutdown.cancel();
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let shutdown = CancellationToken::new();
    let addr = start_relay(Some(Duration::from_millis(50)), shutdown.clone()).await;
    let mut controller = Controller::connect(addr).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), controller.lines.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed, None);

    shutdown.cancel();
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let shutdown = CancellationToken::new();
    let addr = start_relay(None, shutdown.clone()).await;
    let mut controller = Controller::connect(addr).await;
    assert_eq!(controller.send("keepAlive").await.as_deref(), Some("keepAlive"));

    shutdown.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(5), controller.lines.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed, None);
}

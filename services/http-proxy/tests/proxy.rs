//! End-to-end tests against a proxy bound to an ephemeral loopback port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchyard_http_proxy::{ProxyConfig, ProxyServer};
use switchyard_networking::SocketAddress;
use switchyard_relay::AdmissionController;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;

struct RunningProxy {
    addr: SocketAddr,
    admission: Arc<AdmissionController>,
}

async fn spawn_proxy(max_connections: i64) -> RunningProxy {
    let mut config = ProxyConfig::new(SocketAddress::new("127.0.0.1", 0));
    config.max_connections = max_connections;
    config.dial_timeout = Duration::from_secs(2);

    let server = ProxyServer::bind(&config).await.unwrap();
    let running = RunningProxy {
        addr: server.local_addr().unwrap(),
        admission: server.admission(),
    };
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    running
}

async fn spawn_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Origin that captures one request head and replies with a fixed response.
async fn spawn_origin(response: &'static [u8]) -> (SocketAddr, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (head_tx, head_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        let _ = head_tx.send(head);
        stream.write_all(response).await.unwrap();
        stream.shutdown().await.unwrap();
    });
    (addr, head_rx)
}

async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Read up to and including the blank line ending a message head.
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = timeout(Duration::from_secs(2), stream.read(&mut byte))
            .await
            .expect("head timed out")
            .unwrap();
        assert!(n > 0, "connection closed mid-head");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

async fn read_all(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    timeout(Duration::from_secs(3), stream.read_to_end(&mut buf))
        .await
        .expect("response timed out")
        .unwrap();
    String::from_utf8(buf).unwrap()
}

async fn request(proxy: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    read_all(&mut stream).await
}

#[tokio::test]
async fn connect_tunnels_bytes_both_ways() {
    let proxy = spawn_proxy(0).await;
    let echo = spawn_echo().await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected head: {head}");

    let payload: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();
    let (mut reader, mut writer) = client.into_split();
    let expected = payload.clone();
    let writer_task = tokio::spawn(async move {
        writer.write_all(&payload).await.unwrap();
        writer
    });
    let mut received = vec![0u8; expected.len()];
    timeout(Duration::from_secs(5), reader.read_exact(&mut received))
        .await
        .expect("tunnel echo timed out")
        .unwrap();
    assert!(received == expected, "tunnel corrupted bytes");

    drop(writer_task.await.unwrap());
    drop(reader);

    let admission = Arc::clone(&proxy.admission);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while admission.active() != 0 {
        assert!(tokio::time::Instant::now() < deadline, "tunnel kept its slot");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn connect_to_unreachable_target_is_503() {
    let proxy = spawn_proxy(0).await;
    let dead = dead_addr().await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client
        .write_all(format!("CONNECT {dead} HTTP/1.1\r\nHost: {dead}\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 503"), "unexpected head: {head}");
}

#[tokio::test]
async fn plain_get_is_forwarded_in_origin_form() {
    let proxy = spawn_proxy(0).await;
    let (origin, head_rx) = spawn_origin(
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nKeep-Alive: timeout=5\r\nConnection: close\r\n\r\nhello",
    )
    .await;

    let response = request(
        proxy.addr,
        &format!(
            "GET http://{origin}/path?q=1 HTTP/1.1\r\n\
             Host: {origin}\r\n\
             Connection: close, X-Session\r\n\
             X-Session: secret\r\n\
             Proxy-Authorization: Basic Zm9v\r\n\
             X-Forwarded-For: 192.0.2.1\r\n\
             X-Kept: yes\r\n\r\n"
        ),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200"), "unexpected response: {response}");
    assert!(response.ends_with("hello"));
    assert!(!response.to_ascii_lowercase().contains("keep-alive:"));

    let upstream = timeout(Duration::from_secs(2), head_rx)
        .await
        .unwrap()
        .unwrap()
        .to_ascii_lowercase();
    assert!(upstream.starts_with("get /path?q=1 http/1.1\r\n"), "unexpected head: {upstream}");
    assert!(upstream.contains("x-forwarded-for: 192.0.2.1, 127.0.0.1\r\n"));
    assert!(upstream.contains("x-kept: yes\r\n"));
    assert!(upstream.contains(&format!("host: {origin}\r\n")));
    assert!(!upstream.contains("x-session"));
    assert!(!upstream.contains("proxy-authorization"));
}

#[tokio::test]
async fn non_http_scheme_is_rejected() {
    let proxy = spawn_proxy(0).await;

    let response = request(
        proxy.addr,
        "GET ftp://example.com/file HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 400"), "unexpected response: {response}");
    assert!(response.ends_with("unsupported protocol scheme ftp\n"));

    let response = request(
        proxy.addr,
        "GET https://example.com/ HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 400"), "unexpected response: {response}");
    assert!(response.ends_with("unsupported protocol scheme https\n"));

    let response = request(
        proxy.addr,
        "GET /index.html HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 400"), "unexpected response: {response}");
    assert!(response.ends_with("unsupported protocol scheme \n"));
}

#[tokio::test]
async fn unreachable_origin_is_500() {
    let proxy = spawn_proxy(0).await;
    let dead = dead_addr().await;

    let response = request(
        proxy.addr,
        &format!("GET http://{dead}/ HTTP/1.1\r\nHost: {dead}\r\nConnection: close\r\n\r\n"),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 500"), "unexpected response: {response}");
    assert!(response.ends_with("Server Error\n"));
}

#[tokio::test]
async fn open_tunnel_holds_the_only_slot() {
    let proxy = spawn_proxy(1).await;
    let echo = spawn_echo().await;

    let mut tunnel = TcpStream::connect(proxy.addr).await.unwrap();
    tunnel
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\n").as_bytes())
        .await
        .unwrap();
    assert!(read_head(&mut tunnel).await.starts_with("HTTP/1.1 200"));
    assert_eq!(proxy.admission.active(), 1);

    // Rejected connections are closed without a response.
    let mut rejected = TcpStream::connect(proxy.addr).await.unwrap();
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(2), rejected.read(&mut buf))
        .await
        .expect("rejected connection was not closed")
        .unwrap_or(0);
    assert_eq!(n, 0);

    tunnel.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    tunnel.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");
}

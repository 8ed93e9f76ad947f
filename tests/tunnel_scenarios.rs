//! End-to-end tunnel scenarios, driven against real loopback sockets playing
//! the roles of the local SOCKS5 client and the upstream SSR server — the
//! same style the rest of this crate's test suites use (see
//! `tunnel::tests::streaming_splices_both_directions_until_eof`), just with
//! the full `serve_connection` driver in the loop instead of calling
//! `stream_bidirectional` directly. Covers the seven scenarios named in the
//! specification's testable-properties section.

use ssrs_local::access::AccessPolicy;
use ssrs_local::cipher::{CodecFactory, ConfiguredCodecFactory};
use ssrs_local::config::Config;
use ssrs_local::env::Environment;
use ssrs_local::registry::TunnelRegistry;
use ssrs_local::{auth::NoAuth, tunnel, AuthAdaptor, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Test-only access policy that allows everything, including loopback —
/// needed because every upstream in these tests *is* loopback (a local
/// `TcpListener` standing in for the SSR server). The crate's real default,
/// [`ssrs_local::access::DenyLoopback`], is exercised directly in
/// `loopback_is_denied_even_when_everything_else_succeeds` below.
struct AllowAll;

impl AccessPolicy for AllowAll {
    fn allow(&self, _addr: &SocketAddr) -> bool {
        true
    }
}

struct TestConfig {
    remote_host: String,
    remote_port: u16,
    listen_host: String,
    listen_port: u16,
    cipher_method: String,
    protocol: String,
}

impl TestConfig {
    fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            listen_host: "127.0.0.1".to_owned(),
            listen_port: 1080,
            cipher_method: "none".to_owned(),
            protocol: "origin".to_owned(),
        }
    }

    fn with_rc4_feedback(mut self) -> Self {
        self.cipher_method = "rc4".to_owned();
        self.protocol = "auth_simple".to_owned();
        self
    }

    fn with_listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.listen_host = host.into();
        self.listen_port = port;
        self
    }

    fn build_config(&self) -> Config {
        Config {
            remote_host: self.remote_host.clone(),
            remote_port: self.remote_port,
            listen_host: self.listen_host.clone(),
            listen_port: self.listen_port,
            udp: true,
            over_tls_enable: false,
            tls_sni: None,
            cipher_method: self.cipher_method.clone(),
            protocol: self.protocol.clone(),
            obfs: "plain".to_owned(),
            password: "hunter2".to_owned(),
        }
    }
}

/// Builds an [`Environment`] directly (bypassing [`Environment::new`]) so
/// tests can swap in [`AllowAll`] where the scenario under test isn't the
/// access-policy one.
fn test_environment(cfg: &TestConfig, access_policy: Arc<dyn AccessPolicy>) -> Arc<Environment> {
    let config = Arc::new(cfg.build_config());
    let codec_factory: Arc<dyn CodecFactory> = Arc::new(ConfiguredCodecFactory::new(
        config.cipher_method.clone(),
        config.protocol.clone(),
        config.obfs.clone(),
        config.password.clone(),
    ));

    Arc::new(Environment {
        config,
        codec_factory,
        registry: Arc::new(TunnelRegistry::new()),
        access_policy,
        tls_connector: None,
    })
}

/// Spawns the listener + `serve_connection` driver for one accepted
/// connection, returning the client-facing address to connect to.
async fn spawn_server(env: Arc<Environment>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth: AuthAdaptor<()> = Arc::new(NoAuth);
    let server = Server::from((listener, auth));

    tokio::spawn(async move {
        let (conn, _peer) = server.accept().await.unwrap();
        tunnel::serve_connection(env, conn).await;
    });

    addr
}

async fn timeout<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("scenario test exceeded its timeout")
}

/// Scenario 1: happy-path CONNECT — greeting, request, SOCKS success reply
/// echoing the initial package, then bytes flowing in both directions
/// through the (identity) codec.
#[tokio::test]
async fn happy_path_connect_streams_both_directions() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();

    let upstream_task = tokio::spawn(async move {
        let (mut stream, _) = upstream.accept().await.unwrap();
        // Initial package for 8.8.8.8:80 under the identity codec: ATYP(1) + addr(4) + port(2).
        let mut initial = [0u8; 7];
        stream.read_exact(&mut initial).await.unwrap();
        assert_eq!(initial, [0x01, 8, 8, 8, 8, 0x00, 0x50]);

        let mut hello = [0u8; 5];
        stream.read_exact(&mut hello).await.unwrap();
        assert_eq!(&hello, b"Hello");
        stream.write_all(b"World").await.unwrap();
    });

    let cfg = TestConfig::new("127.0.0.1", upstream_addr.port());
    let env = test_environment(&cfg, Arc::new(AllowAll));
    let listen_addr = spawn_server(env).await;

    timeout(async move {
        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 8, 8, 8, 8, 0x00, 0x50])
            .await
            .unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 8, 8, 8, 8, 0x00, 0x50]);

        client.write_all(b"Hello").await.unwrap();
        let mut world = [0u8; 5];
        client.read_exact(&mut world).await.unwrap();
        assert_eq!(&world, b"World");
    })
    .await;

    upstream_task.await.unwrap();
}

/// Scenario 2: client offers only password auth; tunnel replies `05 FF` and
/// closes after the write completes.
#[tokio::test]
async fn password_only_method_is_rejected() {
    let cfg = TestConfig::new("127.0.0.1", 1);
    let env = test_environment(&cfg, Arc::new(AllowAll));
    let listen_addr = spawn_server(env).await;

    timeout(async move {
        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();

        let mut resp = [0u8; 2];
        client.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, [0x05, 0xFF]);

        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "connection should be closed after the rejection reply");
    })
    .await;
}

/// Scenario 3: BIND is rejected with no reply of any kind, just closure.
#[tokio::test]
async fn bind_command_is_rejected_without_a_reply() {
    let cfg = TestConfig::new("127.0.0.1", 1);
    let env = test_environment(&cfg, Arc::new(AllowAll));
    let listen_addr = spawn_server(env).await;

    timeout(async move {
        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x02, 0x00, 0x01, 1, 2, 3, 4, 0x00, 0x50])
            .await
            .unwrap();

        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "BIND gets no reply, only connection closure");
    })
    .await;
}

/// Scenario 4: UDP ASSOCIATE synthesizes a reply from the configured
/// `listen_host`/`listen_port`, then closes (no data plane).
#[tokio::test]
async fn udp_associate_replies_with_configured_bind_address() {
    let cfg = TestConfig::new("127.0.0.1", 1).with_listen("9.9.9.9", 9050);
    let env = test_environment(&cfg, Arc::new(AllowAll));
    let listen_addr = spawn_server(env).await;

    timeout(async move {
        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0x00, 0x00])
            .await
            .unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0..4], [0x05, 0x00, 0x00, 0x01]);
        assert_eq!(reply[4..8], [9, 9, 9, 9]);
        assert_eq!(u16::from_be_bytes([reply[8], reply[9]]), 9050);

        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "no UDP data plane, connection closes after the reply");
    })
    .await;
}

/// Scenario 5: an unresolvable remote host yields `04 host-unreachable`.
#[tokio::test]
async fn unresolvable_upstream_replies_host_unreachable() {
    // `.invalid` is reserved by RFC 2606 to never resolve.
    let cfg = TestConfig::new("definitely-not-a-real-host.invalid", 8388);
    let env = test_environment(&cfg, Arc::new(AllowAll));
    let listen_addr = spawn_server(env).await;

    timeout(async move {
        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 8, 8, 8, 8, 0x00, 0x50])
            .await
            .unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x04, 0x00, 0x01, 0, 0, 0, 0, 0x00, 0x00]);
    })
    .await;
}

/// Scenario 6: loopback is always denied by the crate's real default access
/// policy, even though everything else about the request is well-formed.
#[tokio::test]
async fn loopback_is_denied_even_when_everything_else_succeeds() {
    let cfg = TestConfig::new("127.0.0.1", 1);
    let env = Environment::new(cfg.build_config());
    let listen_addr = spawn_server(env).await;

    timeout(async move {
        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 8, 8, 8, 8, 0x00, 0x50])
            .await
            .unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x02, 0x00, 0x01, 0, 0, 0, 0, 0x00, 0x00]);
    })
    .await;
}

/// Scenario 7: a `needs-feedback` codec makes the tunnel read one challenge
/// chunk from upstream and answer it before the SOCKS success reply is sent.
#[tokio::test]
async fn feedback_handshake_completes_before_socks_success() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();

    let upstream_task = tokio::spawn(async move {
        let (mut stream, _) = upstream.accept().await.unwrap();

        // Initial package for 8.8.8.8:80, RC4-encrypted (same length as plaintext).
        let mut initial = [0u8; 7];
        stream.read_exact(&mut initial).await.unwrap();

        // Any non-empty chunk triggers the feedback path on first decrypt.
        stream.write_all(b"server-challenge").await.unwrap();

        // The tunnel answers with an encrypted SHA-256 digest (32 bytes).
        let mut response = [0u8; 32];
        stream.read_exact(&mut response).await.unwrap();
    });

    let cfg = TestConfig::new("127.0.0.1", upstream_addr.port()).with_rc4_feedback();
    let env = test_environment(&cfg, Arc::new(AllowAll));
    let listen_addr = spawn_server(env).await;

    timeout(async move {
        let mut client = TcpStream::connect(listen_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 8, 8, 8, 8, 0x00, 0x50])
            .await
            .unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 8, 8, 8, 8, 0x00, 0x50]);
    })
    .await;

    upstream_task.await.unwrap();
}

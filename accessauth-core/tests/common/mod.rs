//! Test harness: a real TLS server on a loopback port plus a pinned client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use accessauth_auth::{Directory, DirectoryEntry, MemoryDirectory};
use accessauth_core::server::serve_connection;
use accessauth_core::tls::{build_self_signed, client_config_pinned, server_config, CertParams};
use accessauth_core::transport::{self, SecureConnection, SecureListener};
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    pub cert_der: Vec<u8>,
    accept_task: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Spawn a server with a fresh self-signed identity on an ephemeral port.
pub async fn spawn_server(directory: MemoryDirectory, timeout: Duration) -> TestServer {
    let identity = build_self_signed(&CertParams::default()).unwrap();
    let cert_der = identity.cert_der.clone();
    let config = server_config(&identity).unwrap();

    let listener = SecureListener::bind("127.0.0.1:0".parse().unwrap(), config)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let directory: Arc<dyn Directory> = Arc::new(directory);

    let accept_task = tokio::spawn(async move {
        loop {
            let Ok(pending) = listener.accept().await else {
                break;
            };
            let directory = directory.clone();
            tokio::spawn(async move {
                if let Ok(conn) = pending.complete().await {
                    serve_connection(conn, directory, timeout).await;
                }
            });
        }
    });

    TestServer {
        addr,
        cert_der,
        accept_task,
    }
}

/// Connect a client pinned to the server's certificate.
pub async fn connect_client(server: &TestServer) -> SecureConnection {
    let config = client_config_pinned(&server.cert_der);
    transport::connect(server.addr, "localhost", config)
        .await
        .unwrap()
}

/// Directory with a single identity.
pub fn single_identity(identity: i64, active: bool, key: &str) -> MemoryDirectory {
    let mut dir = MemoryDirectory::new();
    dir.insert(
        identity,
        DirectoryEntry {
            active,
            symmetric_key: key.to_string(),
        },
    );
    dir
}

//! accessauth daemon.
//!
//! Serves the symmetric-key challenge-response protocol over TLS, and
//! carries two side commands: `keygen` for provisioning fresh symmetric
//! keys and `auth` for running one client-side exchange against a server.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use accessauth_auth::{generate_symmetric_key, Directory};
use accessauth_core::server::serve_connection;
use accessauth_core::timeout::DEFAULT_PROTOCOL_TIMEOUT;
use accessauth_core::transport::{self, SecureListener};
use accessauth_core::{client, tls};

mod config;

/// Connections that do not complete the TLS handshake within this window
/// are dropped so a stalled peer cannot pin a connection slot.
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// accessauth - symmetric-key challenge-response authentication server
#[derive(Parser)]
#[command(name = "accessauth-daemon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the authentication server
    Serve(ServeArgs),

    /// Generate a fresh base64 symmetric key for provisioning
    Keygen,

    /// Run one client-side authentication against a server
    Auth(AuthArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "ACCESSAUTH_BIND")]
    bind: IpAddr,

    /// Listening port
    #[arg(long, default_value_t = 12345, env = "ACCESSAUTH_PORT")]
    port: u16,

    /// PEM certificate path (a self-signed identity is generated when absent)
    #[arg(long, requires = "key", env = "ACCESSAUTH_CERT")]
    cert: Option<PathBuf>,

    /// PEM private key path (PKCS#8)
    #[arg(long, requires = "cert", env = "ACCESSAUTH_KEY")]
    key: Option<PathBuf>,

    /// JSON users file mapping identities to active flag and key
    #[arg(long, env = "ACCESSAUTH_USERS")]
    users: PathBuf,

    /// Window in milliseconds a peer has to send its next message
    #[arg(
        long,
        default_value_t = DEFAULT_PROTOCOL_TIMEOUT.as_millis() as u64,
        env = "ACCESSAUTH_TIMEOUT_MS"
    )]
    timeout_ms: u64,

    /// Cap on concurrent connections
    #[arg(long, default_value_t = 256, env = "ACCESSAUTH_MAX_CONNECTIONS")]
    max_connections: usize,

    /// Seconds to wait for in-flight attempts on shutdown
    #[arg(long, default_value_t = 5)]
    shutdown_grace_secs: u64,
}

#[derive(Args)]
struct AuthArgs {
    /// Server address (host:port)
    #[arg(long, default_value = "127.0.0.1:12345")]
    server: SocketAddr,

    /// TLS server name
    #[arg(long, default_value = "localhost")]
    server_name: String,

    /// PEM certificate of the server, pinned for this connection
    #[arg(long)]
    server_cert: PathBuf,

    /// Identity to claim (decimal)
    #[arg(long)]
    user: String,

    /// Base64 symmetric key
    #[arg(long, env = "ACCESSAUTH_KEY_B64")]
    key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => cmd_serve(args).await,
        Commands::Keygen => {
            println!("{}", generate_symmetric_key());
            Ok(())
        }
        Commands::Auth(args) => cmd_auth(args).await,
    }
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let directory = Arc::new(config::load_users(&args.users)?);
    tracing::info!(
        path = %args.users.display(),
        identities = directory.len(),
        "Loaded identity directory"
    );

    let identity = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            tracing::info!(cert = %cert.display(), "Loading TLS identity");
            tls::load_identity(cert, key)?
        }
        _ => {
            tracing::info!("No certificate configured, generating self-signed identity");
            tls::build_self_signed(&tls::CertParams::default())?
        }
    };
    let tls_config = tls::server_config(&identity)?;

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = SecureListener::bind(addr, tls_config).await?;
    tracing::info!(addr = %addr, "Listener bound");

    let timeout = Duration::from_millis(args.timeout_ms);
    let semaphore = Arc::new(Semaphore::new(args.max_connections));
    let mut connections = JoinSet::new();

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx);

    loop {
        // Reap finished connection tasks so the set stays bounded.
        while connections.try_join_next().is_some() {}

        let permit = tokio::select! {
            _ = shutdown_rx.changed() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = listener.accept() => match result {
                Ok(pending) => {
                    let directory: Arc<dyn Directory> = directory.clone();
                    connections.spawn(async move {
                        let _permit = permit;
                        let peer = pending.peer_addr();
                        match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, pending.complete()).await {
                            Ok(Ok(conn)) => {
                                tracing::debug!(peer = %peer, "TLS handshake successful");
                                serve_connection(conn, directory, timeout).await;
                            }
                            Ok(Err(e)) => {
                                tracing::warn!(peer = %peer, error = %e, "TLS handshake failed");
                            }
                            Err(_) => {
                                tracing::warn!(
                                    peer = %peer,
                                    timeout = ?TLS_HANDSHAKE_TIMEOUT,
                                    "TLS handshake timed out"
                                );
                            }
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "TCP accept failed"),
            },
        }
    }

    drop(listener);
    let grace = Duration::from_secs(args.shutdown_grace_secs);
    tracing::info!(in_flight = connections.len(), grace = ?grace, "Waiting for in-flight attempts");

    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            remaining = connections.len(),
            "Grace period elapsed, aborting remaining attempts"
        );
        connections.shutdown().await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn cmd_auth(args: AuthArgs) -> anyhow::Result<()> {
    let cert_der = tls::load_certificate(&args.server_cert)?;
    let tls_config = tls::client_config_pinned(&cert_der);

    let conn = transport::connect(args.server, &args.server_name, tls_config).await?;
    let outcome = client::authenticate(&conn, &args.user, &args.key).await?;
    conn.close().await;

    println!("Authenticated as {}", outcome.user_id);
    println!("Server time: {} ms since epoch", outcome.timestamp_millis);
    Ok(())
}

fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received SIGINT, initiating shutdown"),
            _ = terminate => tracing::info!("Received SIGTERM, initiating shutdown"),
        }
        let _ = shutdown_tx.send(true);
    });
}

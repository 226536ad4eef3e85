//! Per-connection serving loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use accessauth_auth::Directory;
use accessauth_proto::Message;

use crate::session::AuthSession;
use crate::transport::SecureConnection;

/// Drive one authenticated connection to completion.
///
/// Spawns a writer task that drains the session outbox onto the wire,
/// then alternates between inbound messages and the attempt's terminal
/// outcome. On exit the session is shut down (cancelling any armed
/// timeout and erasing secrets), queued outbound messages are flushed,
/// and the connection is closed.
pub async fn serve_connection(
    conn: SecureConnection,
    directory: Arc<dyn Directory>,
    timeout: Duration,
) {
    let peer = conn.peer_addr();
    let conn = Arc::new(conn);
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Message>(16);
    let session = AuthSession::new(directory, outbox_tx, timeout, peer.to_string()).await;

    let writer_conn = Arc::clone(&conn);
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            if let Err(e) = writer_conn.send(&msg).await {
                tracing::debug!(peer = %writer_conn.peer_addr(), error = %e, "outbound write failed");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            result = conn.next_message() => match result {
                Ok(Some(msg)) => session.handle_message(msg).await,
                Ok(None) => {
                    tracing::debug!(peer = %peer, "peer closed connection");
                    break;
                }
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "read failed");
                    break;
                }
            },
            _ = session.finished() => break,
        }
    }

    session.shutdown().await;
    // Dropping the session releases the outbox sender; the writer drains
    // whatever is queued and exits.
    drop(session);
    let _ = writer.await;
    conn.close().await;
}

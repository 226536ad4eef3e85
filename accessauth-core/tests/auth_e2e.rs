//! End-to-end authentication over real TLS on loopback.

mod common;

use std::time::Duration;

use accessauth_auth::{compute_digest, decrypt, encrypt, generate_symmetric_key};
use accessauth_core::client::{authenticate, ClientError};
use accessauth_proto::{hex_decode_str, hex_encode_str, Message};

use common::{connect_client, single_identity, spawn_server};

const SERVER_TIMEOUT: Duration = Duration::from_millis(8000);

#[tokio::test]
async fn known_identity_authenticates() {
    let key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, true, &key), SERVER_TIMEOUT).await;
    let conn = connect_client(&server).await;

    let outcome = authenticate(&conn, "2", &key).await.unwrap();
    assert_eq!(outcome.user_id, "2");
    assert!(outcome.timestamp_millis > 0);

    conn.close().await;
}

#[tokio::test]
async fn unknown_identity_is_denied() {
    let key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, true, &key), SERVER_TIMEOUT).await;
    let conn = connect_client(&server).await;

    let err = authenticate(&conn, "999", &key).await.unwrap_err();
    match err {
        ClientError::Denied(reason) => assert_eq!(reason, "authentication failed"),
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn wrong_key_is_denied() {
    let key = generate_symmetric_key();
    let wrong_key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, true, &key), SERVER_TIMEOUT).await;
    let conn = connect_client(&server).await;

    let err = authenticate(&conn, "2", &wrong_key).await.unwrap_err();
    // Depending on where the wrong key bites, the client fails to decrypt
    // the challenge locally or the server denies the bad digest.
    assert!(matches!(
        err,
        ClientError::Denied(_) | ClientError::Crypto(_)
    ));
}

#[tokio::test]
async fn inactive_identity_is_denied() {
    let key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, false, &key), SERVER_TIMEOUT).await;
    let conn = connect_client(&server).await;

    assert!(matches!(
        authenticate(&conn, "2", &key).await.unwrap_err(),
        ClientError::Denied(_)
    ));
}

#[tokio::test]
async fn malformed_record_is_skipped_not_fatal() {
    let key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, true, &key), SERVER_TIMEOUT).await;
    let conn = connect_client(&server).await;

    // Garbage first; the server logs and skips it, then the normal
    // exchange still succeeds on the same connection.
    conn.send_line("this is not json").await.unwrap();
    conn.send_line("{\"also\": \"not a message\"}").await.unwrap();

    let outcome = authenticate(&conn, "2", &key).await.unwrap();
    assert_eq!(outcome.user_id, "2");
}

#[tokio::test]
async fn unrecognized_type_yields_denial() {
    let key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, true, &key), SERVER_TIMEOUT).await;
    let conn = connect_client(&server).await;

    conn.send_line(r#"{"type":"renegotiate"}"#).await.unwrap();

    match conn.next_message().await.unwrap() {
        Some(Message::AuthError { message }) => {
            assert_eq!(hex_decode_str(&message).unwrap(), "authentication failed");
        }
        other => panic!("expected auth_error, got {:?}", other),
    }
}

#[tokio::test]
async fn legacy_bare_id_record_completes_the_exchange() {
    let key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, true, &key), SERVER_TIMEOUT).await;
    let conn = connect_client(&server).await;

    conn.send_line(&format!(r#"{{"id":"{}"}}"#, hex_encode_str("2")))
        .await
        .unwrap();

    let challenge_hex = match conn.next_message().await.unwrap() {
        Some(Message::Challenge { challenge, .. }) => challenge,
        other => panic!("expected challenge, got {:?}", other),
    };

    let challenge = decrypt(&hex_decode_str(&challenge_hex).unwrap(), &key).unwrap();
    let response = encrypt(&compute_digest(&challenge), &key).unwrap();
    conn.send(&Message::ChallengeResponse {
        response: hex_encode_str(&response),
    })
    .await
    .unwrap();

    match conn.next_message().await.unwrap() {
        Some(Message::AuthSuccess { user_id, .. }) => {
            assert_eq!(hex_decode_str(&user_id).unwrap(), "2");
        }
        other => panic!("expected auth_success, got {:?}", other),
    }
}

#[tokio::test]
async fn short_window_times_out_silent_client() {
    let key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, true, &key), Duration::from_millis(200)).await;
    let conn = connect_client(&server).await;

    conn.send(&Message::AuthRequest {
        user_id: hex_encode_str("2"),
    })
    .await
    .unwrap();

    assert!(matches!(
        conn.next_message().await.unwrap(),
        Some(Message::Challenge { .. })
    ));

    // Never answer the challenge; the server must abandon the attempt.
    match conn.next_message().await.unwrap() {
        Some(Message::Timeout { message }) => {
            assert_eq!(hex_decode_str(&message).unwrap(), "authentication timed out");
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn short_window_times_out_client_that_never_sends() {
    let key = generate_symmetric_key();
    let server = spawn_server(single_identity(2, true, &key), Duration::from_millis(200)).await;
    let conn = connect_client(&server).await;

    // Complete the handshake and go silent; the server must abandon the
    // attempt instead of holding the connection open.
    match conn.next_message().await.unwrap() {
        Some(Message::Timeout { message }) => {
            assert_eq!(hex_decode_str(&message).unwrap(), "authentication timed out");
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn two_clients_authenticate_concurrently() {
    let key_a = generate_symmetric_key();
    let key_b = generate_symmetric_key();
    let mut directory = single_identity(2, true, &key_a);
    directory.insert(
        3,
        accessauth_auth::DirectoryEntry {
            active: true,
            symmetric_key: key_b.clone(),
        },
    );
    let server = spawn_server(directory, SERVER_TIMEOUT).await;

    let conn_a = connect_client(&server).await;
    let conn_b = connect_client(&server).await;

    let (a, b) = tokio::join!(
        authenticate(&conn_a, "2", &key_a),
        authenticate(&conn_b, "3", &key_b),
    );
    assert_eq!(a.unwrap().user_id, "2");
    assert_eq!(b.unwrap().user_id, "3");
}

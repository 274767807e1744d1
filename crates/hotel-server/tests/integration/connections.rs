//! Connection lifecycle: framing, close, isolation and shutdown.

use std::time::Duration;

use hotel_protocol::{codes, OpCode, Request};

use crate::harness::TestServer;

#[tokio::test]
async fn test_fragmented_request_is_reassembled() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let reply = client
        .call_fragmented(
            Request::Register {
                username: "slow-typist".into(),
                password: "pw".into(),
            },
            3,
        )
        .await;
    assert_eq!(reply.code, codes::OK);

    // Connection is back in reading state and serves the next request.
    assert_eq!(client.login("slow-typist", "pw").await, codes::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_fragmented_client_does_not_block_others() {
    let server = TestServer::start().await;
    let mut slow = server.client().await;
    let mut fast = server.client().await;

    // Half a frame from the slow client, then leave it hanging.
    slow.write_raw(&OpCode::SearchHotels.as_i32().to_be_bytes()).await;
    slow.write_raw(&[0, 0]).await;

    let reply = tokio::time::timeout(Duration::from_secs(5), fast.search_hotels("Milan"))
        .await
        .expect("fast client starved by a partial frame");
    assert_eq!(reply.code, codes::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_close_connection() {
    let server = TestServer::start().await;

    let mut anon = server.client().await;
    assert_eq!(anon.close().await.code, codes::DISCONNECTED);

    let mut authed = server.client().await;
    authed.sign_in("alice").await;
    assert_eq!(authed.close().await.code, codes::close::STILL_AUTHENTICATED);
    // Still open and still logged in.
    assert_eq!(authed.show_badge("alice").await.code, codes::OK);
    assert_eq!(authed.logout("alice").await, codes::OK);
    assert_eq!(authed.close().await.code, codes::DISCONNECTED);

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_closes_only_that_connection() {
    let server = TestServer::start().await;
    let mut bad = server.client().await;
    let mut good = server.client().await;
    good.sign_in("alice").await;

    // Unknown operation code.
    bad.write_raw(&99i32.to_be_bytes()).await;
    assert_eq!(bad.read_reply().await.code, codes::DISCONNECTED);

    let mut negative = server.client().await;
    let mut frame = OpCode::SearchHotels.as_i32().to_be_bytes().to_vec();
    frame.extend_from_slice(&(-1i32).to_be_bytes());
    negative.write_raw(&frame).await;
    assert_eq!(negative.read_reply().await.code, codes::DISCONNECTED);

    assert_eq!(good.insert_review("Hotel Roma 1", "Rome", 5).await, codes::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_zero_length_strings() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    assert_eq!(client.register("", "").await, codes::OK);
    assert_eq!(client.login("", "x").await, codes::login::BAD_PASSWORD);
    assert_eq!(client.login("", "").await, codes::OK);
    assert_eq!(client.search_hotel("", "").await.code, codes::search::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_idle_connections() {
    let server = TestServer::start().await;
    let addr = server.addr;
    let mut client = server.client().await;
    client.sign_in("alice").await;

    server.signal_shutdown();
    assert_eq!(client.read_reply().await.code, codes::DISCONNECTED);
    assert!(!server.ctx.store.is_active("alice"));

    server.shutdown().await;

    // Listener is gone: new connections are refused.
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_completes_with_client_not_reading() {
    use tokio::io::AsyncWriteExt;

    let server = TestServer::start().await;

    let mut frame = OpCode::SearchHotels.as_i32().to_be_bytes().to_vec();
    frame.extend_from_slice(&4i32.to_be_bytes());
    frame.extend_from_slice(b"Rome");
    let batch = frame.repeat(10_000);

    // Keep pipelining requests and never read a reply, until the server
    // stops taking bytes or closes the socket.
    let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    let flooder = tokio::spawn(async move {
        for _ in 0..200 {
            if stream.write_all(&batch).await.is_err() {
                break;
            }
        }
    });

    // Let the server's send buffer fill up.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let finished = tokio::time::timeout(Duration::from_secs(10), server.shutdown()).await;
    flooder.abort();
    assert!(finished.is_ok(), "shutdown hung on a client that stopped reading");
}

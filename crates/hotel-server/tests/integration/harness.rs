//! Test harness for in-process hotel-server integration tests.
//!
//! TestServer runs the real dispatcher on its own I/O thread against an
//! ephemeral port; TestClient speaks the wire protocol through ClientCodec.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use hotel_crypto::ScryptHasher;
use hotel_protocol::{codes, ClientCodec, ProtocolError, Reply, Request, Scores};
use hotel_ranking::RankingEngine;
use hotel_server::{spawn_io_thread, unix_now, ServerContext};
use hotel_storage::{EntityStore, Hotel};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Encoder, Framed};

/// Hotels every test server starts with.
pub const HOTELS: &[(&str, &str, &str)] = &[
    ("1", "Hotel Roma 1", "Rome"),
    ("2", "Hotel Roma 2", "Rome"),
    ("3", "Hotel Milano 1", "Milan"),
];

pub struct TestServer {
    pub addr: SocketAddr,
    pub ctx: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
    io_thread: Option<std::thread::JoinHandle<std::io::Result<()>>>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn start() -> Self {
        let store = EntityStore::new();
        for (id, name, city) in HOTELS {
            store.insert_hotel(Hotel::new(*id, *name, "test hotel", *city, "000", vec![]));
        }
        let rankings = RankingEngine::build(&store, unix_now());
        let ctx = Arc::new(ServerContext::new(
            Arc::new(store),
            Arc::new(rankings),
            Arc::new(ScryptHasher::new(4)),
        ));

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, _) = broadcast::channel(1);
        let io_thread = spawn_io_thread(listener, Arc::clone(&ctx), shutdown_tx.subscribe()).unwrap();

        Self {
            addr,
            ctx,
            shutdown_tx,
            io_thread: Some(io_thread),
        }
    }

    pub async fn client(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Signal shutdown and wait for the I/O thread to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.io_thread.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
        }
    }

    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

pub struct TestClient {
    framed: Framed<TcpStream, ClientCodec>,
}

#[allow(dead_code)]
impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, ClientCodec::new()),
        }
    }

    /// Send one request and wait for its reply. EOF reads as `DISCONNECTED`.
    pub async fn call(&mut self, request: Request) -> Reply {
        self.framed.send(request).await.unwrap();
        self.read_reply().await
    }

    pub async fn read_reply(&mut self) -> Reply {
        match tokio::time::timeout(Duration::from_secs(10), self.framed.next()).await {
            Ok(Some(Ok(reply))) => reply,
            Ok(Some(Err(ProtocolError::Io(_)))) | Ok(None) => Reply::code(codes::DISCONNECTED),
            Ok(Some(Err(e))) => panic!("bad reply: {e}"),
            Err(_) => panic!("timed out waiting for reply"),
        }
    }

    /// Encode `request` and write it in `chunk`-byte pieces with a pause
    /// between each, then read the reply.
    pub async fn call_fragmented(&mut self, request: Request, chunk: usize) -> Reply {
        let mut buf = BytesMut::new();
        self.framed.codec_mut().encode(request, &mut buf).unwrap();
        for piece in buf.chunks(chunk) {
            let stream = self.framed.get_mut();
            stream.write_all(piece).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.read_reply().await
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.unwrap();
        stream.flush().await.unwrap();
    }

    pub async fn register(&mut self, username: &str, password: &str) -> i32 {
        self.call(Request::Register {
            username: username.into(),
            password: password.into(),
        })
        .await
        .code
    }

    pub async fn login(&mut self, username: &str, password: &str) -> i32 {
        self.call(Request::Login {
            username: username.into(),
            password: password.into(),
        })
        .await
        .code
    }

    pub async fn logout(&mut self, username: &str) -> i32 {
        self.call(Request::Logout {
            username: username.into(),
        })
        .await
        .code
    }

    pub async fn search_hotel(&mut self, name: &str, city: &str) -> Reply {
        self.call(Request::SearchHotel {
            name: name.into(),
            city: city.into(),
        })
        .await
    }

    pub async fn search_hotels(&mut self, city: &str) -> Reply {
        self.call(Request::SearchHotels { city: city.into() }).await
    }

    pub async fn insert_review(&mut self, name: &str, city: &str, score: i32) -> i32 {
        self.call(Request::InsertReview {
            hotel_name: name.into(),
            city: city.into(),
            scores: Scores {
                overall: score,
                position: score,
                cleanliness: score,
                service: score,
                price: score,
            },
        })
        .await
        .code
    }

    pub async fn show_badge(&mut self, username: &str) -> Reply {
        self.call(Request::ShowBadge {
            username: username.into(),
        })
        .await
    }

    pub async fn close(&mut self) -> Reply {
        self.call(Request::CloseConnection).await
    }

    /// Register and log in a fresh user.
    pub async fn sign_in(&mut self, username: &str) {
        assert_eq!(self.register(username, "pw").await, codes::OK);
        assert_eq!(self.login(username, "pw").await, codes::OK);
    }
}

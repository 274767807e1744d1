//! Connection dispatcher.
//!
//! Runs on the I/O thread's single-threaded runtime. The accept loop and one
//! lightweight task per connection share that thread; the runtime's readiness
//! poller is the only place it blocks. Each connection cycles
//! `Reading -> Handling -> Writing -> Reading` with exactly one request in
//! flight.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hotel_protocol::{ProtocolError, Request, ServerCodec};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

use crate::handlers;
use crate::session::{Pending, Session};
use crate::ServerContext;

/// How long a reply may keep blocking on a peer that stopped reading once
/// shutdown has started.
pub const SHUTDOWN_WRITE_GRACE: Duration = Duration::from_secs(2);

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before the next `accept` after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_MIN
        .saturating_mul(1u32 << failures.saturating_sub(1).min(16))
        .min(ACCEPT_BACKOFF_MAX)
}

pub struct Dispatcher {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Dispatcher {
    pub fn new(listener: TcpListener, ctx: Arc<ServerContext>) -> Self {
        Self { listener, ctx }
    }

    /// Adopt a listener bound with std. Must be called inside a runtime.
    pub fn from_std(
        listener: std::net::TcpListener,
        ctx: Arc<ServerContext>,
    ) -> std::io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self::new(TcpListener::from_std(listener)?, ctx))
    }

    /// Accept and serve connections until `shutdown` fires.
    ///
    /// On shutdown no new connections are accepted, idle connections are
    /// closed, and a request already decoded is answered before its
    /// connection closes. Returns once every connection task has finished.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let Self { listener, ctx } = self;
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        let mut next_id: u64 = 0;
        let mut accept_failures: u32 = 0;

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "listening for clients");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            accept_failures = 0;
                            next_id += 1;
                            tracing::info!(conn = next_id, %peer, "client connected");
                            let conn = Connection::new(next_id, peer, stream, Arc::clone(&ctx));
                            connections.spawn(conn.serve(stop_rx.clone()));
                        }
                        Err(e) => {
                            accept_failures = accept_failures.saturating_add(1);
                            let pause = accept_backoff(accept_failures);
                            tracing::warn!(failures = accept_failures, ?pause, "accept error: {e}");
                            tokio::time::sleep(pause).await;
                        }
                    }
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("connection task failed: {e}");
                    }
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        drop(listener);
        tracing::info!(open = connections.len(), "dispatcher stopping");
        let _ = stop_tx.send(true);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                tracing::error!("connection task failed: {e}");
            }
        }
        tracing::info!("dispatcher stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// EOF or I/O failure from the peer.
    Disconnected,
    /// closeConnection from an anonymous session.
    Requested,
    Malformed,
    Shutdown,
}

enum State {
    Reading,
    Handling(Request),
    Writing,
    Closed(CloseReason),
}

struct Connection {
    id: u64,
    peer: SocketAddr,
    framed: Framed<TcpStream, ServerCodec>,
    session: Session,
    ctx: Arc<ServerContext>,
}

impl Connection {
    fn new(id: u64, peer: SocketAddr, stream: TcpStream, ctx: Arc<ServerContext>) -> Self {
        Self {
            id,
            peer,
            framed: Framed::new(stream, ServerCodec::new()),
            session: Session::new(),
            ctx,
        }
    }

    async fn serve(mut self, mut stop: watch::Receiver<bool>) {
        let mut state = State::Reading;
        let reason = loop {
            state = match state {
                State::Reading => self.read(&mut stop).await,
                State::Handling(request) => self.handle(request).await,
                State::Writing => self.write(&mut stop).await,
                State::Closed(reason) => break reason,
            };
        };

        self.session.release(&self.ctx.store);
        match reason {
            CloseReason::Malformed => {
                tracing::warn!(conn = self.id, peer = %self.peer, "closed after malformed frame")
            }
            _ => tracing::info!(conn = self.id, peer = %self.peer, ?reason, "client disconnected"),
        }
    }

    async fn read(&mut self, stop: &mut watch::Receiver<bool>) -> State {
        if *stop.borrow() {
            return State::Closed(CloseReason::Shutdown);
        }
        tokio::select! {
            biased;
            _ = stop.changed() => State::Closed(CloseReason::Shutdown),
            frame = self.framed.next() => match frame {
                Some(Ok(request)) => State::Handling(request),
                Some(Err(ProtocolError::Io(e))) => {
                    tracing::debug!(conn = self.id, "read failed: {e}");
                    State::Closed(CloseReason::Disconnected)
                }
                Some(Err(e)) => {
                    tracing::warn!(conn = self.id, peer = %self.peer, "protocol error: {e}");
                    State::Closed(CloseReason::Malformed)
                }
                None => State::Closed(CloseReason::Disconnected),
            },
        }
    }

    async fn handle(&mut self, request: Request) -> State {
        let op = request.op();
        tracing::debug!(conn = self.id, %op, "request");

        let outcome = handlers::handle(&self.ctx, &self.session, request).await;
        match outcome.reply {
            Some(reply) => {
                self.session.set_pending(Pending {
                    op,
                    reply,
                    effect: outcome.effect,
                });
                State::Writing
            }
            None => State::Closed(CloseReason::Requested),
        }
    }

    async fn write(&mut self, stop: &mut watch::Receiver<bool>) -> State {
        let Some(pending) = self.session.take_pending() else {
            return State::Reading;
        };
        tracing::debug!(conn = self.id, op = %pending.op, code = pending.reply.code, "reply");

        let sent = tokio::select! {
            sent = self.framed.send(pending.reply) => Some(sent),
            _ = shutdown_grace(stop) => None,
        };
        // A login whose reply failed still attaches, so release() frees it.
        self.session.apply(pending.effect);
        match sent {
            Some(Ok(())) => State::Reading,
            Some(Err(e)) => {
                tracing::debug!(conn = self.id, "write failed: {e}");
                State::Closed(CloseReason::Disconnected)
            }
            None => {
                tracing::warn!(conn = self.id, peer = %self.peer, "peer not reading, reply dropped at shutdown");
                State::Closed(CloseReason::Shutdown)
            }
        }
    }
}

/// Resolves `SHUTDOWN_WRITE_GRACE` after shutdown starts; never before.
async fn shutdown_grace(stop: &mut watch::Receiver<bool>) {
    let stopping = *stop.borrow_and_update();
    if !stopping && stop.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(SHUTDOWN_WRITE_GRACE).await;
}

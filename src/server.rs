use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncWriteExt, BufReader},
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    commands,
    protocol::{self, read_line, send_line},
    registry::{Sink, UserRegistry},
};

pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<UserRegistry>,
}

impl ChatServer {
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            registry: Arc::new(UserRegistry::new()),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    registry.broadcast(protocol::SHUTDOWN_NOTICE).await;
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<UserRegistry>,
) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, registry),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, registry: &Arc<UserRegistry>) {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, peer, registry).await {
            warn!(peer = %peer, error = ?err, "session closed with error");
        }
    });
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<UserRegistry>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let (outbound, outbox) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(pump_outbox(outbox, writer));

    let mut session = Session::new(BufReader::new(reader), outbound, registry);
    let result = session.run().await;

    match session.username() {
        Some(username) => info!(peer = %peer, username, "session ended"),
        None => debug!(peer = %peer, "connection left before registering"),
    }

    // Dropping the session drops its sink, so the writer task drains the
    // remaining lines and closes the socket.
    drop(session);
    let _ = writer_task.await;
    result
}

/// Drains a session's outbound queue onto its socket half, then shuts the
/// half down.
async fn pump_outbox(mut outbox: mpsc::UnboundedReceiver<String>, mut writer: OwnedWriteHalf) {
    while let Some(line) = outbox.recv().await {
        if let Err(err) = send_line(&mut writer, &line).await {
            debug!(error = ?err, "failed to deliver line to client");
            break;
        }
    }
    if let Err(err) = writer.shutdown().await {
        debug!(error = ?err, "failed to shut down client writer");
    }
}

/// Lifecycle of one connection. A session never re-enters an earlier
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Handshaking,
    Active,
    Closed,
}

/// Server-side state for one connected client, from accept to close. The
/// reader is generic so the handshake and chat loop run against in-memory
/// pipes in tests.
struct Session<R> {
    reader: R,
    outbound: Sink,
    registry: Arc<UserRegistry>,
    username: Option<String>,
    state: SessionState,
}

impl<R> Session<R>
where
    R: AsyncBufRead + Unpin,
{
    fn new(reader: R, outbound: Sink, registry: Arc<UserRegistry>) -> Self {
        Self {
            reader,
            outbound,
            registry,
            username: None,
            state: SessionState::Handshaking,
        }
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Drives the session to completion. Cleanup runs no matter how the
    /// handshake or the chat loop ends.
    async fn run(&mut self) -> Result<()> {
        let result = self.drive().await;
        self.close().await;
        result
    }

    async fn drive(&mut self) -> Result<()> {
        match self.handshake().await? {
            Some(username) => self.chat_loop(&username).await,
            // The peer left before registering; there is nobody to notify.
            None => Ok(()),
        }
    }

    /// Repeats the `SUBMITNAME` exchange until a valid unique name
    /// registers. `None` means the peer disconnected first.
    async fn handshake(&mut self) -> Result<Option<String>> {
        loop {
            self.send(protocol::SUBMITNAME);
            let Some(line) = read_line(&mut self.reader).await? else {
                return Ok(None);
            };

            let candidate = line.trim();
            if !protocol::is_valid_name(candidate) {
                self.send(protocol::INVALIDNAME);
                continue;
            }
            if !self
                .registry
                .try_register(candidate, self.outbound.clone())
                .await
            {
                self.send(protocol::NAMETAKEN);
                continue;
            }

            self.send(protocol::NAMEACCEPTED);
            self.username = Some(candidate.to_string());
            self.state = SessionState::Active;
            info!(username = candidate, "user joined");
            self.registry
                .broadcast(&protocol::join_notice(candidate))
                .await;
            return Ok(Some(candidate.to_string()));
        }
    }

    async fn chat_loop(&mut self, username: &str) -> Result<()> {
        while let Some(line) = read_line(&mut self.reader).await? {
            let line = line.trim_end();
            commands::dispatch(&self.registry, username, &self.outbound, line).await;
        }
        Ok(())
    }

    /// Idempotent. Unregisters this session's name and announces the
    /// departure only if the entry was still present.
    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        if let Some(username) = &self.username {
            if self.registry.unregister(username).await {
                info!(username = %username, "user left");
                self.registry
                    .broadcast(&protocol::leave_notice(username))
                    .await;
            }
        }
    }

    /// Queues one line for the writer task. A send error means our own
    /// writer is gone; the read loop notices the dead connection on its
    /// own.
    fn send(&self, line: &str) {
        let _ = self.outbound.send(line.to_string());
    }
}

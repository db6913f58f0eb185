//! Unix domain socket server for the control surface
//!
//! Request-response communication plus push notifications of turn
//! events to subscribed clients. Also the software path into the
//! trigger channel, for boards without the physical button wired up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::button::TriggerEvent;
use crate::events::TurnEvent;

use super::protocol::{DaemonStatus, Notification, Phase, Request, Response};

/// Control server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    trigger_tx: mpsc::Sender<TriggerEvent>,
    /// Cloned per client for notification subscriptions
    event_tx: broadcast::Sender<TurnEvent>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new control server bound to `socket_path`
    pub fn new(
        socket_path: &Path,
        trigger_tx: mpsc::Sender<TriggerEvent>,
        event_tx: broadcast::Sender<TurnEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "control server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            trigger_tx,
            event_tx,
        })
    }

    /// Record whether the physical button came up at startup
    pub async fn set_button_available(&self, available: bool) {
        self.state.write().await.status.button_available = available;
    }

    /// Keep the status snapshot in step with controller events
    pub async fn apply_event(&self, event: &TurnEvent) {
        let mut state = self.state.write().await;
        match event {
            TurnEvent::TurnStarted => state.status.phase = Phase::Playing,
            TurnEvent::ListeningStarted => state.status.phase = Phase::Listening,
            TurnEvent::SearchingStarted => state.status.phase = Phase::Searching,
            TurnEvent::SpeakingStarted => state.status.phase = Phase::Speaking,
            TurnEvent::TurnCompleted { .. } => {
                state.status.phase = Phase::Idle;
                state.status.turns_completed += 1;
            }
            TurnEvent::TurnFailed { .. } => {
                state.status.phase = Phase::Idle;
                state.status.turns_failed += 1;
            }
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let trigger_tx = self.trigger_tx.clone();
                    let event_rx = self.event_tx.subscribe();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, trigger_tx, event_rx) => {
                                if let Err(e) = result {
                                    warn!(error = %e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        trigger_tx: mpsc::Sender<TriggerEvent>,
        mut event_rx: broadcast::Receiver<TurnEvent>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let mut len_buf = [0u8; 4];
        let mut subscribed = false;

        loop {
            tokio::select! {
                read = reader.read_exact(&mut len_buf) => {
                    match read {
                        Ok(_) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                            debug!("client disconnected");
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    }

                    let len = u32::from_le_bytes(len_buf) as usize;
                    if len > 64 * 1024 {
                        warn!(len, "message too large, disconnecting");
                        return Ok(());
                    }

                    let mut msg_buf = vec![0u8; len];
                    reader.read_exact(&mut msg_buf).await?;

                    let request: Request =
                        serde_json::from_slice(&msg_buf).context("failed to parse request")?;
                    debug!(?request, "received request");

                    let response =
                        Self::process_request(request, &state, &trigger_tx, &mut subscribed).await;
                    Self::send_message(&mut writer, &response).await?;
                }
                event = event_rx.recv(), if subscribed => {
                    match event {
                        Ok(event) => {
                            Self::send_message(&mut writer, &Notification::TurnEvent(event))
                                .await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "event notifications lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return Ok(()),
                    }
                }
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(
        writer: &mut OwnedWriteHalf,
        msg: &T,
    ) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return the response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        trigger_tx: &mpsc::Sender<TriggerEvent>,
        subscribed: &mut bool,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::Trigger => {
                let accepted = state.read().await.status.phase == Phase::Idle;
                if trigger_tx.send(TriggerEvent::Remote).await.is_err() {
                    return Response::Error {
                        code: "unavailable".to_string(),
                        message: "turn controller is not running".to_string(),
                    };
                }
                info!(accepted, "trigger injected via control socket");
                Response::Triggered { accepted }
            }

            Request::Subscribe => {
                *subscribed = true;
                debug!("client subscribed to notifications");
                Response::Subscribed
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }

        info!("control server shutdown complete");
    }
}

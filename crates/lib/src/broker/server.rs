//! Broker WebSocket server (single port) and the task that owns the [`Broker`].

use crate::broker::dispatch::Broker;
use crate::broker::sockets::PeerSender;
use crate::config::{BrokerConfig, Config, IdentityMode, Policy};
use crate::identity::ConnectionIdentity;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// How long shutdown waits for the broker task to drain its queue.
const BROKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Events posted by socket tasks to the broker task, applied one at a time in arrival order.
pub enum BrokerEvent {
    Open {
        id: ConnectionIdentity,
        remote: SocketAddr,
    },
    Message {
        id: ConnectionIdentity,
        reply: PeerSender,
        value: Value,
    },
    /// `reply` is the closing connection's own channel; cleanup only touches
    /// registrations made through it.
    Close {
        id: ConnectionIdentity,
        reply: PeerSender,
    },
    Error {
        id: ConnectionIdentity,
        error: String,
    },
    Snapshot {
        respond: oneshot::Sender<BrokerSnapshot>,
    },
}

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct BrokerSnapshot {
    pub apps: usize,
    pub webs: usize,
    pub listed: usize,
}

/// Cloneable handle to the broker task.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerEvent>,
}

impl BrokerHandle {
    /// Spawn the task owning a fresh [`Broker`]. The task ends once every handle is dropped.
    pub fn spawn(policy: Policy) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<BrokerEvent>();
        let task = tokio::spawn(async move {
            let mut broker = Broker::new(policy);
            while let Some(event) = rx.recv().await {
                apply_event(&mut broker, event);
            }
            log::debug!("broker task finished");
        });
        (Self { tx }, task)
    }

    pub fn post(&self, event: BrokerEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("broker task gone, event dropped");
        }
    }

    pub async fn snapshot(&self) -> Option<BrokerSnapshot> {
        let (respond, rx) = oneshot::channel();
        self.post(BrokerEvent::Snapshot { respond });
        rx.await.ok()
    }
}

fn apply_event(broker: &mut Broker, event: BrokerEvent) {
    match event {
        BrokerEvent::Open { id, remote } => log::info!("client connected: {} ({})", id, remote),
        BrokerEvent::Message { id, reply, value } => broker.handle_value(&id, &reply, value),
        BrokerEvent::Close { id, reply } => {
            log::info!("client close: {}", id);
            broker.handle_close(&id, &reply);
        }
        BrokerEvent::Error { id, error } => log::debug!("client error: {} error={}", id, error),
        BrokerEvent::Snapshot { respond } => {
            let (apps, webs) = broker.peer_counts();
            let _ = respond.send(BrokerSnapshot {
                apps,
                webs,
                listed: broker.app_list().len(),
            });
        }
    }
}

/// Shared state for the HTTP/WebSocket handlers.
#[derive(Clone)]
struct ServerState {
    broker: BrokerHandle,
    identity: IdentityMode,
    policy: Policy,
    port: u16,
    /// Fires once on shutdown; every socket loop closes its connection.
    shutdown_tx: broadcast::Sender<()>,
}

/// Bind `broker.bind:broker.port` and serve until SIGINT/SIGTERM.
pub async fn run_broker(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.broker.bind.trim(), config.broker.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    serve(listener, config.broker, shutdown_signal()).await
}

/// Serve the broker on an already-bound listener until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, config: BrokerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr().context("reading listener address")?;
    let (broker, broker_task) = BrokerHandle::spawn(config.policy);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = ServerState {
        broker,
        identity: config.identity,
        policy: config.policy,
        port: local_addr.port(),
        shutdown_tx: shutdown_tx.clone(),
    };
    let app = Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_http))
        .with_state(state);

    log::info!(
        "server start success at {} (policy={}, identity={:?})",
        local_addr,
        config.policy,
        config.identity
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        log::info!("shutdown requested, closing connections");
        let _ = shutdown_tx.send(());
    })
    .await
    .context("broker server exited")?;

    if tokio::time::timeout(BROKER_DRAIN_TIMEOUT, broker_task).await.is_err() {
        log::warn!("broker task did not finish within {:?}", BROKER_DRAIN_TIMEOUT);
    }
    log::info!("broker stopped");
    Ok(())
}

/// Future that completes on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http(State(state): State<ServerState>) -> Json<Value> {
    let snapshot = state.broker.snapshot().await;
    Json(json!({
        "runtime": "running",
        "port": state.port,
        "policy": state.policy.as_str(),
        "apps": snapshot.map(|s| s.apps),
        "webs": snapshot.map(|s| s.webs),
        "listed": snapshot.map(|s| s.listed),
    }))
}

/// GET / (or /ws) upgrades to WebSocket.
async fn ws_handler(
    State(state): State<ServerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, remote, state))
}

async fn handle_socket(mut socket: WebSocket, remote: SocketAddr, state: ServerState) {
    let id = ConnectionIdentity::resolve(remote, state.identity);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    state.broker.post(BrokerEvent::Open {
        id: id.clone(),
        remote,
    });

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            outbound = out_rx.recv() => {
                let Some(value) = outbound else { break };
                let text = match serde_json::to_string(&value) {
                    Ok(text) => text,
                    Err(e) => {
                        log::warn!("encoding message for {}: {}", id, e);
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                let bytes = match msg {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Err(e)) => {
                        state.broker.post(BrokerEvent::Error { id: id.clone(), error: e.to_string() });
                        break;
                    }
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(_)) => continue,
                };
                match serde_json::from_slice::<Value>(&bytes) {
                    Ok(value) => state.broker.post(BrokerEvent::Message {
                        id: id.clone(),
                        reply: out_tx.clone(),
                        value,
                    }),
                    Err(e) => log::debug!("unparsable frame from {}: {}", id, e),
                }
            }
        }
    }

    state.broker.post(BrokerEvent::Close { id, reply: out_tx });
}

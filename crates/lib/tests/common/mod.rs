//! Shared helpers: run a broker on a free port and drive it with WebSocket clients.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use pairhub::broker;
use pairhub::config::BrokerConfig;
use serde_json::Value;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Broker running in the background; stopped when dropped or via `stop`.
pub struct TestBroker {
    pub port: u16,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestBroker {
    pub async fn start(config: BrokerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind free port");
        let port = listener.local_addr().expect("local_addr").port();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(broker::serve(listener, config, async move {
            let _ = stop_rx.await;
        }));
        Self {
            port,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/", self.port)
    }

    pub async fn connect(&self) -> Ws {
        let mut last_err = None;
        for _ in 0..100 {
            match tokio_tungstenite::connect_async(self.url()).await {
                Ok((ws, _)) => return ws,
                Err(e) => last_err = Some(e),
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("could not connect to {}: {:?}", self.url(), last_err);
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let result = tokio::time::timeout(Duration::from_secs(10), task)
                .await
                .expect("broker stops after shutdown")
                .expect("broker task joins");
            assert!(result.is_ok(), "broker exited with {:?}", result);
        }
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string()))
        .await
        .expect("send frame");
}

pub async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(Message::Text(text.to_string()))
        .await
        .expect("send frame");
}

/// Next JSON text frame, or None when nothing arrives within `wait`.
pub async fn recv_within(ws: &mut Ws, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match msg.expect("read frame") {
            Message::Text(text) => {
                return Some(serde_json::from_str(&text).expect("JSON frame"));
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

pub async fn recv(ws: &mut Ws) -> Value {
    recv_within(ws, Duration::from_secs(5))
        .await
        .expect("expected a frame within 5s")
}

pub async fn assert_silent(ws: &mut Ws) {
    if let Some(v) = recv_within(ws, Duration::from_millis(300)).await {
        panic!("expected no frame, got {}", v);
    }
}

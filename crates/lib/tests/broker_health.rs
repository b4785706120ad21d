//! Integration test: start the broker on a free port, GET /health, assert health JSON.

use pairhub::broker;
use pairhub::config::{BrokerConfig, Policy};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::test]
async fn broker_health_http_responds_with_running() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    let config = BrokerConfig {
        policy: Policy::Hard,
        ..BrokerConfig::default()
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(broker::serve(listener, config, async move {
        let _ = stop_rx.await;
    }));

    let url = format!("http://127.0.0.1:{}/health", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    let mut healthy = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                healthy = Some(resp.json::<serde_json::Value>().await.expect("parse JSON"));
                break;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let Some(json) = healthy else {
        server.abort();
        panic!(
            "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
            url, last_err
        );
    };
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("policy").and_then(|v| v.as_str()), Some("hard"));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
    assert_eq!(json.get("apps").and_then(|v| v.as_u64()), Some(0));

    drop(client);
    let _ = stop_tx.send(());
    let result = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server stops after shutdown")
        .expect("server task joins");
    assert!(result.is_ok());
}

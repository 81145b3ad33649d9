use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use property_tracker::{
    config::EvolutionConfig,
    notifier::{EvolutionNotifier, MockNotifier, NotificationService, RetryPolicy},
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::net::TcpListener;

/// Fake Evolution gateway: fails the first `fail_first` calls with 500, then accepts.
#[derive(Clone, Default)]
struct Gateway {
    calls: Arc<AtomicUsize>,
    fail_first: usize,
    last_body: Arc<Mutex<Option<serde_json::Value>>>,
    last_api_key: Arc<Mutex<Option<String>>>,
}

async fn send_text(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let call = gateway.calls.fetch_add(1, Ordering::SeqCst);
    *gateway.last_body.lock().unwrap() = Some(body);
    *gateway.last_api_key.lock().unwrap() = headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if call < gateway.fail_first {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::CREATED
    }
}

async fn spawn_gateway(gateway: Gateway) -> String {
    let router = Router::new()
        .route("/message/sendText/{instance}", post(send_text))
        .with_state(gateway);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    address
}

fn notifier(base_url: String, max_attempts: u32) -> EvolutionNotifier {
    EvolutionNotifier::with_retry(
        EvolutionConfig {
            base_url,
            api_key: "test-key".to_string(),
            instance: "main".to_string(),
        },
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(5),
        },
    )
}

#[tokio::test]
async fn delivers_on_first_success() {
    let gateway = Gateway::default();
    let base = spawn_gateway(gateway.clone()).await;

    assert!(notifier(base, 3).send_text("+5511999998888", "hello").await);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

    let body = gateway.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["number"], "5511999998888");
    assert_eq!(body["text"], "hello");
    assert_eq!(gateway.last_api_key.lock().unwrap().as_deref(), Some("test-key"));
}

#[tokio::test]
async fn retries_until_gateway_recovers() {
    let gateway = Gateway {
        fail_first: 2,
        ..Gateway::default()
    };
    let base = spawn_gateway(gateway.clone()).await;

    assert!(notifier(base, 3).send_text("+14155550123", "code 123456").await);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let gateway = Gateway {
        fail_first: usize::MAX,
        ..Gateway::default()
    };
    let base = spawn_gateway(gateway.clone()).await;

    assert!(!notifier(base, 3).send_text("+14155550123", "never").await);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unreachable_gateway_reports_failure() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    assert!(!notifier(address, 2).send_text("+14155550123", "x").await);
}

#[tokio::test]
async fn mock_notifier_records_and_fails_on_request() {
    let ok = MockNotifier::new();
    assert!(ok.send_text("+1", "a").await);
    assert_eq!(ok.sent(), vec![("+1".to_string(), "a".to_string())]);

    let failing = MockNotifier::new_failing();
    assert!(!failing.send_text("+1", "b").await);
    assert_eq!(failing.sent().len(), 1);
}

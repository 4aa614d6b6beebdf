use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use forge::alerts::notifier::{ChannelKind, NotificationChannel, Notifier, WebhookNotifier};
use forge::alerts::state::{Alert, AlertState};
use forge::ids::Id;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

async fn start_mock_webhook() -> (SocketAddr, JoinHandle<()>, Arc<Mutex<Vec<serde_json::Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = received.clone();

    async fn sink(State(received): State<Arc<Mutex<Vec<serde_json::Value>>>>, Json(body): Json<serde_json::Value>) -> &'static str {
        received.lock().push(body);
        "ok"
    }

    let app = Router::new().route("/hook", post(sink)).with_state(state);
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle, received)
}

fn firing_alert() -> Alert {
    let now = Utc::now();
    Alert {
        id: Id::new(),
        rule_id: Id::new(),
        fingerprint: "rule-1\u{2016}cpu".into(),
        state: AlertState::Firing,
        value: 97.5,
        started_at: now,
        last_evaluated_at: now,
        resolved_at: None,
        acknowledged_at: None,
        escalation_level: 0,
        next_escalation_at: None,
    }
}

#[tokio::test]
async fn webhook_notifier_posts_the_alert_as_json() {
    let (addr, _handle, received) = start_mock_webhook().await;
    let channel = NotificationChannel {
        id: Id::new(),
        name: "ops-webhook".into(),
        kind: ChannelKind::Webhook,
        url: Some(format!("http://{addr}/hook")),
        timeout_ms: 500,
        body_template: None,
    };

    let notifier = WebhookNotifier::new();
    notifier.notify(&channel, &firing_alert(), "cpu-high").await.unwrap();

    let posted = received.lock();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0]["rule_name"], "cpu-high");
    assert_eq!(posted[0]["state"], "Firing");
}

#[tokio::test]
async fn webhook_notifier_reports_a_non_success_status() {
    async fn reject() -> axum::http::StatusCode {
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    }
    let app = Router::new().route("/hook", post(reject));
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let channel = NotificationChannel {
        id: Id::new(),
        name: "broken".into(),
        kind: ChannelKind::Webhook,
        url: Some(format!("http://{addr}/hook")),
        timeout_ms: 500,
        body_template: None,
    };
    let notifier = WebhookNotifier::new();
    let err = notifier.notify(&channel, &firing_alert(), "cpu-high").await.unwrap_err();
    assert!(matches!(err, forge::alerts::notifier::NotifyError::BadStatus(500)));
}

#[tokio::test]
async fn webhook_notifier_fails_closed_without_a_url() {
    let channel = NotificationChannel {
        id: Id::new(),
        name: "no-url".into(),
        kind: ChannelKind::Webhook,
        url: None,
        timeout_ms: 500,
        body_template: None,
    };
    let notifier = WebhookNotifier::new();
    let err = notifier.notify(&channel, &firing_alert(), "cpu-high").await.unwrap_err();
    assert!(matches!(err, forge::alerts::notifier::NotifyError::MissingUrl(_)));
}

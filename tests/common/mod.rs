//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use wicket_client::{ApiClient, Backend, CredentialClient};
use wicket_core::{AccessStateMachine, Signal, Timings};
use wicket_store::SessionStore;
use wicket_types::{
    DEMO_SESSION_TOKEN, Role, Session, SessionToken, StorageTier, SubscriptionStatus,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Short delays so real-time tests finish quickly. Ratios match the defaults.
pub const FAST: Timings = Timings {
    granted: Duration::from_millis(60),
    welcome: Duration::from_millis(120),
    denied_redirect: Duration::from_millis(120),
};

pub fn backend(server: &MockServer) -> Backend {
    Backend::new(&server.uri()).unwrap()
}

pub fn flow(
    server: &MockServer,
    store: &SessionStore,
) -> (
    AccessStateMachine<CredentialClient>,
    mpsc::UnboundedReceiver<Signal>,
) {
    AccessStateMachine::new(
        Arc::new(CredentialClient::new(backend(server))),
        store.clone(),
        FAST,
    )
}

pub fn api(server: &MockServer, store: &SessionStore) -> ApiClient {
    ApiClient::new(backend(server), store.clone())
}

/// Mount a token response on `route`.
pub async fn mount_token(server: &MockServer, route: &str, role: &str, subscription: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jwt-from-server",
            "token_type": "bearer",
            "role": role,
            "name": "Tess Teacher",
            "subscription_status": subscription,
        })))
        .mount(server)
        .await;
}

pub fn demo_session() -> Session {
    Session::new(
        SessionToken::new(DEMO_SESSION_TOKEN),
        Role::new("demo"),
        "Demo Session",
        SubscriptionStatus::demo(),
    )
}

pub fn paid_session(token: &str) -> Session {
    Session::new(
        SessionToken::new(token),
        Role::new("teacher"),
        "Tess Teacher",
        SubscriptionStatus::new("pro"),
    )
}

pub fn store_with(session: &Session, tier: StorageTier) -> SessionStore {
    let store = SessionStore::in_memory();
    store.write(session, tier).unwrap();
    store
}

/// Next signal, failing the test after two seconds.
pub async fn next_signal(rx: &mut mpsc::UnboundedReceiver<Signal>) -> Signal {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a signal")
        .expect("signal channel closed")
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<Signal>) -> Vec<Signal> {
    let mut out = Vec::new();
    while let Ok(signal) = rx.try_recv() {
        out.push(signal);
    }
    out
}

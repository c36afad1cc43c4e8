//! Authenticated calls: sandbox, 401 handling and the demo AI quota.

use serde_json::json;
use wicket_client::{AccessEvent, ApiRequest, ClientError, DEMO_AI_LIMIT_CODE, LOGIN_PATH};
use wicket_core::{Attempt, RouteGuard};
use wicket_store::SessionStore;
use wicket_types::{Credential, NonEmptyString, StorageTier};
use wiremock::matchers::{any, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{api, demo_session, flow, mount_token, paid_session, store_with};

#[tokio::test]
async fn demo_session_mutation_never_reaches_network() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let store = store_with(&demo_session(), StorageTier::Ephemeral);
    let client = api(&server, &store);

    let value = client
        .send(ApiRequest::post("/students", json!({ "name": "Ada" })))
        .await
        .unwrap();
    assert_eq!(value["demo"], json!(true));
    assert_eq!(value["message"], "changes not persisted");
}

#[tokio::test]
async fn demo_session_allowlisted_mutation_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/db/test-connection"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;
    let store = store_with(&demo_session(), StorageTier::Ephemeral);

    let value = api(&server, &store)
        .send(ApiRequest::post("/db/test-connection", json!({})))
        .await
        .unwrap();
    assert_eq!(value, json!({ "ok": true }));
}

#[tokio::test]
async fn demo_session_survives_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let store = store_with(&demo_session(), StorageTier::Ephemeral);
    let client = api(&server, &store);
    let mut events = client.events().subscribe();

    let err = client.send(ApiRequest::get("/dashboard")).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(events.try_recv().is_err());
    assert!(store.read().unwrap().is_some());
    assert!(RouteGuard::new(store).is_admitted());
}

#[tokio::test]
async fn expired_token_logs_out_and_closes_the_guard() {
    let server = MockServer::start().await;
    mount_token(&server, LOGIN_PATH, "teacher", "active").await;
    Mock::given(method("GET"))
        .and(path("/classes"))
        .and(header("authorization", "Bearer jwt-from-server"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })))
        .mount(&server)
        .await;

    let store = SessionStore::in_memory();
    let (machine, _rx) = flow(&server, &store);
    machine
        .submit(Attempt::Login {
            credential: Credential::new(NonEmptyString::new("t1").unwrap(), "x"),
            remember: true,
        })
        .await
        .unwrap();
    machine.dispose();
    let guard = RouteGuard::new(store.clone());
    assert!(guard.is_admitted());

    let client = api(&server, &store);
    let mut events = client.events().subscribe();
    let err = client.send(ApiRequest::get("/classes")).await.unwrap_err();
    assert_eq!(err.to_string(), "Request failed (401): Token expired");
    assert_eq!(events.try_recv().unwrap(), AccessEvent::unauthorized());
    assert!(!guard.is_admitted());
}

#[tokio::test]
async fn demo_ai_quota_ends_in_paywall_event() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let store = store_with(&demo_session(), StorageTier::Ephemeral);
    let client = api(&server, &store).with_ai_quota(2);
    let mut events = client.events().subscribe();

    for _ in 0..2 {
        let value = client
            .send(ApiRequest::ai("predict", "/ai/predict", json!({ "student_id": 4 })))
            .await
            .unwrap();
        assert!(value["response"].as_str().unwrap().starts_with("[DEMO MODE]"));
    }
    let err = client
        .send(ApiRequest::ai("predict", "/ai/predict", json!({ "student_id": 4 })))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::QuotaExhausted { ref feature } if feature == "predict"));
    assert_eq!(
        events.try_recv().unwrap(),
        AccessEvent::paywall(DEMO_AI_LIMIT_CODE)
    );

    // Other features keep their own counters; logout resets them all.
    assert!(
        client
            .send(ApiRequest::ai("chat", "/ai/chat", json!({ "query": "hi" })))
            .await
            .is_ok()
    );
    client.logout().await.unwrap();
    assert!(store.read().unwrap().is_none());
    store.write(&demo_session(), StorageTier::Ephemeral).unwrap();
    assert!(
        client
            .send(ApiRequest::ai("predict", "/ai/predict", json!({})))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn paid_session_mutation_is_sent_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/students"))
        .and(header("authorization", "Bearer paid-jwt"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9 })))
        .expect(1)
        .mount(&server)
        .await;
    let store = store_with(&paid_session("paid-jwt"), StorageTier::Persistent);

    let value = api(&server, &store)
        .send(ApiRequest::post("/students", json!({ "name": "Ada" })))
        .await
        .unwrap();
    assert_eq!(value, json!({ "id": 9 }));
}

//! End-to-end access flow against a mock backend.

use std::time::{Duration, Instant};

use serde_json::json;
use wicket_client::{
    ClientError, DEMO_LOGIN_PATH, DEV_SECRET_HEADER, DEV_UNLOCK_PATH, LOGIN_PATH, REGISTER_PATH,
};
use wicket_core::{Attempt, RouteGuard, Signal, SubmitError};
use wicket_store::SessionStore;
use wicket_types::{
    AccessState, Credential, EntitlementTier, NonEmptyString, RegistrationProfile, Role,
    StorageTier,
};
use wiremock::matchers::{any, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{FAST, drain, flow, mount_token, next_signal};

fn login(remember: bool) -> Attempt {
    Attempt::Login {
        credential: Credential::new(NonEmptyString::new("t1").unwrap(), "x"),
        remember,
    }
}

#[tokio::test]
async fn unentitled_login_is_denied_then_redirected_once() {
    let server = MockServer::start().await;
    mount_token(&server, LOGIN_PATH, "teacher", "free").await;
    let store = SessionStore::in_memory();
    let (machine, mut rx) = flow(&server, &store);

    let tier = machine.submit(login(true)).await.unwrap();
    assert_eq!(tier, EntitlementTier::Denied);
    assert_eq!(
        drain(&mut rx),
        [
            Signal::State(AccessState::Authenticating),
            Signal::State(AccessState::Denied),
        ]
    );

    assert_eq!(next_signal(&mut rx).await, Signal::RedirectToUpgrade);
    tokio::time::sleep(FAST.denied_redirect * 2).await;
    assert!(drain(&mut rx).is_empty());

    // The unentitled session stays stored and still passes the guard.
    let active = store.read().unwrap().unwrap();
    assert_eq!(active.session.subscription.as_str(), "free");
    assert!(RouteGuard::new(store).is_admitted());
}

#[tokio::test]
async fn demo_login_is_granted_then_welcome_then_completed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEMO_LOGIN_PATH))
        .and(body_json(json!({ "role": "demo" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "demo-jwt",
            "role": "demo",
            "subscription_status": "demo",
        })))
        .mount(&server)
        .await;
    let store = SessionStore::in_memory();
    let (machine, mut rx) = flow(&server, &store);

    let started = Instant::now();
    let tier = machine
        .submit(Attempt::Demo {
            role: Role::new("demo"),
        })
        .await
        .unwrap();
    assert_eq!(tier, EntitlementTier::Demo);
    assert_eq!(next_signal(&mut rx).await, Signal::State(AccessState::Authenticating));
    assert_eq!(next_signal(&mut rx).await, Signal::State(AccessState::Granted));
    assert_eq!(next_signal(&mut rx).await, Signal::State(AccessState::Welcome));
    assert!(started.elapsed() >= FAST.granted);
    assert_eq!(next_signal(&mut rx).await, Signal::Completed);
    assert!(started.elapsed() >= FAST.granted + FAST.welcome);

    tokio::time::sleep(FAST.welcome * 2).await;
    assert!(drain(&mut rx).is_empty());

    let active = store.read().unwrap().unwrap();
    assert_eq!(active.tier, StorageTier::Ephemeral);
    assert_eq!(active.session.display_name, "Demo Session");
}

#[tokio::test]
async fn rate_limited_login_returns_to_idle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    let store = SessionStore::in_memory();
    let (machine, mut rx) = flow(&server, &store);

    let err = machine.submit(login(true)).await.unwrap_err();
    assert!(matches!(err, SubmitError::Client(ClientError::RateLimited)));
    assert!(err.to_string().contains("wait"));
    assert_eq!(machine.state(), AccessState::Idle);
    assert_eq!(
        drain(&mut rx).last(),
        Some(&Signal::State(AccessState::Idle))
    );
    assert!(store.read().unwrap().is_none());

    // A retry from Idle reaches the backend again.
    assert!(matches!(
        machine.submit(login(true)).await,
        Err(SubmitError::Client(ClientError::RateLimited))
    ));
}

#[tokio::test]
async fn wrong_password_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "detail": "Incorrect username or password" })),
        )
        .mount(&server)
        .await;
    let store = SessionStore::in_memory();
    let (machine, _rx) = flow(&server, &store);

    machine.submit(login(true)).await.unwrap_err();
    assert_eq!(
        machine.last_error().as_deref(),
        Some("Invalid username or password.")
    );
}

#[tokio::test]
async fn register_then_login_stores_persistent_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "msg": "User created" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_token(&server, LOGIN_PATH, "student", "active").await;
    let store = SessionStore::in_memory();
    let (machine, _rx) = flow(&server, &store);

    let mut profile = RegistrationProfile::new(
        Credential::new(NonEmptyString::new("s1").unwrap(), "Str0ng!Passw0rd"),
        "Sam",
        Role::new("student"),
    );
    profile.grade_level = Some(7);

    let tier = machine
        .submit(Attempt::Register {
            profile: Box::new(profile),
            remember: true,
        })
        .await
        .unwrap();
    assert_eq!(tier, EntitlementTier::Paid);
    assert_eq!(store.read().unwrap().unwrap().tier, StorageTier::Persistent);
}

#[tokio::test]
async fn weak_sign_up_password_never_reaches_the_backend() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let store = SessionStore::in_memory();
    let (machine, mut rx) = flow(&server, &store);

    let profile = RegistrationProfile::new(
        Credential::new(NonEmptyString::new("s1").unwrap(), "letmein1"),
        "Sam",
        Role::new("student"),
    );
    let err = machine
        .submit(Attempt::Register {
            profile: Box::new(profile),
            remember: true,
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Use a stronger password");
    assert_eq!(machine.state(), AccessState::Idle);
    assert_eq!(
        drain(&mut rx),
        [
            Signal::State(AccessState::Authenticating),
            Signal::Error("Use a stronger password".into()),
            Signal::State(AccessState::Idle),
        ]
    );
    assert!(store.read().unwrap().is_none());
}

#[tokio::test]
async fn developer_unlock_sends_secret_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEV_UNLOCK_PATH))
        .and(header(DEV_SECRET_HEADER, "s3cret"))
        .and(body_json(json!({ "email": "dev@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "dev-jwt",
            "role": "teacher",
        })))
        .mount(&server)
        .await;
    let store = SessionStore::in_memory();
    let (machine, mut rx) = flow(&server, &store);

    let tier = machine
        .submit(Attempt::DeveloperUnlock {
            identifier: "dev@example.com".into(),
            secret: "s3cret".into(),
        })
        .await
        .unwrap();
    assert_eq!(tier, EntitlementTier::Developer);
    let active = store.read().unwrap().unwrap();
    assert_eq!(active.tier, StorageTier::Ephemeral);
    assert_eq!(active.session.role.as_str(), "developer");
    assert_eq!(active.session.subscription.as_str(), "active");

    machine.dispose();
    tokio::time::sleep(FAST.granted + FAST.welcome + Duration::from_millis(50)).await;
    assert_eq!(
        drain(&mut rx),
        [
            Signal::State(AccessState::Authenticating),
            Signal::State(AccessState::Granted),
        ]
    );
}

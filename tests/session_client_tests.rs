/// Session client tests against a live server on an ephemeral port
use axum::{http::StatusCode, routing::get, routing::post, Json, Router};
use farmcert::{
    account::{RegisterRequest, Tokens},
    client::{
        ClientConfig, ClientError, FileSessionStore, MemorySessionStore, SessionClient,
        SessionSnapshot, SessionState, SessionStore, SessionTtl,
    },
    config::{SeedAdminConfig, ServerConfig},
    db::{CertificationStatus, Role},
    server::build_router,
    AppContext,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api", addr)
}

async fn spawn_server() -> String {
    let mut config = ServerConfig::for_testing();
    config.authentication.seed_admin = Some(SeedAdminConfig {
        email: "admin@farmcert.com".to_string(),
        password: "Admin@123".to_string(),
        name: "System Administrator".to_string(),
    });
    let ctx = AppContext::new(config).await.unwrap();
    spawn(build_router(ctx)).await
}

fn client(base_url: &str, store: Arc<dyn SessionStore>) -> SessionClient {
    SessionClient::new(ClientConfig::new(base_url), store).unwrap()
}

fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: "password123".to_string(),
        name: "Jane Farmer".to_string(),
        farm_size: 8.0,
        crop_type: "cocoa".to_string(),
    }
}

/// Access token for `sub` that expired an hour ago
fn expired_access_token(sub: &str) -> String {
    let config = ServerConfig::for_testing();
    let now = chrono::Utc::now().timestamp();
    encode(
        &Header::default(),
        &json!({
            "sub": sub,
            "email": "jane@farm.com",
            "role": "farmer",
            "iat": now - 7200,
            "exp": now - 3600,
            "jti": uuid::Uuid::new_v4().to_string(),
        }),
        &EncodingKey::from_secret(config.authentication.access_token_secret.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_and_retried() {
    let base_url = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let client = client(&base_url, store.clone());

    let user = client.register(&register_request("jane@farm.com")).await.unwrap();
    let r1 = store.load().await.unwrap().refresh_token.unwrap();

    // Swap in an expired access token, keep the valid refresh token
    let t1 = expired_access_token(&user.id);
    store
        .save_tokens(
            &Tokens {
                access_token: t1.clone(),
                refresh_token: r1.clone(),
            },
            &SessionTtl::default(),
        )
        .await
        .unwrap();

    let profile = client.my_profile().await.unwrap();
    assert_eq!(profile.id, user.id);

    let session = store.load().await.unwrap();
    let t2 = session.access_token.unwrap();
    let r2 = session.refresh_token.unwrap();
    assert_ne!(t2, t1);
    assert_ne!(r2, r1);

    // R1 is spent
    let response = reqwest::Client::new()
        .post(format!("{}/auth/refresh", base_url))
        .bearer_auth(&r1)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_second_401_is_not_retried() {
    let profile_hits = Arc::new(AtomicUsize::new(0));
    let refresh_hits = Arc::new(AtomicUsize::new(0));

    let app = {
        let profile_hits = profile_hits.clone();
        let refresh_hits = refresh_hits.clone();
        Router::new()
            .route(
                "/api/farmers/me",
                get(move || {
                    let hits = profile_hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({
                                "statusCode": 401,
                                "error": "Unauthorized",
                                "message": "Token has expired"
                            })),
                        )
                    }
                }),
            )
            .route(
                "/api/auth/refresh",
                post(move || {
                    let hits = refresh_hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Json(json!({"accessToken": "t2", "refreshToken": "r2"}))
                    }
                }),
            )
    };
    let base_url = spawn(app).await;

    let store = Arc::new(MemorySessionStore::new());
    store
        .save_tokens(
            &Tokens {
                access_token: "t1".to_string(),
                refresh_token: "r1".to_string(),
            },
            &SessionTtl::default(),
        )
        .await
        .unwrap();
    let client = client(&base_url, store.clone());

    let err = client.my_profile().await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Token has expired");
        }
        other => panic!("Expected Api error, got {:?}", other),
    }

    assert_eq!(profile_hits.load(Ordering::SeqCst), 2);
    assert_eq!(refresh_hits.load(Ordering::SeqCst), 1);
    // The rotated pair was kept
    assert_eq!(store.load().await.unwrap().access_token.as_deref(), Some("t2"));
}

#[tokio::test]
async fn test_failed_refresh_ends_session_and_fires_hook() {
    let base_url = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let expired = Arc::new(AtomicBool::new(false));
    let client = {
        let expired = expired.clone();
        client(&base_url, store.clone()).on_session_expired(move || {
            expired.store(true, Ordering::SeqCst);
        })
    };

    let user = client.register(&register_request("jane@farm.com")).await.unwrap();
    assert!(matches!(
        client.state().await.unwrap(),
        SessionState::Authenticated(_)
    ));

    store
        .save_tokens(
            &Tokens {
                access_token: expired_access_token(&user.id),
                refresh_token: "not-a-refresh-token".to_string(),
            },
            &SessionTtl::default(),
        )
        .await
        .unwrap();

    let err = client.my_profile().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(expired.load(Ordering::SeqCst));
    assert_eq!(client.state().await.unwrap(), SessionState::Anonymous);
    assert!(store.load().await.unwrap().refresh_token.is_none());
}

#[tokio::test]
async fn test_401_without_refresh_token_propagates() {
    let base_url = spawn_server().await;
    let expired = Arc::new(AtomicBool::new(false));
    let client = {
        let expired = expired.clone();
        client(&base_url, Arc::new(MemorySessionStore::new())).on_session_expired(move || {
            expired.store(true, Ordering::SeqCst);
        })
    };

    let err = client.my_profile().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!expired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_wrong_password_does_not_touch_session() {
    let base_url = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let client = client(&base_url, store.clone());

    client.register(&register_request("jane@farm.com")).await.unwrap();
    let before = store.load().await.unwrap();

    let err = client.login("jane@farm.com", "wrong-password").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(store.load().await.unwrap(), before);
}

#[tokio::test]
async fn test_logout_clears_local_and_server_state() {
    let base_url = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let client = client(&base_url, store.clone());

    client.register(&register_request("jane@farm.com")).await.unwrap();
    let refresh_token = store.load().await.unwrap().refresh_token.unwrap();

    client.logout().await.unwrap();
    assert_eq!(client.state().await.unwrap(), SessionState::Anonymous);

    let response = reqwest::Client::new()
        .post(format!("{}/auth/refresh", base_url))
        .bearer_auth(&refresh_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_workflow_through_client() {
    let base_url = spawn_server().await;

    let farmer = client(&base_url, Arc::new(MemorySessionStore::new()));
    let jane = farmer.register(&register_request("jane@farm.com")).await.unwrap();
    assert_eq!(farmer.my_status().await.unwrap().status, CertificationStatus::Pending);

    let admin = client(&base_url, Arc::new(MemorySessionStore::new()));
    let admin_user = admin.login("admin@farmcert.com", "Admin@123").await.unwrap();
    assert_eq!(admin_user.role, Role::Admin);
    assert_eq!(farmcert::client::home_path(admin_user.role), "/admin/dashboard");
    assert_eq!(farmcert::client::home_path(jane.role), "/dashboard");

    let farmers = admin.list_farmers().await.unwrap();
    assert_eq!(farmers.len(), 1);

    let updated = admin
        .update_farmer_status(&jane.id, CertificationStatus::Certified)
        .await
        .unwrap();
    assert_eq!(updated.status, CertificationStatus::Certified);

    assert_eq!(farmer.my_status().await.unwrap().status, CertificationStatus::Certified);
    assert_eq!(farmer.my_profile().await.unwrap().status, CertificationStatus::Certified);

    let err = farmer.list_farmers().await.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_file_store_session_survives_restart() {
    let base_url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let first = client(&base_url, Arc::new(FileSessionStore::new(&path)));
    let user = first.register(&register_request("jane@farm.com")).await.unwrap();
    drop(first);

    let second = client(&base_url, Arc::new(FileSessionStore::new(&path)));
    assert_eq!(
        second.restore().await.unwrap(),
        SessionState::Authenticated(user.clone())
    );
    assert_eq!(second.my_profile().await.unwrap().id, user.id);

    second.logout().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_explicit_refresh_rotates_pair() {
    let base_url = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let client = client(&base_url, store.clone());

    client.register(&register_request("jane@farm.com")).await.unwrap();
    let before = store.load().await.unwrap();

    let tokens = client.refresh().await.unwrap();
    assert_ne!(Some(&tokens.refresh_token), before.refresh_token.as_ref());

    let after = store.load().await.unwrap();
    assert_eq!(after.access_token.as_deref(), Some(tokens.access_token.as_str()));
    assert_eq!(after.refresh_token.as_deref(), Some(tokens.refresh_token.as_str()));
    assert_eq!(after.user, before.user);

    // Rotation again works from the stored pair
    client.refresh().await.unwrap();
}

#[tokio::test]
async fn test_explicit_refresh_failures_end_session() {
    let base_url = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let client = {
        let hook_calls = hook_calls.clone();
        client(&base_url, store.clone()).on_session_expired(move || {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        })
    };

    // Nothing to refresh with
    let err = client.refresh().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);

    client.register(&register_request("jane@farm.com")).await.unwrap();
    store
        .save_tokens(
            &Tokens {
                access_token: "stale".to_string(),
                refresh_token: "not-a-refresh-token".to_string(),
            },
            &SessionTtl::default(),
        )
        .await
        .unwrap();

    let err = client.refresh().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.load().await.unwrap(), SessionSnapshot::default());
    assert_eq!(client.state().await.unwrap(), SessionState::Anonymous);
}

#[tokio::test]
async fn test_expired_user_snapshot_reads_as_anonymous() {
    let base_url = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let ttl = SessionTtl {
        user: Duration::ZERO,
        ..SessionTtl::default()
    };
    let client = SessionClient::new(
        ClientConfig::new(&base_url)
            .with_ttl(ttl)
            .with_timeout(Duration::from_secs(10)),
        store.clone(),
    )
    .unwrap();

    client.register(&register_request("jane@farm.com")).await.unwrap();

    let snapshot = store.load().await.unwrap();
    assert!(snapshot.user.is_none());
    assert!(snapshot.refresh_token.is_some());
    assert_eq!(client.restore().await.unwrap(), SessionState::Anonymous);
    assert_eq!(store.load().await.unwrap(), SessionSnapshot::default());
}

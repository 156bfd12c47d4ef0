use campus_admin_auth::{
    AuthError, AuthStatus, HttpRefresher, RefreshCoordinator, SessionState, TokenRefresher,
    TokenStore,
};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_root(mock_server: &MockServer) -> Url {
    Url::parse(&format!("{}/api/v1/", mock_server.uri())).unwrap()
}

#[tokio::test]
async fn test_http_refresher_posts_refresh_token() {
    // モックサーバーの起動
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .and(body_json(json!({"refresh_token": "old_refresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new_access",
            "refresh_token": "new_refresh"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let refresher = HttpRefresher::new(&api_root(&mock_server), Client::new()).unwrap();
    let grant = refresher.refresh("old_refresh").await.unwrap();

    assert_eq!(grant.access_token, "new_access");
    assert_eq!(grant.refresh_token.as_deref(), Some("new_refresh"));
}

#[tokio::test]
async fn test_http_refresher_reports_backend_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Token invalide"})),
        )
        .mount(&mock_server)
        .await;

    let refresher = HttpRefresher::new(&api_root(&mock_server), Client::new()).unwrap();
    let err = refresher.refresh("expired").await.unwrap_err();

    assert_eq!(
        err,
        AuthError::RefreshRejected {
            status: 401,
            message: "Token invalide".to_string()
        }
    );
}

#[tokio::test]
async fn test_coordinator_single_backend_call_under_contention() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "minted"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(TokenStore::in_memory());
    store.save("stale", "long_lived");
    let session = Arc::new(SessionState::new());
    let refresher = HttpRefresher::new(&api_root(&mock_server), Client::new()).unwrap();
    let coordinator = Arc::new(RefreshCoordinator::new(
        store.clone(),
        session.clone(),
        Arc::new(refresher),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.ensure_fresh_token().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "minted");
    }

    // 回転されていないリフレッシュトークンは保持される
    let pair = store.read().unwrap();
    assert_eq!(pair.access_token, "minted");
    assert_eq!(pair.refresh_token, "long_lived");
    assert_ne!(session.status(), AuthStatus::Anonymous);

    mock_server.verify().await;
}

mod common;

use auth_core::{
    config::SessionPolicy,
    services::{AuthError, SessionStore},
    ErrorKind,
};
use chrono::{Duration, Utc};
use common::{spawn_app, spawn_app_with_policy};

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let app = spawn_app();
    let login = app.alice().await;
    let original = login.tokens.refresh_token;

    let rotated = app
        .service
        .refresh(&original)
        .await
        .expect("First refresh failed");

    let err = app.service.refresh(&original).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOrExpiredToken);

    let again = app
        .service
        .refresh(&rotated.tokens.refresh_token)
        .await
        .expect("Refresh with rotated token failed");
    assert_ne!(again.tokens.refresh_token, rotated.tokens.refresh_token);

    // Rotation happens in place.
    assert_eq!(app.store.session_count(), 1);
}

#[tokio::test]
async fn test_refreshed_access_token_is_valid() {
    let app = spawn_app();
    let login = app.alice().await;

    let refreshed = app
        .service
        .refresh(&login.tokens.refresh_token)
        .await
        .expect("Refresh failed");

    let claims = app
        .jwt
        .verify(&refreshed.tokens.access_token)
        .expect("Refreshed access token invalid");
    assert_eq!(claims.sub, login.account.account_id);
    assert!(!refreshed.is_new_account);
}

#[tokio::test]
async fn test_expired_session_is_removed() {
    let app = spawn_app();
    let login = app.alice().await;

    app.store
        .create(
            login.account.account_id,
            "expired-token",
            Utc::now() - Duration::seconds(1),
        )
        .await
        .expect("Failed to create session");
    assert_eq!(app.store.session_count(), 2);

    for _ in 0..2 {
        let err = app.service.refresh("expired-token").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOrExpiredToken);
    }
    assert_eq!(app.store.session_count(), 1);
}

#[tokio::test]
async fn test_unknown_token_rejected() {
    let app = spawn_app();
    app.alice().await;

    let err = app.service.refresh("never-issued").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredToken));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_has_one_winner() {
    let app = spawn_app();
    let login = app.alice().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = app.service.clone();
        let token = login.tokens.refresh_token.clone();
        handles.push(tokio::spawn(async move { service.refresh(&token).await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.expect("Refresh task panicked") {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidOrExpiredToken),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(app.store.session_count(), 1);
}

#[tokio::test]
async fn test_reuse_is_tolerated_by_default() {
    let app = spawn_app();
    let login = app.alice().await;

    let rotated = app
        .service
        .refresh(&login.tokens.refresh_token)
        .await
        .expect("Refresh failed");
    app.service
        .refresh(&login.tokens.refresh_token)
        .await
        .unwrap_err();

    app.service
        .refresh(&rotated.tokens.refresh_token)
        .await
        .expect("Legitimate holder lost the session");
}

#[tokio::test]
async fn test_reuse_revokes_everything_when_configured() {
    let app = spawn_app_with_policy(SessionPolicy {
        revoke_on_reuse: true,
    });
    let login = app.alice().await;

    let rotated = app
        .service
        .refresh(&login.tokens.refresh_token)
        .await
        .expect("Refresh failed");

    let err = app
        .service
        .refresh(&login.tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOrExpiredToken);
    assert_eq!(app.store.session_count(), 0);

    let err = app
        .service
        .refresh(&rotated.tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOrExpiredToken);
}

#[tokio::test]
async fn test_purge_expired_sessions() {
    let app = spawn_app();
    let login = app.alice().await;

    for token in ["old-1", "old-2"] {
        app.store
            .create(
                login.account.account_id,
                token,
                Utc::now() - Duration::minutes(5),
            )
            .await
            .expect("Failed to create session");
    }

    let purged = app
        .service
        .purge_expired_sessions()
        .await
        .expect("Purge failed");
    assert_eq!(purged, 2);

    app.service
        .refresh(&login.tokens.refresh_token)
        .await
        .expect("Live session was purged");
}

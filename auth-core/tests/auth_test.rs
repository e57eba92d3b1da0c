mod common;

use auth_core::{models::Role, ErrorKind};
use common::{register_request, spawn_app, TEST_PASSWORD};
use uuid::Uuid;

#[tokio::test]
async fn test_register_login_refresh_logout_scenario() {
    let app = spawn_app();

    let account = app
        .service
        .register(register_request("a@x.com", "alice", "secret1"))
        .await
        .expect("Failed to register");
    assert_eq!(account.email, "a@x.com");
    assert_eq!(account.username, "alice");
    assert_eq!(account.role, Role::User);
    assert!(account.has_password);

    let login = app
        .service
        .password_login("a@x.com", "secret1")
        .await
        .expect("Failed to log in");
    assert_eq!(login.tokens.token_type, "Bearer");
    assert_eq!(login.tokens.expires_in, 15 * 60);
    assert_eq!(login.account.account_id, account.account_id);

    let refreshed = app
        .service
        .refresh(&login.tokens.refresh_token)
        .await
        .expect("Failed to refresh");
    assert_ne!(refreshed.tokens.refresh_token, login.tokens.refresh_token);

    app.service
        .logout(&refreshed.tokens.refresh_token)
        .await
        .expect("Failed to log out");

    let err = app
        .service
        .refresh(&refreshed.tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOrExpiredToken);
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let app = spawn_app();
    app.service
        .register(register_request("a@x.com", "alice", TEST_PASSWORD))
        .await
        .expect("Failed to register");

    let err = app
        .service
        .register(register_request("a@x.com", "alice2", TEST_PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmailTaken);

    let err = app
        .service
        .register(register_request("A@X.com", "alice3", TEST_PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmailTaken);
}

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let app = spawn_app();
    app.service
        .register(register_request("a@x.com", "alice", TEST_PASSWORD))
        .await
        .expect("Failed to register");

    let err = app
        .service
        .register(register_request("b@x.com", "alice", TEST_PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UsernameTaken);
}

#[tokio::test]
async fn test_register_validation() {
    let app = spawn_app();

    for req in [
        register_request("not-an-email", "alice", TEST_PASSWORD),
        register_request("a@x.com", "al", TEST_PASSWORD),
        register_request("a@x.com", "alice smith", TEST_PASSWORD),
        register_request("a@x.com", "alice", "12345"),
    ] {
        let err = app.service.register(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert_eq!(app.store.session_count(), 0);
}

#[tokio::test]
async fn test_access_token_carries_subject_and_role() {
    let app = spawn_app();
    let login = app.alice().await;

    let claims = app
        .service
        .authenticate(&login.tokens.access_token)
        .expect("Failed to authenticate");
    assert_eq!(claims.sub, login.account.account_id);
    assert_eq!(claims.role, Role::User);
    assert_eq!(claims.iss, "filmophilia");

    let claims = app
        .service
        .authenticate_bearer(&format!("Bearer {}", login.tokens.access_token))
        .expect("Failed to authenticate bearer header");
    assert_eq!(claims.sub, login.account.account_id);
}

#[tokio::test]
async fn test_tampered_access_token_rejected() {
    let app = spawn_app();
    let login = app.alice().await;

    let mut tampered = login.tokens.access_token.clone();
    tampered.push('x');

    let err = app.service.authenticate(&tampered).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAccessToken);
}

#[tokio::test]
async fn test_get_account() {
    let app = spawn_app();
    let login = app.alice().await;

    let account = app
        .service
        .get_account(login.account.account_id)
        .await
        .expect("Failed to get account");
    assert_eq!(account, login.account);

    let err = app.service.get_account(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccountNotFound);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let app = spawn_app();
    let login = app.alice().await;

    app.service
        .logout(&login.tokens.refresh_token)
        .await
        .expect("First logout failed");
    assert_eq!(app.store.session_count(), 0);

    app.service
        .logout(&login.tokens.refresh_token)
        .await
        .expect("Second logout failed");
    app.service
        .logout("never-issued")
        .await
        .expect("Logout of unknown token failed");
}

#[tokio::test]
async fn test_revoke_all_sessions() {
    let app = spawn_app();
    let first = app.alice().await;
    app.service
        .password_login("a@x.com", TEST_PASSWORD)
        .await
        .expect("Second login failed");

    let revoked = app
        .service
        .revoke_all_sessions(first.account.account_id)
        .await
        .expect("Failed to revoke sessions");
    assert_eq!(revoked, 2);

    let err = app
        .service
        .refresh(&first.tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOrExpiredToken);
}

#[tokio::test]
async fn test_register_normalizes_email_before_validation() {
    let app = spawn_app();

    let account = app
        .service
        .register(register_request("  Alice@X.com ", "alice", TEST_PASSWORD))
        .await
        .expect("Failed to register padded mixed-case email");
    assert_eq!(account.email, "alice@x.com");

    let err = app
        .service
        .register(register_request("ALICE@x.com", "alice2", TEST_PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmailTaken);

    app.service
        .password_login(" alice@X.COM", TEST_PASSWORD)
        .await
        .expect("Failed to log in with differently cased email");
}

mod common;

use auth_core::{
    models::IdentityProvider,
    services::{AccountDirectory, ProviderError},
    ErrorKind,
};
use common::{google_identity, spawn_app, TEST_PASSWORD};

#[tokio::test]
async fn test_first_login_creates_passwordless_account() {
    let app = spawn_app();

    let login = app
        .google_login("code-1", google_identity("g-1", "New.User@Gmail.com", true))
        .await
        .expect("Federated login failed");

    assert!(login.is_new_account);
    assert_eq!(login.account.email, "new.user@gmail.com");
    assert_eq!(login.account.username, "new.user");
    assert_eq!(login.account.display_name.as_deref(), Some("Google User"));
    assert!(!login.account.has_password);

    let identities = app
        .service
        .linked_identities(login.account.account_id)
        .await
        .expect("Failed to list identities");
    assert_eq!(identities.len(), 1);
    assert!(identities[0].is_provider(IdentityProvider::Google));
    assert_eq!(identities[0].subject, "g-1");
}

#[tokio::test]
async fn test_returning_login_uses_linked_identity() {
    let app = spawn_app();
    let first = app
        .google_login("code-1", google_identity("g-1", "g@x.com", true))
        .await
        .expect("First login failed");

    // The provider email changed; the stable subject still resolves.
    let second = app
        .google_login("code-2", google_identity("g-1", "renamed@x.com", true))
        .await
        .expect("Second login failed");

    assert!(!second.is_new_account);
    assert_eq!(second.account.account_id, first.account.account_id);
}

#[tokio::test]
async fn test_verified_email_links_existing_account() {
    let app = spawn_app();
    let alice = app.alice().await;

    let login = app
        .google_login("code-1", google_identity("g-alice", "A@x.com", true))
        .await
        .expect("Federated login failed");

    assert!(!login.is_new_account);
    assert_eq!(login.account.account_id, alice.account.account_id);
    assert!(login.account.has_password);

    let linked = app
        .store
        .find_by_identity(IdentityProvider::Google, "g-alice")
        .await
        .expect("Lookup failed");
    assert_eq!(
        linked.map(|a| a.account_id),
        Some(alice.account.account_id)
    );

    app.service
        .password_login("a@x.com", TEST_PASSWORD)
        .await
        .expect("Password login broke after linking");
}

#[tokio::test]
async fn test_unverified_email_neither_links_nor_creates() {
    let app = spawn_app();
    let alice = app.alice().await;

    let err = app
        .google_login("code-1", google_identity("g-evil", "a@x.com", false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnverifiedEmail);

    let err = app
        .google_login("code-2", google_identity("g-new", "new@x.com", false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnverifiedEmail);

    assert!(app
        .service
        .linked_identities(alice.account.account_id)
        .await
        .expect("Failed to list identities")
        .is_empty());
    assert!(app
        .store
        .find_by_email("new@x.com")
        .await
        .expect("Lookup failed")
        .is_none());
}

#[tokio::test]
async fn test_provider_failure_is_opaque() {
    let app = spawn_app();
    app.provider.add_failure(
        "code-1",
        ProviderError::Upstream {
            status: 400,
            body: "invalid_grant".to_string(),
        },
    );

    let err = app.service.federated_login("code-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderExchangeFailed);
    assert!(!err.to_string().contains("invalid_grant"));

    // Codes are single use.
    app.google_login("code-2", google_identity("g-1", "g@x.com", true))
        .await
        .expect("Federated login failed");
    let err = app.service.federated_login("code-2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderExchangeFailed);
}

#[tokio::test]
async fn test_banned_account_cannot_federate() {
    let app = spawn_app();
    let first = app
        .google_login("code-1", google_identity("g-1", "g@x.com", true))
        .await
        .expect("Federated login failed");

    app.service
        .admin_ban(first.account.account_id)
        .await
        .expect("Failed to ban");

    let err = app
        .google_login("code-2", google_identity("g-1", "g@x.com", true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccountBanned);
    assert_eq!(app.store.session_count(), 0);
}

#[tokio::test]
async fn test_username_collision_gets_suffix() {
    let app = spawn_app();
    app.alice().await;

    let login = app
        .google_login("code-1", google_identity("g-2", "alice@other.com", true))
        .await
        .expect("Federated login failed");

    assert!(login.is_new_account);
    assert!(login.account.username.starts_with("alice_"));
    assert_eq!(login.account.username.len(), "alice_".len() + 6);
}

#[tokio::test]
async fn test_authorization_url_carries_state() {
    let app = spawn_app();
    let url = app.service.google_authorization_url("xyz 1");
    assert!(url.contains("state=xyz%201"));
}

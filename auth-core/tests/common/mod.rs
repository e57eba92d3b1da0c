//! Shared setup for auth-core integration tests.
//!
//! Builds an `AuthService` over the in-memory store and a scripted identity
//! provider, with the cheapest argon2 parameters.

#![allow(dead_code)]

use auth_core::{
    config::{JwtConfig, SessionPolicy},
    models::{AuthResponse, ExternalIdentity, IdentityProvider, RegisterRequest},
    services::{AccountDirectory, AuthService, JwtService, MemoryStore, MockIdentityProvider},
    utils::{CredentialHasher, HashingParams},
};
use secrecy::Secret;
use std::sync::Arc;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-32-bytes!!";
pub const TEST_PASSWORD: &str = "secret1";

pub struct TestApp {
    pub service: AuthService,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MockIdentityProvider>,
    pub jwt: JwtService,
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: Secret::new(TEST_JWT_SECRET.to_string()),
        issuer: "filmophilia".to_string(),
        access_token_expiry_minutes: 15,
        refresh_token_expiry_days: 7,
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_policy(SessionPolicy::default())
}

pub fn spawn_app_with_policy(policy: SessionPolicy) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    build_app(store.clone(), store, policy)
}

/// Sessions live in `store`; account reads and writes go through `directory`,
/// which usually wraps the same store.
pub fn spawn_app_with_directory(
    directory: Arc<dyn AccountDirectory>,
    store: Arc<MemoryStore>,
) -> TestApp {
    build_app(directory, store, SessionPolicy::default())
}

fn build_app(
    directory: Arc<dyn AccountDirectory>,
    store: Arc<MemoryStore>,
    policy: SessionPolicy,
) -> TestApp {
    service_core::observability::init_test_tracing();

    let provider = Arc::new(MockIdentityProvider::new());
    let jwt = JwtService::new(&jwt_config());
    let hasher =
        CredentialHasher::new(HashingParams::minimal()).expect("Failed to build password hasher");

    let service = AuthService::new(
        directory,
        store.clone(),
        provider.clone(),
        jwt.clone(),
        hasher,
        policy,
    );

    TestApp {
        service,
        store,
        provider,
        jwt,
    }
}

pub fn register_request(email: &str, username: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        display_name: None,
    }
}

pub fn google_identity(external_id: &str, email: &str, verified: bool) -> ExternalIdentity {
    ExternalIdentity {
        provider: IdentityProvider::Google,
        external_id: external_id.to_string(),
        email: email.to_string(),
        email_verified: verified,
        display_name: Some("Google User".to_string()),
    }
}

impl TestApp {
    /// Register alice (a@x.com / secret1) and log her in.
    pub async fn alice(&self) -> AuthResponse {
        self.service
            .register(register_request("a@x.com", "alice", TEST_PASSWORD))
            .await
            .expect("Failed to register alice");

        self.service
            .password_login("a@x.com", TEST_PASSWORD)
            .await
            .expect("Failed to log alice in")
    }

    pub async fn google_login(
        &self,
        code: &str,
        identity: ExternalIdentity,
    ) -> Result<AuthResponse, auth_core::AuthError> {
        self.provider.add_identity(code, identity);
        self.service.federated_login(code).await
    }
}

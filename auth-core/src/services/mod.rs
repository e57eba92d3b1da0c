//! Services layer: the authentication core, its token codec, stores and
//! identity provider adapters.

mod auth;
mod database;
pub mod error;
mod google;
pub mod identity;
pub mod jwt;
mod memory;
pub mod store;

pub use auth::AuthService;
pub use database::Database;
pub use error::{AuthError, ErrorKind, StoreError};
pub use google::GoogleIdentityProvider;
pub use identity::{IdentityProviderAdapter, MockIdentityProvider, ProviderError};
pub use jwt::{AccessTokenClaims, JwtService, TokenError};
pub use memory::MemoryStore;
pub use store::{AccountDirectory, SessionStore};

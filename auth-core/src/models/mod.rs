pub mod account;
pub mod identity;
pub mod session;

pub use account::{Account, AccountRow, AccountStatus, AccountView, RegisterRequest, Role};
pub use identity::{ExternalIdentity, IdentityProvider, LinkedIdentity};
pub use session::{hash_token, AuthResponse, Rotation, Session, TokenPair};

//! Session credentials for the campus admin client
//!
//! This crate owns everything that keeps a signed-in session valid:
//! persisting the token pair ([`TokenStore`]), reading a token's expiry
//! ([`TokenClock`]), minting a new access token exactly once per refresh
//! cycle ([`RefreshCoordinator`]) and publishing the resulting status
//! ([`SessionState`]).

pub mod clock;
mod error;
pub mod refresh;
pub mod session;
pub mod store;
mod types;

pub use clock::{decode_claims, is_near_expiry, Claims, TokenClock, DEFAULT_REFRESH_THRESHOLD};
pub use error::AuthError;
pub use refresh::{HttpRefresher, RefreshCoordinator, TokenRefresher};
pub use session::{AuthStatus, SessionState};
pub use store::{FileStorage, MemoryStorage, SessionStorage, TokenStore};
pub use types::*;

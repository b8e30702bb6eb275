/// Accounts, bearer sessions and OTP verification
///
/// The service keeps its own user store so that every role check is made
/// against server-side state, never against what the client claims.

pub mod credentials;
pub mod service;
pub mod storage;
pub mod types;

pub use service::AccountService;
pub use storage::AccountStorage;
pub use types::{AuthSession, OtpPurpose, Role, User};

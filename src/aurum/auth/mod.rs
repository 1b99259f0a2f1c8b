//! Authentication and session authorization.
//!
//! Registration hashes the password, stores an unverified user and emails a
//! verification link. Login compares the password and issues a session token.
//! Protected routes sit behind the [`gate`] middleware.

pub mod error;
pub mod gate;
pub mod password;
mod state;
pub mod token;
pub mod verification;

pub use error::AuthError;
pub use gate::{AuthenticatedUser, GateError, require_bearer};
pub use password::PasswordHasher;
pub use state::{AuthConfig, AuthState};
pub use token::{Claims, TokenError, TokenKind, TokenService};

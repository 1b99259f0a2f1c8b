//! # Aurum
//!
//! `aurum` is a small backend for a gold inventory: account registration with
//! email verification, password login that issues bearer tokens, and
//! token-gated inventory endpoints.
//!
//! ## Tokens
//!
//! Session and verification tokens are HS256-signed compact JWS strings keyed on
//! a single process-wide secret loaded at startup. A token is valid iff its
//! signature matches and the current time is strictly before `exp`.
//! Verification redemption is idempotent; there is no consumed-token ledger.
//!
//! ## Passwords
//!
//! Passwords are hashed with Argon2id and a random salt. The PHC hash string is
//! never logged and never returned by any endpoint.

pub mod aurum;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

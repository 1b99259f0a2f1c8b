pub mod gold;
pub mod health;
pub mod login;
pub mod register;
pub mod verify;

pub use self::health::health;
pub use self::login::login;
pub use self::register::register;
pub use self::verify::{resend_verification, verify_email};

// common functions for the handlers
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub(crate) const INVALID_PAYLOAD: &str = "Invalid request payload";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

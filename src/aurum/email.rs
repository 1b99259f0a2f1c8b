//! Outbound email delivery.
//!
//! Registration hands a rendered verification email to an [`EmailSender`] and
//! waits only for the send call to succeed or fail. There is no outbox and no
//! retry: a failed send surfaces immediately to the caller.
//!
//! `SendGridSender` talks to the SendGrid v3 API. `LogEmailSender` logs the
//! recipient and subject instead, for local development.

use crate::APP_USER_AGENT;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, instrument};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const VERIFICATION_SUBJECT: &str = "Confirm your registration";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub html_body: String,
}

/// Email delivery abstraction.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error describing why it was not accepted.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct SendGridConfig {
    api_key: SecretString,
    from_address: String,
    from_name: String,
}

impl SendGridConfig {
    #[must_use]
    pub fn new(api_key: SecretString, from_address: String, from_name: String) -> Self {
        Self {
            api_key,
            from_address,
            from_name,
        }
    }
}

impl std::fmt::Debug for SendGridConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridConfig")
            .field("api_key", &"***")
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .finish()
    }
}

#[derive(Debug)]
pub struct SendGridSender {
    client: Client,
    config: SendGridConfig,
}

impl SendGridSender {
    /// # Errors
    /// Returns an error if the API key is empty or the HTTP client cannot be built.
    pub fn new(config: SendGridConfig) -> Result<Self> {
        if config.api_key.expose_secret().is_empty() {
            return Err(anyhow!("SendGrid API key is required"));
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(SEND_TIMEOUT)
            .build()
            .context("Error creating reqwest client")?;

        Ok(Self { client, config })
    }
}

fn sendgrid_payload(config: &SendGridConfig, message: &EmailMessage) -> Value {
    json!({
        "personalizations": [
            { "to": [ { "email": message.to_email } ] }
        ],
        "from": {
            "email": config.from_address,
            "name": config.from_name,
        },
        "subject": message.subject,
        "content": [
            { "type": "text/html", "value": message.html_body }
        ]
    })
}

#[async_trait]
impl EmailSender for SendGridSender {
    #[instrument(skip_all, fields(to_email = %message.to_email))]
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let response = self
            .client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&sendgrid_payload(&self.config, message))
            .send()
            .await
            .context("SendGrid request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("SendGrid rejected message: {status} - {body}"));
        }

        debug!("SendGrid accepted message: {status}");

        Ok(())
    }
}

const VERIFICATION_TEMPLATE: &str = r#"<html>
<head>
  <style>
    body { font-family: Arial, sans-serif; background-color: #f4f4f4; color: #333; margin: 0; padding: 0; }
    .container { max-width: 600px; margin: 30px auto; padding: 20px; background-color: #ffffff; border-radius: 8px; }
    .header { text-align: center; padding-bottom: 20px; }
    .header h2 { color: #007BFF; }
    .content p { font-size: 16px; }
    .button { display: inline-block; padding: 10px 20px; background-color: #28a745; color: #fff; border-radius: 5px; text-decoration: none; font-size: 16px; }
    .footer { margin-top: 20px; font-size: 14px; color: #888; text-align: center; }
  </style>
</head>
<body>
  <div class="container">
    <div class="header">
      <h2>Thanks for signing up!</h2>
    </div>
    <div class="content">
      <p>Hi,</p>
      <p>Please click the button below to verify your account:</p>
      <p><a href="{{link}}" class="button">Verify account</a></p>
      <p>If you did not sign up, you can ignore this email.</p>
    </div>
    <div class="footer">
      <p>&copy; Aurum. All rights reserved.</p>
    </div>
  </div>
</body>
</html>
"#;

/// Render the verification email for `to_email` pointing at `link`.
#[must_use]
pub fn verification_email(to_email: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        subject: VERIFICATION_SUBJECT.to_string(),
        html_body: VERIFICATION_TEMPLATE.replace("{{link}}", &escape_attr(link)),
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

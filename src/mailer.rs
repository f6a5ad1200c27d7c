use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::EmailConfig;

/// Outbound mail collaborator. The transport is external; callers only need
/// "deliver this html to this address" and a delivery id back.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<String>;
}

/// Sends through an HTTP mail API (Mailgun/Resend style JSON endpoint).
pub struct HttpMailer {
    client: reqwest::Client,
    config: EmailConfig,
}

impl HttpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl MailSender for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "from": format!("\"{}\" <{}>", self.config.from_name, self.config.from_address),
                "to": to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .context("mail api request")?
            .error_for_status()
            .context("mail api rejected message")?;

        let body: serde_json::Value = response.json().await.context("mail api response")?;
        let id = body["id"].as_str().unwrap_or("unknown").to_string();
        info!(%to, %subject, message_id = %id, "email sent");
        Ok(id)
    }
}

pub fn verification_email(frontend_url: &str, token: &str) -> (String, String) {
    let verify_url = format!("{}/verify-email/{}", frontend_url, token);
    let html = format!(
        r#"<h1>Verify Your Email</h1>
<p>Thank you for registering! Please verify your email address to complete your registration.</p>
<p>Click the link below to verify your email:</p>
<a href="{verify_url}">Verify Email</a>
<p>This link will expire in 24 hours.</p>
<p>If you did not create an account, please ignore this email.</p>"#
    );
    ("Verify Your Email".to_string(), html)
}

pub fn reset_password_email(frontend_url: &str, token: &str) -> (String, String) {
    let reset_url = format!("{}/reset-password/{}", frontend_url, token);
    let html = format!(
        r#"<h1>Reset Password</h1>
<p>You have requested to reset your password for your account.</p>
<p>Click the link below to reset your password:</p>
<a href="{reset_url}">Reset Password</a>
<p>This link will expire in 1 hour.</p>
<p>If you did not request a password reset, please ignore this email.</p>"#
    );
    ("Reset Password".to_string(), html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_email_links_to_frontend() {
        let (subject, html) = verification_email("https://blog.example.com", "abc123");
        assert_eq!(subject, "Verify Your Email");
        assert!(html.contains("https://blog.example.com/verify-email/abc123"));
        assert!(html.contains("24 hours"));
    }

    #[test]
    fn reset_email_links_to_frontend() {
        let (subject, html) = reset_password_email("https://blog.example.com", "tok");
        assert_eq!(subject, "Reset Password");
        assert!(html.contains("https://blog.example.com/reset-password/tok"));
        assert!(html.contains("1 hour"));
    }
}

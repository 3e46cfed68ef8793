//! Outbound email
//!
//! Handlers build an [`OutgoingMail`] from one of the templates below and
//! hand it to [`send_in_background`]; delivery failures are logged and never
//! reach the HTTP caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::{error, info};
use udulib_common::config::EmailConfig;

/// A rendered HTML email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// SMTP delivery through a STARTTLS relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let host = config.smtp_host.as_deref().context("smtp_host is not configured")?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("Invalid SMTP relay '{}'", host))?
            .port(config.smtp_port);
        if let (Some(user), Some(password)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let from = Mailbox::new(
            Some(config.from_name.clone()),
            config
                .from_email
                .parse()
                .with_context(|| format!("Invalid sender address '{}'", config.from_email))?,
        );
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mail.to.parse().with_context(|| format!("Invalid recipient '{}'", mail.to))?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(mail.html)?;
        self.transport.send(message).await?;
        info!("Sent '{}' to {}", mail.subject, mail.to);
        Ok(())
    }
}

/// Writes mail to the log; used when no SMTP relay is configured
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        info!("Email to {} ({}), SMTP not configured:\n{}", mail.to, mail.subject, mail.html);
        Ok(())
    }
}

/// Pick the SMTP mailer when configured, else the log mailer
pub fn from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    if config.smtp_host.as_deref().is_some_and(|h| !h.is_empty()) {
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// Deliver on a background task, logging failures
pub fn send_in_background(mailer: Arc<dyn Mailer>, mail: OutgoingMail) {
    tokio::spawn(async move {
        let to = mail.to.clone();
        if let Err(e) = mailer.send(mail).await {
            error!("Failed to send email to {}: {:#}", to, e);
        }
    });
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn wrap(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{title}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
<div style="max-width: 600px; margin: 0 auto; padding: 20px;">
{body}
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="font-size: 12px; color: #666;">This email was sent by the UDU Library system.<br>Please do not reply.</p>
</div>
</body>
</html>"#
    )
}

/// Link to the frontend reset page carrying the one-time token
pub fn password_reset(to: &str, name: &str, frontend_url: &str, token: &str, valid_minutes: i64) -> OutgoingMail {
    let link = format!("{}/reset-password?token={}", frontend_url.trim_end_matches('/'), token);
    let body = format!(
        r#"<h2 style="color: #2c3e50;">Reset your password</h2>
<p>Hello {name},</p>
<p>We received a request to reset the password of your UDU Library account.</p>
<p><a href="{link}" style="background-color: #2c3e50; color: #fff; padding: 10px 20px; border-radius: 5px; text-decoration: none;">Choose a new password</a></p>
<p>This link is valid for {valid_minutes} minutes and can be used once.</p>
<p>If you did not request a reset, you can ignore this email.</p>"#,
        name = escape_html(name),
        link = escape_html(&link),
    );
    OutgoingMail {
        to: to.to_string(),
        subject: "Password reset - UDU Library".to_string(),
        html: wrap("Password reset", &body),
    }
}

/// Notice sent after a password change
pub fn password_changed(to: &str, name: &str) -> OutgoingMail {
    let body = format!(
        r#"<h2 style="color: #27ae60;">Your password was changed</h2>
<p>Hello {name},</p>
<p>The password of your account was changed at <strong>{at}</strong>.</p>
<p>If you did not make this change, contact us immediately.</p>"#,
        name = escape_html(name),
        at = Utc::now().format("%d/%m/%Y %H:%M:%S UTC"),
    );
    OutgoingMail {
        to: to.to_string(),
        subject: "Password changed - UDU Library".to_string(),
        html: wrap("Password changed", &body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_template_contains_link() {
        let mail = password_reset("a@b.c", "Linh", "http://front/", "tok-123", 30);
        assert_eq!(mail.to, "a@b.c");
        assert!(mail.html.contains("http://front/reset-password?token=tok-123"));
        assert!(mail.html.contains("30 minutes"));
    }

    #[test]
    fn test_templates_escape_names() {
        let mail = password_changed("a@b.c", "<script>");
        assert!(!mail.html.contains("<script>"));
        assert!(mail.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_from_config_without_smtp_uses_log() {
        assert!(from_config(&EmailConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_mail() {
        LogMailer.send(password_changed("a@b.c", "x")).await.unwrap();
    }
}

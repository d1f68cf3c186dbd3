use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

/// 事务邮件（HTTP API，Resend 兼容格式）
#[derive(Clone)]
pub struct EmailService {
    client: Client,
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        let client = Client::builder()
            .user_agent("sorteos-backend/email")
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.api_key.is_empty() && !self.config.api_url.is_empty()
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<()> {
        if !self.is_enabled() {
            log::debug!("Email disabled, skipping message to {to}: {subject}");
            return Ok(());
        }

        let body = SendEmailRequest {
            from: &self.config.from_address,
            to: vec![to],
            subject,
            html,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            log::info!("Email sent to {to}: {subject}");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("Email to {to} failed: HTTP {status}: {error_text}");
            Err(AppError::ExternalApiError(format!(
                "Email sending failed: HTTP {status}"
            )))
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::Notifier;

#[derive(Debug, Serialize)]
pub struct OutboundMessage<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub html: &'a str,
}

/// HTTP client for the e-mail relay service.
#[derive(Clone)]
pub struct MailerClient {
    client: reqwest::Client,
    base_url: String,
}

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

impl MailerClient {
    /// `base_url` may be given with or without its `/api/v1` suffix.
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let root = base_url.trim_end_matches('/');
        let base_url = match root.strip_suffix("/api/v1") {
            Some(_) => root.to_string(),
            None => format!("{root}/api/v1"),
        };
        let client = reqwest::Client::builder().timeout(RELAY_TIMEOUT).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Notifier for MailerClient {
    async fn send(&self, recipient: &str, subject: &str, body_html: &str) -> Result<(), String> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&OutboundMessage {
                to: recipient,
                subject,
                html: body_html,
            })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("Mail relay returned {status}: {text}"));
        }

        Ok(())
    }
}

/// Stand-in used when no relay is configured.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, _body_html: &str) -> Result<(), String> {
        log::info!("Mail relay not configured; dropping '{subject}' for {recipient}");
        Ok(())
    }
}

use async_trait::async_trait;
use parkline_core::{Contact, Notice, Notifier, ParkError, ParkResult};
use parkline_shared::Masked;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::app_config::MailConfig;

/// Delivers personal notices as email through an HTTP mail relay.
pub struct MailRelayNotifier {
    client: Client,
    relay_url: String,
    sender: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text: String,
}

impl MailRelayNotifier {
    pub fn new(config: &MailConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            relay_url: config.relay_url.clone(),
            sender: config.sender.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    fn channel(&self) -> &'static str {
        "mail"
    }

    async fn send(&self, contact: &Contact, notice: &Notice) -> ParkResult<()> {
        let to = match (&contact.email, notice.is_personal()) {
            (Some(email), true) if !email.trim().is_empty() => email.trim(),
            _ => return Ok(()),
        };

        let mail = OutgoingMail {
            from: &self.sender,
            to,
            subject: notice.subject(),
            text: notice.text(),
        };

        let mut req = self.client.post(&self.relay_url).json(&mail);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ParkError::CollaboratorUnavailable(format!("mail relay: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ParkError::CollaboratorUnavailable(format!(
                "mail relay rejected message ({}): {}",
                status, detail
            )));
        }

        debug!(to = %Masked(to), subject = %mail.subject, "Email sent");
        Ok(())
    }
}

use async_trait::async_trait;
use parkline_core::{Contact, Notice, Notifier, ParkError, ParkResult};
use parkline_shared::Masked;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::app_config::WhatsAppConfig;

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";

/// Sends personal notices as WhatsApp messages through the Twilio REST API.
pub struct WhatsAppNotifier {
    client: Client,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl WhatsAppNotifier {
    pub fn new(config: &WhatsAppConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from: config.from.clone(),
        })
    }
}

fn whatsapp_address(phone: &str) -> String {
    if phone.starts_with("whatsapp:") {
        phone.to_string()
    } else {
        format!("whatsapp:{}", phone)
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    fn channel(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, contact: &Contact, notice: &Notice) -> ParkResult<()> {
        let phone = match (&contact.phone, notice.is_personal()) {
            (Some(phone), true) if !phone.trim().is_empty() => phone,
            _ => return Ok(()),
        };

        let to = whatsapp_address(phone.trim());
        let body = format!("*{}*\n\n{}", notice.subject(), notice.text());
        let url = format!("{}/Accounts/{}/Messages.json", TWILIO_API, self.account_sid);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", self.from.as_str()), ("To", to.as_str()), ("Body", body.as_str())])
            .send()
            .await
            .map_err(|e| ParkError::CollaboratorUnavailable(format!("whatsapp: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ParkError::CollaboratorUnavailable(format!(
                "whatsapp rejected message ({}): {}",
                status, detail
            )));
        }

        debug!(to = %Masked(phone), "WhatsApp message sent");
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parkline_core::{
    Contact, Notice, Notifier, ParkError, ParkResult, SensorFeed, SensorReading, SlotId,
};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::app_config::BlynkConfig;

/// Client for the Blynk cloud HTTP API the slot sensors publish to.
///
/// Each slot owns three virtual pins: occupancy on `V{slot-1}`, the reservation
/// indicator on `V{slot+2}` and the entry timer on `V{slot+5}`.
pub struct BlynkClient {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl BlynkClient {
    pub fn new(config: &BlynkConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: format!("https://{}/external/api", config.server),
            auth_token: config.auth_token.clone(),
        })
    }

    fn occupancy_pin(slot_id: SlotId) -> String {
        format!("V{}", slot_id.get() - 1)
    }

    fn reservation_pin(slot_id: SlotId) -> String {
        format!("V{}", slot_id.get() + 2)
    }

    fn timer_pin(slot_id: SlotId) -> String {
        format!("V{}", slot_id.get() + 5)
    }

    /// `Ok(None)` when the cloud answers but has no value for the pin.
    async fn read_pin(&self, pin: &str) -> ParkResult<Option<String>> {
        let url = format!("{}/get", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("token", self.auth_token.as_str()), (pin, "")])
            .send()
            .await
            .map_err(unavailable)?;

        if response.status() != StatusCode::OK {
            debug!(pin, status = %response.status(), "Blynk pin read rejected");
            return Ok(None);
        }

        let body = response.text().await.map_err(unavailable)?;
        Ok(parse_pin_value(&body))
    }

    async fn write_pin(&self, pin: &str, value: &str) -> ParkResult<()> {
        let url = format!("{}/update", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("token", self.auth_token.as_str()), (pin, value)])
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(ParkError::CollaboratorUnavailable(format!(
                "blynk rejected write to {} ({})",
                pin,
                response.status()
            )));
        }
        Ok(())
    }

    async fn read_slot(&self, slot_id: SlotId) -> ParkResult<Option<SensorReading>> {
        let status = match self.read_pin(&Self::occupancy_pin(slot_id)).await? {
            Some(v) => v,
            None => return Ok(None),
        };
        let reserved = self.read_pin(&Self::reservation_pin(slot_id)).await?;
        let timer = self.read_pin(&Self::timer_pin(slot_id)).await?;

        Ok(Some(SensorReading {
            slot_id,
            is_occupied: pin_flag(Some(&status)),
            is_reserved: pin_flag(reserved.as_deref()),
            entry_time: timer
                .and_then(|t| t.parse::<i64>().ok())
                .filter(|secs| *secs != 0)
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        }))
    }
}

fn unavailable(err: reqwest::Error) -> ParkError {
    ParkError::CollaboratorUnavailable(format!("blynk: {}", err))
}

/// Pin reads come back either bare (`1`) or JSON-wrapped (`["1"]`).
fn parse_pin_value(body: &str) -> Option<String> {
    let value = body
        .trim()
        .trim_matches(|c| c == '[' || c == ']' || c == '"')
        .trim();

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn pin_flag(value: Option<&str>) -> bool {
    value.and_then(|v| v.parse::<f64>().ok()) == Some(1.0)
}

#[async_trait]
impl SensorFeed for BlynkClient {
    async fn get_all_slot_status(&self) -> ParkResult<Vec<SensorReading>> {
        let mut readings = Vec::new();
        for slot_id in SlotId::all() {
            match self.read_slot(slot_id).await? {
                Some(reading) => readings.push(reading),
                None => warn!(slot_id = %slot_id, "No sensor value for slot"),
            }
        }
        Ok(readings)
    }

    async fn set_reservation_flag(&self, slot_id: SlotId, reserved: bool) -> ParkResult<()> {
        let value = if reserved { "1" } else { "0" };
        self.write_pin(&Self::reservation_pin(slot_id), value).await
    }

    async fn reset_slot_timer(&self, slot_id: SlotId) -> ParkResult<()> {
        self.write_pin(&Self::timer_pin(slot_id), "0").await
    }
}

/// The cloud event log. Only takes [`Notice::Event`]; personal notices go
/// through the mail and WhatsApp channels.
#[async_trait]
impl Notifier for BlynkClient {
    fn channel(&self) -> &'static str {
        "blynk"
    }

    async fn send(&self, _contact: &Contact, notice: &Notice) -> ParkResult<()> {
        if notice.is_personal() {
            return Ok(());
        }

        let url = format!("{}/logEvent", self.base_url);
        let text = notice.text();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("token", self.auth_token.as_str()),
                ("code", "parking_event"),
                ("description", text.as_str()),
            ])
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(ParkError::CollaboratorUnavailable(format!(
                "blynk rejected event ({})",
                response.status()
            )));
        }
        Ok(())
    }
}

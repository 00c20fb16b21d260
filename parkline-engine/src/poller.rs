use chrono::Utc;
use parkline_core::{ParkResult, SensorFeed, SlotLedger};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Merges sensor-observed arrivals into the ledger on a fixed interval.
///
/// Only ever marks slots occupied. A sensor reporting an empty bay leaves an
/// occupied slot alone, since freeing it would drop an unbilled stay.
pub struct ReconciliationPoller {
    ledger: Arc<dyn SlotLedger>,
    sensor: Arc<dyn SensorFeed>,
    interval: Duration,
}

impl ReconciliationPoller {
    pub fn new(ledger: Arc<dyn SlotLedger>, sensor: Arc<dyn SensorFeed>, interval: Duration) -> Self {
        Self {
            ledger,
            sensor,
            interval,
        }
    }

    /// One reconciliation pass. Returns how many slots were newly marked occupied.
    pub async fn tick(&self) -> ParkResult<usize> {
        let readings = self.sensor.get_all_slot_status().await?;

        let occupied: HashSet<_> = self
            .ledger
            .list()
            .await?
            .into_iter()
            .filter(|slot| slot.is_occupied())
            .map(|slot| slot.slot_id)
            .collect();

        let mut arrivals = 0;
        for reading in readings {
            if !reading.is_occupied || occupied.contains(&reading.slot_id) {
                continue;
            }

            // A manual occupy may have landed since the listing; its clock stands.
            if self.ledger.occupy_if_vacant(reading.slot_id, Utc::now()).await? {
                info!(slot_id = %reading.slot_id, "Vehicle detected by sensor");
                arrivals += 1;
            }
        }

        Ok(arrivals)
    }

    /// Tick until the task is aborted. A failed tick is logged and the next one
    /// runs on schedule.
    pub async fn run(self: Arc<Self>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Reconciliation poller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(0) => {}
                Ok(n) => debug!(arrivals = n, "Reconciliation tick applied arrivals"),
                Err(e) => error!(error = %e, "Reconciliation tick skipped"),
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

use chrono::{DateTime, Utc};
use parkline_core::ParkError;
use serde::{Deserialize, Serialize};

use crate::schedule::RateSchedule;

/// Result of pricing one interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bill {
    pub base_charge: f64,
    pub variable_charge: f64,
    pub total_amount: f64,
    pub duration_minutes: i64,
}

/// Stateless pricing over time intervals.
#[derive(Debug, Clone, Default)]
pub struct BillingCalculator {
    schedule: RateSchedule,
}

impl BillingCalculator {
    pub fn new(schedule: RateSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &RateSchedule {
        &self.schedule
    }

    /// Price an actual stay from `entry_time` to `exit_time`.
    ///
    /// Partial ticks are charged proportionally. A zero-length stay costs the
    /// base charge; an exit before entry is an error.
    pub fn live_parking(
        &self,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
    ) -> Result<Bill, BillingError> {
        if exit_time < entry_time {
            return Err(BillingError::NegativeInterval {
                entry: entry_time,
                exit: exit_time,
            });
        }

        let rate = &self.schedule.live;
        let elapsed = exit_time - entry_time;
        let elapsed_seconds = elapsed.num_milliseconds() as f64 / 1000.0;

        let ticks = elapsed_seconds / rate.tick_seconds;
        let variable_charge = ticks * rate.rate_per_tick;

        Ok(Bill {
            base_charge: rate.base_charge,
            variable_charge,
            total_amount: rate.base_charge + variable_charge,
            duration_minutes: elapsed.num_minutes(),
        })
    }

    /// Price a cancelled reservation. `None` when no duration was declared.
    pub fn cancellation_fee(&self, reserved_duration_hours: f64) -> Result<Option<Bill>, BillingError> {
        if !reserved_duration_hours.is_finite() || reserved_duration_hours < 0.0 {
            return Err(BillingError::InvalidDuration(reserved_duration_hours));
        }
        if reserved_duration_hours == 0.0 {
            return Ok(None);
        }

        let rate = &self.schedule.cancellation;
        let variable_charge = reserved_duration_hours * rate.rate_per_hour;

        Ok(Some(Bill {
            base_charge: rate.base_charge,
            variable_charge,
            total_amount: rate.base_charge + variable_charge,
            duration_minutes: (reserved_duration_hours * 60.0) as i64,
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Exit time {exit} precedes entry time {entry}")]
    NegativeInterval {
        entry: DateTime<Utc>,
        exit: DateTime<Utc>,
    },

    #[error("Reserved duration must be a non-negative number of hours, got {0}")]
    InvalidDuration(f64),
}

impl From<BillingError> for ParkError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::NegativeInterval { entry, exit } => ParkError::InvalidInterval { entry, exit },
            BillingError::InvalidDuration(_) => ParkError::Store(Box::new(err)),
        }
    }
}

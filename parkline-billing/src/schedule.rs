use serde::{Deserialize, Serialize};

/// Rate applied to actual occupancy: a flat base plus a charge per elapsed tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveRate {
    pub base_charge: f64,
    /// Charged per full tick, and proportionally for a partial one.
    pub rate_per_tick: f64,
    pub tick_seconds: f64,
}

impl Default for LiveRate {
    fn default() -> Self {
        Self {
            base_charge: 30.0,
            rate_per_tick: 50.0,
            tick_seconds: 30.0,
        }
    }
}

/// Rate applied when a reservation with a declared duration is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancellationRate {
    pub base_charge: f64,
    pub rate_per_hour: f64,
}

impl Default for CancellationRate {
    fn default() -> Self {
        Self {
            base_charge: 30.0,
            rate_per_hour: 100.0,
        }
    }
}

/// The two schedules are configured independently and never derived from each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RateSchedule {
    #[serde(default)]
    pub live: LiveRate,
    #[serde(default)]
    pub cancellation: CancellationRate,
}

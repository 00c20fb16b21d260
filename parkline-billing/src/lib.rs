pub mod schedule;
pub mod calculator;

pub use schedule::{CancellationRate, LiveRate, RateSchedule};
pub use calculator::{Bill, BillingCalculator, BillingError};

//! Approval-date estimation: business-day calendar, queue and throughput
//! scans over a capture, and the forecast view returned to callers.

mod calendar;
mod estimator;
mod views;

pub use calendar::{federal_holidays, BusinessCalendar};
pub use estimator::{CaseEstimator, EstimateError};
pub use views::{Forecast, ForecastCode};

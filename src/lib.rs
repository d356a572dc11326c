//! Tracks USCIS I-765 case statuses by sampling the public case-status
//! site into snapshot files and estimating approval dates from them.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

mod cli;
mod infra;
mod routes;
mod server;

use error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}

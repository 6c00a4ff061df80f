//! Predefined jobs.
//!
//! - **sweep**: periodic full sweep of registered indexers

pub mod sweep;

pub use sweep::{create_sweep_job, run_sweep_job, SweepJobConfig, SWEEP_JOB_NAME};

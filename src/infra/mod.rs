//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod rest;
pub mod telemetry;
pub mod uploads;

//! Admin-facing operations built on the data client.

pub mod error;
pub mod images;
pub mod notify;
pub mod optimistic;
pub mod posts;

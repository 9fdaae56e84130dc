//! Domain layer types and invariants.

pub mod error;
pub mod images;
pub mod posts;
pub mod scoring;
pub mod slug;

//! coldreach — multi-step cold email campaign dispatch engine.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod render;
pub mod sequence;
pub mod store;
pub mod transport;
pub mod variants;

//! Control-plane API models consumed by the satellite agent.

pub mod models;

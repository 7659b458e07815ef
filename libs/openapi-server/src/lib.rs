//! Models served by the satellite agent's local HTTP API.

pub mod models;

//! Satellite Agent Library
//!
//! Core modules for the satellite agent: control-plane client, task
//! engine, container runtime, local deployment store and HTTP surface.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod tasks;
pub mod utils;
pub mod workers;

//! Agent-local models

pub mod deployment;

//! Container lifecycle for model deployments

pub mod docker;
pub mod health;
pub mod runtime;

//! Local storage: on-disk layout, settings and deployment state

pub mod deployments;
pub mod layout;
pub mod settings;

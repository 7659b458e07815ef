//! Agent HTTP surface

pub mod gate;
pub mod handlers;
pub mod serve;
pub mod state;

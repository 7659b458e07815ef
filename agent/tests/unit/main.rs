//! Integration tests for the satellite agent

mod common;
mod test_controller;
mod test_server;

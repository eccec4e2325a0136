// Library crate for the binary and integration tests.

pub mod checks;
pub mod config;
pub mod error;
pub mod log_capture;
pub mod mode;
pub mod provider;
pub mod registry;
pub mod routes;
pub mod runner;
pub mod server;
pub mod state;
pub mod verdict;

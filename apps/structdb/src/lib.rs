//! # structdb
//!
//! Network side of the structdb client: HTTP transport, configuration and the
//! command-line interface around `structdb-core`.

pub mod cli;
pub mod config;
pub mod transport;

pub use config::Config;
pub use transport::HttpTransport;

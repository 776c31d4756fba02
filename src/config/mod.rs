//! Configuration module
//!
//! Runtime settings for the relay server, assembled from CLI flags and
//! environment variables in `main`.

mod server;

pub use server::*;

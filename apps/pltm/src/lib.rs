//! # pltm
//!
//! The HTTP server and CLI surface over `pltm-core`: REST API (axum), CLI
//! commands (clap), and the ambient stack (auth, rate limiting, CORS,
//! structured logging). Exposed as a library so integration tests can build
//! a router and drive it directly (`axum-test`) without shelling out to the
//! binary.

pub mod api;
pub mod cli;

//! Certificate-gated process supervision.
//!
//! `certbridge` fetches a short-lived TLS certificate from a companion server,
//! runs a command once a valid certificate is on disk, and restarts that
//! command whenever the certificate is rotated.

pub mod acme;
pub mod api;
pub mod auth;
pub mod cert;
pub mod config;
pub mod error;
pub mod observability;
pub mod provider;
pub mod state;
pub mod supervisor;

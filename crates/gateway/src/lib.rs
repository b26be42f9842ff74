//! HTTP surface of the vault: `/encrypt`, `/decrypt-dek` and `/health`.
//!
//! Handlers are thin: they validate the request shape, then hand off to
//! [`custodian_vault::Vault`], which owns every key and ownership decision.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{AppState, build_app, serve};

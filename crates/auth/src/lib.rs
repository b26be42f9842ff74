//! Token verification for the vault.
//!
//! The vault never inspects tokens itself; it asks the issuing service through
//! [`HttpAuthorizationGate`], which implements
//! [`custodian_vault::AuthorizationGate`].

pub mod http_gate;

pub use http_gate::HttpAuthorizationGate;

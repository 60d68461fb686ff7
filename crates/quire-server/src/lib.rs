//! quire-server - sync server for Quire
//!
//! Hosts the authoritative [`engine::MergeEngine`] behind two authenticated
//! JSON endpoints. Payloads stay encrypted end to end; the server only reads
//! note ids and modification dates.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod routes;
mod schema;

pub use config::AppConfig;
pub use engine::{AuthenticatedClient, EngineError, EngineResult, MergeEngine};
pub use routes::{app_router, AppState};

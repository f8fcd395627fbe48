//! KeyEscrow server
//!
//! Stores per-machine recovery-key records submitted by devices and serves
//! them to operators. Key material is opaque text: it is stored and returned
//! verbatim, never parsed or transformed.

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod storage;

pub use config::ServerConfig;
pub use error::EscrowError;
pub use server::{build_router, AppState};
pub use storage::models::{KeyRecord, KeyState, NewKeyRecord};
pub use storage::KeyStorage;

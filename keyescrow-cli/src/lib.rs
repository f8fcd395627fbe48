//! KeyEscrow operator client
//!
//! HTTP client for the escrow server and local export of fetched key
//! material.

pub mod client;
pub mod export;
pub mod models;

pub use client::{ClientError, EscrowClient, Result};
pub use models::{KeyRecord, KeyState};

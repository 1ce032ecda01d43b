//! TalentGate API Library
//!
//! This library provides the core functionality for the TalentGate recruiting
//! marketplace API: credit wallets, subscription gating, candidate unlocks and
//! notification dispatch.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `integrations`: External service integrations.
//! - `candidates`: Candidate directory (masked/full listings).
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `jobs`: Background subscription maintenance.
//! - `models`: Core data models.
//! - `notifications`: In-app + push notification dispatch.
//! - `subscriptions`: Subscription lifecycle and gating snapshots.
//! - `unlock`: The unlock gate and funding decision.
//! - `wallet`: Credit ledger operations.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod candidates;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod notifications;
pub mod subscriptions;
pub mod unlock;
pub mod wallet;

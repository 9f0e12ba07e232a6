//! Lectern - progress tracking and certificate issuance backend
//!
//! Lectern aggregates per-video watch reports into per-course completion
//! state and gates certificate issuance on verified completion.
//!
//! ## Components
//!
//! - **Progress**: per-video watch records with bounded history, rolled up
//!   into per-course aggregates by a single recompute path
//! - **Certificates**: eligibility checks, uniquely numbered issuance with
//!   an idempotent short-circuit, artifact rendering/upload as retryable
//!   steps, and terminal revocation
//! - **Collaborators**: blob storage and notification webhooks behind
//!   narrow trait interfaces

pub mod certificate;
pub mod config;
pub mod db;
pub mod progress;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

#[cfg(test)]
pub mod testutil;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{LecternError, Result};

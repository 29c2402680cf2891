//! Domain logic for the Echopad Sync Core — see `SPEC_FULL.md` at the
//! workspace root for the full behavioral specification.
//!
//! This crate owns every service described there (Blob Store, Metadata
//! Store connection, Token Service, Rate Limiter, Audit Log, Auth Service,
//! Vault Service, Sync Engine, File Transfer) and nothing about HTTP —
//! the `echopad-sync` binary crate is the only thing that knows about
//! axum, mirroring the teacher's `context-hub-core`/`context-hub` split.

pub mod audit;
pub mod auth;
pub mod blob;
pub mod db;
pub mod error;
pub mod file_transfer;
pub mod model;
pub mod rate_limit;
pub mod sync;
pub mod token;
pub mod vault;

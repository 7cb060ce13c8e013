//! # Verity
//!
//! A relay and local analysis history for media-authenticity and
//! misinformation detection services.
//!
//! Verity sits between a browser UI (or the `verity` CLI) and an external
//! detection API. It forwards videos, audio clips, images, and text,
//! interprets the model outputs into verdicts, and keeps the ten most
//! recent results per category.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────┐
//! │  Web UI  │──▶│ Relay server │──▶│ Detection API  │
//! │   CLI    │   │ (axum)       │   │ (external)     │
//! └──────────┘   └──────┬───────┘   └────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │ History store │  verity-core over SQLite
//!               └───────────────┘
//! ```
//!
//! Classification, fusion, response interpretation, and the bounded
//! history live in the `verity-core` crate; this crate adds HTTP, SQL,
//! uploads, and configuration.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and env overrides |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite key-value backend for the history |
//! | [`relay`] | Detection-API client and error vocabulary |
//! | [`uploads`] | Media upload storage |
//! | [`server`] | Relay HTTP server |
//! | [`analyze`] | One-shot analysis for the CLI |
//! | [`history_cmd`] | History listing and counts for the CLI |

pub mod analyze;
pub mod config;
pub mod db;
pub mod history_cmd;
pub mod migrate;
pub mod relay;
pub mod server;
pub mod sqlite_store;
pub mod uploads;

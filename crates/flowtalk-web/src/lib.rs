//! # flowtalk-web
//!
//! HTTP/JSON API for FlowTalk.
//!
//! Auth (signed bearer tokens, 7-day expiry, header or cookie), messages
//! with translation hydration, reactions, communities and channels, DM
//! conversations, and public profiles.  Reads are poll-based; posting a
//! message stores it and spawns the translation fan-out in the
//! background.

pub mod api;
pub mod auth;
pub mod error;
pub mod server;
pub mod state;

// ── re-exports ───────────────────────────────────────────────────────

pub use auth::TokenSigner;
pub use error::{ApiError, ApiResult};
pub use server::{WebConfig, WebServer};
pub use state::AppState;

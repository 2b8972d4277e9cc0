//! # flowtalk-store
//!
//! Persistence for FlowTalk.
//!
//! SQLite-backed storage with WAL mode, versioned migrations, and async
//! access via the blocking thread pool.  Conditional writes carry the
//! concurrency-sensitive invariants: message status transitions CAS on
//! their source state, translations are unique per `(message, target)`,
//! reactions are unique per `(message, user)`, and DM threads are unique
//! per participant pair.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  UserStore          accounts, PBKDF2 hashing  │
//! │  CommunityStore     communities · channels    │
//! │  ConversationStore  DM threads (pair-unique)  │
//! │  MessageStore       messages · translations   │
//! │                     reactions · hydration     │
//! │  GlossaryStore      per-community terms       │
//! ├───────────────────────────────────────────────┤
//! │  Database  (rusqlite WAL, spawn_blocking)     │
//! │  Migrations (versioned, transactional)        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! [`MessageStore`] also implements the pipeline's `MessageRepository`
//! seam, so the orchestrator drives translation through the same
//! conditional writes as every other caller.

pub mod community_store;
pub mod conversation_store;
pub mod db;
pub mod error;
pub mod glossary_store;
pub mod message_store;
pub mod migration;
pub mod user_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use community_store::{Channel, Community, CommunityStore, DiscoveredCommunity, slugify};
pub use conversation_store::{Conversation, ConversationStore, DM_COMMUNITY_ID};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use glossary_store::{GlossaryStore, StoredTerm};
pub use message_store::{
    Message, MessageStatus, MessageStore, Reaction, ReactionOutcome, Translation,
};
pub use user_store::{ProfileUpdate, User, UserStore};

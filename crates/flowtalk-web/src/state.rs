//! Shared application state for the web server.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers.  Everything in it is a long-lived object constructed at
//! startup — no hidden initialization.

use std::sync::Arc;

use flowtalk_pipeline::TranslationPipeline;
use flowtalk_store::{
    CommunityStore, ConversationStore, Database, GlossaryStore, MessageStore, UserStore,
};

use crate::auth::TokenSigner;

/// Shared state accessible from every Axum handler.
pub struct AppState {
    /// Account storage.
    pub users: UserStore,
    /// Communities, channels, membership.
    pub communities: CommunityStore,
    /// DM threads.
    pub conversations: ConversationStore,
    /// Messages, translations, reactions.
    pub messages: MessageStore,
    /// Per-community glossary terms.
    pub glossary: GlossaryStore,
    /// The translation pipeline.
    pub pipeline: Arc<TranslationPipeline>,
    /// Bearer-token signing and verification.
    pub tokens: TokenSigner,
}

impl AppState {
    /// Build the state from a database handle and a ready pipeline.
    pub fn new(db: Database, pipeline: Arc<TranslationPipeline>, tokens: TokenSigner) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            communities: CommunityStore::new(db.clone()),
            conversations: ConversationStore::new(db.clone()),
            messages: MessageStore::new(db.clone()),
            glossary: GlossaryStore::new(db),
            pipeline,
            tokens,
        }
    }
}

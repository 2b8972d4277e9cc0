//! REST API route handlers.
//!
//! Request and response bodies are explicit camelCase structs — inputs are
//! validated into typed records at this boundary before anything reaches
//! the core.  Handlers stay thin: membership check, store call, view
//! mapping.  Posting a message is the one place with real choreography:
//! validate → detect → persist → resolve fan-out → spawn the pipeline.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use flowtalk_pipeline::{Language, TermCategory, resolve_targets};
use flowtalk_store::{
    Channel, Community, Conversation, Message, MessageStatus, Reaction, ReactionOutcome,
    Translation,
};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Reactions are drawn from a closed set; anything else is rejected.
const ALLOWED_EMOJIS: &[&str] = &["👍", "❤️", "😂", "🎉", "😮", "😢", "🙏"];

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A message as served to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub content: String,
    pub source_language: Language,
    pub is_romanized: bool,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Value>,
    pub timestamp: i64,
    pub translations: Vec<TranslationView>,
    pub reactions: Vec<ReactionView>,
}

/// One translation entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationView {
    pub target_language: Language,
    pub translated_content: String,
    pub created_at: i64,
}

/// One reaction entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionView {
    pub user_id: String,
    pub emoji: String,
    pub created_at: i64,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            channel_id: m.channel_id,
            sender_id: m.sender_id,
            content: m.content,
            source_language: m.source_language,
            is_romanized: m.detected_romanized,
            status: m.status,
            attachment: m.attachment,
            timestamp: m.created_at_ms,
            translations: m.translations.into_iter().map(Into::into).collect(),
            reactions: m.reactions.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Translation> for TranslationView {
    fn from(t: Translation) -> Self {
        Self {
            target_language: t.target_language,
            translated_content: t.content,
            created_at: t.created_at,
        }
    }
}

impl From<Reaction> for ReactionView {
    fn from(r: Reaction) -> Self {
        Self {
            user_id: r.user_id,
            emoji: r.emoji,
            created_at: r.created_at,
        }
    }
}

/// A community as served to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: i64,
}

impl From<Community> for CommunityView {
    fn from(c: Community) -> Self {
        Self {
            id: c.id,
            name: c.name,
            description: c.description,
            created_at: c.created_at,
        }
    }
}

/// A channel as served to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: String,
    pub community_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: i64,
}

impl From<Channel> for ChannelView {
    fn from(c: Channel) -> Self {
        Self {
            id: c.id,
            community_id: c.community_id,
            name: c.name,
            description: c.description,
            created_at: c.created_at,
        }
    }
}

/// A DM thread as served to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: String,
    pub participants: [String; 2],
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
}

impl From<Conversation> for ConversationView {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            participants: c.participants,
            created_at: c.created_at,
            last_message_at: c.last_message_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel resolution
// ---------------------------------------------------------------------------

/// A channel id resolves either to a community channel or a DM thread.
enum ResolvedChannel {
    Community(Channel),
    Dm(Conversation),
}

impl ResolvedChannel {
    /// The community whose glossary applies, if any.
    fn community_id(&self) -> Option<&str> {
        match self {
            Self::Community(channel) => Some(&channel.community_id),
            Self::Dm(_) => None,
        }
    }
}

/// Resolve a channel id and enforce membership for `user_id`.
async fn resolve_channel(
    state: &AppState,
    channel_id: &str,
    user_id: &str,
) -> ApiResult<ResolvedChannel> {
    if let Some(channel) = state.communities.get_channel(channel_id).await? {
        if !state
            .communities
            .is_member(&channel.community_id, user_id)
            .await?
        {
            return Err(ApiError::Forbidden);
        }
        return Ok(ResolvedChannel::Community(channel));
    }

    if let Some(thread) = state.conversations.get(channel_id).await? {
        if !thread.participants.iter().any(|p| p == user_id) {
            return Err(ApiError::Forbidden);
        }
        return Ok(ResolvedChannel::Dm(thread));
    }

    Err(ApiError::NotFound("channel"))
}

/// The member-language snapshot that drives fan-out for this channel.
async fn member_languages(
    state: &AppState,
    resolved: &ResolvedChannel,
) -> ApiResult<Vec<Language>> {
    match resolved {
        ResolvedChannel::Community(channel) => {
            Ok(state.communities.channel_member_languages(&channel.id).await?)
        }
        ResolvedChannel::Dm(thread) => {
            Ok(state.conversations.participant_languages(&thread.id).await?)
        }
    }
}

// ---------------------------------------------------------------------------
// GET /healthz
// ---------------------------------------------------------------------------

/// Liveness probe with cache effectiveness numbers.
pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.pipeline.cache().stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": stats,
    }))
}

// ---------------------------------------------------------------------------
// GET /messages
// ---------------------------------------------------------------------------

/// Query for `GET /messages` and `DELETE /messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub channel_id: String,
    pub limit: Option<u32>,
}

/// Recent channel messages, hydrated for the caller's language.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Value>> {
    resolve_channel(&state, &query.channel_id, &auth.user_id).await?;

    let viewer = state
        .users
        .get(&auth.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let messages = state
        .messages
        .get_channel_messages(
            &query.channel_id,
            query.limit.unwrap_or(50),
            &auth.user_id,
            viewer.primary_language,
        )
        .await?;

    let views: Vec<MessageView> = messages.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "messages": views })))
}

// ---------------------------------------------------------------------------
// POST /messages
// ---------------------------------------------------------------------------

/// Body for `POST /messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageBody {
    pub channel_id: String,
    pub content: String,
    #[serde(default)]
    pub attachment: Option<Value>,
}

/// Store a message and enqueue its translation fan-out.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PostMessageBody>,
) -> ApiResult<Json<Value>> {
    if body.content.trim().is_empty() {
        return Err(ApiError::invalid("content is required"));
    }

    let resolved = resolve_channel(&state, &body.channel_id, &auth.user_id).await?;

    // Detection runs on the masked content and also validates it; invalid
    // content is rejected here, before anything is stored.
    let detection = state.pipeline.detect_source(&body.content)?;

    let message = state
        .messages
        .create_message(
            &body.channel_id,
            &auth.user_id,
            &body.content,
            detection.language,
            detection.is_romanized,
            body.attachment,
        )
        .await?;

    // Snapshot of member languages at post time drives the fan-out.
    let languages = member_languages(&state, &resolved).await?;
    let targets = resolve_targets(languages, detection.language);

    let community_terms = match resolved.community_id() {
        Some(community_id) => state.glossary.entries_for_community(community_id).await?,
        None => Vec::new(),
    };

    if let ResolvedChannel::Dm(thread) = &resolved {
        state.conversations.touch(&thread.id).await?;
    }

    let pipeline = Arc::clone(&state.pipeline);
    let message_id = message.id.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline
            .translate_message(&message_id, &targets, community_terms)
            .await
        {
            error!(message_id, error = %e, "translation fan-out failed");
        }
    });

    debug!(message_id = %message.id, "message posted");
    Ok(Json(json!({ "message": MessageView::from(message) })))
}

// ---------------------------------------------------------------------------
// DELETE /messages
// ---------------------------------------------------------------------------

/// Clear a channel's history.
pub async fn delete_messages(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Value>> {
    resolve_channel(&state, &query.channel_id, &auth.user_id).await?;
    let deleted = state
        .messages
        .delete_channel_messages(&query.channel_id)
        .await?;
    Ok(Json(json!({ "deletedCount": deleted })))
}

// ---------------------------------------------------------------------------
// POST /messages/reactions
// ---------------------------------------------------------------------------

/// Body for `POST /messages/reactions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionBody {
    pub message_id: String,
    pub emoji: String,
}

/// Set (or toggle) the caller's reaction on a message.
pub async fn add_reaction(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ReactionBody>,
) -> ApiResult<Json<Value>> {
    if !ALLOWED_EMOJIS.contains(&body.emoji.as_str()) {
        return Err(ApiError::invalid(format!(
            "unsupported emoji: {}",
            body.emoji
        )));
    }

    let message = state
        .messages
        .get_message(&body.message_id)
        .await?
        .ok_or(ApiError::NotFound("message"))?;
    resolve_channel(&state, &message.channel_id, &auth.user_id).await?;

    let outcome = state
        .messages
        .set_reaction(&body.message_id, &auth.user_id, &body.emoji)
        .await?;
    let action = match outcome {
        ReactionOutcome::Added => "added",
        ReactionOutcome::Replaced => "replaced",
        ReactionOutcome::Removed => "removed",
    };
    Ok(Json(json!({ "action": action })))
}

/// Query for `DELETE /messages/reactions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReactionQuery {
    pub message_id: String,
    pub emoji: String,
}

/// Explicitly remove the caller's reaction.
pub async fn remove_reaction(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<RemoveReactionQuery>,
) -> ApiResult<Json<Value>> {
    let removed = state
        .messages
        .remove_reaction(&query.message_id, &auth.user_id, &query.emoji)
        .await?;
    if !removed {
        return Err(ApiError::NotFound("reaction"));
    }
    Ok(Json(json!({ "action": "removed" })))
}

// ---------------------------------------------------------------------------
// Communities
// ---------------------------------------------------------------------------

/// The caller's communities and every channel in them.
pub async fn list_communities(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Value>> {
    let (communities, channels) = state.communities.list_for_user(&auth.user_id).await?;
    let communities: Vec<CommunityView> = communities.into_iter().map(Into::into).collect();
    let channels: Vec<ChannelView> = channels.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "communities": communities, "channels": channels })))
}

/// Body for `POST /communities`.
#[derive(Debug, Deserialize)]
pub struct CreateCommunityBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Create a community (with its default `general` channel) and join it.
pub async fn create_community(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateCommunityBody>,
) -> ApiResult<Json<Value>> {
    let (community, general) = state
        .communities
        .create_community(&body.name, body.description, &auth.user_id)
        .await?;
    Ok(Json(json!({
        "community": CommunityView::from(community),
        "channel": ChannelView::from(general),
    })))
}

/// Every community with the caller's membership flag.
pub async fn discover_communities(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Value>> {
    let discovered = state.communities.discover(&auth.user_id).await?;
    let views: Vec<Value> = discovered
        .into_iter()
        .map(|d| {
            json!({
                "id": d.community.id,
                "name": d.community.name,
                "description": d.community.description,
                "createdAt": d.community.created_at,
                "isMember": d.is_member,
            })
        })
        .collect();
    Ok(Json(json!({ "communities": views })))
}

/// Join a community.
pub async fn join_community(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(community_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.communities.join(&community_id, &auth.user_id).await?;
    Ok(Json(json!({})))
}

// ---------------------------------------------------------------------------
// Community glossary
// ---------------------------------------------------------------------------

/// A community's protected terms (members only).
pub async fn list_glossary(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(community_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.communities.is_member(&community_id, &auth.user_id).await? {
        return Err(ApiError::Forbidden);
    }
    let terms = state.glossary.list(&community_id).await?;
    let views: Vec<Value> = terms
        .iter()
        .map(|t| {
            json!({
                "id": t.id,
                "term": t.term,
                "category": t.category.as_str(),
                "preserveCase": t.preserve_case,
                "createdAt": t.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "terms": views })))
}

/// Body for `POST /communities/{id}/glossary`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTermBody {
    pub term: String,
    pub category: Option<String>,
    #[serde(default = "default_preserve_case")]
    pub preserve_case: bool,
}

fn default_preserve_case() -> bool {
    true
}

/// Pin a protected term for a community (members only).
pub async fn add_glossary_term(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(community_id): Path<String>,
    Json(body): Json<AddTermBody>,
) -> ApiResult<Json<Value>> {
    if !state.communities.is_member(&community_id, &auth.user_id).await? {
        return Err(ApiError::Forbidden);
    }
    let category = match body.category.as_deref() {
        None => TermCategory::Custom,
        Some(s) => TermCategory::from_str(s)
            .ok_or_else(|| ApiError::invalid(format!("unknown category: {s}")))?,
    };
    let term = state
        .glossary
        .add(&community_id, &body.term, category, body.preserve_case)
        .await?;
    Ok(Json(json!({
        "term": {
            "id": term.id,
            "term": term.term,
            "category": term.category.as_str(),
            "preserveCase": term.preserve_case,
        }
    })))
}

/// Remove a protected term (members only).
pub async fn remove_glossary_term(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((community_id, term_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    if !state.communities.is_member(&community_id, &auth.user_id).await? {
        return Err(ApiError::Forbidden);
    }
    if !state.glossary.remove(&community_id, &term_id).await? {
        return Err(ApiError::NotFound("glossary_term"));
    }
    Ok(Json(json!({})))
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Body for `POST /channels`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelBody {
    pub community_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Create a channel in a community the caller belongs to.
pub async fn create_channel(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateChannelBody>,
) -> ApiResult<Json<Value>> {
    if !state
        .communities
        .is_member(&body.community_id, &auth.user_id)
        .await?
    {
        return Err(ApiError::Forbidden);
    }
    let channel = state
        .communities
        .create_channel(&body.community_id, &body.name, body.description)
        .await?;
    Ok(Json(json!({ "channel": ChannelView::from(channel) })))
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// The caller's DM threads, most recently active first.
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Value>> {
    let threads = state.conversations.list_for_user(&auth.user_id).await?;
    let views: Vec<ConversationView> = threads.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "conversations": views })))
}

/// Body for `POST /conversations`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationBody {
    pub target_username: String,
}

/// Open (or return) the one thread with another user.  The target may be
/// given as a username or a raw user id.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateConversationBody>,
) -> ApiResult<Json<Value>> {
    let target = match state.users.get_by_username(&body.target_username).await? {
        Some(user) => user,
        None => state
            .users
            .get(&body.target_username)
            .await?
            .ok_or(ApiError::NotFound("user"))?,
    };

    let (thread, created) = state
        .conversations
        .create_or_get(&auth.user_id, &target.id)
        .await?;
    debug!(conversation_id = %thread.id, created, "conversation resolved");
    Ok(Json(json!({ "conversation": ConversationView::from(thread) })))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Public profile by user id.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user = state
        .users
        .get(&user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(json!({
        "id": user.id,
        "username": user.username,
        "primaryLanguage": user.primary_language,
        "avatar": user.avatar,
        "status": user.status_message,
    })))
}

//! Message persistence — the canonical record of every posted message,
//! its accumulated translations, and its reactions.
//!
//! Messages are immutable after creation; `translations` is append-only
//! and `status` only moves along `sent → translating → translated|failed`.
//! Both guarantees are enforced here with conditional writes (a `WHERE`
//! on the source status, a composite primary key on translations), so
//! racing orchestrator runs degrade to harmless no-ops.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use flowtalk_pipeline::Language;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ── types ────────────────────────────────────────────────────────────

/// Lifecycle state of a message's translation fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Stored, translation not yet started.
    Sent,
    /// The pipeline has claimed the message.
    Translating,
    /// At least one target succeeded (or none were needed).
    Translated,
    /// Every target failed.
    Failed,
}

impl MessageStatus {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Translating => "translating",
            Self::Translated => "translated",
            Self::Failed => "failed",
        }
    }

    /// Parse the database string form.
    pub fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "sent" => Ok(Self::Sent),
            "translating" => Ok(Self::Translating),
            "translated" => Ok(Self::Translated),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown message status: {other}"
            ))),
        }
    }

    /// The single legal predecessor of this status, if any.
    fn legal_from(&self) -> Option<MessageStatus> {
        match self {
            Self::Sent => None,
            Self::Translating => Some(Self::Sent),
            Self::Translated | Self::Failed => Some(Self::Translating),
        }
    }
}

/// One translation of a message into a target language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    /// The language this rendering is for.
    pub target_language: Language,
    /// The translated text.
    pub content: String,
    /// Unix timestamp when the translation was written.
    pub created_at: i64,
}

/// An emoji reaction.  At most one per `(message, user)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    /// Who reacted.
    pub user_id: String,
    /// The emoji.
    pub emoji: String,
    /// Unix timestamp of the reaction.
    pub created_at: i64,
}

/// A stored message with its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// The channel (or DM thread) it was posted to.
    pub channel_id: String,
    /// The author.
    pub sender_id: String,
    /// Original text, never rewritten.
    pub content: String,
    /// Language detected at creation, never rewritten.
    pub source_language: Language,
    /// Whether detection saw a romanized script (e.g. Hinglish).
    pub detected_romanized: bool,
    /// Translation lifecycle state.
    pub status: MessageStatus,
    /// Opaque attachment metadata, if any.
    pub attachment: Option<serde_json::Value>,
    /// Millisecond Unix timestamp; orders messages within a channel.
    pub created_at_ms: i64,
    /// Accumulated translations, in insertion order.
    pub translations: Vec<Translation>,
    /// Reactions, in insertion order.
    pub reactions: Vec<Reaction>,
}

/// What [`MessageStore::set_reaction`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionOutcome {
    /// No prior reaction by this user; the emoji was added.
    Added,
    /// A different emoji was replaced by the new one.
    Replaced,
    /// The same emoji was toggled off.
    Removed,
}

/// Hard cap on page size for channel reads.
const MAX_PAGE: u32 = 100;

// ── store ────────────────────────────────────────────────────────────

/// Message, translation, and reaction persistence.
#[derive(Clone)]
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    /// Create a message store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a new message with `status = sent` and no translations.
    ///
    /// The caller supplies the detected source language; detection happens
    /// at post time so it can reject invalid content before storage.
    #[instrument(skip(self, content, attachment))]
    pub async fn create_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        content: &str,
        source_language: Language,
        detected_romanized: bool,
        attachment: Option<serde_json::Value>,
    ) -> StoreResult<Message> {
        let message = Message {
            id: Uuid::now_v7().to_string(),
            channel_id: channel_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            source_language,
            detected_romanized,
            status: MessageStatus::Sent,
            attachment,
            created_at_ms: Utc::now().timestamp_millis(),
            translations: Vec::new(),
            reactions: Vec::new(),
        };

        let row = message.clone();
        self.db
            .execute(move |conn| {
                let attachment_json = row
                    .attachment
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                conn.execute(
                    "INSERT INTO messages \
                     (id, channel_id, sender_id, content, source_language, detected_romanized, \
                      status, attachment, created_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        row.id,
                        row.channel_id,
                        row.sender_id,
                        row.content,
                        row.source_language.as_code(),
                        row.detected_romanized,
                        row.status.as_str(),
                        attachment_json,
                        row.created_at_ms,
                    ],
                )?;
                Ok(())
            })
            .await?;

        debug!(message_id = %message.id, channel_id, "message created");
        Ok(message)
    }

    /// Fetch one message with translations and reactions.
    pub async fn get_message(&self, id: &str) -> StoreResult<Option<Message>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, channel_id, sender_id, content, source_language, \
                            detected_romanized, status, attachment, created_at_ms \
                     FROM messages WHERE id = ?1",
                )?;
                let mut rows = stmt.query_map([&id], row_to_message)?;
                let Some(row) = rows.next() else {
                    return Ok(None);
                };
                let mut message = row??;
                message.translations = load_translations(conn, &message.id)?;
                message.reactions = load_reactions(conn, &message.id)?;
                Ok(Some(message))
            })
            .await
    }

    /// Transition a message's status.
    ///
    /// The update is conditional on the legal predecessor state, so an
    /// illegal or stale transition affects zero rows and surfaces as
    /// [`StoreError::Conflict`] (or `NotFound` when the message is gone).
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: &str, new_status: MessageStatus) -> StoreResult<()> {
        let Some(from) = new_status.legal_from() else {
            return Err(StoreError::Conflict {
                entity: "message",
                detail: format!("cannot transition into {}", new_status.as_str()),
            });
        };

        let id_owned = id.to_string();
        let affected = self
            .db
            .execute(move |conn| {
                Ok(conn.execute(
                    "UPDATE messages SET status = ?1 WHERE id = ?2 AND status = ?3",
                    rusqlite::params![new_status.as_str(), id_owned, from.as_str()],
                )?)
            })
            .await?;

        if affected == 1 {
            return Ok(());
        }

        match self.get_message(id).await? {
            Some(current) => Err(StoreError::Conflict {
                entity: "message",
                detail: format!(
                    "cannot transition {} → {}",
                    current.status.as_str(),
                    new_status.as_str()
                ),
            }),
            None => Err(StoreError::NotFound {
                entity: "message",
                id: id.to_string(),
            }),
        }
    }

    /// Append a translation unless one already exists for the target.
    ///
    /// Returns true when the row was inserted, false on the idempotent
    /// duplicate (the later writer's value is dropped).
    #[instrument(skip(self, content))]
    pub async fn append_translation(
        &self,
        message_id: &str,
        target: Language,
        content: &str,
    ) -> StoreResult<bool> {
        let message_id = message_id.to_string();
        let content = content.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO translations \
                     (message_id, target_language, content, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![message_id, target.as_code(), content, now],
                )?;
                Ok(inserted == 1)
            })
            .await
    }

    /// The most recent messages in a channel, oldest first, hydrated for
    /// one viewer.
    ///
    /// `limit` is capped at 100.  Translations are filtered to the
    /// viewer's language to keep payloads small; the sender gets the full
    /// set (their client shows the original anyway).
    pub async fn get_channel_messages(
        &self,
        channel_id: &str,
        limit: u32,
        viewer_id: &str,
        viewer_language: Language,
    ) -> StoreResult<Vec<Message>> {
        let channel_id = channel_id.to_string();
        let viewer_id = viewer_id.to_string();
        let limit = limit.min(MAX_PAGE);
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, channel_id, sender_id, content, source_language, \
                            detected_romanized, status, attachment, created_at_ms \
                     FROM messages WHERE channel_id = ?1 \
                     ORDER BY created_at_ms DESC, rowid DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![channel_id, limit], row_to_message)?;

                let mut messages = Vec::new();
                for row in rows {
                    let mut message = row??;
                    let translations = load_translations(conn, &message.id)?;
                    message.translations = if message.sender_id == viewer_id {
                        translations
                    } else {
                        translations
                            .into_iter()
                            .filter(|t| t.target_language == viewer_language)
                            .collect()
                    };
                    message.reactions = load_reactions(conn, &message.id)?;
                    messages.push(message);
                }
                // Fetched newest-first for the LIMIT; serve oldest-first.
                messages.reverse();
                Ok(messages)
            })
            .await
    }

    /// Delete every message in a channel.  Returns the count removed.
    #[instrument(skip(self))]
    pub async fn delete_channel_messages(&self, channel_id: &str) -> StoreResult<usize> {
        let channel_id = channel_id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM messages WHERE channel_id = ?1",
                    [&channel_id],
                )?)
            })
            .await
    }

    /// Set (or toggle) a user's reaction on a message.
    ///
    /// The one-reaction-per-user invariant is enforced in a transaction:
    /// any existing reaction by the user is removed first; if it carried
    /// the same emoji the operation is a toggle-off.
    #[instrument(skip(self))]
    pub async fn set_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> StoreResult<ReactionOutcome> {
        let message_id = message_id.to_string();
        let user_id = user_id.to_string();
        let emoji = emoji.to_string();
        let now = Utc::now().timestamp();

        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let exists: bool = tx.query_row(
                    "SELECT count(*) FROM messages WHERE id = ?1",
                    [&message_id],
                    |row| row.get::<_, i64>(0).map(|n| n > 0),
                )?;
                if !exists {
                    return Err(StoreError::NotFound {
                        entity: "message",
                        id: message_id,
                    });
                }

                let previous: Option<String> = tx
                    .query_row(
                        "SELECT emoji FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                        rusqlite::params![message_id, user_id],
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                let outcome = match previous {
                    Some(prior) => {
                        tx.execute(
                            "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                            rusqlite::params![message_id, user_id],
                        )?;
                        if prior == emoji {
                            // Same emoji toggles off; nothing to insert.
                            tx.commit()?;
                            return Ok(ReactionOutcome::Removed);
                        }
                        ReactionOutcome::Replaced
                    }
                    None => ReactionOutcome::Added,
                };

                tx.execute(
                    "INSERT INTO reactions (message_id, user_id, emoji, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![message_id, user_id, emoji, now],
                )?;
                tx.commit()?;
                Ok(outcome)
            })
            .await
    }

    /// Explicitly delete a user's reaction.  Returns true when a row with
    /// this exact emoji existed.
    #[instrument(skip(self))]
    pub async fn remove_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> StoreResult<bool> {
        let message_id = message_id.to_string();
        let user_id = user_id.to_string();
        let emoji = emoji.to_string();
        self.db
            .execute(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM reactions \
                     WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                    rusqlite::params![message_id, user_id, emoji],
                )?;
                Ok(removed == 1)
            })
            .await
    }
}

// ── pipeline repository seam ─────────────────────────────────────────

#[async_trait::async_trait]
impl flowtalk_pipeline::MessageRepository for MessageStore {
    async fn load(
        &self,
        message_id: &str,
    ) -> flowtalk_pipeline::Result<Option<flowtalk_pipeline::PipelineMessage>> {
        let message = self
            .get_message(message_id)
            .await
            .map_err(|e| flowtalk_pipeline::PipelineError::Repository {
                reason: e.to_string(),
            })?;
        Ok(message.map(|m| flowtalk_pipeline::PipelineMessage {
            id: m.id,
            channel_id: m.channel_id,
            content: m.content,
            source_language: m.source_language,
        }))
    }

    async fn begin_translating(&self, message_id: &str) -> flowtalk_pipeline::Result<bool> {
        match self
            .update_status(message_id, MessageStatus::Translating)
            .await
        {
            Ok(()) => Ok(true),
            // Not in `sent` (or already gone): another run owns it.
            Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(flowtalk_pipeline::PipelineError::Repository {
                reason: e.to_string(),
            }),
        }
    }

    async fn append_translation(
        &self,
        message_id: &str,
        target: Language,
        content: &str,
    ) -> flowtalk_pipeline::Result<bool> {
        MessageStore::append_translation(self, message_id, target, content)
            .await
            .map_err(|e| flowtalk_pipeline::PipelineError::Repository {
                reason: e.to_string(),
            })
    }

    async fn finish(&self, message_id: &str, success: bool) -> flowtalk_pipeline::Result<()> {
        let status = if success {
            MessageStatus::Translated
        } else {
            MessageStatus::Failed
        };
        match self.update_status(message_id, status).await {
            Ok(()) => Ok(()),
            // A concurrent run already settled the message.
            Err(StoreError::Conflict { .. }) => Ok(()),
            Err(e) => Err(flowtalk_pipeline::PipelineError::Repository {
                reason: e.to_string(),
            }),
        }
    }
}

// ── row mapping ──────────────────────────────────────────────────────

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<Message>> {
    let lang_code: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    let attachment_json: Option<String> = row.get(7)?;
    let id: String = row.get(0)?;
    let channel_id: String = row.get(1)?;
    let sender_id: String = row.get(2)?;
    let content: String = row.get(3)?;
    let detected_romanized: bool = row.get(5)?;
    let created_at_ms: i64 = row.get(8)?;

    Ok((|| {
        Ok(Message {
            id,
            channel_id,
            sender_id,
            content,
            source_language: Language::from_code(&lang_code).ok_or_else(|| {
                StoreError::InvalidArgument(format!("unknown language code: {lang_code}"))
            })?,
            detected_romanized,
            status: MessageStatus::from_str(&status_str)?,
            attachment: attachment_json
                .map(|json| serde_json::from_str(&json))
                .transpose()?,
            created_at_ms,
            translations: Vec::new(),
            reactions: Vec::new(),
        })
    })())
}

fn load_translations(
    conn: &rusqlite::Connection,
    message_id: &str,
) -> StoreResult<Vec<Translation>> {
    let mut stmt = conn.prepare(
        "SELECT target_language, content, created_at \
         FROM translations WHERE message_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map([message_id], |row| {
        let code: String = row.get(0)?;
        let content: String = row.get(1)?;
        let created_at: i64 = row.get(2)?;
        Ok((code, content, created_at))
    })?;

    let mut translations = Vec::new();
    for row in rows {
        let (code, content, created_at) = row?;
        let target_language = Language::from_code(&code).ok_or_else(|| {
            StoreError::InvalidArgument(format!("unknown language code: {code}"))
        })?;
        translations.push(Translation {
            target_language,
            content,
            created_at,
        });
    }
    Ok(translations)
}

fn load_reactions(conn: &rusqlite::Connection, message_id: &str) -> StoreResult<Vec<Reaction>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, emoji, created_at \
         FROM reactions WHERE message_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map([message_id], |row| {
        Ok(Reaction {
            user_id: row.get(0)?,
            emoji: row.get(1)?,
            created_at: row.get(2)?,
        })
    })?;

    let mut reactions = Vec::new();
    for row in rows {
        reactions.push(row?);
    }
    Ok(reactions)
}

//! Direct-message thread persistence.
//!
//! A conversation is a two-party thread modelled as a channel with the
//! reserved `dm` community sentinel: its id doubles as the `channel_id`
//! of its messages.  Participants are stored sorted so the unordered pair
//! is unique — at most one thread ever exists per pair.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use flowtalk_pipeline::Language;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// The sentinel community id that marks a channel as a DM thread.
pub const DM_COMMUNITY_ID: &str = "dm";

/// A two-party direct-message thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier; also the `channel_id` of the thread's messages.
    pub id: String,
    /// The two participants, sorted.
    pub participants: [String; 2],
    /// Unix timestamp when the thread was created.
    pub created_at: i64,
    /// Unix timestamp of the latest message, if any.
    pub last_message_at: Option<i64>,
}

/// CRUD for DM threads.
#[derive(Clone)]
pub struct ConversationStore {
    db: Database,
}

impl ConversationStore {
    /// Create a conversation store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch the thread for a pair, creating it on first contact.
    ///
    /// Returns the thread and whether it was newly created.
    #[instrument(skip(self))]
    pub async fn create_or_get(&self, user_a: &str, user_b: &str) -> StoreResult<(Conversation, bool)> {
        if user_a == user_b {
            return Err(StoreError::InvalidArgument(
                "cannot open a conversation with yourself".into(),
            ));
        }
        let (first, second) = if user_a < user_b {
            (user_a.to_string(), user_b.to_string())
        } else {
            (user_b.to_string(), user_a.to_string())
        };

        let candidate = Conversation {
            id: Uuid::now_v7().to_string(),
            participants: [first.clone(), second.clone()],
            created_at: Utc::now().timestamp(),
            last_message_at: None,
        };

        let row = candidate.clone();
        self.db
            .execute(move |conn| {
                if let Some(existing) = find_by_pair(conn, &first, &second)? {
                    return Ok((existing, false));
                }
                // INSERT OR IGNORE so a racing creator wins cleanly; the
                // re-read below returns whichever row survived.
                conn.execute(
                    "INSERT OR IGNORE INTO conversations \
                     (id, participant_a, participant_b, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![row.id, first, second, row.created_at],
                )?;
                match find_by_pair(conn, &first, &second)? {
                    Some(thread) => {
                        let created = thread.id == row.id;
                        Ok((thread, created))
                    }
                    None => Err(StoreError::NotFound {
                        entity: "conversation",
                        id: format!("{first}/{second}"),
                    }),
                }
            })
            .await
            .inspect(|(thread, created)| {
                if *created {
                    debug!(conversation_id = %thread.id, "conversation created");
                }
            })
    }

    /// Fetch a thread by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Conversation>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, participant_a, participant_b, created_at, last_message_at \
                     FROM conversations WHERE id = ?1",
                )?;
                let mut rows = stmt.query_map([&id], row_to_conversation)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Every thread the user participates in, most recently active first.
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, participant_a, participant_b, created_at, last_message_at \
                     FROM conversations \
                     WHERE participant_a = ?1 OR participant_b = ?1 \
                     ORDER BY coalesce(last_message_at, 0) DESC, created_at DESC",
                )?;
                let rows = stmt.query_map([&user_id], row_to_conversation)?;
                Ok(rows.collect::<Result<_, _>>()?)
            })
            .await
    }

    /// Record activity on a thread.
    pub async fn touch(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE conversations SET last_message_at = ?2 WHERE id = ?1",
                    rusqlite::params![id, now],
                )?;
                Ok(())
            })
            .await
    }

    /// The primary languages of the two participants, for fan-out.
    pub async fn participant_languages(&self, id: &str) -> StoreResult<Vec<Language>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT u.primary_language \
                     FROM conversations c \
                     JOIN users u ON u.id IN (c.participant_a, c.participant_b) \
                     WHERE c.id = ?1",
                )?;
                let codes = stmt.query_map([&id], |row| row.get::<_, String>(0))?;
                let mut languages = Vec::new();
                for code in codes {
                    let code = code?;
                    languages.push(Language::from_code(&code).ok_or_else(|| {
                        StoreError::InvalidArgument(format!("unknown language code: {code}"))
                    })?);
                }
                Ok(languages)
            })
            .await
    }
}

fn find_by_pair(
    conn: &rusqlite::Connection,
    first: &str,
    second: &str,
) -> StoreResult<Option<Conversation>> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_a, participant_b, created_at, last_message_at \
         FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
    )?;
    let mut rows = stmt.query_map([first, second], row_to_conversation)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        participants: [row.get(1)?, row.get(2)?],
        created_at: row.get(3)?,
        last_message_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_store::UserStore;

    async fn setup() -> (ConversationStore, String, String) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let users = UserStore::new(db.clone());
        let ana = users
            .create("ana@example.com", "pw", "ana", Language::Es)
            .await
            .unwrap()
            .id;
        let bo = users
            .create("bo@example.com", "pw", "bo", Language::En)
            .await
            .unwrap()
            .id;
        (ConversationStore::new(db), ana, bo)
    }

    #[tokio::test]
    async fn create_then_get_same_thread() {
        let (store, ana, bo) = setup().await;

        let (first, created) = store.create_or_get(&ana, &bo).await.unwrap();
        assert!(created);

        // Either argument order resolves to the one thread.
        let (second, created) = store.create_or_get(&bo, &ana).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn participants_are_sorted() {
        let (store, ana, bo) = setup().await;
        let (thread, _) = store.create_or_get(&bo, &ana).await.unwrap();
        assert!(thread.participants[0] < thread.participants[1]);
    }

    #[tokio::test]
    async fn self_conversation_rejected() {
        let (store, ana, _) = setup().await;
        assert!(matches!(
            store.create_or_get(&ana, &ana).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn list_orders_by_activity() {
        let (store, ana, bo) = setup().await;
        let db = store.db.clone();
        let users = UserStore::new(db);
        let cy = users
            .create("cy@example.com", "pw", "cy", Language::Fr)
            .await
            .unwrap()
            .id;

        let (quiet, _) = store.create_or_get(&ana, &bo).await.unwrap();
        let (active, _) = store.create_or_get(&ana, &cy).await.unwrap();
        store.touch(&active.id).await.unwrap();

        let threads = store.list_for_user(&ana).await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, active.id);
        assert_eq!(threads[1].id, quiet.id);
    }

    #[tokio::test]
    async fn participant_languages_for_fanout() {
        let (store, ana, bo) = setup().await;
        let (thread, _) = store.create_or_get(&ana, &bo).await.unwrap();

        let mut langs = store.participant_languages(&thread.id).await.unwrap();
        langs.sort();
        assert_eq!(langs, vec![Language::En, Language::Es]);
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let (store, _, _) = setup().await;
        assert!(store.get("ghost").await.unwrap().is_none());
    }
}
